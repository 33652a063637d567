//! Constrained triangulation of a mesh triangle against the segments where
//! it meets the other operand.
//!
//! The triangle is projected onto the coordinate plane its normal is most
//! aligned with, segment endpoints and crossings are inserted one at a
//! time, then each segment is recovered as an edge by flipping the edges
//! that cross it. Every output triangle lies on one side of every segment,
//! so a single inside/outside test per piece is enough.

use std::collections::VecDeque;

use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;

type P2 = [f64; 2];

/// Split `tri` so every segment in `segments` is a union of edges. Output
/// triangles keep the winding of `tri`.
pub fn triangulate_with_segments(tri: &[Point3d; 3], segments: &[(Point3d, Point3d)], eps: f64) -> Vec<[Point3d; 3]> {
    if segments.is_empty() {
        return vec![*tri];
    }
    let normal = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
    let Some(mut planar) = Planar::new(tri, normal, eps) else {
        return vec![*tri];
    };

    let ends: Vec<(usize, usize)> = segments
        .iter()
        .filter_map(|(p, q)| Some((planar.insert(*p)?, planar.insert(*q)?)))
        .filter(|(a, b)| a != b)
        .collect();

    for (i, &(a1, b1)) in ends.iter().enumerate() {
        for &(a2, b2) in &ends[i + 1..] {
            if let Some(x) = planar.crossing_point(a1, b1, a2, b2) {
                planar.insert(x);
            }
        }
    }

    let mut constraints: Vec<(usize, usize)> = ends.iter().flat_map(|&(a, b)| planar.pieces(a, b)).collect();
    constraints.sort_unstable();
    constraints.dedup();
    for (a, b) in constraints {
        planar.recover(a, b);
    }

    planar
        .triangles
        .iter()
        .map(|t| t.map(|i| planar.points[i]))
        .collect()
}

/// Drops the axis the normal is most aligned with; swaps the remaining two
/// when that component is negative so counter-clockwise is preserved.
#[derive(Debug, Clone, Copy)]
struct Projection {
    axis: usize,
    swap: bool,
}

impl Projection {
    fn new(normal: Vec3) -> Self {
        let c = [normal.x, normal.y, normal.z];
        let axis = (0..3).max_by(|&i, &j| c[i].abs().total_cmp(&c[j].abs())).unwrap_or(2);
        Self {
            axis,
            swap: c[axis] < 0.0,
        }
    }

    fn apply(&self, p: &Point3d) -> P2 {
        let (u, v) = match self.axis {
            0 => (p.y, p.z),
            1 => (p.z, p.x),
            _ => (p.x, p.y),
        };
        if self.swap { [v, u] } else { [u, v] }
    }
}

fn orient(a: P2, b: P2, c: P2) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn length(a: P2, b: P2) -> f64 {
    (b[0] - a[0]).hypot(b[1] - a[1])
}

/// Distance of `p` to the left of the line through `a` and `b`.
fn left_distance(a: P2, b: P2, p: P2) -> f64 {
    let len = length(a, b);
    if len <= f64::EPSILON {
        return 0.0;
    }
    orient(a, b, p) / len
}

fn has_edge(t: &[usize; 3], a: usize, b: usize) -> bool {
    (0..3).any(|e| t[e] == a && t[(e + 1) % 3] == b)
}

fn opposite(t: &[usize; 3], a: usize, b: usize) -> usize {
    t.iter().copied().find(|&v| v != a && v != b).unwrap_or(t[0])
}

struct Planar {
    projection: Projection,
    eps: f64,
    points: Vec<Point3d>,
    coords: Vec<P2>,
    /// Counter-clockwise in projected coordinates.
    triangles: Vec<[usize; 3]>,
}

impl Planar {
    fn new(tri: &[Point3d; 3], normal: Vec3, eps: f64) -> Option<Self> {
        let projection = Projection::new(normal);
        let coords: Vec<P2> = tri.iter().map(|p| projection.apply(p)).collect();
        if orient(coords[0], coords[1], coords[2]) <= 0.0 {
            return None;
        }
        Some(Self {
            projection,
            eps,
            points: tri.to_vec(),
            coords,
            triangles: vec![[0, 1, 2]],
        })
    }

    /// Index of `p`, inserting it when no existing point lies within `eps`.
    /// `None` if `p` is outside the triangle by more than `eps`.
    fn insert(&mut self, p: Point3d) -> Option<usize> {
        if let Some(k) = self.points.iter().position(|q| q.distance_to(&p) <= self.eps) {
            return Some(k);
        }
        let c = self.projection.apply(&p);

        // The triangle that contains `c` most deeply.
        let mut best: Option<(usize, f64)> = None;
        for (t, tri) in self.triangles.iter().enumerate() {
            let depth = (0..3)
                .map(|e| left_distance(self.coords[tri[e]], self.coords[tri[(e + 1) % 3]], c))
                .fold(f64::INFINITY, f64::min);
            if best.is_none_or(|(_, d)| depth > d) {
                best = Some((t, depth));
            }
        }
        let (t, depth) = best?;
        if depth < -self.eps {
            return None;
        }

        let k = self.points.len();
        self.points.push(p);
        self.coords.push(c);
        if depth > self.eps {
            let [a, b, o] = self.triangles[t];
            self.triangles[t] = [a, b, k];
            self.triangles.push([b, o, k]);
            self.triangles.push([o, a, k]);
        } else {
            let tri = self.triangles[t];
            let edge = self.nearest_edge(&tri, c);
            self.split_edge(t, edge, k);
        }
        Some(k)
    }

    fn nearest_edge(&self, tri: &[usize; 3], c: P2) -> usize {
        (0..3)
            .min_by(|&i, &j| {
                let di = left_distance(self.coords[tri[i]], self.coords[tri[(i + 1) % 3]], c);
                let dj = left_distance(self.coords[tri[j]], self.coords[tri[(j + 1) % 3]], c);
                di.total_cmp(&dj)
            })
            .unwrap_or(0)
    }

    /// Put `k` on edge `e` of triangle `t` and on the same edge of the
    /// neighbour across it, if any.
    fn split_edge(&mut self, t: usize, e: usize, k: usize) {
        let tri = self.triangles[t];
        let (i, j, o) = (tri[e], tri[(e + 1) % 3], tri[(e + 2) % 3]);
        self.triangles[t] = [i, k, o];
        self.triangles.push([k, j, o]);
        if let Some(n) = self.triangles.iter().position(|tr| has_edge(tr, j, i)) {
            let o2 = opposite(&self.triangles[n], j, i);
            self.triangles[n] = [j, k, o2];
            self.triangles.push([k, i, o2]);
        }
    }

    /// Where segments `a1-b1` and `a2-b2` cross, when each passes the other's
    /// ends by more than `eps`.
    fn crossing_point(&self, a1: usize, b1: usize, a2: usize, b2: usize) -> Option<Point3d> {
        let c = &self.coords;
        let d1 = left_distance(c[a1], c[b1], c[a2]);
        let d2 = left_distance(c[a1], c[b1], c[b2]);
        let d3 = left_distance(c[a2], c[b2], c[a1]);
        let d4 = left_distance(c[a2], c[b2], c[b1]);
        if [d1, d2, d3, d4].iter().any(|d| d.abs() <= self.eps) || d1 * d2 >= 0.0 || d3 * d4 >= 0.0 {
            return None;
        }
        Some(self.points[a1].lerp(&self.points[b1], d3 / (d3 - d4)))
    }

    /// Consecutive sub-segments of `a-b` between the points lying on it.
    fn pieces(&self, a: usize, b: usize) -> Vec<(usize, usize)> {
        let (ca, cb) = (self.coords[a], self.coords[b]);
        let len2 = (cb[0] - ca[0]).powi(2) + (cb[1] - ca[1]).powi(2);
        if len2 <= f64::EPSILON * f64::EPSILON {
            return Vec::new();
        }
        let mut on: Vec<(f64, usize)> = (0..self.coords.len())
            .filter(|&k| k != a && k != b)
            .filter_map(|k| {
                let ck = self.coords[k];
                let s = ((ck[0] - ca[0]) * (cb[0] - ca[0]) + (ck[1] - ca[1]) * (cb[1] - ca[1])) / len2;
                (s > 0.0 && s < 1.0 && left_distance(ca, cb, ck).abs() <= self.eps).then_some((s, k))
            })
            .collect();
        on.sort_by(|x, y| x.0.total_cmp(&y.0));

        let chain: Vec<usize> = std::iter::once(a)
            .chain(on.into_iter().map(|(_, k)| k))
            .chain(std::iter::once(b))
            .collect();
        chain.windows(2).map(|w| (w[0].min(w[1]), w[0].max(w[1]))).collect()
    }

    fn crosses(&self, a: usize, b: usize, u: usize, v: usize) -> bool {
        if u == a || u == b || v == a || v == b {
            return false;
        }
        let c = &self.coords;
        orient(c[a], c[b], c[u]) * orient(c[a], c[b], c[v]) < 0.0
            && orient(c[u], c[v], c[a]) * orient(c[u], c[v], c[b]) < 0.0
    }

    /// Flip edges crossing `a-b` until it is an edge of the triangulation.
    fn recover(&mut self, a: usize, b: usize) {
        if self.triangles.iter().any(|t| has_edge(t, a, b) || has_edge(t, b, a)) {
            return;
        }
        let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
        for t in &self.triangles {
            for e in 0..3 {
                let (u, v) = (t[e], t[(e + 1) % 3]);
                if u < v && self.crosses(a, b, u, v) {
                    queue.push_back((u, v));
                }
            }
        }

        let mut budget = 64 + 16 * self.triangles.len() * self.triangles.len();
        while let Some((u, v)) = queue.pop_front() {
            if budget == 0 {
                break;
            }
            budget -= 1;
            let (Some(t1), Some(t2)) = (
                self.triangles.iter().position(|t| has_edge(t, u, v)),
                self.triangles.iter().position(|t| has_edge(t, v, u)),
            ) else {
                continue;
            };
            let p = opposite(&self.triangles[t1], u, v);
            let q = opposite(&self.triangles[t2], v, u);
            let c = &self.coords;
            if orient(c[p], c[u], c[q]) <= 0.0 || orient(c[q], c[v], c[p]) <= 0.0 {
                queue.push_back((u, v));
                continue;
            }
            self.triangles[t1] = [p, u, q];
            self.triangles[t2] = [q, v, p];
            if self.crosses(a, b, p, q) {
                queue.push_back((p.min(q), p.max(q)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(t: &[Point3d; 3]) -> f64 {
        0.5 * (t[1] - t[0]).cross(&(t[2] - t[0])).length()
    }

    fn signed_area_z(t: &[Point3d; 3]) -> f64 {
        0.5 * (t[1] - t[0]).cross(&(t[2] - t[0])).z
    }

    fn has_segment(pieces: &[[Point3d; 3]], p: Point3d, q: Point3d) -> bool {
        pieces.iter().any(|t| {
            (0..3).any(|e| {
                let (a, b) = (t[e], t[(e + 1) % 3]);
                (a.distance_to(&p) < 1e-12 && b.distance_to(&q) < 1e-12)
                    || (a.distance_to(&q) < 1e-12 && b.distance_to(&p) < 1e-12)
            })
        })
    }

    fn base() -> [Point3d; 3] {
        [
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(4.0, 0.0, 0.0),
            Point3d::new(0.0, 4.0, 0.0),
        ]
    }

    #[test]
    fn test_no_segments_is_identity() {
        let tri = base();
        assert_eq!(triangulate_with_segments(&tri, &[], 1e-9), vec![tri]);
    }

    #[test]
    fn test_edge_to_edge_segment_becomes_edge() {
        let tri = base();
        let (p, q) = (Point3d::new(1.0, 0.0, 0.0), Point3d::new(0.0, 1.0, 0.0));
        let pieces = triangulate_with_segments(&tri, &[(p, q)], 1e-9);

        let total: f64 = pieces.iter().map(area).sum();
        assert!((total - 8.0).abs() < 1e-9);
        assert!(pieces.iter().all(|t| signed_area_z(t) > 0.0));
        assert!(has_segment(&pieces, p, q));
        // Nothing straddles the cut x + y = 1.
        for t in &pieces {
            let side: Vec<f64> = t.iter().map(|v| v.x + v.y - 1.0).collect();
            assert!(side.iter().all(|&s| s >= -1e-12) || side.iter().all(|&s| s <= 1e-12));
        }
    }

    #[test]
    fn test_interior_segment_is_recovered() {
        let tri = base();
        let (p, q) = (Point3d::new(0.5, 0.5, 0.0), Point3d::new(2.0, 1.0, 0.0));
        let pieces = triangulate_with_segments(&tri, &[(p, q)], 1e-9);
        let total: f64 = pieces.iter().map(area).sum();
        assert!((total - 8.0).abs() < 1e-9);
        assert!(has_segment(&pieces, p, q));
    }

    #[test]
    fn test_crossing_segments_meet_at_shared_vertex() {
        let tri = base();
        let s1 = (Point3d::new(0.5, 0.5, 0.0), Point3d::new(2.5, 0.5, 0.0));
        let s2 = (Point3d::new(1.5, 0.1, 0.0), Point3d::new(1.5, 1.5, 0.0));
        let pieces = triangulate_with_segments(&tri, &[s1, s2], 1e-9);

        let total: f64 = pieces.iter().map(area).sum();
        assert!((total - 8.0).abs() < 1e-9);
        let x = Point3d::new(1.5, 0.5, 0.0);
        assert!(has_segment(&pieces, s1.0, x));
        assert!(has_segment(&pieces, x, s1.1));
        assert!(has_segment(&pieces, s2.0, x));
        assert!(has_segment(&pieces, x, s2.1));
    }

    #[test]
    fn test_tilted_triangle_keeps_winding() {
        // Normal mostly along -x, so the projection swaps its axes.
        let tri = [
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(0.1, 0.0, 2.0),
            Point3d::new(0.2, 2.0, 0.0),
        ];
        let normal = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
        assert!(normal.x < 0.0);
        let p = tri[0].lerp(&tri[1], 0.5);
        let q = tri[0].lerp(&tri[2], 0.5);
        let pieces = triangulate_with_segments(&tri, &[(p, q)], 1e-9);

        assert!(pieces.len() >= 3);
        assert!(has_segment(&pieces, p, q));
        for t in &pieces {
            let n = (t[1] - t[0]).cross(&(t[2] - t[0]));
            assert!(n.dot(&normal) > 0.0);
        }
        let total: f64 = pieces.iter().map(area).sum();
        assert!((total - area(&tri)).abs() < 1e-9);
    }
}
