use std::collections::HashMap;

use crate::geometry::bounds::BoundingBox;
use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;
use crate::topology::brep::*;

/// Indexed triangle soup extracted from a solid's planar faces.
#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    pub points: Vec<Point3d>,
    pub triangles: Vec<[usize; 3]>,
}

/// Where a point lies relative to a closed triangle mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Containment {
    Inside,
    Outside,
    /// On a triangle whose unit normal is given.
    OnSurface(Vec3),
}

impl TriMesh {
    /// Fan-triangulate the outer loop of every face. Faces must be convex,
    /// which holds for everything the kernel builds with planar faces.
    pub fn from_solid(store: &EntityStore, solid_id: SolidId) -> Self {
        let mut mesh = TriMesh::default();
        let mut index: HashMap<VertexId, usize> = HashMap::new();

        for face_id in store.solid_faces(solid_id) {
            let loop_id = store.faces[face_id].outer_loop;
            let corners: Vec<usize> = store.loops[loop_id]
                .half_edges
                .iter()
                .filter_map(|&he| store.half_edges.get(he))
                .map(|he| {
                    *index.entry(he.start_vertex).or_insert_with(|| {
                        mesh.points.push(store.vertices[he.start_vertex].point);
                        mesh.points.len() - 1
                    })
                })
                .collect();
            for k in 1..corners.len().saturating_sub(1) {
                mesh.triangles.push([corners[0], corners[k], corners[k + 1]]);
            }
        }
        mesh
    }

    pub fn triangle(&self, t: usize) -> [Point3d; 3] {
        self.triangles[t].map(|i| self.points[i])
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Classify a point against this mesh. Points within `eps` of a triangle
    /// are on the surface; otherwise three skewed rays vote on the parity of
    /// their crossings.
    pub fn classify(&self, p: &Point3d, eps: f64) -> Containment {
        for t in 0..self.triangles.len() {
            if let Some(normal) = on_triangle(p, &self.triangle(t), eps) {
                return Containment::OnSurface(normal);
            }
        }

        let directions = [
            Vec3::new(1.0, 0.3711, 0.2297),
            Vec3::new(-0.4127, 1.0, 0.6173),
            Vec3::new(0.2659, -0.5381, 1.0),
        ];
        let inside_votes = directions
            .iter()
            .filter(|dir| self.count_crossings(p, &dir.normalize_or_zero(), eps) % 2 == 1)
            .count();
        if inside_votes >= 2 {
            Containment::Inside
        } else {
            Containment::Outside
        }
    }

    /// Hits along the ray, with hits closer than `eps` to each other counted
    /// once so a ray through a shared edge is not seen twice.
    fn count_crossings(&self, origin: &Point3d, direction: &Vec3, eps: f64) -> usize {
        let mut hits: Vec<f64> = (0..self.triangles.len())
            .filter_map(|t| ray_triangle(origin, direction, &self.triangle(t)))
            .filter(|&t| t > eps)
            .collect();
        hits.sort_by(f64::total_cmp);
        hits.dedup_by(|b, a| (*b - *a).abs() < eps);
        hits.len()
    }
}

/// Möller–Trumbore ray/triangle intersection; returns the ray parameter.
pub(crate) fn ray_triangle(origin: &Point3d, direction: &Vec3, tri: &[Point3d; 3]) -> Option<f64> {
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let h = direction.cross(&e2);
    let a = e1.dot(&h);
    if a.abs() < 1e-14 {
        return None;
    }
    let f = 1.0 / a;
    let s = *origin - tri[0];
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    Some(f * e2.dot(&q))
}

/// Unit normal of `tri` if `p` lies on it within `eps`.
fn on_triangle(p: &Point3d, tri: &[Point3d; 3], eps: f64) -> Option<Vec3> {
    let normal = (tri[1] - tri[0]).cross(&(tri[2] - tri[0])).normalized()?;
    let height = normal.dot(&(*p - tri[0]));
    if height.abs() > eps {
        return None;
    }
    let q = *p - normal * height;
    let inside = (0..3).all(|i| {
        let (a, b) = (tri[i], tri[(i + 1) % 3]);
        let edge = b - a;
        edge.cross(&(q - a)).dot(&normal) >= -eps * edge.length()
    });
    inside.then_some(normal)
}

/// Merges points closer than `eps` into one index using a uniform grid.
pub struct PointWelder {
    eps: f64,
    cells: HashMap<(i64, i64, i64), Vec<usize>>,
    pub points: Vec<Point3d>,
}

impl PointWelder {
    pub fn new(eps: f64) -> Self {
        Self {
            eps,
            cells: HashMap::new(),
            points: Vec::new(),
        }
    }

    fn cell(&self, p: &Point3d) -> (i64, i64, i64) {
        (
            (p.x / self.eps).floor() as i64,
            (p.y / self.eps).floor() as i64,
            (p.z / self.eps).floor() as i64,
        )
    }

    /// Index of an existing point within `eps`, or of `p` newly added.
    pub fn insert(&mut self, p: Point3d) -> usize {
        let (cx, cy, cz) = self.cell(&p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) {
                        if let Some(&i) = bucket.iter().find(|&&i| self.points[i].distance_to(&p) <= self.eps) {
                            return i;
                        }
                    }
                }
            }
        }
        self.points.push(p);
        let i = self.points.len() - 1;
        self.cells.entry((cx, cy, cz)).or_default().push(i);
        i
    }
}

/// True when the vertex opposite the longest edge is within `eps` of it,
/// or when two corners coincide.
pub fn is_needle(points: &[Point3d], tri: &[usize; 3], eps: f64) -> bool {
    if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
        return true;
    }
    let p = tri.map(|i| points[i]);
    let longest = (0..3)
        .max_by(|&i, &j| {
            let li = p[i].distance_squared_to(&p[(i + 1) % 3]);
            let lj = p[j].distance_squared_to(&p[(j + 1) % 3]);
            li.total_cmp(&lj)
        })
        .unwrap_or(0);
    let (a, b, c) = (p[longest], p[(longest + 1) % 3], p[(longest + 2) % 3]);
    let base = b - a;
    let len = base.length();
    len <= eps || base.cross(&(c - a)).length() / len <= eps
}

/// Split triangles until no kept vertex lies inside another triangle's
/// edge. Returns `None` if splitting does not settle within `max_splits`.
pub fn repair_t_junctions(
    points: &[Point3d],
    triangles: Vec<[usize; 3]>,
    eps: f64,
    max_splits: usize,
) -> Option<Vec<[usize; 3]>> {
    let mut used: Vec<usize> = triangles.iter().flatten().copied().collect();
    used.sort_unstable();
    used.dedup();
    used.sort_by(|&a, &b| points[a].x.total_cmp(&points[b].x));

    let mut pending = triangles;
    let mut done = Vec::with_capacity(pending.len());
    let mut splits = 0usize;

    while let Some(tri) = pending.pop() {
        let found = (0..3).find_map(|k| {
            let (a, b) = (tri[k], tri[(k + 1) % 3]);
            interior_vertex(points, &used, a, b, eps).map(|v| (k, v))
        });
        match found {
            Some((k, v)) => {
                splits += 1;
                if splits > max_splits {
                    return None;
                }
                let (a, b, c) = (tri[k], tri[(k + 1) % 3], tri[(k + 2) % 3]);
                pending.push([a, v, c]);
                pending.push([v, b, c]);
            }
            None => done.push(tri),
        }
    }
    Some(done)
}

/// Kept vertex nearest to `a` lying strictly inside segment `a`-`b`.
fn interior_vertex(points: &[Point3d], by_x: &[usize], a: usize, b: usize, eps: f64) -> Option<usize> {
    let (pa, pb) = (points[a], points[b]);
    let bounds = BoundingBox::from_points(&[pa, pb]).expanded(eps);
    let axis = pb - pa;
    let len = axis.length();
    if len <= 2.0 * eps {
        return None;
    }

    let start = by_x.partition_point(|&i| points[i].x < bounds.min.x);
    by_x[start..]
        .iter()
        .take_while(|&&i| points[i].x <= bounds.max.x)
        .filter(|&&i| i != a && i != b && bounds.contains_point(&points[i]))
        .filter_map(|&i| {
            let along = axis.dot(&(points[i] - pa)) / len;
            if along <= eps || along >= len - eps {
                return None;
            }
            let foot = pa + axis * (along / len);
            (points[i].distance_to(&foot) <= eps).then_some((i, along))
        })
        .min_by(|x, y| x.1.total_cmp(&y.1))
        .map(|(i, _)| i)
}

/// Drop triangles that appear with both windings; keep one of each set of
/// identical ones.
pub fn cancel_opposites(triangles: Vec<[usize; 3]>) -> Vec<[usize; 3]> {
    fn canonical(t: &[usize; 3]) -> [usize; 3] {
        let k = (0..3).min_by_key(|&k| t[k]).unwrap_or(0);
        [t[k], t[(k + 1) % 3], t[(k + 2) % 3]]
    }
    let mut seen: HashMap<[usize; 3], usize> = HashMap::new();
    let mut kept: Vec<Option<[usize; 3]>> = Vec::with_capacity(triangles.len());
    for tri in triangles {
        let key = canonical(&tri);
        if seen.contains_key(&key) {
            continue;
        }
        let reversed = canonical(&[tri[0], tri[2], tri[1]]);
        if let Some(slot) = seen.remove(&reversed) {
            kept[slot] = None;
            continue;
        }
        seen.insert(key, kept.len());
        kept.push(Some(tri));
    }
    kept.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::primitives::make_polyhedron;
    use crate::topology::primitives::tests::box_polygons;

    fn unit_box_mesh() -> TriMesh {
        let mut store = EntityStore::new();
        let (points, faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let solid = make_polyhedron(&mut store, &points, &faces).unwrap();
        TriMesh::from_solid(&store, solid)
    }

    #[test]
    fn test_box_mesh_counts() {
        let mesh = unit_box_mesh();
        assert_eq!(mesh.points.len(), 8);
        assert_eq!(mesh.triangles.len(), 12);
    }

    #[test]
    fn test_classify_inside_outside_surface() {
        let mesh = unit_box_mesh();
        assert_eq!(mesh.classify(&Point3d::new(0.5, 0.5, 0.5), 1e-9), Containment::Inside);
        assert_eq!(mesh.classify(&Point3d::new(0.3, 0.6, 0.2), 1e-9), Containment::Inside);
        assert_eq!(mesh.classify(&Point3d::new(1.5, 0.5, 0.5), 1e-9), Containment::Outside);
        assert_eq!(mesh.classify(&Point3d::new(-0.5, -0.5, 2.0), 1e-9), Containment::Outside);

        match mesh.classify(&Point3d::new(0.5, 0.5, 1.0), 1e-9) {
            Containment::OnSurface(n) => assert!((n - Vec3::Z).length() < 1e-12),
            other => panic!("expected surface hit, got {other:?}"),
        }
    }

    #[test]
    fn test_welder_merges_close_points() {
        let mut welder = PointWelder::new(1e-6);
        let a = welder.insert(Point3d::new(1.0, 2.0, 3.0));
        let b = welder.insert(Point3d::new(1.0 + 4e-7, 2.0, 3.0 - 4e-7));
        let c = welder.insert(Point3d::new(1.0 + 1e-5, 2.0, 3.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(welder.points.len(), 2);
    }

    #[test]
    fn test_needle_detection() {
        let points = [
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(0.5, 1e-9, 0.0),
            Point3d::new(0.5, 0.5, 0.0),
        ];
        assert!(is_needle(&points, &[0, 1, 2], 1e-6));
        assert!(!is_needle(&points, &[0, 1, 3], 1e-6));
        assert!(is_needle(&points, &[0, 0, 3], 1e-6));
    }

    #[test]
    fn test_t_junction_split() {
        // Two triangles above the x axis meet a single triangle below it
        // that does not know about the midpoint.
        let points = [
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(2.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(1.0, 1.0, 0.0),
            Point3d::new(1.0, -1.0, 0.0),
        ];
        let tris = vec![[0, 2, 3], [2, 1, 3], [1, 0, 4]];
        let repaired = repair_t_junctions(&points, tris, 1e-9, 100).unwrap();
        assert_eq!(repaired.len(), 4);
        assert!(repaired.contains(&[1, 2, 4]) || repaired.contains(&[2, 0, 4]));
    }

    #[test]
    fn test_cancel_opposites() {
        let tris = vec![[0, 1, 2], [1, 0, 2], [3, 4, 5], [4, 5, 3], [6, 7, 8]];
        let kept = cancel_opposites(tris);
        assert_eq!(kept, vec![[3, 4, 5], [6, 7, 8]]);
    }
}
