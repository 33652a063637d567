use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;

/// Oriented plane `normal · p = offset` carried by a mesh triangle.
#[derive(Debug, Clone, Copy)]
pub struct CutPlane {
    pub normal: Vec3,
    pub offset: f64,
}

impl CutPlane {
    /// Plane through a triangle, oriented by its winding. `None` for
    /// collinear corners.
    pub fn through_triangle(tri: &[Point3d; 3]) -> Option<Self> {
        let normal = (tri[1] - tri[0]).cross(&(tri[2] - tri[0])).normalized()?;
        Some(Self {
            normal,
            offset: normal.dot(&tri[0].to_vec3()),
        })
    }

    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        self.normal.dot(&p.to_vec3()) - self.offset
    }
}

/// Interval along `direction` where a triangle meets `plane`, with the
/// point that produced each bound. `None` if the triangle lies on one side
/// or within `eps` of the plane.
fn crossing_interval(
    tri: &[Point3d; 3],
    plane: &CutPlane,
    direction: &Vec3,
    eps: f64,
) -> Option<[(f64, Point3d); 2]> {
    let dist = tri.map(|p| plane.signed_distance(&p));
    if dist.iter().all(|&d| d > eps) || dist.iter().all(|&d| d < -eps) || dist.iter().all(|d| d.abs() <= eps) {
        return None;
    }

    let mut lo = (f64::INFINITY, Point3d::ORIGIN);
    let mut hi = (f64::NEG_INFINITY, Point3d::ORIGIN);
    let mut include = |p: Point3d| {
        let s = direction.dot(&p.to_vec3());
        if s < lo.0 {
            lo = (s, p);
        }
        if s > hi.0 {
            hi = (s, p);
        }
    };
    for i in 0..3 {
        let j = (i + 1) % 3;
        if dist[i].abs() <= eps {
            include(tri[i]);
        }
        if (dist[i] > eps && dist[j] < -eps) || (dist[i] < -eps && dist[j] > eps) {
            include(tri[i].lerp(&tri[j], dist[i] / (dist[i] - dist[j])));
        }
    }
    (lo.0 <= hi.0).then_some([lo, hi])
}

/// Segment shared by two non-coplanar triangles, when it is longer than
/// `eps`. Each end is taken from the triangle whose boundary bounds it, so
/// neighbouring pairs produce the same points along shared edges.
pub fn crossing_segment(
    a: &[Point3d; 3],
    plane_a: &CutPlane,
    b: &[Point3d; 3],
    plane_b: &CutPlane,
    eps: f64,
) -> Option<(Point3d, Point3d)> {
    let direction = plane_a.normal.cross(&plane_b.normal).normalized()?;
    let [a_lo, a_hi] = crossing_interval(a, plane_b, &direction, eps)?;
    let [b_lo, b_hi] = crossing_interval(b, plane_a, &direction, eps)?;
    let lo = if a_lo.0 >= b_lo.0 { a_lo } else { b_lo };
    let hi = if a_hi.0 <= b_hi.0 { a_hi } else { b_hi };
    (hi.0 - lo.0 > eps).then_some((lo.1, hi.1))
}

/// True when two non-coplanar triangles cross along a segment longer than
/// `eps`. Touching at a point and coplanar overlap both report false.
pub fn triangles_cross(
    a: &[Point3d; 3],
    plane_a: &CutPlane,
    b: &[Point3d; 3],
    plane_b: &CutPlane,
    eps: f64,
) -> bool {
    crossing_segment(a, plane_a, b, plane_b, eps).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_distance_follows_winding() {
        let tri = [
            Point3d::new(0.0, 0.0, 1.0),
            Point3d::new(1.0, 0.0, 1.0),
            Point3d::new(0.0, 1.0, 1.0),
        ];
        let plane = CutPlane::through_triangle(&tri).unwrap();
        assert!((plane.signed_distance(&Point3d::new(3.0, 3.0, 2.5)) - 1.5).abs() < 1e-12);
        let flipped = CutPlane::through_triangle(&[tri[0], tri[2], tri[1]]).unwrap();
        assert!((flipped.signed_distance(&Point3d::new(3.0, 3.0, 2.5)) + 1.5).abs() < 1e-12);
        assert!(CutPlane::through_triangle(&[tri[0], tri[0], tri[1]]).is_none());
    }

    #[test]
    fn test_crossing_triangles() {
        let a = [
            Point3d::new(-1.0, -1.0, 0.0),
            Point3d::new(1.0, -1.0, 0.0),
            Point3d::new(0.0, 1.0, 0.0),
        ];
        let b = [
            Point3d::new(0.0, 0.0, -1.0),
            Point3d::new(0.0, 0.5, 1.0),
            Point3d::new(0.0, -0.5, 1.0),
        ];
        let pa = CutPlane::through_triangle(&a).unwrap();
        let pb = CutPlane::through_triangle(&b).unwrap();
        assert!(triangles_cross(&a, &pa, &b, &pb, 1e-9));

        // b pokes through the inside of a, so both ends lie on b's edges.
        let (p, q) = crossing_segment(&a, &pa, &b, &pb, 1e-9).unwrap();
        let (lo, hi) = if p.y < q.y { (p, q) } else { (q, p) };
        assert!(lo.distance_to(&Point3d::new(0.0, -0.25, 0.0)) < 1e-12);
        assert!(hi.distance_to(&Point3d::new(0.0, 0.25, 0.0)) < 1e-12);

        let far = b.map(|p| p + Vec3::new(5.0, 0.0, 0.0));
        let pf = CutPlane::through_triangle(&far).unwrap();
        assert!(!triangles_cross(&a, &pa, &far, &pf, 1e-9));
    }

    #[test]
    fn test_coplanar_triangles_do_not_cross() {
        let a = [
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(0.0, 1.0, 0.0),
        ];
        let b = a.map(|p| p + Vec3::new(0.2, 0.2, 0.0));
        let pa = CutPlane::through_triangle(&a).unwrap();
        let pb = CutPlane::through_triangle(&b).unwrap();
        assert!(!triangles_cross(&a, &pa, &b, &pb, 1e-9));
    }
}
