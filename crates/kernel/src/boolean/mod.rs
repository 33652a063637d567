pub mod engine;
pub mod mesh;
pub mod split;
pub mod triangulate;

use crate::topology::brep::{EntityStore, SolidId};
use engine::BooleanFailure;

/// Trait for Boolean operations on B-Rep solids.
///
/// Implement this trait to provide alternative Boolean backends or mock
/// implementations for the solid synthesizer.
pub trait BooleanEngine {
    /// Compute the union of two solids as a new solid in the same store.
    /// The operands are left untouched.
    fn union(&self, store: &mut EntityStore, a: SolidId, b: SolidId) -> Result<SolidId, BooleanFailure>;
}

/// Boolean engine working on the triangulated boundary of planar-faced solids.
#[derive(Debug, Clone, Copy)]
pub struct MeshBooleanEngine {
    /// Weld and sliver tolerance as a fraction of the operands' combined
    /// bounding-box diagonal.
    pub relative_tolerance: f64,
}

impl Default for MeshBooleanEngine {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-6,
        }
    }
}

impl BooleanEngine for MeshBooleanEngine {
    fn union(&self, store: &mut EntityStore, a: SolidId, b: SolidId) -> Result<SolidId, BooleanFailure> {
        engine::mesh_union(store, a, b, self.relative_tolerance)
    }
}

#[cfg(test)]
mod trait_tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::tests::box_polygons;
    use crate::topology::primitives::{make_cylinder, make_polyhedron};
    use crate::validation::{BRepValidator, volume::signed_volume};

    fn make_box(store: &mut EntityStore, min: [f64; 3], max: [f64; 3]) -> SolidId {
        let (points, faces) = box_polygons(Point3d::from_array(min), Point3d::from_array(max));
        make_polyhedron(store, &points, &faces).unwrap()
    }

    #[test]
    fn test_disjoint_union_keeps_both_shells() {
        let engine = MeshBooleanEngine::default();
        let mut store = EntityStore::new();
        let a = make_box(&mut store, [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = make_box(&mut store, [5.0, 5.0, 5.0], [6.0, 6.0, 6.0]);
        let result = engine.union(&mut store, a, b).unwrap();

        assert_eq!(store.solids[result].shells.len(), 2);
        let report = BRepValidator::default().validate(&store, result);
        assert!(report.valid, "{report}");
        assert!((signed_volume(&store, result) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlapping_boxes_union() {
        let engine = MeshBooleanEngine::default();
        let mut store = EntityStore::new();
        let a = make_box(&mut store, [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = make_box(&mut store, [0.5, 0.25, 0.3], [1.5, 0.75, 0.7]);
        let result = engine.union(&mut store, a, b).unwrap();

        assert_eq!(store.solids[result].shells.len(), 1);
        let report = BRepValidator::default().validate(&store, result);
        assert!(report.valid, "{report}");
        // 1 + 0.2 - 0.1 overlap
        assert!((signed_volume(&store, result) - 1.1).abs() < 1e-9);
        // Operands survive unchanged.
        assert!((signed_volume(&store, a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_contained_operand_is_absorbed() {
        let engine = MeshBooleanEngine::default();
        let mut store = EntityStore::new();
        let a = make_box(&mut store, [0.0, 0.0, 0.0], [4.0, 4.0, 4.0]);
        let b = make_box(&mut store, [1.0, 1.3, 1.7], [2.0, 2.2, 2.9]);
        let result = engine.union(&mut store, a, b).unwrap();

        let report = BRepValidator::default().validate(&store, result);
        assert!(report.valid, "{report}");
        assert!((signed_volume(&store, result) - 64.0).abs() < 1e-9);
        assert_eq!(report.metrics.entity_counts.vertices, 8);
    }

    #[test]
    fn test_cylinder_through_box_top() {
        let engine = MeshBooleanEngine::default();
        let mut store = EntityStore::new();
        let a = make_box(&mut store, [0.0, 0.0, 0.0], [4.0, 4.0, 1.0]);
        let key = make_cylinder(&mut store, Point3d::new(1.9, 2.1, 0.5), 1.0, 2.0, 32).unwrap();
        let key_volume = signed_volume(&store, key);
        let result = engine.union(&mut store, a, key).unwrap();

        let report = BRepValidator::default().validate(&store, result);
        assert!(report.valid, "{report}");
        // Half of the cylinder is buried in the box.
        let expected = 16.0 + key_volume * 0.75;
        assert!((signed_volume(&store, result) - expected).abs() < 1e-9);
    }
}
