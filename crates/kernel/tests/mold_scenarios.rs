//! End-to-end mold generation scenarios: cage in, validated solid out.

use approx::assert_relative_eq;

use mold_kernel::geometry::point::Point3d;
use mold_kernel::geometry::vector::Vec3;
use mold_kernel::validation::ErrorCode;
use mold_kernel::{
    ConstraintValidator, ControlCage, DraftTransformer, EvalTier, FitQualityAuditor, LimitSurfaceEvaluator, MoldError,
    MoldParameters, MoldPipeline, SolidConfig, SolidSynthesizer, SurfaceFitter, WallSide,
};

fn planar_quad() -> LimitSurfaceEvaluator {
    LimitSurfaceEvaluator::from_cage(ControlCage::new(
        vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(2.0, 0.0, 0.0),
            Point3d::new(2.0, 2.0, 0.0),
            Point3d::new(0.0, 2.0, 0.0),
        ],
        vec![vec![0, 1, 2, 3]],
    ))
    .unwrap()
}

fn unit_cube() -> LimitSurfaceEvaluator {
    let vertices = vec![
        Point3d::new(0.0, 0.0, 0.0),
        Point3d::new(1.0, 0.0, 0.0),
        Point3d::new(1.0, 1.0, 0.0),
        Point3d::new(0.0, 1.0, 0.0),
        Point3d::new(0.0, 0.0, 1.0),
        Point3d::new(1.0, 0.0, 1.0),
        Point3d::new(1.0, 1.0, 1.0),
        Point3d::new(0.0, 1.0, 1.0),
    ];
    let faces = vec![
        vec![0, 3, 2, 1],
        vec![4, 5, 6, 7],
        vec![0, 1, 5, 4],
        vec![1, 2, 6, 5],
        vec![2, 3, 7, 6],
        vec![3, 0, 4, 7],
    ];
    LimitSurfaceEvaluator::from_cage(ControlCage::new(vertices, faces)).unwrap()
}

#[test]
fn planar_quad_fit_and_audit() {
    let eval = planar_quad();
    let patch = SurfaceFitter::new(&eval).fit_surface(&[0], 30).unwrap();

    assert!(patch.validate().is_ok());
    assert!(patch.count_u >= 2 && patch.count_v >= 2);
    assert_eq!(patch.degree_u, 3);

    let report = FitQualityAuditor::new(&eval).check_fitting_quality(&patch, &[0]);
    assert!(report.passes_tolerance);
    assert!(report.max_deviation < 1.0);
    assert!(report.max_deviation < 1e-6, "planar input should fit to round-off");
}

#[test]
fn planar_quad_draft_keeps_structure() {
    let eval = planar_quad();
    let patch = SurfaceFitter::new(&eval).fit_surface(&[0], 30).unwrap();
    let separation = [Point3d::new(0.0, 0.0, 0.0), Point3d::new(2.0, 0.0, 0.0)];
    let drafted = DraftTransformer::new()
        .apply_draft(&patch, Vec3::Z, 2.0, &separation)
        .unwrap();

    assert!(drafted.validate().is_ok());
    assert_eq!(drafted.degree_u, patch.degree_u);
    assert_eq!(drafted.degree_v, patch.degree_v);
    assert_eq!(drafted.knots_u, patch.knots_u);
    assert_eq!(drafted.knots_v, patch.knots_v);
    assert_eq!(drafted.weights, patch.weights);
    for (before, after) in patch.control_points.iter().zip(&drafted.control_points) {
        let h = before.z - separation[0].z;
        if h.abs() <= 1e-6 {
            assert_eq!(before, after);
        }
    }
}

#[test]
fn draft_angle_above_limit_is_rejected() {
    let eval = planar_quad();
    let patch = SurfaceFitter::new(&eval).fit_surface(&[0], 30).unwrap();
    let err = DraftTransformer::new()
        .apply_draft(&patch, Vec3::Z, 50.0, &[Point3d::ORIGIN])
        .unwrap_err();
    assert!(matches!(err, MoldError::InvalidParameter(_)));
}

#[test]
fn cube_face_becomes_keyed_solid() {
    let eval = unit_cube();
    let patch = SurfaceFitter::new(&eval).fit_surface(&[0], 20).unwrap();
    let synth = SolidSynthesizer::new();

    let solid = synth.create_solid(&patch, 10.0).unwrap();
    assert!(solid.report.valid, "{}", solid.report);
    // The bottom face bulges away from the cube, so the wall grows downward.
    assert!(solid.bounding_box().min.z < -5.0);
    assert!(solid.bounding_box().max.z < 0.5);
    let plate_volume = solid.volume();
    assert!(plate_volume > 0.0);

    let keyed = synth
        .add_registration_keys(solid, &[Point3d::new(0.5, 0.5, 0.0)])
        .unwrap();
    assert!(keyed.report.valid, "{}", keyed.report);
    assert!(keyed.report.no_errors_of(ErrorCode::EulerPoincareViolation));
    assert_eq!(keyed.shell_count(), 1);
    assert_relative_eq!(keyed.bounding_box().max.z, 10.0, epsilon = 1e-9);
    // The key adds most of its own volume; only its foot overlaps the plate.
    assert!(keyed.volume() > plate_volume + 500.0);
}

#[test]
fn wall_through_centre_of_curvature_is_rejected() {
    let eval = unit_cube();
    let patch = SurfaceFitter::new(&eval).fit_surface(&[2], 20).unwrap();
    // Growing inward, a 10-unit wall passes far beyond the face's centre of
    // curvature and would come out inside out.
    let synth = SolidSynthesizer::new().with_config(SolidConfig {
        wall_side: WallSide::Back,
        ..SolidConfig::default()
    });
    let err = synth.create_solid(&patch, 10.0).unwrap_err();
    assert!(matches!(err, MoldError::InvalidSolid(_)), "{err}");

    // The outward side is convex and takes the same wall.
    let outward = SolidSynthesizer::new().create_solid(&patch, 10.0).unwrap();
    assert!(outward.report.valid, "{}", outward.report);
    assert!(outward.report.no_errors_of(ErrorCode::SelfIntersection));
    assert!(outward.bounding_box().min.y < -5.0);
}

#[test]
fn multi_face_fit_is_unsupported() {
    let eval = unit_cube();
    let err = SurfaceFitter::new(&eval).fit_surface(&[0, 1], 20).unwrap_err();
    assert!(matches!(err, MoldError::UnsupportedOperation(_)));
}

#[test]
fn non_positive_thickness_is_rejected() {
    let eval = planar_quad();
    let patch = SurfaceFitter::new(&eval).fit_surface(&[0], 10).unwrap();
    let synth = SolidSynthesizer::new();
    assert!(matches!(synth.create_solid(&patch, 0.0), Err(MoldError::InvalidParameter(_))));
    assert!(matches!(synth.create_solid(&patch, -3.0), Err(MoldError::InvalidParameter(_))));
}

#[test]
fn empty_key_list_is_identity() {
    let eval = planar_quad();
    let patch = SurfaceFitter::new(&eval).fit_surface(&[0], 10).unwrap();
    let synth = SolidSynthesizer::new();
    let solid = synth.create_solid(&patch, 1.0).unwrap();
    let volume = solid.volume();
    let faces = solid.face_count();

    let same = synth.add_registration_keys(solid, &[]).unwrap();
    assert!(same.report.valid);
    assert_eq!(same.face_count(), faces);
    assert_relative_eq!(same.volume(), volume);
}

#[test]
fn tiers_are_kept_apart_on_curved_cages() {
    let eval = unit_cube();
    let corner = eval.evaluate_point(0, 0.5, 0.5).unwrap();
    let exact = eval.evaluate_point_with(0, 0.5, 0.5, EvalTier::Exact).unwrap();
    // Corner interpolation sits on the cage; the limit surface shrinks inside it.
    assert_relative_eq!(corner.z, 0.0);
    assert!(exact.z > 0.05);
}

#[test]
fn pipeline_builds_every_cube_face() {
    let eval = unit_cube();
    let pipeline = MoldPipeline::new(&eval);
    for face in [0, 1, 2] {
        // The side face needs the release axis anchored clear of its own
        // control net; top and bottom keep their default anchor.
        let separation_curve = if face == 2 {
            vec![Point3d::new(0.5, 0.5, 0.5)]
        } else {
            Vec::new()
        };
        let params = MoldParameters {
            sample_density: 20,
            wall_thickness: 2.0,
            separation_curve,
            ..MoldParameters::default()
        };
        let piece = pipeline
            .build_piece(face, &params)
            .unwrap_or_else(|e| panic!("face {face}: {e}"));
        assert!(piece.quality.passes_tolerance, "face {face}: {:?}", piece.quality);
        assert!(piece.solid.report.valid);
        assert!(piece.solid.report.no_errors_of(ErrorCode::SelfIntersection));
        assert!(piece.min_draft_degrees.is_some());
    }
}

#[test]
fn bottom_face_pulled_up_is_undercut() {
    let eval = unit_cube();
    let report = ConstraintValidator::new(&eval).validate_region(&[0], Vec3::Z).unwrap();
    assert!(report.has_errors(), "{report}");
    let undercut = report
        .violations
        .iter()
        .find(|v| v.description.contains("Undercut"))
        .unwrap_or_else(|| panic!("no undercut in {report}"));
    assert_eq!(undercut.face, 0);
    assert!(undercut.severity > 0.0 && undercut.severity <= 1.0);
    // Facing straight down, the centre draft is also far below the minimum.
    assert!(report
        .for_face(0)
        .any(|v| v.description.contains("Draft") && v.severity == 1.0));

    let piece = MoldPipeline::new(&eval)
        .build_piece(
            0,
            &MoldParameters {
                sample_density: 20,
                wall_thickness: 2.0,
                ..MoldParameters::default()
            },
        )
        .unwrap();
    assert_eq!(piece.constraints, report);
}
