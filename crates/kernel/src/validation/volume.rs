use crate::topology::brep::*;

/// Enclosed volume of a solid by the divergence theorem over its face loops,
/// fan-triangulated from each loop's first vertex. Positive when faces wind
/// outward.
pub fn signed_volume(store: &EntityStore, solid_id: SolidId) -> f64 {
    let mut six_volume = 0.0;
    for face_id in store.solid_faces(solid_id) {
        for loop_id in store.face_loops(face_id) {
            let points = store.loop_points(loop_id);
            if points.len() < 3 {
                continue;
            }
            let a = points[0].to_vec3();
            for k in 1..points.len() - 1 {
                six_volume += a.triple(&points[k].to_vec3(), &points[k + 1].to_vec3());
            }
        }
    }
    six_volume / 6.0
}
