//! Rigid body modes of plane elasticity.

use crate::mesh::{Mesh, GDIM};

/// Translations along `x` and `y` followed by the rotation about the vertex centroid,
/// each as a vector over all dofs.
pub fn rigid_motions(mesh: &Mesh) -> Vec<Vec<f64>> {
    let n = mesh.num_dofs();
    let mut modes = vec![vec![0.0; n]; 3];
    let verts = mesh.vertices();
    if verts.is_empty() {
        return modes;
    }
    let center = verts.iter().sum::<na::Vector2<f64>>() / verts.len() as f64;
    for (v, p) in verts.iter().enumerate() {
        let d = p - center;
        modes[0][GDIM * v] = 1.0;
        modes[1][GDIM * v + 1] = 1.0;
        modes[2][GDIM * v] = -d.y;
        modes[2][GDIM * v + 1] = d.x;
    }
    modes
}
