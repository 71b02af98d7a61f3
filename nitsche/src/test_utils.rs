use crate::contact::ContactPair;
use crate::fem::nl::linsolve::LinearSolverOptions;
use crate::fem::DirichletCondition;
use crate::material::{NitscheParameters, PhysicalParameters};
use crate::mesh::builder::*;
use crate::mesh::{Mesh, MeshTags};
use crate::scene::SceneConfig;

/*
 * Setup code
 */

pub const YOUNGS_MODULUS: f64 = 1e3;
pub const POISSON_RATIO: f64 = 0.1;

pub fn physical_params() -> PhysicalParameters {
    PhysicalParameters::new(YOUNGS_MODULUS, POISSON_RATIO)
}

pub fn nitsche_params(theta: f64) -> NitscheParameters {
    NitscheParameters::new(10.0, theta)
}

/// Unit blocks with `n × n` subdivisions each, separated by `gap`.
pub fn two_blocks_geometry(gap: f64, n: usize) -> TwoBlocks {
    TwoBlocks {
        width: 1.0,
        height: 1.0,
        gap,
        divisions: [n, n],
    }
}

pub fn make_two_blocks(gap: f64, n: usize) -> (Mesh, MeshTags) {
    match two_blocks_geometry(gap, n).build() {
        Ok(result) => result,
        Err(err) => panic!("failed to build test mesh: {}", err),
    }
}

pub fn unbiased_pair() -> ContactPair {
    ContactPair::unbiased(LOWER_CONTACT, UPPER_CONTACT)
}

/// Outer sides moved by `displacement` towards the other block.
pub fn compression(displacement: f64) -> Vec<DirichletCondition> {
    vec![
        DirichletCondition {
            tag: LOWER_DIRICHLET,
            displacement: [0.0, displacement],
        },
        DirichletCondition {
            tag: UPPER_DIRICHLET,
            displacement: [0.0, -displacement],
        },
    ]
}

pub fn direct_solver() -> LinearSolverOptions {
    let mut options = LinearSolverOptions::new();
    options.insert("ksp_type".to_string(), "preonly".to_string());
    options.insert("pc_type".to_string(), "lu".to_string());
    options
}

pub fn compression_scene(gap: f64, n: usize, displacement: f64) -> SceneConfig {
    let mut config = SceneConfig::two_blocks(two_blocks_geometry(gap, n), displacement);
    config.physical = physical_params();
    config.nitsche = nitsche_params(1.0);
    config.linear_solver = direct_solver();
    config
}
