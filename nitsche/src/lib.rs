//! Contact mechanics for plane linear elasticity with a Nitsche-type weak
//! imposition of non-penetration.
//!
//! The gap between contact surfaces is measured on the deformed configuration and
//! recomputed at every Newton iteration, which makes it a nonlinear function of the
//! displacement. See [`solve`] for the main entry point.

pub mod contact;
pub mod fem;
mod index;
pub mod material;
pub mod matrix;
pub mod mesh;
pub mod nullspace;
pub mod quadrature;
pub mod scene;

// TODO: This should be feature gated, but integration tests would then need to pass the
// feature explicitly.
pub mod test_utils;

pub use contact::{ContactPair, ContactPressure, GapModel, RigidPlane, SearchMode};
pub use fem::nl;
pub use fem::nl::linsolve::LinearSolverOptions;
pub use fem::nl::{NewtonOptions, NewtonParams};
pub use fem::{solve, ContactProblem, DirichletCondition, Solution};
pub use index::Index;
pub use material::*;
pub use mesh::{Mesh, MeshTags};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Size mismatch error")]
    SizeMismatch,
    #[error("Missing parameter: {name:?}")]
    MissingParameter { name: String },
    #[error("Invalid parameter: {name:?}")]
    InvalidParameter { name: String },
    #[error("Unknown convergence criterion: {0:?}")]
    UnknownConvergenceCriterion(String),
    #[error("Invalid linear solver option {key:?} = {value:?}")]
    InvalidLinearSolverOption { key: String, value: String },
    #[error("Degenerate reference element detected: {:?}", .degens[0])]
    DegenerateReferenceElement { degens: Vec<usize> },
    #[error("Facet tag {tag} is used by more than one boundary condition or contact surface")]
    OverlappingSurfaces { tag: i32 },
    #[error("No facets found with tag {tag}")]
    EmptySurface { tag: i32 },
    #[error("Jacobian entry ({row}, {col}) is outside of the preallocated sparsity pattern")]
    SparsityViolation { row: usize, col: usize },
    #[error("Distance map was built for a different displacement")]
    StaleDistanceMap,
    #[error("Newton state is in a terminal phase; reset it before solving again")]
    TerminalNewtonState,
    #[error("Linear solve failed with status {status:?} in Newton iteration {}: {result}", .result.iterations + 1)]
    LinearSolve {
        status: nl::linsolve::Status,
        /// Newton progress up to the failed linear solve.
        result: nl::SolveResult,
    },
    #[error("Newton solver did not converge: {result}")]
    NewtonDidNotConverge { result: nl::SolveResult },
}

pub(crate) fn inf_norm<I>(iter: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    iter.into_iter()
        .map(|x| x.abs())
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Less))
        .unwrap_or(0.0)
}

pub(crate) fn norm(v: &[f64]) -> f64 {
    v.iter().map(|&x| x * x).sum::<f64>().sqrt()
}
