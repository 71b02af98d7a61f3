//! Newton solver for the nonlinear contact equations.

pub mod linsolve;
pub mod newton;
pub mod problem;
pub mod timing;

pub use newton::*;
pub use problem::*;

/// Phase of a Newton solve.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Init,
    Iterating,
    Converged,
    Diverged,
}

impl Phase {
    /// `true` for phases that end a solve.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Converged | Phase::Diverged)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Status {
    Success,
    MaximumIterationsExceeded,
    /// The residual or increment is no longer finite.
    Diverged,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolveResult {
    /// Number of Newton iterations.
    pub iterations: u32,
    /// Accumulated iterations of all linear solves.
    pub linear_iterations: u32,
    /// Final convergence measure, the residual or increment norm depending on the criterion.
    pub measure: f64,
    /// Solve status.
    pub status: Status,
}

impl SolveResult {
    pub fn converged(&self) -> bool {
        self.status == Status::Success
    }
}

impl std::fmt::Display for SolveResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} after {} iterations ({} linear iterations, measure {:.3e})",
            self.status, self.iterations, self.linear_iterations, self.measure
        )
    }
}
