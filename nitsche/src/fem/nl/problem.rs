use super::timing::Timings;
use crate::matrix::GlobalMatrix;
use crate::Error;

/// A nonlinear system `F(x) = 0` with a sparse Jacobian.
///
/// The Newton solver calls `update_coefficients` every time `x` changes, before
/// evaluating the residual or the Jacobian at `x`.
pub trait NonlinearProblem {
    /// Returns the number of unknowns for the problem.
    fn num_variables(&self) -> usize;
    /// Recomputes everything that depends on `x` other than the residual and Jacobian
    /// themselves.
    fn update_coefficients(&mut self, x: &[f64]) -> Result<(), Error>;
    /// Computes `F(x)` into `r`, overwriting its contents.
    fn residual(&mut self, x: &[f64], r: &mut [f64]) -> Result<(), Error>;
    /// Computes the Jacobian of `F` at `x` into `jac`, overwriting its values.
    fn jacobian(&mut self, x: &[f64], jac: &mut GlobalMatrix) -> Result<(), Error>;
    /// A zero matrix with the sparsity pattern of the Jacobian.
    fn new_jacobian(&self) -> GlobalMatrix;
    /// Problem specific null space of the Jacobian, if known.
    fn near_null_space(&self) -> Vec<Vec<f64>> {
        Vec::new()
    }
    fn timings(&mut self) -> &mut Timings;
}
