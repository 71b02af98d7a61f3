use std::time::{Duration, Instant};

use super::nl::linsolve::{LinearSolver, LinearSolverOptions};
use super::nl::timing::Timings;
use super::nl::{Newton, NewtonOptions, NewtonParams, NewtonState, NonlinearProblem};
use super::problem::ContactProblem;
use super::standard_form::DirichletCondition;
use crate::contact::{ContactPair, ContactPressure};
use crate::material::{NitscheParameters, PhysicalParameters};
use crate::mesh::{Mesh, MeshTags};
use crate::quadrature::FacetQuadrature;
use crate::Error;

/// Result of a contact solve.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    /// Displacement per dof, vertex-major.
    pub displacement: Vec<f64>,
    pub iterations: u32,
    pub linear_iterations: u32,
    /// Wall-clock time spent in the Newton solve.
    pub elapsed: Duration,
    pub converged: bool,
    /// Residual 2-norm, starting with the initial residual.
    pub residual_history: Vec<f64>,
    pub timings: Timings,
    /// Contact pressure on every integrated contact surface at the final displacement.
    pub contact_pressure: Vec<ContactPressure>,
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Converged: {}\nNewton iterations: {}\nLinear iterations: {}\nElapsed: {:.3}s",
            self.converged,
            self.iterations,
            self.linear_iterations,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Solves a frictionless contact problem between elastic bodies.
///
/// All parameters are validated before any assembly. Dirichlet conditions are imposed
/// weakly on their tagged facets. The initial guess defaults to zero.
#[allow(clippy::too_many_arguments)]
pub fn solve(
    mesh: &Mesh,
    facet_tags: &MeshTags,
    contact_pairs: &[ContactPair],
    physical: &PhysicalParameters,
    nitsche: &NitscheParameters,
    dirichlet: &[DirichletCondition],
    quadrature_degree: u32,
    newton_options: &NewtonOptions,
    linear_solver_options: &LinearSolverOptions,
    initial_guess: Option<&[f64]>,
) -> Result<Solution, Error> {
    let material = physical.material()?;
    let nitsche = nitsche.validate()?;
    let params = NewtonParams::from_options(newton_options)?;
    let linsolve = LinearSolver::from_options(linear_solver_options)?;
    let quadrature = FacetQuadrature::new(quadrature_degree)?;

    let x0 = match initial_guess {
        Some(x0) if x0.len() != mesh.num_dofs() => return Err(Error::SizeMismatch),
        Some(x0) => x0.to_vec(),
        None => vec![0.0; mesh.num_dofs()],
    };

    let problem = ContactProblem::new(
        mesh,
        facet_tags,
        contact_pairs,
        &material,
        &nitsche,
        dirichlet,
        quadrature,
    )?;

    let mut newton = Newton::new(problem, params, linsolve);
    let mut state = NewtonState::new(x0);

    let t_begin = Instant::now();
    let result = newton.solve_with(&mut state)?;
    let elapsed = Instant::now() - t_begin;

    let contact_pressure = newton.problem().contact_pressure()?;
    let timings = *newton.problem_mut().timings();
    log::debug!("{}", timings);

    let solution = Solution {
        displacement: state.x,
        iterations: result.iterations,
        linear_iterations: result.linear_iterations,
        elapsed,
        converged: result.converged(),
        residual_history: state.residual_history,
        timings,
        contact_pressure,
    };
    log::info!("{}", solution);
    Ok(solution)
}
