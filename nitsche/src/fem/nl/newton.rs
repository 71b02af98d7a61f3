use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::linsolve::{self, LinearSolver};
use super::problem::NonlinearProblem;
use super::{Phase, SolveResult, Status};
use crate::matrix::GlobalMatrix;
use crate::{norm, Error};

/// Quantity measured to decide convergence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceCriterion {
    /// Norm of the Newton increment, relative to the first increment.
    Incremental,
    /// Norm of the residual, relative to the initial residual.
    Residual,
}

impl FromStr for ConvergenceCriterion {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "incremental" => Ok(ConvergenceCriterion::Incremental),
            "residual" => Ok(ConvergenceCriterion::Residual),
            _ => Err(Error::UnknownConvergenceCriterion(s.to_string())),
        }
    }
}

/// Newton options as given in a problem description. Missing values take defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonOptions {
    pub atol: Option<f64>,
    pub rtol: Option<f64>,
    /// `"incremental"` or `"residual"`.
    pub convergence_criterion: Option<String>,
    pub max_it: Option<u32>,
    pub relaxation_parameter: Option<f64>,
    pub error_on_nonconvergence: Option<bool>,
}

// Parameters for the Newton solver.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NewtonParams {
    /// Absolute tolerance on the convergence measure.
    pub atol: f64,
    /// Tolerance on the convergence measure relative to its reference value.
    pub rtol: f64,
    pub criterion: ConvergenceCriterion,
    /// Maximum number of Newton iterations permitted.
    pub max_iter: u32,
    /// Scaling of each Newton increment.
    pub relaxation: f64,
    /// Return an error instead of an unconverged result.
    pub error_on_nonconvergence: bool,
}

impl Default for NewtonParams {
    fn default() -> Self {
        NewtonParams {
            atol: 1e-10,
            rtol: 1e-9,
            criterion: ConvergenceCriterion::Residual,
            max_iter: 50,
            relaxation: 1.0,
            error_on_nonconvergence: true,
        }
    }
}

impl NewtonParams {
    pub fn from_options(options: &NewtonOptions) -> Result<NewtonParams, Error> {
        let defaults = NewtonParams::default();
        let non_negative = |value: Option<f64>, default: f64, name: &str| match value {
            Some(v) if v >= 0.0 && v.is_finite() => Ok(v),
            Some(_) => Err(Error::InvalidParameter {
                name: name.to_string(),
            }),
            None => Ok(default),
        };
        let relaxation = non_negative(
            options.relaxation_parameter,
            defaults.relaxation,
            "relaxation_parameter",
        )?;
        if relaxation == 0.0 {
            return Err(Error::InvalidParameter {
                name: "relaxation_parameter".to_string(),
            });
        }
        Ok(NewtonParams {
            atol: non_negative(options.atol, defaults.atol, "atol")?,
            rtol: non_negative(options.rtol, defaults.rtol, "rtol")?,
            criterion: options
                .convergence_criterion
                .as_deref()
                .map(str::parse)
                .transpose()?
                .unwrap_or(defaults.criterion),
            max_iter: options.max_it.unwrap_or(defaults.max_iter),
            relaxation,
            error_on_nonconvergence: options
                .error_on_nonconvergence
                .unwrap_or(defaults.error_on_nonconvergence),
        })
    }

    /// Convergence test for a measure against its reference value.
    fn converged(&self, measure: f64, reference: f64) -> bool {
        measure == 0.0
            || measure < self.atol
            || (reference > 0.0 && measure / reference < self.rtol)
    }
}

/// Iterate and counters of a Newton solve.
#[derive(Clone, Debug, PartialEq)]
pub struct NewtonState {
    pub x: Vec<f64>,
    pub iterations: u32,
    pub linear_iterations: u32,
    /// Residual 2-norm after each iteration, starting with the initial residual.
    pub residual_history: Vec<f64>,
    phase: Phase,
}

impl NewtonState {
    pub fn new(x: Vec<f64>) -> Self {
        NewtonState {
            x,
            iterations: 0,
            linear_iterations: 0,
            residual_history: Vec::new(),
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns a finished state to `Init`, keeping the current iterate.
    pub fn reset(&mut self) {
        self.iterations = 0;
        self.linear_iterations = 0;
        self.residual_history.clear();
        self.phase = Phase::Init;
    }
}

pub struct Newton<P> {
    problem: P,
    params: NewtonParams,
    linsolve: LinearSolver,
    r: Vec<f64>,
    dx: Vec<f64>,
    jac: GlobalMatrix,
}

impl<P: NonlinearProblem> Newton<P> {
    pub fn new(problem: P, params: NewtonParams, mut linsolve: LinearSolver) -> Self {
        let n = problem.num_variables();
        let null_space = problem.near_null_space();
        if !null_space.is_empty() {
            linsolve.set_near_null_space(null_space);
        }
        let jac = problem.new_jacobian();
        Newton {
            problem,
            params,
            linsolve,
            r: vec![0.0; n],
            dx: vec![0.0; n],
            jac,
        }
    }

    pub fn params(&self) -> &NewtonParams {
        &self.params
    }

    /// Gets a reference to the underlying problem instance.
    pub fn problem(&self) -> &P {
        &self.problem
    }

    /// Gets a mutable reference the underlying problem instance.
    pub fn problem_mut(&mut self) -> &mut P {
        &mut self.problem
    }

    pub fn into_problem(self) -> P {
        self.problem
    }

    /// Runs Newton iterations starting from `state.x`, updating `state` in place.
    ///
    /// `state` must be in the `Init` phase. An unconverged solve is an error if the
    /// parameters say so, otherwise it is reported through the returned status.
    pub fn solve_with(&mut self, state: &mut NewtonState) -> Result<SolveResult, Error> {
        if state.phase.is_terminal() {
            return Err(Error::TerminalNewtonState);
        }
        if state.x.len() != self.problem.num_variables() {
            return Err(Error::SizeMismatch);
        }

        let t_begin = Instant::now();
        let result = self.iterate(state);
        self.problem.timings().total += Instant::now() - t_begin;

        let result = match result {
            Ok(result) => result,
            Err(err) => {
                state.phase = Phase::Diverged;
                return Err(err);
            }
        };

        state.phase = if result.converged() {
            Phase::Converged
        } else {
            Phase::Diverged
        };

        if result.converged() {
            log::info!(
                "Newton solver converged in {} iterations and {} linear solver iterations.",
                result.iterations,
                result.linear_iterations
            );
            Ok(result)
        } else if self.params.error_on_nonconvergence {
            Err(Error::NewtonDidNotConverge { result })
        } else {
            log::warn!("Newton solver did not converge: {}", result);
            Ok(result)
        }
    }

    fn iterate(&mut self, state: &mut NewtonState) -> Result<SolveResult, Error> {
        let Newton {
            problem,
            params,
            linsolve,
            r,
            dx,
            jac,
        } = self;

        state.iterations = 0;
        state.linear_iterations = 0;
        state.residual_history.clear();

        problem.update_coefficients(&state.x)?;
        problem.residual(&state.x, r)?;
        let mut r_norm = norm(r);
        state.residual_history.push(r_norm);
        state.phase = Phase::Iterating;

        let mut linsolve_result = linsolve::SolveResult::default();
        log_debug_stats_header();
        log_debug_stats(0, linsolve_result, r_norm, 0.0, &state.x);

        let mut reference = None;
        let mut measure = r_norm;
        let result = |state: &NewtonState, measure, status| SolveResult {
            iterations: state.iterations,
            linear_iterations: state.linear_iterations,
            measure,
            status,
        };

        let status = loop {
            if !r_norm.is_finite() {
                break Status::Diverged;
            }
            if params.criterion == ConvergenceCriterion::Residual {
                let r0 = *reference.get_or_insert(r_norm);
                measure = r_norm;
                if params.converged(r_norm, r0) {
                    break Status::Success;
                }
            }

            // Check that we are running no more than the maximum allowed iterations.
            if state.iterations >= params.max_iter {
                break Status::MaximumIterationsExceeded;
            }

            problem.jacobian(&state.x, jac)?;

            let t_begin = Instant::now();
            dx.iter_mut().for_each(|v| *v = 0.0);
            linsolve_result = linsolve.solve(jac, r, dx)?;
            problem.timings().linear_solve += Instant::now() - t_begin;
            state.linear_iterations += linsolve_result.iterations;
            if linsolve_result.status != linsolve::Status::Success {
                let status = match linsolve_result.status {
                    linsolve::Status::MaximumIterationsExceeded => {
                        Status::MaximumIterationsExceeded
                    }
                    _ => Status::Diverged,
                };
                log::debug!(
                    "Linear solve failed in Newton iteration {}: {:?}",
                    state.iterations + 1,
                    linsolve_result
                );
                return Err(Error::LinearSolve {
                    status: linsolve_result.status,
                    result: result(state, measure, status),
                });
            }

            // x = x - ω dx
            for (x, &d) in state.x.iter_mut().zip(dx.iter()) {
                *x -= params.relaxation * d;
            }
            state.iterations += 1;

            problem.update_coefficients(&state.x)?;
            problem.residual(&state.x, r)?;
            r_norm = norm(r);
            state.residual_history.push(r_norm);

            let dx_norm = norm(dx);
            log_debug_stats(state.iterations, linsolve_result, r_norm, dx_norm, &state.x);

            if !dx_norm.is_finite() {
                break Status::Diverged;
            }
            if params.criterion == ConvergenceCriterion::Incremental {
                let dx0 = *reference.get_or_insert(dx_norm);
                measure = dx_norm;
                if params.converged(dx_norm, dx0) {
                    break Status::Success;
                }
            }
        };

        Ok(result(state, measure, status))
    }
}

/*
 * Status print routines.
 * i       - iteration number
 * res-2   - 2-norm of the residual
 * d-2     - 2-norm of the step vector
 * x-2     - 2-norm of the variable vector
 * lin #   - number of linear solver iterations
 * lin err - relative residual of the linear solve
 */
fn log_debug_stats_header() {
    log::debug!("    i |   res-2    |    d-2     |    x-2     | lin # |  lin err   ");
    log::debug!("------+------------+------------+------------+-------+------------");
}

fn log_debug_stats(
    iterations: u32,
    linsolve_result: linsolve::SolveResult,
    r_norm: f64,
    dx_norm: f64,
    x: &[f64],
) {
    log::debug!(
        "{i:>5} | {res2:10.3e} | {di:10.3e} | {xi:10.3e} | {lin:>5} | {linerr:10.3e} ",
        i = iterations,
        res2 = r_norm,
        di = dx_norm,
        xi = norm(x),
        lin = linsolve_result.iterations,
        linerr = linsolve_result.error,
    );
}
