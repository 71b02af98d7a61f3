mod bicgstab;

pub use bicgstab::*;

use std::collections::BTreeMap;

use crate::matrix::GlobalMatrix;
use crate::Error;

/// Opaque key-value options forwarded to the linear solver.
///
/// Recognized keys are `ksp_type` (`preonly` or `bicgstab`), `pc_type` (`lu`, `jacobi`
/// or `none`), `ksp_rtol` and `ksp_max_it`.
pub type LinearSolverOptions = BTreeMap<String, String>;

#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum Status {
    #[error("Success")]
    Success,
    #[error("Maximum number of linear solver iterations exceeded")]
    MaximumIterationsExceeded,
    #[error("NaN detected")]
    NanDetected,
    #[error("Singular matrix detected")]
    SingularMatrix,
}

impl Default for Status {
    fn default() -> Self {
        Status::Success
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct SolveResult {
    /// Number of iterations of an iterative solver.
    pub iterations: u32,
    /// Absolute residual 2-norm.
    pub residual: f64,
    /// Relative residual 2-norm.
    ///
    /// Residual divided by the norm of the right-hand-side.
    pub error: f64,
    /// Final status of the linear solve.
    pub status: Status,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KrylovMethod {
    /// Apply the preconditioner once.
    PreOnly,
    BiCGSTAB,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Preconditioner {
    /// Dense LU factorization.
    Lu,
    Jacobi,
    None,
}

/// Linear solver for the Newton update `J dx = F`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearSolver {
    pub method: KrylovMethod,
    pub preconditioner: Preconditioner,
    pub rtol: f64,
    pub max_iter: u32,
    near_null_space: Vec<Vec<f64>>,
}

impl Default for LinearSolver {
    fn default() -> Self {
        LinearSolver {
            method: KrylovMethod::PreOnly,
            preconditioner: Preconditioner::Lu,
            rtol: 1e-10,
            max_iter: 10_000,
            near_null_space: Vec::new(),
        }
    }
}

fn invalid_option(key: &str, value: &str) -> Error {
    Error::InvalidLinearSolverOption {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl LinearSolver {
    /// Builds a solver from options. Unknown keys are ignored with a warning.
    pub fn from_options(options: &LinearSolverOptions) -> Result<LinearSolver, Error> {
        let mut solver = LinearSolver::default();
        for (key, value) in options.iter() {
            match key.as_str() {
                "ksp_type" => {
                    solver.method = match value.as_str() {
                        "preonly" => KrylovMethod::PreOnly,
                        "bicgstab" => KrylovMethod::BiCGSTAB,
                        _ => return Err(invalid_option(key, value)),
                    }
                }
                "pc_type" => {
                    solver.preconditioner = match value.as_str() {
                        "lu" => Preconditioner::Lu,
                        "jacobi" => Preconditioner::Jacobi,
                        "none" => Preconditioner::None,
                        _ => return Err(invalid_option(key, value)),
                    }
                }
                "ksp_rtol" => {
                    solver.rtol = value
                        .parse::<f64>()
                        .ok()
                        .filter(|&tol| tol > 0.0)
                        .ok_or_else(|| invalid_option(key, value))?;
                }
                "ksp_max_it" => {
                    solver.max_iter = value.parse().map_err(|_| invalid_option(key, value))?;
                }
                _ => log::warn!("Ignoring unknown linear solver option {:?} = {:?}", key, value),
            }
        }
        if solver.method == KrylovMethod::PreOnly && solver.preconditioner != Preconditioner::Lu {
            return Err(invalid_option(
                "pc_type",
                match solver.preconditioner {
                    Preconditioner::Jacobi => "jacobi",
                    _ => "none",
                },
            ));
        }
        Ok(solver)
    }

    /// Attaches modes the operator is expected to (nearly) annihilate.
    ///
    /// The modes are informational: they are reported but do not change the solve.
    pub fn set_near_null_space(&mut self, modes: Vec<Vec<f64>>) {
        log::debug!("Attached near null space with {} modes", modes.len());
        self.near_null_space = modes;
    }

    pub fn near_null_space(&self) -> &[Vec<f64>] {
        &self.near_null_space
    }

    /// Solves `a x = b`, using the contents of `x` as the initial guess for iterative
    /// methods.
    ///
    /// Only invalid inputs are errors. A failed solve is reported through the status of
    /// the result.
    pub fn solve(
        &self,
        a: &GlobalMatrix,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<SolveResult, Error> {
        if b.len() != a.size() || x.len() != a.size() {
            return Err(Error::SizeMismatch);
        }

        let lu = match self.preconditioner {
            Preconditioner::Lu => {
                let lu = a.to_dense().lu();
                if !lu.is_invertible() {
                    log::trace!("Linear solve: singular matrix");
                    return Ok(SolveResult {
                        residual: f64::NAN,
                        error: f64::NAN,
                        status: Status::SingularMatrix,
                        ..Default::default()
                    });
                }
                Some(lu)
            }
            _ => None,
        };

        let result = match (self.method, lu) {
            (KrylovMethod::PreOnly, Some(lu)) => {
                let rhs = na::DVector::from_column_slice(b);
                let sol = match lu.solve(&rhs) {
                    Some(sol) => sol,
                    None => {
                        return Ok(SolveResult {
                            residual: f64::NAN,
                            error: f64::NAN,
                            status: Status::SingularMatrix,
                            ..Default::default()
                        })
                    }
                };
                x.copy_from_slice(sol.as_slice());
                let mut ax = vec![0.0; b.len()];
                a.mul_vec(x, &mut ax);
                let residual = ax
                    .iter()
                    .zip(b.iter())
                    .map(|(&p, &q)| (p - q) * (p - q))
                    .sum::<f64>()
                    .sqrt();
                let b_norm = crate::norm(b);
                SolveResult {
                    iterations: 1,
                    residual,
                    error: if b_norm > 0.0 { residual / b_norm } else { 0.0 },
                    status: if residual.is_finite() {
                        Status::Success
                    } else {
                        Status::NanDetected
                    },
                }
            }
            (KrylovMethod::PreOnly, None) => {
                // Rejected by `from_options`.
                return Err(invalid_option("ksp_type", "preonly"));
            }
            (KrylovMethod::BiCGSTAB, lu) => {
                let mut bicgstab = BiCGSTAB::new(b.len(), self.max_iter, self.rtol);
                let matvec = |v: &[f64], out: &mut [f64]| a.mul_vec(v, out);
                match (self.preconditioner, lu) {
                    (Preconditioner::Lu, Some(lu)) => {
                        bicgstab.solve_precond(matvec, x, b, |r, out| {
                            out.copy_from_slice(r);
                            let mut out = na::DVectorViewMut::from(out);
                            lu.solve_mut(&mut out);
                        })
                    }
                    (Preconditioner::Jacobi, _) => {
                        let inv_diag: Vec<f64> = a
                            .diagonal()
                            .into_iter()
                            .map(|d| if d != 0.0 { 1.0 / d } else { 1.0 })
                            .collect();
                        bicgstab.solve_precond(matvec, x, b, |r, out| {
                            for ((o, &r), &d) in out.iter_mut().zip(r.iter()).zip(inv_diag.iter())
                            {
                                *o = r * d;
                            }
                        })
                    }
                    _ => bicgstab.solve(matvec, x, b),
                }
            }
        };

        log::trace!("Linear solve: {:?}", result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::SparsityPattern;
    use approx::assert_relative_eq;

    fn options(pairs: &[(&str, &str)]) -> LinearSolverOptions {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn laplacian(n: usize) -> GlobalMatrix {
        let mut pattern = SparsityPattern::new(n);
        for i in 0..n {
            pattern.insert_block(&[i], &[i.saturating_sub(1), i, (i + 1).min(n - 1)]);
        }
        let mut mat = pattern.build();
        for i in 0..n {
            mat.add(i, i, 2.0).unwrap();
            if i > 0 {
                mat.add(i, i - 1, -1.0).unwrap();
            }
            if i + 1 < n {
                mat.add(i, i + 1, -1.0).unwrap();
            }
        }
        mat
    }

    #[test]
    fn option_parsing() {
        let solver = LinearSolver::from_options(&LinearSolverOptions::new()).unwrap();
        assert_eq!(solver.method, KrylovMethod::PreOnly);
        assert_eq!(solver.preconditioner, Preconditioner::Lu);

        let solver = LinearSolver::from_options(&options(&[
            ("ksp_type", "bicgstab"),
            ("pc_type", "jacobi"),
            ("ksp_rtol", "1e-8"),
            ("pc_factor_mat_solver_type", "mumps"),
        ]))
        .unwrap();
        assert_eq!(solver.method, KrylovMethod::BiCGSTAB);
        assert_eq!(solver.rtol, 1e-8);

        for bad in [
            options(&[("ksp_type", "gmres")]),
            options(&[("pc_type", "jacobi")]),
            options(&[("ksp_max_it", "-3")]),
        ] {
            assert!(matches!(
                LinearSolver::from_options(&bad),
                Err(Error::InvalidLinearSolverOption { .. })
            ));
        }
    }

    #[test]
    fn direct_and_iterative_agree() {
        let n = 12;
        let mat = laplacian(n);
        let b: Vec<f64> = (0..n).map(|i| 1.0 + i as f64).collect();

        let mut direct = vec![0.0; n];
        let result = LinearSolver::default().solve(&mat, &b, &mut direct).unwrap();
        assert_eq!(result.iterations, 1);

        for pc in ["jacobi", "none", "lu"] {
            let solver = LinearSolver::from_options(&options(&[
                ("ksp_type", "bicgstab"),
                ("pc_type", pc),
                ("ksp_rtol", "1e-12"),
            ]))
            .unwrap();
            let mut x = vec![0.0; n];
            solver.solve(&mat, &b, &mut x).unwrap();
            for (a, e) in x.iter().zip(direct.iter()) {
                assert_relative_eq!(*a, *e, max_relative = 1e-8);
            }
        }
    }

    #[test]
    fn singular_matrix_is_reported() {
        let mut pattern = SparsityPattern::new(2);
        pattern.insert_block(&[0, 1], &[0, 1]);
        let mat = pattern.build();
        let mut x = vec![0.0; 2];
        let result = LinearSolver::default().solve(&mat, &[1.0, 1.0], &mut x).unwrap();
        assert_eq!(result.status, Status::SingularMatrix);
        assert_eq!(result.iterations, 0);
    }
}
