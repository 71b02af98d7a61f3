use super::{SolveResult, Status};

/// Implementation of the preconditioned BiConjugate Gradient STABilized (BiCGSTAB)
/// algorithm for non-symmetric linear systems.
///
/// https://en.wikipedia.org/wiki/Biconjugate_gradient_stabilized_method
#[allow(non_snake_case)]
pub struct BiCGSTAB {
    pub max_iter: u32,
    pub tol: f64,
    r: na::DVector<f64>,
    r0s: na::DVector<f64>,
    p: na::DVector<f64>,
    /// Preconditioned search direction.
    y: na::DVector<f64>,
    /// Preconditioned intermediate residual.
    z: na::DVector<f64>,
    Ay: na::DVector<f64>,
    Az: na::DVector<f64>,
}

impl BiCGSTAB {
    #[allow(non_snake_case)]
    pub fn new(size: usize, max_iter: u32, tol: f64) -> Self {
        let r = na::DVector::zeros(size);
        BiCGSTAB {
            max_iter,
            tol: f64::EPSILON.max(tol),
            r0s: r.clone(),
            p: r.clone(),
            y: r.clone(),
            z: r.clone(),
            Ay: r.clone(),
            Az: r.clone(),
            r,
        }
    }

    /// Solves `Ax = b` where the product `Ax` is provided by the function `matvec`.
    #[inline]
    pub fn solve<F>(&mut self, matvec: F, x: &mut [f64], b: &[f64]) -> SolveResult
    where
        F: FnMut(&[f64], &mut [f64]),
    {
        self.solve_precond(matvec, x, b, |r, out| out.copy_from_slice(r))
    }

    /// Solves `Ax = b` with a preconditioner.
    ///
    /// `matvec(x, out)` computes `out = Ax` and `precond(r, out)` computes `out = M⁻¹r` for
    /// some approximation `M` of `A`. `x` holds the initial guess on entry.
    #[allow(non_snake_case)]
    pub fn solve_precond<F, P>(
        &mut self,
        mut matvec: F,
        x: &mut [f64],
        b: &[f64],
        mut precond: P,
    ) -> SolveResult
    where
        F: FnMut(&[f64], &mut [f64]),
        P: FnMut(&[f64], &mut [f64]),
    {
        let BiCGSTAB {
            max_iter,
            tol,
            ref mut r,
            ref mut r0s,
            ref mut p,
            ref mut y,
            ref mut z,
            ref mut Ay,
            ref mut Az,
        } = *self;

        debug_assert_eq!(b.len(), x.len());
        debug_assert_eq!(r.len(), x.len());

        let b = na::DVectorView::from(b);
        let b_norm_sq = b.norm_squared();
        let mut x: na::DVectorViewMut<f64> = x.into();

        // Return if b is zero, the solution is trivial.
        if b_norm_sq == 0.0 {
            x.fill(0.0);
            return SolveResult {
                iterations: 0,
                residual: 0.0,
                error: 0.0,
                status: Status::Success,
            };
        }

        let tol_sq = b_norm_sq * tol * tol;
        let eps_sq = f64::EPSILON * f64::EPSILON;
        let result = |iterations, r_norm_sq: f64, status| {
            let residual = r_norm_sq.sqrt();
            SolveResult {
                iterations,
                residual,
                error: residual / b_norm_sq.sqrt(),
                status,
            }
        };

        // r0 = b - A*x0
        matvec(x.as_slice(), r.as_mut_slice());
        r.axpy(1.0, &b, -1.0);

        // Choose r0s arbitrary such that (r0s, r) != 0. We chose r0s = r.
        r0s.copy_from(r);
        p.copy_from(r);
        let mut rho = r0s.dot(r);

        let mut iterations = 0;
        loop {
            let r_norm_sq = r.norm_squared();
            log::trace!("r norm sq ratio: {:?}", r_norm_sq / b_norm_sq);
            if !r_norm_sq.is_finite() {
                break result(iterations, r_norm_sq, Status::NanDetected);
            } else if r_norm_sq <= tol_sq {
                break result(iterations, r_norm_sq, Status::Success);
            } else if iterations >= max_iter {
                break result(iterations, r_norm_sq, Status::MaximumIterationsExceeded);
            }

            // Restart with r0s = r if r became orthogonal to r0s.
            if rho.abs() <= eps_sq * r0s.norm_squared() {
                r0s.copy_from(r);
                p.copy_from(r);
                rho = r_norm_sq;
                log::trace!("r too orthogonal to r0s, restarting with rho = {:?}", rho);
            }

            // y = M⁻¹p, Ay = A*y
            precond(p.as_slice(), y.as_mut_slice());
            matvec(y.as_slice(), Ay.as_mut_slice());

            let r0sAy = r0s.dot(Ay);
            if r0sAy == 0.0 {
                break result(iterations, r_norm_sq, Status::SingularMatrix);
            }

            // α = r0s'r / r0s'Ay
            let alpha = rho / r0sAy;
            log::trace!("alpha = {:?}", alpha);

            // s = r - α Ay
            x.axpy(alpha, y, 1.0);
            r.axpy(-alpha, Ay, 1.0);
            if r.norm_squared() <= tol_sq {
                iterations += 1;
                continue;
            }

            // z = M⁻¹s, Az = A*z
            precond(r.as_slice(), z.as_mut_slice());
            matvec(z.as_slice(), Az.as_mut_slice());

            // ω = Az's / Az'Az
            let Az_norm_sq = Az.norm_squared();
            let w = if Az_norm_sq > 0.0 {
                Az.dot(r) / Az_norm_sq
            } else {
                0.0
            };
            log::trace!("w = {:?}", w);

            // x = x + ωz, r = s - ωAz
            x.axpy(w, z, 1.0);
            r.axpy(-w, Az, 1.0);

            iterations += 1;

            if w == 0.0 {
                let r_norm_sq = r.norm_squared();
                if r_norm_sq > tol_sq {
                    break result(iterations, r_norm_sq, Status::SingularMatrix);
                }
                continue;
            }

            // β = (r0s'r_new / r0s'r) (α/ω)
            let rho_new = r0s.dot(r);
            let beta = (rho_new / rho) * (alpha / w);
            log::trace!("beta = {:?}", beta);
            rho = rho_new;

            // p = r + β(p - ωAy)
            p.axpy(-w, Ay, 1.0);
            p.axpy(1.0, r, beta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bicgstab_simple() {
        // Test that BiCGSTAB works with a simple 2x2 system.
        let mtx = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![5.0, 6.0];
        let mut x = vec![0.0, 0.0];

        let mut solver = BiCGSTAB::new(2, 1000, 1e-10);
        let result = solver.solve(
            |x, out| {
                out[0] = mtx[0] * x[0] + mtx[1] * x[1];
                out[1] = mtx[2] * x[0] + mtx[3] * x[1];
            },
            x.as_mut_slice(),
            b.as_slice(),
        );

        assert_eq!(result.status, Status::Success);
        assert_relative_eq!(x[0], -4.0, max_relative = 1e-8);
        assert_relative_eq!(x[1], 4.5, max_relative = 1e-8);
    }

    #[test]
    fn jacobi_preconditioned_tridiagonal() {
        let n = 20;
        let diag: Vec<f64> = (0..n).map(|i| 4.0 + i as f64).collect();
        let matvec = |x: &[f64], out: &mut [f64]| {
            for i in 0..n {
                out[i] = diag[i] * x[i];
                if i > 0 {
                    out[i] -= x[i - 1];
                }
                if i + 1 < n {
                    out[i] -= 2.0 * x[i + 1];
                }
            }
        };
        let expected: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
        let mut b = vec![0.0; n];
        matvec(&expected, &mut b);

        let mut x = vec![0.0; n];
        let mut solver = BiCGSTAB::new(n, 100, 1e-12);
        let result = solver.solve_precond(matvec, &mut x, &b, |r, out| {
            for i in 0..n {
                out[i] = r[i] / diag[i];
            }
        });
        assert_eq!(result.status, Status::Success);
        for (a, e) in x.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *e, epsilon = 1e-9);
        }
    }
}
