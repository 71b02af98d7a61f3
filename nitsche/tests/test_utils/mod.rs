use nitsche::matrix::GlobalMatrix;
use nitsche::nl::NonlinearProblem;
use nitsche::ContactPressure;
pub use nitsche::test_utils::*;

pub fn init_logger() {
    let _ = env_logger::Builder::from_env("NITSCHE_LOG")
        .is_test(true)
        .try_init();
}

/// Pressure values of a surface paired with the `x` coordinate of their points, sorted
/// by `x`.
#[allow(dead_code)]
pub fn pressure_by_x(pressure: &ContactPressure) -> Vec<(f64, Option<f64>)> {
    let mut values: Vec<_> = pressure
        .points
        .iter()
        .map(|p| p[0])
        .zip(pressure.values.iter().copied())
        .collect();
    values.sort_by(|a, b| a.0.total_cmp(&b.0));
    values
}

/// Residual at `x` after updating the problem coefficients.
#[allow(dead_code)]
pub fn eval_residual<P: NonlinearProblem>(problem: &mut P, x: &[f64]) -> Vec<f64> {
    let mut r = vec![0.0; x.len()];
    problem.update_coefficients(x).unwrap();
    problem.residual(x, &mut r).unwrap();
    r
}

/// Jacobian at `x` after updating the problem coefficients.
#[allow(dead_code)]
pub fn eval_jacobian<P: NonlinearProblem>(problem: &mut P, x: &[f64]) -> GlobalMatrix {
    let mut jac = problem.new_jacobian();
    problem.update_coefficients(x).unwrap();
    problem.jacobian(x, &mut jac).unwrap();
    jac
}

/// Largest deviation between the Jacobian at `x` and central differences of the residual,
/// along with the largest Jacobian entry.
#[allow(dead_code)]
pub fn jacobian_fd_error<P: NonlinearProblem>(problem: &mut P, x: &[f64], h: f64) -> (f64, f64) {
    let jac = eval_jacobian(problem, x).to_dense();
    let mut max_err: f64 = 0.0;
    let mut xp = x.to_vec();
    for j in 0..x.len() {
        xp[j] = x[j] + h;
        let r_plus = eval_residual(problem, &xp);
        xp[j] = x[j] - h;
        let r_minus = eval_residual(problem, &xp);
        xp[j] = x[j];
        for i in 0..x.len() {
            let fd = (r_plus[i] - r_minus[i]) / (2.0 * h);
            max_err = max_err.max((fd - jac[(i, j)]).abs());
        }
    }
    let max_entry = jac.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    (max_err, max_entry)
}
