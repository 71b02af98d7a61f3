pub mod nl;
mod problem;
mod solve;
pub mod standard_form;

pub use problem::ContactProblem;
pub use solve::{solve, Solution};
pub use standard_form::{DirichletCondition, StandardForm};
