pub mod calculator;
pub mod coefficients;

pub use calculator::{compute_budget, compute_budget_with};
pub use coefficients::Coefficients;
