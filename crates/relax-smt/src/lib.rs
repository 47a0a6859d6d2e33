#![doc = include_str!("../README.md")]

//! The relax encoding core builds quantifier-free formulas over boolean edge
//! variables and integer position/value variables. This crate keeps those
//! formulas independent of any particular solver.

pub mod backends;
pub mod solver;
pub mod sorts;
pub mod terms;

pub use solver::{Model, ModelValue, SatResult, SmtSolver};
pub use sorts::SmtSort;
pub use terms::SmtTerm;
