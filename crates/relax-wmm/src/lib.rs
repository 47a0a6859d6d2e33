#![doc = include_str!("../README.md")]

//! Relations, axioms and their SMT encoding.
//!
//! A verification task owns one [`RelationAnalysis`] and one [`Encoder`];
//! both borrow the program and the model read-only and are dropped with the
//! task.

pub mod analysis;
pub mod axiom;
pub mod co;
pub mod encoder;
pub mod equivalence;
pub mod error;
pub mod execution;
pub mod model;
pub mod models;
pub mod relation;
pub mod tuple;

pub use analysis::RelationAnalysis;
pub use axiom::{Axiom, AxiomKind, Violation};
pub use encoder::Encoder;
pub use equivalence::{BranchEquivalence, ClassId, CycleEquivalence, Equivalence};
pub use error::WmmError;
pub use execution::ExecutionGraph;
pub use model::MemoryModel;
pub use relation::{Relation, RelationId, RelationKind};
pub use tuple::{Tuple, TupleSet};
