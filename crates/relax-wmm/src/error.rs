use thiserror::Error;

use crate::relation::RelationId;

/// Errors raised while building or encoding a memory model.
///
/// All of these are reported before any solver call is made, except
/// `IncompleteModel`, which signals a solver model lacking a variable the
/// encoding declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WmmError {
    #[error("Undefined relation '{0}'")]
    UndefinedRelation(String),
    #[error("Relation '{0}' is already defined")]
    Redefinition(String),
    #[error("Incompatible operands for '{0}'")]
    IncompatibleOperands(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Relation id {0} does not exist")]
    DanglingRelation(RelationId),
    #[error("Solver model has no value for '{0}'")]
    IncompleteModel(String),
}
