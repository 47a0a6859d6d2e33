use relax_ir::EventFilter;

use crate::tuple::Tuple;

/// Index of a relation in its [`MemoryModel`](crate::model::MemoryModel).
pub type RelationId = usize;

/// How a relation is defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// `po`: same thread, earlier in program order.
    ProgramOrder,
    /// `rf`: a write and a read observing it.
    ReadsFrom,
    /// `co`: per-location total order of writes.
    Coherence,
    /// `loc`: distinct memory events on the same location.
    SameLocation,
    /// `id`
    Identity,
    /// `int`: distinct events of the same thread.
    Internal,
    /// `ext`: events of different threads.
    External,
    /// `fencerel(F)`: `a po f po b` for a fence `f` named `F`.
    FenceRel(String),
    /// `0`
    EmptyRel,
    Union(Vec<RelationId>),
    Intersection(Vec<RelationId>),
    /// `a \ b`; the subtrahend must not depend on `rf` or `co`.
    Difference(RelationId, RelationId),
    Inverse(RelationId),
    Composition(RelationId, RelationId),
    TransitiveClosure(RelationId),
    Cartesian(EventFilter, EventFilter),
}

impl RelationKind {
    pub fn operands(&self) -> Vec<RelationId> {
        match self {
            RelationKind::Union(ops) | RelationKind::Intersection(ops) => ops.clone(),
            RelationKind::Difference(a, b) | RelationKind::Composition(a, b) => vec![*a, *b],
            RelationKind::Inverse(r) | RelationKind::TransitiveClosure(r) => vec![*r],
            _ => Vec::new(),
        }
    }

    /// Base relation whose edges are fixed by the program text alone.
    pub fn is_static_base(&self) -> bool {
        matches!(
            self,
            RelationKind::ProgramOrder
                | RelationKind::SameLocation
                | RelationKind::Identity
                | RelationKind::Internal
                | RelationKind::External
                | RelationKind::FenceRel(_)
                | RelationKind::EmptyRel
        )
    }
}

/// A named relation of a memory model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: RelationId,
    pub name: String,
    pub kind: RelationKind,
}

/// Name of the boolean variable for one edge of relation `name`.
pub fn edge_var_name(name: &str, tuple: Tuple) -> String {
    format!("{name}{tuple}")
}
