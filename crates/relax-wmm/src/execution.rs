use std::cell::OnceCell;

use indexmap::IndexMap;
use relax_ir::{final_value_var, value_var, EventId, LocationId};
use relax_smt::solver::Model;

use crate::analysis::RelationAnalysis;
use crate::equivalence::BranchEquivalence;
use crate::error::WmmError;
use crate::model::{CO, RF};
use crate::relation::{edge_var_name, RelationId, RelationKind};
use crate::tuple::{Tuple, TupleSet};

/// A concrete execution read back from a solver model.
///
/// Relations are evaluated set-wise over the executed events, following the
/// same definitions the encoder asserts, so an axiom holds on the graph
/// exactly when its consistency formula holds under the model.
pub struct ExecutionGraph<'a> {
    analysis: &'a RelationAnalysis<'a>,
    executed: Vec<bool>,
    rf: TupleSet,
    co: TupleSet,
    values: IndexMap<EventId, i64>,
    final_values: IndexMap<LocationId, i64>,
    memo: Vec<OnceCell<TupleSet>>,
}

impl<'a> ExecutionGraph<'a> {
    /// Decode the execution. `rf` and `co` must be fully encoded and every
    /// program variable present in `model`.
    pub fn decode(analysis: &'a RelationAnalysis<'a>, model: &Model) -> Result<Self, WmmError> {
        let program = analysis.program;
        let executed = BranchEquivalence::new(program).executed(model)?;

        let read_edges = |id: RelationId| -> Result<TupleSet, WmmError> {
            let name = analysis.model.name_of(id);
            let mut out = TupleSet::new();
            for &t in analysis.max_tuples(id) {
                let var = edge_var_name(name, t);
                if model
                    .get_bool(&var)
                    .ok_or(WmmError::IncompleteModel(var))?
                {
                    out.insert(t);
                }
            }
            Ok(out)
        };
        let rf = read_edges(RF)?;
        let co = read_edges(CO)?;

        let mut values = IndexMap::new();
        for e in program.events.iter().filter(|e| e.is_memory() && executed[e.id]) {
            let var = value_var(e.id);
            let v = model.get_int(&var).ok_or(WmmError::IncompleteModel(var))?;
            values.insert(e.id, v);
        }
        let mut final_values = IndexMap::new();
        for &loc in program.locations.keys() {
            let var = final_value_var(loc);
            let v = model.get_int(&var).ok_or(WmmError::IncompleteModel(var))?;
            final_values.insert(loc, v);
        }

        Ok(Self {
            analysis,
            executed,
            rf,
            co,
            values,
            final_values,
            memo: (0..analysis.model.len()).map(|_| OnceCell::new()).collect(),
        })
    }

    pub fn analysis(&self) -> &'a RelationAnalysis<'a> {
        self.analysis
    }

    pub fn is_executed(&self, e: EventId) -> bool {
        self.executed.get(e).copied().unwrap_or(false)
    }

    pub fn executed_events(&self) -> impl Iterator<Item = EventId> + '_ {
        self.executed
            .iter()
            .enumerate()
            .filter(|&(_, &x)| x)
            .map(|(e, _)| e)
    }

    pub fn rf(&self) -> &TupleSet {
        &self.rf
    }

    pub fn co(&self) -> &TupleSet {
        &self.co
    }

    pub fn value(&self, e: EventId) -> Option<i64> {
        self.values.get(&e).copied()
    }

    pub fn final_values(&self) -> &IndexMap<LocationId, i64> {
        &self.final_values
    }

    /// Concrete edges of relation `id` in this execution.
    pub fn evaluate(&self, id: RelationId) -> &TupleSet {
        self.memo[id].get_or_init(|| self.compute(id))
    }

    fn compute(&self, id: RelationId) -> TupleSet {
        let max = self.analysis.max_tuples(id);
        match &self.analysis.model.get(id).kind {
            RelationKind::ReadsFrom => self.rf.clone(),
            RelationKind::Coherence => self.co.clone(),
            RelationKind::FenceRel(name) => max.filter(|t| {
                self.both_executed(*t)
                    && self
                        .analysis
                        .fences_between(name, t.first, t.second)
                        .into_iter()
                        .any(|f| self.is_executed(f))
            }),
            kind if kind.is_static_base() => max.filter(|t| self.both_executed(*t)),
            RelationKind::Cartesian(..) => max.filter(|t| self.both_executed(*t)),
            RelationKind::Union(ops) => {
                let mut out = TupleSet::new();
                for &op in ops {
                    out.union_with(self.evaluate(op));
                }
                out
            }
            RelationKind::Intersection(ops) => {
                let Some((&first, rest)) = ops.split_first() else {
                    return TupleSet::new();
                };
                rest.iter().fold(self.evaluate(first).clone(), |acc, &op| {
                    acc.intersection(self.evaluate(op))
                })
            }
            RelationKind::Difference(a, b) => self.evaluate(*a).difference(self.evaluate(*b)),
            RelationKind::Inverse(r) => self.evaluate(*r).inverse(),
            RelationKind::Composition(r, s) => self.evaluate(*r).compose(self.evaluate(*s)),
            RelationKind::TransitiveClosure(r) => self.evaluate(*r).transitive_closure(),
            other => unreachable!("unhandled relation kind {other:?}"),
        }
    }

    fn both_executed(&self, t: Tuple) -> bool {
        self.is_executed(t.first) && self.is_executed(t.second)
    }
}
