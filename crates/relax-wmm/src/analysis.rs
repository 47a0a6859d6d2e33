use std::cell::OnceCell;

use relax_ir::{Event, EventId, EventKind, Program};
use tracing::debug;

use crate::model::MemoryModel;
use crate::relation::{RelationId, RelationKind};
use crate::tuple::{Tuple, TupleSet};

/// Candidate edge sets of every relation of a model, for one program.
///
/// Each `max_tuples` set is computed on first use and then kept for the
/// lifetime of the analysis, which is one verification task. The model must
/// have passed [`MemoryModel::validate`].
pub struct RelationAnalysis<'a> {
    pub program: &'a Program,
    pub model: &'a MemoryModel,
    max: Vec<OnceCell<TupleSet>>,
}

impl<'a> RelationAnalysis<'a> {
    pub fn new(program: &'a Program, model: &'a MemoryModel) -> Self {
        Self {
            program,
            model,
            max: (0..model.len()).map(|_| OnceCell::new()).collect(),
        }
    }

    /// Over-approximation of every edge `id` can hold in any execution.
    pub fn max_tuples(&self, id: RelationId) -> &TupleSet {
        self.max[id].get_or_init(|| {
            let set = self.compute(id);
            debug!(
                relation = self.model.name_of(id),
                tuples = set.len(),
                "computed candidate edges"
            );
            set
        })
    }

    /// Total number of candidate edges over all relations computed so far.
    pub fn computed_tuples(&self) -> usize {
        self.max.iter().filter_map(|c| c.get()).map(TupleSet::len).sum()
    }

    fn pairs(&self, mut pred: impl FnMut(&Event, &Event) -> bool) -> TupleSet {
        let events = &self.program.events;
        let mut out = TupleSet::new();
        for a in events {
            for b in events {
                if pred(a, b) {
                    out.insert(Tuple::new(a.id, b.id));
                }
            }
        }
        out
    }

    fn compute(&self, id: RelationId) -> TupleSet {
        match &self.model.get(id).kind {
            RelationKind::ProgramOrder => self.pairs(|a, b| {
                a.thread.is_some() && a.thread == b.thread && a.po_index < b.po_index
            }),
            RelationKind::SameLocation => self.pairs(|a, b| {
                a.id != b.id && a.is_memory() && b.is_memory() && a.location == b.location
            }),
            RelationKind::Identity => self.program.events.iter().map(|e| Tuple::new(e.id, e.id)).collect(),
            RelationKind::Internal => {
                self.pairs(|a, b| a.id != b.id && a.thread.is_some() && a.thread == b.thread)
            }
            RelationKind::External => {
                self.pairs(|a, b| a.id != b.id && (a.thread.is_none() || a.thread != b.thread))
            }
            RelationKind::ReadsFrom => {
                self.pairs(|w, r| w.is_write() && r.is_read() && w.location == r.location)
            }
            RelationKind::Coherence => self.pairs(|a, b| {
                a.id != b.id
                    && a.is_write()
                    && b.kind == EventKind::Store
                    && a.location == b.location
            }),
            RelationKind::FenceRel(name) => self.pairs(|a, b| {
                a.thread.is_some()
                    && a.thread == b.thread
                    && !self.fences_between(name, a.id, b.id).is_empty()
            }),
            RelationKind::EmptyRel => TupleSet::new(),
            RelationKind::Union(ops) => {
                let mut out = TupleSet::new();
                for &op in ops {
                    out.union_with(self.max_tuples(op));
                }
                out
            }
            RelationKind::Intersection(ops) => {
                let Some((&first, rest)) = ops.split_first() else {
                    return TupleSet::new();
                };
                rest.iter().fold(self.max_tuples(first).clone(), |acc, &op| {
                    acc.intersection(self.max_tuples(op))
                })
            }
            RelationKind::Difference(a, b) => self.max_tuples(*a).difference(&self.must_tuples(*b)),
            RelationKind::Inverse(r) => self.max_tuples(*r).inverse(),
            RelationKind::Composition(r, s) => self.max_tuples(*r).compose(self.max_tuples(*s)),
            RelationKind::TransitiveClosure(r) => self.max_tuples(*r).transitive_closure(),
            RelationKind::Cartesian(f1, f2) => self.pairs(|a, b| f1.matches(a) && f2.matches(b)),
        }
    }

    /// Edges a static relation holds whenever both endpoints execute.
    ///
    /// Only these may be dropped from a difference's candidates. Relations
    /// going through an intermediate event contribute nothing, since the
    /// intermediate may not execute.
    pub fn must_tuples(&self, id: RelationId) -> TupleSet {
        match &self.model.get(id).kind {
            RelationKind::FenceRel(name) => self.max_tuples(id).filter(|t| {
                self.fences_between(name, t.first, t.second)
                    .into_iter()
                    .any(|f| self.program.event(f).always_executes())
            }),
            kind if kind.is_static_base() => self.max_tuples(id).clone(),
            RelationKind::Cartesian(..) => self.max_tuples(id).clone(),
            RelationKind::Union(ops) => {
                let mut out = TupleSet::new();
                for &op in ops {
                    out.union_with(&self.must_tuples(op));
                }
                out
            }
            RelationKind::Intersection(ops) => {
                let Some((&first, rest)) = ops.split_first() else {
                    return TupleSet::new();
                };
                rest.iter().fold(self.must_tuples(first), |acc, &op| {
                    acc.intersection(&self.must_tuples(op))
                })
            }
            RelationKind::Difference(a, b) => self.must_tuples(*a).difference(self.max_tuples(*b)),
            RelationKind::Inverse(r) => self.must_tuples(*r).inverse(),
            _ => TupleSet::new(),
        }
    }

    /// Fences named `name` strictly between `a` and `b` in `a`'s thread.
    pub fn fences_between(&self, name: &str, a: EventId, b: EventId) -> Vec<EventId> {
        let (a, b) = (self.program.event(a), self.program.event(b));
        let Some(thread) = a.thread.filter(|&t| Some(t) == b.thread) else {
            return Vec::new();
        };
        self.program.threads[thread]
            .events
            .iter()
            .map(|&id| self.program.event(id))
            .filter(|f| f.is_fence(name) && a.po_index < f.po_index && f.po_index < b.po_index)
            .map(|f| f.id)
            .collect()
    }

    /// Squaring levels `k` with `2^k >= |events|`, so a closure unrolled `k`
    /// times covers every simple path and cycle.
    pub fn closure_depth(&self) -> usize {
        let n = self.program.len().max(2);
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CO, EXT, INT, LOC, PO, RF};
    use relax_ir::ProgramBuilder;
    use relax_smt::terms::SmtTerm;

    /// x=0; T0: a: W y=1, b: W x=1 ; T1: c: R x
    fn po_then_rf() -> Program {
        let mut b = ProgramBuilder::new("po-rf");
        let x = b.location("x", 0);
        let y = b.location("y", 0);
        let t0 = b.thread();
        let t1 = b.thread();
        b.store(t0, y, SmtTerm::int(1));
        b.store(t0, x, SmtTerm::int(1));
        b.load(t1, x, "r");
        b.build().unwrap()
    }

    #[test]
    fn base_candidate_sets() {
        let p = po_then_rf();
        let m = MemoryModel::new();
        let a = RelationAnalysis::new(&p, &m);
        // events: 0 init x, 1 init y, 2 a, 3 b, 4 c
        assert_eq!(a.max_tuples(PO).sorted(), vec![Tuple::new(2, 3)]);
        assert_eq!(
            a.max_tuples(RF).sorted(),
            vec![Tuple::new(0, 4), Tuple::new(3, 4)]
        );
        assert_eq!(
            a.max_tuples(CO).sorted(),
            vec![Tuple::new(0, 3), Tuple::new(1, 2)]
        );
        assert!(a.max_tuples(LOC).contains(&Tuple::new(4, 3)));
        assert!(a.max_tuples(INT).contains(&Tuple::new(3, 2)));
        assert!(!a.max_tuples(INT).contains(&Tuple::new(0, 1)));
        assert!(a.max_tuples(EXT).contains(&Tuple::new(0, 1)));
    }

    #[test]
    fn composition_of_po_and_rf_is_exact() {
        let p = po_then_rf();
        let mut m = MemoryModel::new();
        let seq = m.add(RelationKind::Composition(PO, RF)).unwrap();
        let a = RelationAnalysis::new(&p, &m);
        assert_eq!(a.max_tuples(seq).sorted(), vec![Tuple::new(2, 4)]);
    }

    #[test]
    fn two_unordered_stores_are_co_candidates_both_ways() {
        let mut b = ProgramBuilder::new("2+2W");
        let x = b.location("x", 0);
        let t0 = b.thread();
        let t1 = b.thread();
        let w1 = b.store(t0, x, SmtTerm::int(1));
        let w2 = b.store(t1, x, SmtTerm::int(2));
        let p = b.build().unwrap();
        let m = MemoryModel::new();
        let a = RelationAnalysis::new(&p, &m);
        let co = a.max_tuples(CO);
        assert!(co.contains(&Tuple::new(w1, w2)));
        assert!(co.contains(&Tuple::new(w2, w1)));
        assert!(!co.contains(&Tuple::new(w1, 0)));
    }

    #[test]
    fn fencerel_requires_a_fence_in_between() {
        let mut b = ProgramBuilder::new("fenced");
        let x = b.location("x", 0);
        let t = b.thread();
        let s = b.store(t, x, SmtTerm::int(1));
        b.fence(t, "Mfence");
        let l = b.load(t, x, "r");
        let s2 = b.store(t, x, SmtTerm::int(2));
        let p = b.build().unwrap();
        let mut m = MemoryModel::new();
        let f = m.add(RelationKind::FenceRel("Mfence".into())).unwrap();
        let a = RelationAnalysis::new(&p, &m);
        let set = a.max_tuples(f);
        assert!(set.contains(&Tuple::new(s, l)));
        assert!(set.contains(&Tuple::new(s, s2)));
        assert!(!set.contains(&Tuple::new(l, s2)));
    }

    #[test]
    fn guarded_fence_does_not_shrink_a_difference() {
        let mut b = ProgramBuilder::new("guarded-fence");
        let x = b.location("x", 0);
        let t = b.thread();
        let s = b.store(t, x, SmtTerm::int(1));
        b.declare("c", relax_smt::sorts::SmtSort::Bool);
        b.with_guard(SmtTerm::var("c"), |b| b.fence(t, "Mfence"));
        let l = b.load(t, x, "r");
        let p = b.build().unwrap();
        let mut m = MemoryModel::new();
        let f = m.add(RelationKind::FenceRel("Mfence".into())).unwrap();
        let unfenced = m.add(RelationKind::Difference(PO, f)).unwrap();
        let a = RelationAnalysis::new(&p, &m);
        assert!(a.max_tuples(f).contains(&Tuple::new(s, l)));
        assert!(a.must_tuples(f).is_empty());
        assert!(a.max_tuples(unfenced).contains(&Tuple::new(s, l)));
    }

    #[test]
    fn closure_depth_covers_program_length() {
        let p = po_then_rf();
        let m = MemoryModel::new();
        let a = RelationAnalysis::new(&p, &m);
        // five events: 2^3 >= 5
        assert_eq!(a.closure_depth(), 3);
    }
}
