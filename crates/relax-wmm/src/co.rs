use relax_ir::{final_value_var, Event, EventId};
use relax_smt::sorts::SmtSort;
use relax_smt::terms::SmtTerm;

use crate::encoder::Encoder;
use crate::relation::{edge_var_name, RelationId};
use crate::tuple::Tuple;

/// Integer position of a write in its location's coherence order.
pub fn position_var(e: EventId) -> String {
    format!("co_pos_{e}")
}

impl Encoder<'_> {
    /// Coherence as integer positions per location.
    ///
    /// The initial write sits at position 1, executing stores take distinct
    /// positions in `1..=n`, and `co(a,b)` holds exactly when both execute and
    /// `pos(a) < pos(b)`; transitivity comes for free from integer order. The
    /// write with no outgoing `co` edge fixes the location's final value.
    pub(crate) fn encode_coherence(&mut self, id: RelationId) {
        let program = self.program();
        let max = self.analysis().max_tuples(id);
        for &loc in program.locations.keys() {
            let writes: Vec<&Event> = program.accesses(loc).filter(|e| e.is_write()).collect();
            let n = writes.len() as i64;

            for w in &writes {
                let pos = SmtTerm::var(position_var(w.id));
                self.declare(position_var(w.id), SmtSort::Int);
                if w.is_init() {
                    self.assert_term(pos.eq(SmtTerm::int(1)));
                } else {
                    let bounds = SmtTerm::and_all([
                        SmtTerm::int(0).lt(pos.clone()),
                        pos.le(SmtTerm::int(n)),
                    ]);
                    self.assert_term(self.exec(w.id).implies(bounds));
                }
            }

            for (i, a) in writes.iter().enumerate() {
                for b in &writes[i + 1..] {
                    let both = SmtTerm::and_all([self.exec(a.id), self.exec(b.id)]);
                    let (pa, pb) = (
                        SmtTerm::var(position_var(a.id)),
                        SmtTerm::var(position_var(b.id)),
                    );
                    self.assert_term(
                        both.clone()
                            .implies(SmtTerm::Distinct(vec![pa.clone(), pb.clone()])),
                    );
                    for (x, y, px, py) in [(a, b, &pa, &pb), (b, a, &pb, &pa)] {
                        let t = Tuple::new(x.id, y.id);
                        if !max.contains(&t) {
                            continue;
                        }
                        self.declare(edge_var_name(self.model().name_of(id), t), SmtSort::Bool);
                        let edge = self.edge(id, x.id, y.id);
                        let ordered = SmtTerm::and_all([both.clone(), px.clone().lt(py.clone())]);
                        self.assert_term(edge.clone().implies(ordered.clone()));
                        self.assert_term(ordered.implies(edge));
                    }
                    let either = SmtTerm::or_any([self.edge(id, a.id, b.id), self.edge(id, b.id, a.id)]);
                    self.assert_term(both.implies(either));
                }
            }

            let last_val = final_value_var(loc);
            self.declare(last_val.clone(), SmtSort::Int);
            for w in &writes {
                let later = writes
                    .iter()
                    .filter(|o| o.id != w.id)
                    .map(|o| self.edge(id, w.id, o.id).not());
                let is_last = SmtTerm::and_all(std::iter::once(self.exec(w.id)).chain(later));
                let value = self.memory_value(w.id);
                self.assert_term(is_last.implies(SmtTerm::var(last_val.clone()).eq(value)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RelationAnalysis;
    use crate::model::{MemoryModel, CO};
    use relax_ir::ProgramBuilder;

    #[test]
    fn positions_are_declared_per_write() {
        let mut b = ProgramBuilder::new("2W");
        let x = b.location("x", 0);
        let t0 = b.thread();
        let t1 = b.thread();
        let w1 = b.store(t0, x, SmtTerm::int(1));
        let w2 = b.store(t1, x, SmtTerm::int(2));
        let p = b.build().unwrap();
        let m = MemoryModel::new();
        let a = RelationAnalysis::new(&p, &m);
        let mut enc = Encoder::new(&a);
        enc.request_all(CO);

        for e in [0, w1, w2] {
            assert_eq!(enc.declarations().get(&position_var(e)), Some(&SmtSort::Int));
        }
        assert!(enc.declarations().contains_key("co(1,2)"));
        assert!(enc.declarations().contains_key("co(2,1)"));
        assert!(!enc.declarations().contains_key("co(1,0)"));
        let asserted = enc.take_assertions();
        assert!(asserted.contains(&SmtTerm::var(position_var(0)).eq(SmtTerm::int(1))));
    }
}
