use std::collections::HashSet;
use std::iter;

use indexmap::IndexMap;
use relax_ir::{value_var, EventFilter, EventId, Program};
use relax_smt::sorts::SmtSort;
use relax_smt::terms::SmtTerm;
use tracing::debug;

use crate::analysis::RelationAnalysis;
use crate::model::{MemoryModel, CO, RF};
use crate::relation::{edge_var_name, RelationId, RelationKind};
use crate::tuple::{Tuple, TupleSet};

/// Encoding context for one verification task.
///
/// Holds the variables declared so far, the tuples of every relation that
/// already have a defined edge variable, and the assertions not yet handed
/// to a solver. Encoding is incremental: [`Encoder::request`] only defines
/// tuples that were not requested before, so refinement rounds can keep
/// growing the encoded sets.
pub struct Encoder<'a> {
    analysis: &'a RelationAnalysis<'a>,
    declarations: IndexMap<String, SmtSort>,
    flushed_declarations: usize,
    encoded: Vec<TupleSet>,
    complete: Vec<bool>,
    closure_levels: IndexMap<RelationId, Vec<TupleSet>>,
    assertions: Vec<SmtTerm>,
    assertion_keys: HashSet<SmtTerm>,
    dedup_hits: usize,
    program_encoded: bool,
}

impl<'a> Encoder<'a> {
    pub fn new(analysis: &'a RelationAnalysis<'a>) -> Self {
        let n = analysis.model.len();
        Self {
            analysis,
            declarations: IndexMap::new(),
            flushed_declarations: 0,
            encoded: vec![TupleSet::new(); n],
            complete: vec![false; n],
            closure_levels: IndexMap::new(),
            assertions: Vec::new(),
            assertion_keys: HashSet::new(),
            dedup_hits: 0,
            program_encoded: false,
        }
    }

    pub fn analysis(&self) -> &'a RelationAnalysis<'a> {
        self.analysis
    }

    pub fn program(&self) -> &'a Program {
        self.analysis.program
    }

    pub fn model(&self) -> &'a MemoryModel {
        self.analysis.model
    }

    pub fn declare(&mut self, name: impl Into<String>, sort: SmtSort) {
        self.declarations.entry(name.into()).or_insert(sort);
    }

    /// Queue an assertion. Literal `true` and repeated terms are dropped.
    pub fn assert_term(&mut self, term: SmtTerm) {
        if term.is_true() {
            return;
        }
        if self.assertion_keys.insert(term.clone()) {
            self.assertions.push(term);
        } else {
            self.dedup_hits = self.dedup_hits.saturating_add(1);
        }
    }

    pub fn declarations(&self) -> &IndexMap<String, SmtSort> {
        &self.declarations
    }

    /// Declarations added since the previous call.
    pub fn take_declarations(&mut self) -> Vec<(String, SmtSort)> {
        let fresh = self
            .declarations
            .iter()
            .skip(self.flushed_declarations)
            .map(|(n, s)| (n.clone(), *s))
            .collect();
        self.flushed_declarations = self.declarations.len();
        fresh
    }

    /// Assertions queued since the previous call.
    pub fn take_assertions(&mut self) -> Vec<SmtTerm> {
        std::mem::take(&mut self.assertions)
    }

    pub fn dedup_hits(&self) -> usize {
        self.dedup_hits
    }

    /// Tuples of `id` that currently have a defined edge.
    pub fn encode_tuple_set(&self, id: RelationId) -> &TupleSet {
        &self.encoded[id]
    }

    pub fn num_encoded_tuples(&self) -> usize {
        self.encoded.iter().map(TupleSet::len).sum()
    }

    pub fn exec(&self, e: EventId) -> SmtTerm {
        self.program().event(e).executes().clone()
    }

    fn both_execute(&self, a: EventId, b: EventId) -> SmtTerm {
        SmtTerm::and_all([self.exec(a), self.exec(b)])
    }

    /// Observed memory value of event `e`, declared on first use.
    pub fn memory_value(&mut self, e: EventId) -> SmtTerm {
        let name = value_var(e);
        self.declare(name.clone(), SmtSort::Int);
        SmtTerm::var(name)
    }

    /// Literal for edge `(a,b)` of relation `id`.
    ///
    /// `false` when the tuple is not a candidate. The literal is only
    /// meaningful once the tuple has been requested.
    pub fn edge(&self, id: RelationId, a: EventId, b: EventId) -> SmtTerm {
        let t = Tuple::new(a, b);
        if !self.analysis.max_tuples(id).contains(&t) {
            return SmtTerm::bool(false);
        }
        match &self.model().get(id).kind {
            RelationKind::Inverse(r) => self.edge(*r, b, a),
            _ => SmtTerm::var(edge_var_name(self.model().name_of(id), t)),
        }
    }

    fn define_edge(&mut self, id: RelationId, t: Tuple, definition: SmtTerm) {
        let var = self.edge(id, t.first, t.second);
        self.assert_term(var.iff(definition));
    }

    fn declare_edge(&mut self, id: RelationId, t: Tuple) {
        let name = edge_var_name(self.model().name_of(id), t);
        self.declare(name, SmtSort::Bool);
    }

    /// Request definitions for `tuples` of relation `id`, recursively
    /// requesting the operand tuples they depend on. Non-candidates are
    /// ignored. Returns the number of newly encoded tuples.
    pub fn request(&mut self, id: RelationId, tuples: impl IntoIterator<Item = Tuple>) -> usize {
        let analysis = self.analysis;
        let max = analysis.max_tuples(id);
        let fresh: TupleSet = tuples
            .into_iter()
            .filter(|t| max.contains(t) && !self.encoded[id].contains(t))
            .collect();
        if fresh.is_empty() {
            return 0;
        }

        let kind = &analysis.model.get(id).kind;
        match kind {
            RelationKind::ReadsFrom | RelationKind::Coherence | RelationKind::Cartesian(..) => {
                return self.encode_complete(id);
            }
            RelationKind::Inverse(r) => {
                self.encoded[id].union_with(&fresh);
                self.request(*r, fresh.inverse().iter().copied());
                return fresh.len();
            }
            _ => {}
        }

        self.encoded[id].union_with(&fresh);
        for t in &fresh {
            self.declare_edge(id, *t);
        }
        match kind {
            RelationKind::Union(ops) | RelationKind::Intersection(ops) => {
                let is_union = matches!(kind, RelationKind::Union(_));
                for &op in ops {
                    self.request(op, fresh.iter().copied());
                }
                for t in &fresh {
                    let lits = ops.iter().map(|&op| self.edge(op, t.first, t.second));
                    let def = if is_union {
                        SmtTerm::or_any(lits)
                    } else {
                        SmtTerm::and_all(lits)
                    };
                    self.define_edge(id, *t, def);
                }
            }
            RelationKind::Difference(a, b) => {
                self.request(*a, fresh.iter().copied());
                self.request(*b, fresh.iter().copied());
                for t in &fresh {
                    let def = SmtTerm::and_all([
                        self.edge(*a, t.first, t.second),
                        self.edge(*b, t.first, t.second).not(),
                    ]);
                    self.define_edge(id, *t, def);
                }
            }
            RelationKind::Composition(r, s) => self.encode_composition(id, *r, *s, &fresh),
            RelationKind::TransitiveClosure(r) => self.encode_closure(id, *r, &fresh),
            RelationKind::FenceRel(name) => {
                for t in &fresh {
                    let fences = analysis.fences_between(name, t.first, t.second);
                    let def = SmtTerm::and_all([
                        self.both_execute(t.first, t.second),
                        SmtTerm::or_any(fences.into_iter().map(|f| self.exec(f))),
                    ]);
                    self.define_edge(id, *t, def);
                }
            }
            _ => {
                // Static base relation: an edge holds iff both ends execute.
                for t in &fresh {
                    let def = self.both_execute(t.first, t.second);
                    self.define_edge(id, *t, def);
                }
            }
        }
        fresh.len()
    }

    /// Request every candidate tuple of `id`.
    pub fn request_all(&mut self, id: RelationId) -> usize {
        let all = self.analysis.max_tuples(id);
        self.request(id, all.iter().copied())
    }

    fn encode_complete(&mut self, id: RelationId) -> usize {
        if self.complete[id] {
            return 0;
        }
        self.complete[id] = true;
        let model = self.model();
        match &model.get(id).kind {
            RelationKind::ReadsFrom => self.encode_reads_from(id),
            RelationKind::Coherence => self.encode_coherence(id),
            RelationKind::Cartesian(f1, f2) => self.encode_cartesian(id, f1, f2),
            other => unreachable!("relation kind {other:?} has no complete encoding"),
        }
        let max = self.analysis.max_tuples(id);
        let added = max.len() - self.encoded[id].len();
        self.encoded[id] = max.clone();
        added
    }

    /// Each executing read takes its value from exactly one write.
    fn encode_reads_from(&mut self, id: RelationId) {
        let max = self.analysis.max_tuples(id);
        for (r, sources) in max.by_second() {
            let read_val = self.memory_value(r);
            let mut lits = Vec::with_capacity(sources.len());
            for &w in &sources {
                let t = Tuple::new(w, r);
                self.declare_edge(id, t);
                let lit = self.edge(id, w, r);
                let write_val = self.memory_value(w);
                self.assert_term(lit.clone().implies(SmtTerm::and_all([
                    self.both_execute(w, r),
                    write_val.eq(read_val.clone()),
                ])));
                lits.push(lit);
            }
            self.assert_term(self.exec(r).implies(SmtTerm::or_any(lits.iter().cloned())));
            for i in 0..lits.len() {
                for j in (i + 1)..lits.len() {
                    self.assert_term(SmtTerm::and_all([lits[i].clone(), lits[j].clone()]).not());
                }
            }
        }
    }

    /// Pins every ordered pair of the event space: candidates hold iff both
    /// ends execute, every other pair is asserted absent.
    ///
    /// Unlike a bare product, an edge never touches a non-executing event.
    /// Every relation shares that property, and `must_tuples` needs it to
    /// subtract a product from a difference's candidates.
    fn encode_cartesian(&mut self, id: RelationId, f1: &EventFilter, f2: &EventFilter) {
        let program = self.program();
        let name = self.model().name_of(id);
        for a in &program.events {
            for b in &program.events {
                let t = Tuple::new(a.id, b.id);
                let var_name = edge_var_name(name, t);
                self.declare(var_name.clone(), SmtSort::Bool);
                let var = SmtTerm::var(var_name);
                if f1.matches(a) && f2.matches(b) {
                    let def = self.both_execute(a.id, b.id);
                    self.assert_term(var.iff(def));
                } else {
                    self.assert_term(var.not());
                }
            }
        }
    }

    /// `edge(a,c) <=> OR_b edge_r(a,b) & edge_s(b,c)` over the intermediates
    /// `b` that are candidates on both sides.
    fn encode_composition(&mut self, id: RelationId, r: RelationId, s: RelationId, fresh: &TupleSet) {
        let analysis = self.analysis;
        let succ = analysis.max_tuples(r).by_first();
        let s_max = analysis.max_tuples(s);
        for t in fresh {
            let mids: Vec<EventId> = succ
                .get(&t.first)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&m| s_max.contains(&Tuple::new(m, t.second)))
                .collect();
            self.request(r, mids.iter().map(|&m| Tuple::new(t.first, m)));
            self.request(s, mids.iter().map(|&m| Tuple::new(m, t.second)));
            let def = SmtTerm::or_any(mids.iter().map(|&m| {
                SmtTerm::and_all([self.edge(r, t.first, m), self.edge(s, m, t.second)])
            }));
            self.define_edge(id, *t, def);
        }
    }

    /// Iterated squaring: level `i` holds paths of at most `2^i` edges of
    /// `r`. Level 0 is `r` itself, the top level is the closure's own edge.
    fn encode_closure(&mut self, id: RelationId, r: RelationId, fresh: &TupleSet) {
        let analysis = self.analysis;
        let depth = analysis.closure_depth();
        let max = analysis.max_tuples(id);
        let succ = max.by_first();
        self.closure_levels
            .entry(id)
            .or_insert_with(|| vec![TupleSet::new(); depth + 1]);

        let mut frontier: Vec<Tuple> = fresh.iter().copied().collect();
        for level in (1..=depth).rev() {
            let mut below = TupleSet::new();
            for &t in &frontier {
                let mids: Vec<EventId> = succ
                    .get(&t.first)
                    .into_iter()
                    .flatten()
                    .copied()
                    .filter(|&m| {
                        m != t.first && m != t.second && max.contains(&Tuple::new(m, t.second))
                    })
                    .collect();
                let def = SmtTerm::or_any(iter::once(self.closure_term(id, r, level - 1, t)).chain(
                    mids.iter().map(|&m| {
                        SmtTerm::and_all([
                            self.closure_term(id, r, level - 1, Tuple::new(t.first, m)),
                            self.closure_term(id, r, level - 1, Tuple::new(m, t.second)),
                        ])
                    }),
                ));
                if level < depth {
                    let name = self.level_var_name(id, level, t);
                    self.declare(name, SmtSort::Bool);
                }
                let lhs = self.closure_term(id, r, level, t);
                self.assert_term(lhs.iff(def));

                below.insert(t);
                for &m in &mids {
                    below.insert(Tuple::new(t.first, m));
                    below.insert(Tuple::new(m, t.second));
                }
            }
            if level == 1 {
                self.request(r, below.iter().copied());
                break;
            }
            let defined = &mut self.closure_levels[&id][level - 1];
            frontier = below.iter().copied().filter(|t| defined.insert(*t)).collect();
        }
    }

    fn level_var_name(&self, id: RelationId, level: usize, t: Tuple) -> String {
        format!("{}^{level}{t}", self.model().name_of(id))
    }

    fn closure_term(&self, id: RelationId, r: RelationId, level: usize, t: Tuple) -> SmtTerm {
        if level == 0 {
            self.edge(r, t.first, t.second)
        } else if level == self.analysis.closure_depth() {
            self.edge(id, t.first, t.second)
        } else {
            SmtTerm::var(self.level_var_name(id, level, t))
        }
    }

    /// Program declarations and constraints, memory values, and the complete
    /// `rf` and `co` encodings.
    pub fn encode_program(&mut self) {
        if self.program_encoded {
            return;
        }
        self.program_encoded = true;
        let program = self.program();
        for (name, sort) in &program.declarations {
            self.declare(name.clone(), *sort);
        }
        for c in &program.constraints {
            self.assert_term(c.clone());
        }
        for e in program.events.iter().filter(|e| e.is_memory()) {
            let val = self.memory_value(e.id);
            if let Some(value) = &e.value {
                self.assert_term(e.executes().clone().implies(val.eq(value.clone())));
            }
        }
        self.encode_complete(RF);
        self.encode_complete(CO);
        debug!(
            program = %program.name,
            declarations = self.declarations.len(),
            assertions = self.assertions.len(),
            "encoded program"
        );
    }

    /// The condition whose reachability is checked; `true` when the program
    /// carries none.
    pub fn encode_reachability(&self) -> SmtTerm {
        self.program()
            .assertion
            .clone()
            .unwrap_or(SmtTerm::bool(true))
    }
}
