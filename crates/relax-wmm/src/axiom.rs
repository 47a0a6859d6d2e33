use std::collections::BTreeSet;
use std::fmt;

use relax_ir::EventId;
use relax_smt::sorts::SmtSort;
use relax_smt::terms::SmtTerm;

use crate::analysis::RelationAnalysis;
use crate::encoder::Encoder;
use crate::equivalence::CycleEquivalence;
use crate::execution::ExecutionGraph;
use crate::relation::{edge_var_name, RelationId};
use crate::tuple::{Tuple, TupleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxiomKind {
    Empty,
    Irreflexive,
    Acyclic,
    /// Every two distinct executing events of the relation's field are
    /// related one way or the other.
    Total,
}

impl fmt::Display for AxiomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxiomKind::Empty => write!(f, "empty"),
            AxiomKind::Irreflexive => write!(f, "irreflexive"),
            AxiomKind::Acyclic => write!(f, "acyclic"),
            AxiomKind::Total => write!(f, "total"),
        }
    }
}

/// A global predicate over one relation. `negate` inverts its meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axiom {
    pub kind: AxiomKind,
    pub relation: RelationId,
    pub negate: bool,
    /// Name of the relation, for display.
    pub label: String,
}

/// An axiom failing on a concrete execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Edges that jointly break the predicate (a cycle, a reflexive edge, a
    /// present edge of an empty relation).
    Edges(Vec<Tuple>),
    /// Two executing events of a total relation left unrelated.
    Unordered(EventId, EventId),
    /// A negated axiom whose predicate holds.
    Holds,
}

impl Axiom {
    /// Candidate edges this axiom constrains.
    pub fn encode_tuple_set(&self, analysis: &RelationAnalysis<'_>) -> TupleSet {
        let max = analysis.max_tuples(self.relation);
        match self.kind {
            AxiomKind::Irreflexive => max.filter(|t| t.is_reflexive()),
            AxiomKind::Empty | AxiomKind::Acyclic | AxiomKind::Total => max.clone(),
        }
    }

    /// Holds for every execution without any constraint.
    pub fn is_trivially_consistent(&self, analysis: &RelationAnalysis<'_>) -> bool {
        !self.negate && self.encode_tuple_set(analysis).is_empty()
    }

    /// Formula stating the axiom holds.
    pub fn consistent(&self, enc: &mut Encoder<'_>) -> SmtTerm {
        if self.negate {
            self.violated(enc)
        } else {
            self.holds(enc)
        }
    }

    /// Formula stating the axiom is violated.
    pub fn inconsistent(&self, enc: &mut Encoder<'_>) -> SmtTerm {
        if self.negate {
            self.holds(enc)
        } else {
            self.violated(enc)
        }
    }

    fn holds(&self, enc: &mut Encoder<'_>) -> SmtTerm {
        let tuples = self.encode_tuple_set(enc.analysis());
        if tuples.is_empty() {
            return SmtTerm::bool(true);
        }
        enc.request(self.relation, tuples.iter().copied());
        let r = self.relation;
        match self.kind {
            AxiomKind::Empty | AxiomKind::Irreflexive => {
                SmtTerm::and_all(tuples.iter().map(|t| enc.edge(r, t.first, t.second).not()))
            }
            AxiomKind::Acyclic => {
                let clocks: Vec<(EventId, String)> = tuples
                    .field()
                    .into_iter()
                    .map(|e| (e, self.aux_name("clk", &e.to_string())))
                    .collect();
                for (_, name) in &clocks {
                    enc.declare(name.clone(), SmtSort::Int);
                }
                let clock = |e: EventId| SmtTerm::var(self.aux_name("clk", &e.to_string()));
                SmtTerm::and_all(tuples.iter().map(|t| {
                    enc.edge(r, t.first, t.second)
                        .implies(clock(t.first).lt(clock(t.second)))
                }))
            }
            AxiomKind::Total => SmtTerm::and_all(unordered_pairs(&tuples).map(|(a, b)| {
                SmtTerm::and_all([enc.exec(a), enc.exec(b)])
                    .implies(SmtTerm::or_any([enc.edge(r, a, b), enc.edge(r, b, a)]))
            })),
        }
    }

    fn violated(&self, enc: &mut Encoder<'_>) -> SmtTerm {
        let tuples = self.encode_tuple_set(enc.analysis());
        if tuples.is_empty() {
            return SmtTerm::bool(false);
        }
        enc.request(self.relation, tuples.iter().copied());
        let r = self.relation;
        match self.kind {
            AxiomKind::Empty | AxiomKind::Irreflexive => {
                SmtTerm::or_any(tuples.iter().map(|t| enc.edge(r, t.first, t.second)))
            }
            AxiomKind::Acyclic => {
                // Some non-empty set of nodes where every node has an incoming
                // and an outgoing selected edge: such a subgraph has a cycle.
                let node = |e: EventId| SmtTerm::var(self.aux_name("cyc_node", &e.to_string()));
                let cyc_edge =
                    |t: &Tuple| SmtTerm::var(self.aux_name("cyc_edge", &t.to_string()));
                let field = tuples.field();
                for &e in &field {
                    enc.declare(self.aux_name("cyc_node", &e.to_string()), SmtSort::Bool);
                }
                for t in &tuples {
                    enc.declare(self.aux_name("cyc_edge", &t.to_string()), SmtSort::Bool);
                }
                let succ = tuples.by_first();
                let pred = tuples.by_second();
                let mut parts = vec![SmtTerm::or_any(field.iter().map(|&e| node(e)))];
                for t in &tuples {
                    parts.push(cyc_edge(t).implies(SmtTerm::and_all([
                        enc.edge(r, t.first, t.second),
                        node(t.first),
                        node(t.second),
                    ])));
                }
                for &e in &field {
                    let outgoing = succ
                        .get(&e)
                        .into_iter()
                        .flatten()
                        .map(|&b| cyc_edge(&Tuple::new(e, b)));
                    let incoming = pred
                        .get(&e)
                        .into_iter()
                        .flatten()
                        .map(|&a| cyc_edge(&Tuple::new(a, e)));
                    parts.push(node(e).implies(SmtTerm::and_all([
                        SmtTerm::or_any(outgoing),
                        SmtTerm::or_any(incoming),
                    ])));
                }
                SmtTerm::and_all(parts)
            }
            AxiomKind::Total => SmtTerm::or_any(unordered_pairs(&tuples).map(|(a, b)| {
                SmtTerm::and_all([
                    enc.exec(a),
                    enc.exec(b),
                    enc.edge(r, a, b).not(),
                    enc.edge(r, b, a).not(),
                ])
            })),
        }
    }

    /// Auxiliary variable scoped to this axiom's kind and relation.
    fn aux_name(&self, what: &str, suffix: &str) -> String {
        format!("{what}[{}]_{suffix}", self.label)
    }

    /// Evaluate the axiom on a concrete execution. Witnesses are chosen
    /// deterministically, lowest event ids first.
    pub fn check(&self, graph: &ExecutionGraph<'_>) -> Option<Violation> {
        let edges = graph.evaluate(self.relation);
        let found = match self.kind {
            AxiomKind::Empty => edges.sorted().first().map(|&t| Violation::Edges(vec![t])),
            AxiomKind::Irreflexive => edges
                .sorted()
                .into_iter()
                .find(|t| t.is_reflexive())
                .map(|t| Violation::Edges(vec![t])),
            AxiomKind::Acyclic => CycleEquivalence::new(edges).witness().map(Violation::Edges),
            AxiomKind::Total => {
                let field: BTreeSet<EventId> = graph
                    .analysis()
                    .max_tuples(self.relation)
                    .field()
                    .into_iter()
                    .filter(|&e| graph.is_executed(e))
                    .collect();
                let mut missing = None;
                'outer: for &a in &field {
                    for &b in field.range(a + 1..) {
                        if !edges.contains(&Tuple::new(a, b)) && !edges.contains(&Tuple::new(b, a)) {
                            missing = Some(Violation::Unordered(a, b));
                            break 'outer;
                        }
                    }
                }
                missing
            }
        };
        match (self.negate, found) {
            (false, found) => found,
            (true, Some(_)) => None,
            (true, None) => Some(Violation::Holds),
        }
    }

    /// Constraint excluding the violation from every future model. Sound for
    /// every consistent execution.
    pub fn refinement(&self, violation: &Violation, enc: &mut Encoder<'_>) -> SmtTerm {
        let r = self.relation;
        match violation {
            Violation::Edges(edges) => {
                enc.request(r, edges.iter().copied());
                SmtTerm::and_all(edges.iter().map(|t| enc.edge(r, t.first, t.second))).not()
            }
            Violation::Unordered(a, b) => {
                enc.request(r, [Tuple::new(*a, *b), Tuple::new(*b, *a)]);
                SmtTerm::or_any([
                    enc.exec(*a).not(),
                    enc.exec(*b).not(),
                    enc.edge(r, *a, *b),
                    enc.edge(r, *b, *a),
                ])
            }
            Violation::Holds => self.consistent(enc),
        }
    }

    /// Name of the boolean variable for edge `t` of this axiom's relation.
    pub fn edge_name(&self, t: Tuple) -> String {
        edge_var_name(&self.label, t)
    }
}

fn unordered_pairs(tuples: &TupleSet) -> impl Iterator<Item = (EventId, EventId)> {
    let field: Vec<EventId> = tuples.field().into_iter().collect();
    let mut pairs = Vec::new();
    for (i, &a) in field.iter().enumerate() {
        for &b in &field[i + 1..] {
            pairs.push((a, b));
        }
    }
    pairs.into_iter()
}

fn strip_outer_parens(label: &str) -> &str {
    let Some(inner) = label.strip_prefix('(').and_then(|s| s.strip_suffix(')')) else {
        return label;
    };
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return label;
                }
            }
            _ => {}
        }
    }
    inner
}

impl fmt::Display for Axiom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            write!(f, "~")?;
        }
        write!(f, "{} {}", self.kind, strip_outer_parens(&self.label))
    }
}
