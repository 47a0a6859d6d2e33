/// Abstract SMT term representation, solver-agnostic.
///
/// Relation edges, coherence positions and program values are all built from
/// this small quantifier-free fragment (QF_LIA plus booleans).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    /// Integer literal.
    IntLit(i64),
    /// Boolean literal.
    BoolLit(bool),

    // Arithmetic
    Add(Box<SmtTerm>, Box<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),

    // Comparison
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),
    /// Pairwise distinct integers.
    Distinct(Vec<SmtTerm>),

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),
    Iff(Box<SmtTerm>, Box<SmtTerm>),

    // If-then-else
    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn add(self, other: SmtTerm) -> Self {
        SmtTerm::Add(Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: SmtTerm) -> Self {
        SmtTerm::Sub(Box::new(self), Box::new(other))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        SmtTerm::Eq(Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: SmtTerm) -> Self {
        SmtTerm::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: SmtTerm) -> Self {
        SmtTerm::Le(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: SmtTerm) -> Self {
        SmtTerm::Gt(Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: SmtTerm) -> Self {
        SmtTerm::Ge(Box::new(self), Box::new(other))
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        match self {
            SmtTerm::BoolLit(b) => SmtTerm::BoolLit(!b),
            SmtTerm::Not(inner) => *inner,
            other => SmtTerm::Not(Box::new(other)),
        }
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        match (self, other) {
            (SmtTerm::BoolLit(true), rhs) => rhs,
            (SmtTerm::BoolLit(false), _) | (_, SmtTerm::BoolLit(true)) => SmtTerm::BoolLit(true),
            (lhs, SmtTerm::BoolLit(false)) => lhs.not(),
            (lhs, rhs) => SmtTerm::Implies(Box::new(lhs), Box::new(rhs)),
        }
    }

    pub fn iff(self, other: SmtTerm) -> Self {
        match (self, other) {
            (SmtTerm::BoolLit(true), t) | (t, SmtTerm::BoolLit(true)) => t,
            (SmtTerm::BoolLit(false), t) | (t, SmtTerm::BoolLit(false)) => t.not(),
            (lhs, rhs) => SmtTerm::Iff(Box::new(lhs), Box::new(rhs)),
        }
    }

    pub fn ite(self, then: SmtTerm, els: SmtTerm) -> Self {
        SmtTerm::Ite(Box::new(self), Box::new(then), Box::new(els))
    }

    /// Conjunction with literal folding: `true` operands are dropped, any
    /// `false` operand collapses the whole term, nested `And`s are flattened.
    pub fn and_all(terms: impl IntoIterator<Item = SmtTerm>) -> Self {
        let mut out = Vec::new();
        for term in terms {
            match term {
                SmtTerm::BoolLit(true) => {}
                SmtTerm::BoolLit(false) => return SmtTerm::BoolLit(false),
                SmtTerm::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => SmtTerm::BoolLit(true),
            1 => out.pop().unwrap_or(SmtTerm::BoolLit(true)),
            _ => SmtTerm::And(out),
        }
    }

    /// Disjunction with literal folding, dual to [`SmtTerm::and_all`].
    pub fn or_any(terms: impl IntoIterator<Item = SmtTerm>) -> Self {
        let mut out = Vec::new();
        for term in terms {
            match term {
                SmtTerm::BoolLit(false) => {}
                SmtTerm::BoolLit(true) => return SmtTerm::BoolLit(true),
                SmtTerm::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => SmtTerm::BoolLit(false),
            1 => out.pop().unwrap_or(SmtTerm::BoolLit(false)),
            _ => SmtTerm::Or(out),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, SmtTerm::BoolLit(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, SmtTerm::BoolLit(false))
    }

    /// Collect the names of all variables occurring in the term.
    pub fn free_vars(&self, out: &mut Vec<String>) {
        match self {
            SmtTerm::Var(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => {}
            SmtTerm::Add(a, b)
            | SmtTerm::Sub(a, b)
            | SmtTerm::Eq(a, b)
            | SmtTerm::Lt(a, b)
            | SmtTerm::Le(a, b)
            | SmtTerm::Gt(a, b)
            | SmtTerm::Ge(a, b)
            | SmtTerm::Implies(a, b)
            | SmtTerm::Iff(a, b) => {
                a.free_vars(out);
                b.free_vars(out);
            }
            SmtTerm::Distinct(ts) | SmtTerm::And(ts) | SmtTerm::Or(ts) => {
                for t in ts {
                    t.free_vars(out);
                }
            }
            SmtTerm::Not(inner) => inner.free_vars(out),
            SmtTerm::Ite(c, t, e) => {
                c.free_vars(out);
                t.free_vars(out);
                e.free_vars(out);
            }
        }
    }
}
