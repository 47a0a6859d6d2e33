use std::collections::HashMap;

use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

/// A model (variable assignments) extracted from a SAT result.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelValue {
    Int(i64),
    Bool(bool),
}

impl Model {
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ModelValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ModelValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Evaluate a ground term under this model.
    ///
    /// Returns `None` when a variable has no assigned value or the term is
    /// ill-sorted.
    pub fn eval_bool(&self, term: &SmtTerm) -> Option<bool> {
        match term {
            SmtTerm::BoolLit(b) => Some(*b),
            SmtTerm::Var(name) => self.get_bool(name),
            SmtTerm::Not(inner) => self.eval_bool(inner).map(|b| !b),
            SmtTerm::And(ts) => {
                let mut acc = true;
                for t in ts {
                    acc &= self.eval_bool(t)?;
                }
                Some(acc)
            }
            SmtTerm::Or(ts) => {
                let mut acc = false;
                for t in ts {
                    acc |= self.eval_bool(t)?;
                }
                Some(acc)
            }
            SmtTerm::Implies(a, b) => Some(!self.eval_bool(a)? || self.eval_bool(b)?),
            SmtTerm::Iff(a, b) => Some(self.eval_bool(a)? == self.eval_bool(b)?),
            SmtTerm::Eq(a, b) => match (self.eval_int(a), self.eval_int(b)) {
                (Some(x), Some(y)) => Some(x == y),
                _ => Some(self.eval_bool(a)? == self.eval_bool(b)?),
            },
            SmtTerm::Lt(a, b) => Some(self.eval_int(a)? < self.eval_int(b)?),
            SmtTerm::Le(a, b) => Some(self.eval_int(a)? <= self.eval_int(b)?),
            SmtTerm::Gt(a, b) => Some(self.eval_int(a)? > self.eval_int(b)?),
            SmtTerm::Ge(a, b) => Some(self.eval_int(a)? >= self.eval_int(b)?),
            SmtTerm::Distinct(ts) => {
                let mut seen = Vec::with_capacity(ts.len());
                for t in ts {
                    let v = self.eval_int(t)?;
                    if seen.contains(&v) {
                        return Some(false);
                    }
                    seen.push(v);
                }
                Some(true)
            }
            SmtTerm::Ite(c, t, e) => {
                if self.eval_bool(c)? {
                    self.eval_bool(t)
                } else {
                    self.eval_bool(e)
                }
            }
            SmtTerm::IntLit(_) | SmtTerm::Add(..) | SmtTerm::Sub(..) => None,
        }
    }

    /// Evaluate an integer-sorted ground term under this model.
    pub fn eval_int(&self, term: &SmtTerm) -> Option<i64> {
        match term {
            SmtTerm::IntLit(n) => Some(*n),
            SmtTerm::Var(name) => self.get_int(name),
            SmtTerm::Add(a, b) => self.eval_int(a)?.checked_add(self.eval_int(b)?),
            SmtTerm::Sub(a, b) => self.eval_int(a)?.checked_sub(self.eval_int(b)?),
            SmtTerm::Ite(c, t, e) => {
                if self.eval_bool(c)? {
                    self.eval_int(t)
                } else {
                    self.eval_int(e)
                }
            }
            _ => None,
        }
    }
}

/// Abstract incremental SMT solver interface.
///
/// The encoding core only produces terms; callers drive a backend through
/// this trait, using `push`/`pop` for scoped queries and
/// `check_sat_with_model` to pull back edge and position values.
pub trait SmtSolver {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Declare a new variable.
    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    /// Assert a constraint.
    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    /// Push a new scope.
    fn push(&mut self) -> Result<(), Self::Error>;

    /// Pop a scope.
    fn pop(&mut self) -> Result<(), Self::Error>;

    /// Check satisfiability.
    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    /// Check satisfiability and extract a model if SAT.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;

    /// [`SmtSolver::check_sat_with_model`] that gives up once `stop` returns
    /// `true`, answering `Unknown`.
    ///
    /// Backends that can interrupt a running check poll `stop` while it runs.
    /// The default only polls before starting.
    fn check_sat_interruptible(
        &mut self,
        var_names: &[(&str, &SmtSort)],
        stop: &(dyn Fn() -> bool + Sync),
    ) -> Result<(SatResult, Option<Model>), Self::Error> {
        if stop() {
            return Ok((SatResult::Unknown("interrupted".into()), None));
        }
        self.check_sat_with_model(var_names)
    }

    /// Bound the wall-clock time of subsequent checks. Zero removes the bound.
    fn set_timeout_ms(&mut self, _timeout_ms: u64) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Reset the solver state.
    fn reset(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(entries: &[(&str, ModelValue)]) -> Model {
        Model {
            values: entries
                .iter()
                .map(|(n, v)| (n.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn model_getters_return_typed_values_only() {
        let m = model(&[("x", ModelValue::Int(42)), ("flag", ModelValue::Bool(true))]);
        assert_eq!(m.get_int("x"), Some(42));
        assert_eq!(m.get_bool("flag"), Some(true));
        assert_eq!(m.get_int("flag"), None);
        assert_eq!(m.get_bool("x"), None);
        assert_eq!(m.get_int("missing"), None);
    }

    #[test]
    fn eval_bool_handles_connectives_and_comparisons() {
        let m = model(&[
            ("a", ModelValue::Bool(true)),
            ("b", ModelValue::Bool(false)),
            ("x", ModelValue::Int(3)),
            ("y", ModelValue::Int(5)),
        ]);
        let t = SmtTerm::and(vec![
            SmtTerm::var("a"),
            SmtTerm::var("b").not(),
            SmtTerm::var("x").lt(SmtTerm::var("y")),
        ]);
        assert_eq!(m.eval_bool(&t), Some(true));
        let d = SmtTerm::Distinct(vec![SmtTerm::var("x"), SmtTerm::int(3)]);
        assert_eq!(m.eval_bool(&d), Some(false));
        assert_eq!(m.eval_bool(&SmtTerm::var("missing")), None);
    }

    #[test]
    fn eval_int_handles_arithmetic_and_ite() {
        let m = model(&[("c", ModelValue::Bool(false)), ("x", ModelValue::Int(7))]);
        let t = SmtTerm::var("c").ite(SmtTerm::int(1), SmtTerm::var("x").add(SmtTerm::int(1)));
        assert_eq!(m.eval_int(&t), Some(8));
    }
}
