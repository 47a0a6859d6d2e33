use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use z3::SatResult as Z3SatResult;

use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Sort mismatch in {0}")]
    SortMismatch(&'static str),
}

/// How often a running check looks at its stop condition.
const INTERRUPT_POLL: Duration = Duration::from_millis(10);

/// In-process Z3 backend.
///
/// Variables must be declared before they are referenced; the encoder emits
/// declarations for every edge, position and value variable it introduces.
pub struct Z3Solver {
    solver: z3::Solver,
    int_vars: HashMap<String, z3::ast::Int>,
    bool_vars: HashMap<String, z3::ast::Bool>,
    timeout_ms: u64,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            solver: z3::Solver::new(),
            int_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            timeout_ms: 0,
        }
    }

    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        let mut solver = Self::new();
        solver.apply_timeout(timeout_secs.saturating_mul(1000));
        solver
    }

    pub fn with_default_config() -> Self {
        Self::new()
    }

    fn apply_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
        let mut params = z3::Params::new();
        // Z3 treats u32::MAX as "no limit".
        let ms = if timeout_ms == 0 {
            u32::MAX
        } else {
            u32::try_from(timeout_ms).unwrap_or(u32::MAX)
        };
        params.set_u32("timeout", ms);
        self.solver.set_params(&params);
    }

    fn solve(&self, var_names: &[(&str, &SmtSort)]) -> Result<(SatResult, Option<Model>), Z3Error> {
        match self.solver.check() {
            Z3SatResult::Sat => {
                let z3_model = self
                    .solver
                    .get_model()
                    .ok_or_else(|| Z3Error::Internal("SAT but no model available".into()))?;
                let mut values = HashMap::new();
                for &(name, sort) in var_names {
                    match sort {
                        SmtSort::Int => {
                            let value = self
                                .int_vars
                                .get(name)
                                .and_then(|v| z3_model.eval::<z3::ast::Int>(v, true))
                                .and_then(|v| v.as_i64());
                            if let Some(n) = value {
                                values.insert(name.to_string(), ModelValue::Int(n));
                            }
                        }
                        SmtSort::Bool => {
                            let value = self
                                .bool_vars
                                .get(name)
                                .and_then(|v| z3_model.eval::<z3::ast::Bool>(v, true))
                                .and_then(|v| v.as_bool());
                            if let Some(b) = value {
                                values.insert(name.to_string(), ModelValue::Bool(b));
                            }
                        }
                    }
                }
                Ok((SatResult::Sat, Some(Model { values })))
            }
            other => Ok((convert(other), None)),
        }
    }

    fn translate_term(&self, term: &SmtTerm) -> Result<Z3Term, Z3Error> {
        match term {
            SmtTerm::Var(name) => {
                if let Some(v) = self.bool_vars.get(name) {
                    Ok(Z3Term::Bool(v.clone()))
                } else if let Some(v) = self.int_vars.get(name) {
                    Ok(Z3Term::Int(v.clone()))
                } else {
                    Err(Z3Error::UnknownVariable(name.clone()))
                }
            }
            SmtTerm::IntLit(n) => Ok(Z3Term::Int(z3::ast::Int::from_i64(*n))),
            SmtTerm::BoolLit(b) => Ok(Z3Term::Bool(z3::ast::Bool::from_bool(*b))),
            SmtTerm::Add(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int("+")?;
                let r = self.translate_term(rhs)?.into_int("+")?;
                Ok(Z3Term::Int(&l + &r))
            }
            SmtTerm::Sub(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int("-")?;
                let r = self.translate_term(rhs)?.into_int("-")?;
                Ok(Z3Term::Int(&l - &r))
            }
            SmtTerm::Eq(lhs, rhs) => {
                match (self.translate_term(lhs)?, self.translate_term(rhs)?) {
                    (Z3Term::Int(li), Z3Term::Int(ri)) => Ok(Z3Term::Bool(li.eq(&ri))),
                    (Z3Term::Bool(lb), Z3Term::Bool(rb)) => Ok(Z3Term::Bool(lb.eq(&rb))),
                    _ => Err(Z3Error::SortMismatch("=")),
                }
            }
            SmtTerm::Lt(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int("<")?;
                let r = self.translate_term(rhs)?.into_int("<")?;
                Ok(Z3Term::Bool(l.lt(&r)))
            }
            SmtTerm::Le(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int("<=")?;
                let r = self.translate_term(rhs)?.into_int("<=")?;
                Ok(Z3Term::Bool(l.le(&r)))
            }
            SmtTerm::Gt(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int(">")?;
                let r = self.translate_term(rhs)?.into_int(">")?;
                Ok(Z3Term::Bool(l.gt(&r)))
            }
            SmtTerm::Ge(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int(">=")?;
                let r = self.translate_term(rhs)?.into_int(">=")?;
                Ok(Z3Term::Bool(l.ge(&r)))
            }
            SmtTerm::Distinct(terms) => {
                let ints = terms
                    .iter()
                    .map(|t| self.translate_term(t).and_then(|z| z.into_int("distinct")))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut pairs = Vec::new();
                for i in 0..ints.len() {
                    for j in (i + 1)..ints.len() {
                        pairs.push(ints[i].eq(&ints[j]).not());
                    }
                }
                let refs: Vec<&z3::ast::Bool> = pairs.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::and(&refs)))
            }
            SmtTerm::And(terms) => {
                let bools = self.translate_bools(terms, "and")?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::and(&refs)))
            }
            SmtTerm::Or(terms) => {
                let bools = self.translate_bools(terms, "or")?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::or(&refs)))
            }
            SmtTerm::Not(inner) => {
                let b = self.translate_term(inner)?.into_bool("not")?;
                Ok(Z3Term::Bool(b.not()))
            }
            SmtTerm::Implies(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_bool("=>")?;
                let r = self.translate_term(rhs)?.into_bool("=>")?;
                Ok(Z3Term::Bool(l.implies(&r)))
            }
            SmtTerm::Iff(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_bool("iff")?;
                let r = self.translate_term(rhs)?.into_bool("iff")?;
                Ok(Z3Term::Bool(l.eq(&r)))
            }
            SmtTerm::Ite(cond, then, els) => {
                let c = self.translate_term(cond)?.into_bool("ite")?;
                match (self.translate_term(then)?, self.translate_term(els)?) {
                    (Z3Term::Int(ti), Z3Term::Int(ei)) => Ok(Z3Term::Int(c.ite(&ti, &ei))),
                    (Z3Term::Bool(tb), Z3Term::Bool(eb)) => Ok(Z3Term::Bool(c.ite(&tb, &eb))),
                    _ => Err(Z3Error::SortMismatch("ite")),
                }
            }
        }
    }

    fn translate_bools(
        &self,
        terms: &[SmtTerm],
        op: &'static str,
    ) -> Result<Vec<z3::ast::Bool>, Z3Error> {
        terms
            .iter()
            .map(|t| self.translate_term(t).and_then(|z| z.into_bool(op)))
            .collect()
    }
}

enum Z3Term {
    Int(z3::ast::Int),
    Bool(z3::ast::Bool),
}

impl Z3Term {
    fn into_int(self, op: &'static str) -> Result<z3::ast::Int, Z3Error> {
        match self {
            Z3Term::Int(i) => Ok(i),
            Z3Term::Bool(_) => Err(Z3Error::SortMismatch(op)),
        }
    }

    fn into_bool(self, op: &'static str) -> Result<z3::ast::Bool, Z3Error> {
        match self {
            Z3Term::Bool(b) => Ok(b),
            Z3Term::Int(_) => Err(Z3Error::SortMismatch(op)),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

fn convert(result: Z3SatResult) -> SatResult {
    debug!(?result, "z3 check finished");
    match result {
        Z3SatResult::Sat => SatResult::Sat,
        Z3SatResult::Unsat => SatResult::Unsat,
        Z3SatResult::Unknown => SatResult::Unknown("Z3 returned unknown".into()),
    }
}

impl SmtSolver for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        match sort {
            SmtSort::Int => {
                self.int_vars
                    .insert(name.to_string(), z3::ast::Int::new_const(name));
            }
            SmtSort::Bool => {
                self.bool_vars
                    .insert(name.to_string(), z3::ast::Bool::new_const(name));
            }
        }
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let z3_term = self.translate_term(term)?.into_bool("assert")?;
        self.solver.assert(&z3_term);
        Ok(())
    }

    fn push(&mut self) -> Result<(), Z3Error> {
        self.solver.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Z3Error> {
        self.solver.pop(1);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        Ok(convert(self.solver.check()))
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        self.solve(var_names)
    }

    /// A watcher thread polls `stop` and interrupts the context, which makes
    /// the running check return `unknown`.
    fn check_sat_interruptible(
        &mut self,
        var_names: &[(&str, &SmtSort)],
        stop: &(dyn Fn() -> bool + Sync),
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        let this: &Self = self;
        let handle = this.solver.get_context().handle();
        let finished = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !finished.load(Ordering::Acquire) {
                    if stop() {
                        if !finished.load(Ordering::Acquire) {
                            debug!("interrupting z3 check");
                            handle.interrupt();
                        }
                        return;
                    }
                    std::thread::sleep(INTERRUPT_POLL);
                }
            });
            let result = this.solve(var_names);
            finished.store(true, Ordering::Release);
            result
        })
    }

    fn set_timeout_ms(&mut self, timeout_ms: u64) -> Result<(), Z3Error> {
        self.apply_timeout(timeout_ms);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.solver.reset();
        // Z3 drops per-solver parameters on reset.
        if self.timeout_ms > 0 {
            self.apply_timeout(self.timeout_ms);
        }
        self.int_vars.clear();
        self.bool_vars.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn z3_position_order_is_transitive() -> TestResult {
        // p1 < p2 < p3 and p3 < p1 cannot hold together.
        let mut solver = Z3Solver::with_default_config();
        for name in ["p1", "p2", "p3"] {
            solver.declare_var(name, &SmtSort::Int)?;
        }
        solver.assert(&SmtTerm::var("p1").lt(SmtTerm::var("p2")))?;
        solver.assert(&SmtTerm::var("p2").lt(SmtTerm::var("p3")))?;
        solver.push()?;
        solver.assert(&SmtTerm::var("p3").lt(SmtTerm::var("p1")))?;
        assert_eq!(solver.check_sat()?, SatResult::Unsat);
        solver.pop()?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);
        Ok(())
    }

    #[test]
    fn z3_model_extraction() -> TestResult {
        let mut solver = Z3Solver::with_default_config();
        solver.declare_var("x", &SmtSort::Int)?;
        solver.declare_var("e", &SmtSort::Bool)?;
        solver.assert(&SmtTerm::var("x").eq(SmtTerm::int(42)))?;
        solver.assert(&SmtTerm::var("e").iff(SmtTerm::var("x").gt(SmtTerm::int(40))))?;

        let vars = vec![("x", &SmtSort::Int), ("e", &SmtSort::Bool)];
        let (result, model) = solver.check_sat_with_model(&vars)?;
        assert_eq!(result, SatResult::Sat);
        let model = model.ok_or_else(|| std::io::Error::other("expected model"))?;
        assert_eq!(model.get_int("x"), Some(42));
        assert_eq!(model.get_bool("e"), Some(true));
        Ok(())
    }

    #[test]
    fn z3_distinct_forbids_shared_positions() -> TestResult {
        let mut solver = Z3Solver::with_default_config();
        solver.declare_var("a", &SmtSort::Int)?;
        solver.declare_var("b", &SmtSort::Int)?;
        solver.assert(&SmtTerm::Distinct(vec![SmtTerm::var("a"), SmtTerm::var("b")]))?;
        solver.assert(&SmtTerm::var("a").eq(SmtTerm::var("b")))?;
        assert_eq!(solver.check_sat()?, SatResult::Unsat);
        Ok(())
    }

    /// `pigeons` pigeons into one hole fewer: UNSAT, and hard for resolution.
    fn pigeonhole(solver: &mut Z3Solver, pigeons: usize) -> TestResult {
        let holes = pigeons - 1;
        let var = |p: usize, h: usize| format!("p{p}_h{h}");
        for p in 0..pigeons {
            for h in 0..holes {
                solver.declare_var(&var(p, h), &SmtSort::Bool)?;
            }
            solver.assert(&SmtTerm::or_any((0..holes).map(|h| SmtTerm::var(var(p, h)))))?;
        }
        for h in 0..holes {
            for p in 0..pigeons {
                for q in (p + 1)..pigeons {
                    let both = SmtTerm::and_all([SmtTerm::var(var(p, h)), SmtTerm::var(var(q, h))]);
                    solver.assert(&both.not())?;
                }
            }
        }
        Ok(())
    }

    #[test]
    fn z3_check_stops_when_asked() -> TestResult {
        let mut solver = Z3Solver::with_default_config();
        pigeonhole(&mut solver, 13)?;
        let started = std::time::Instant::now();
        let stop = || started.elapsed() >= Duration::from_millis(200);
        let (result, model) = solver.check_sat_interruptible(&[], &stop)?;
        assert!(matches!(result, SatResult::Unknown(_)), "{result:?}");
        assert!(model.is_none());
        assert!(started.elapsed() < Duration::from_secs(20));
        Ok(())
    }

    #[test]
    fn z3_unstopped_check_answers_normally() -> TestResult {
        let mut solver = Z3Solver::with_default_config();
        solver.declare_var("x", &SmtSort::Int)?;
        solver.assert(&SmtTerm::var("x").gt(SmtTerm::int(3)))?;
        let (result, model) = solver.check_sat_interruptible(&[("x", &SmtSort::Int)], &|| false)?;
        assert_eq!(result, SatResult::Sat);
        assert!(model.and_then(|m| m.get_int("x")).is_some_and(|x| x > 3));
        Ok(())
    }

    #[test]
    fn z3_undeclared_variable_is_rejected() {
        let mut solver = Z3Solver::with_default_config();
        let err = solver.assert(&SmtTerm::var("nope")).unwrap_err();
        assert!(matches!(err, Z3Error::UnknownVariable(name) if name == "nope"));
    }

    #[test]
    fn z3_timeout_configuration_survives_reset() -> TestResult {
        let mut solver = Z3Solver::with_timeout_secs(2);
        assert_eq!(solver.timeout_ms, 2000);
        solver.reset()?;
        assert_eq!(solver.timeout_ms, 2000);
        solver.declare_var("x", &SmtSort::Int)?;
        solver.assert(&SmtTerm::var("x").eq(SmtTerm::int(2)))?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);
        Ok(())
    }
}
