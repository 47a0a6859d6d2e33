use std::convert::Infallible;

use crate::backends::smtlib_printer::{sort_to_smtlib, symbol, to_smtlib};
use crate::solver::{Model, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Backend that never solves: it records every command as an SMT-LIB2 script.
///
/// Useful for dumping the formula of a verification task to disk and for
/// counting how many declarations and assertions an encoding produced.
#[derive(Debug, Clone, Default)]
pub struct ScriptSolver {
    lines: Vec<String>,
    declarations: usize,
    assertions: usize,
    checks: usize,
}

impl ScriptSolver {
    pub fn new() -> Self {
        let mut solver = Self::default();
        solver.lines.push("(set-logic QF_LIA)".into());
        solver
    }

    pub fn script(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    pub fn num_declarations(&self) -> usize {
        self.declarations
    }

    pub fn num_assertions(&self) -> usize {
        self.assertions
    }

    pub fn num_checks(&self) -> usize {
        self.checks
    }
}

impl SmtSolver for ScriptSolver {
    type Error = Infallible;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Infallible> {
        self.declarations += 1;
        self.lines.push(format!(
            "(declare-const {} {})",
            symbol(name),
            sort_to_smtlib(sort)
        ));
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Infallible> {
        self.assertions += 1;
        self.lines.push(format!("(assert {})", to_smtlib(term)));
        Ok(())
    }

    fn push(&mut self) -> Result<(), Infallible> {
        self.lines.push("(push 1)".into());
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Infallible> {
        self.lines.push("(pop 1)".into());
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Infallible> {
        self.checks += 1;
        self.lines.push("(check-sat)".into());
        Ok(SatResult::Unknown("script backend does not solve".into()))
    }

    fn check_sat_with_model(
        &mut self,
        _var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Infallible> {
        let result = self.check_sat()?;
        Ok((result, None))
    }

    fn set_timeout_ms(&mut self, timeout_ms: u64) -> Result<(), Infallible> {
        if timeout_ms > 0 {
            self.lines.push(format!("(set-option :timeout {timeout_ms})"));
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), Infallible> {
        *self = Self::new();
        Ok(())
    }
}
