use std::fmt::Display;
use std::path::Path;
use std::time::Instant;

use relax_smt::backends::script::ScriptSolver;
use relax_smt::solver::{Model, SatResult, SmtSolver};
use relax_smt::sorts::SmtSort;
use relax_wmm::{Encoder, ExecutionGraph, RelationAnalysis};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::error::EngineError;
use crate::result::{VerificationResult, Witness};
use crate::timeout::remaining_timeout_ms;

/// Solver answer for one round.
pub(crate) enum Answer {
    Sat(Model),
    Unsat,
    Unknown(String),
    /// The deadline passed before the solver was called.
    OutOfTime,
    /// Cancellation was requested before or during the call.
    Cancelled,
}

fn solver_error(e: impl Display) -> EngineError {
    EngineError::Solver(e.to_string())
}

/// One solver fed incrementally from one encoder.
pub(crate) struct Session<'a, S: SmtSolver> {
    solver: S,
    pub(crate) enc: Encoder<'a>,
    /// Copy of everything sent to `solver`, kept when a dump is requested.
    mirror: Option<ScriptSolver>,
    deadline: Option<Instant>,
    cancel: CancelFlag,
}

impl<'a, S> Session<'a, S>
where
    S: SmtSolver,
    S::Error: Display,
{
    pub(crate) fn new(
        solver: S,
        analysis: &'a RelationAnalysis<'a>,
        record: bool,
        deadline: Option<Instant>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            solver,
            enc: Encoder::new(analysis),
            mirror: record.then(ScriptSolver::new),
            deadline,
            cancel,
        }
    }

    pub(crate) fn analysis(&self) -> &'a RelationAnalysis<'a> {
        self.enc.analysis()
    }

    /// Send pending declarations and assertions to the solver.
    pub(crate) fn flush(&mut self) -> Result<(), EngineError> {
        let declarations = self.enc.take_declarations();
        let assertions = self.enc.take_assertions();
        debug!(
            declarations = declarations.len(),
            assertions = assertions.len(),
            "flushing encoding"
        );
        for (name, sort) in &declarations {
            self.solver.declare_var(name, sort).map_err(solver_error)?;
            if let Some(mirror) = &mut self.mirror {
                mirror.declare_var(name, sort).map_err(solver_error)?;
            }
        }
        for term in &assertions {
            self.solver.assert(term).map_err(solver_error)?;
            if let Some(mirror) = &mut self.mirror {
                mirror.assert(term).map_err(solver_error)?;
            }
        }
        Ok(())
    }

    /// Flush and solve within the remaining time budget. A cancellation
    /// request interrupts the running check.
    pub(crate) fn check(&mut self) -> Result<Answer, EngineError> {
        self.flush()?;
        if self.cancel.is_cancelled() {
            return Ok(Answer::Cancelled);
        }
        match remaining_timeout_ms(self.deadline) {
            Some(0) => return Ok(Answer::OutOfTime),
            Some(ms) => self.solver.set_timeout_ms(ms).map_err(solver_error)?,
            None => {}
        }
        if let Some(mirror) = &mut self.mirror {
            mirror.check_sat().map_err(solver_error)?;
        }
        let names: Vec<(String, SmtSort)> = self
            .enc
            .declarations()
            .iter()
            .map(|(n, s)| (n.clone(), *s))
            .collect();
        let refs: Vec<(&str, &SmtSort)> = names.iter().map(|(n, s)| (n.as_str(), s)).collect();
        let cancel = self.cancel.clone();
        let stop = move || cancel.is_cancelled();
        let (result, model) = self
            .solver
            .check_sat_interruptible(&refs, &stop)
            .map_err(solver_error)?;
        match (result, model) {
            (SatResult::Unknown(reason), _) if self.cancel.is_cancelled() => {
                debug!(%reason, "solver call cancelled");
                Ok(Answer::Cancelled)
            }
            (SatResult::Sat, Some(model)) => Ok(Answer::Sat(model)),
            (SatResult::Sat, None) => Err(EngineError::Solver("SAT but no model available".into())),
            (SatResult::Unsat, _) => Ok(Answer::Unsat),
            (SatResult::Unknown(reason), _) => Ok(Answer::Unknown(reason)),
        }
    }

    /// Decode a reachable witness from a SAT model.
    pub(crate) fn witness(&self, model: &Model) -> Result<VerificationResult, EngineError> {
        let analysis = self.analysis();
        let graph = ExecutionGraph::decode(analysis, model)?;
        Ok(VerificationResult::Reachable {
            witness: Witness::from_graph(analysis.program, &graph),
        })
    }

    /// Write the recorded script, if any. Failures are logged, not returned.
    pub(crate) fn dump(&self, path: Option<&Path>) {
        let (Some(path), Some(mirror)) = (path, &self.mirror) else {
            return;
        };
        match std::fs::write(path, mirror.script()) {
            Ok(()) => info!("SMT dump written to {}", path.display()),
            Err(e) => warn!("could not write SMT dump to {}: {e}", path.display()),
        }
    }
}
