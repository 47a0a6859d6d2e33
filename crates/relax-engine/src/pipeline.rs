use std::fmt::Display;
use std::time::Instant;

use rayon::prelude::*;
use relax_ir::Program;
use relax_smt::backends::script::ScriptSolver;
use relax_smt::backends::z3_backend::Z3Solver;
use relax_smt::solver::SmtSolver;
use relax_smt::terms::SmtTerm;
use relax_wmm::{Axiom, MemoryModel, RelationAnalysis};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::error::EngineError;
use crate::options::{CheckMode, SolverChoice, VerifyOptions};
use crate::refinement::refine;
use crate::result::{RefinementStats, Report, VerificationResult};
use crate::session::{Answer, Session};
use crate::timeout::{deadline_from_timeout_secs, timeout_unknown_reason};

/// What a task asks of the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Goal {
    /// Reach the program's assertion by an execution the model allows.
    Reach(CheckMode),
    /// Reach the program's assertion by an execution the model forbids.
    Violate,
}

/// Check whether the program's assertion is reachable under the model.
pub fn verify(
    program: &Program,
    model: &MemoryModel,
    options: &VerifyOptions,
) -> Result<VerificationResult, EngineError> {
    verify_with_cancel(program, model, options, &CancelFlag::new()).map(|r| r.result)
}

/// [`verify`] with run statistics, honoring `cancel` between rounds.
pub fn verify_with_cancel(
    program: &Program,
    model: &MemoryModel,
    options: &VerifyOptions,
    cancel: &CancelFlag,
) -> Result<Report, EngineError> {
    run(program, model, options, Goal::Reach(options.mode), cancel)
}

/// Search for an execution reaching the assertion that violates at least one
/// axiom. `Reachable` carries such an execution; `Unreachable` means every
/// reaching execution is consistent.
pub fn find_violation(
    program: &Program,
    model: &MemoryModel,
    options: &VerifyOptions,
) -> Result<VerificationResult, EngineError> {
    run(program, model, options, Goal::Violate, &CancelFlag::new()).map(|r| r.result)
}

fn run(
    program: &Program,
    model: &MemoryModel,
    options: &VerifyOptions,
    goal: Goal,
    cancel: &CancelFlag,
) -> Result<Report, EngineError> {
    program.validate()?;
    model.validate()?;
    info!(
        program = %program.name,
        model = %model.name,
        events = program.len(),
        axioms = model.axioms().len(),
        ?goal,
        "starting verification"
    );

    let started = Instant::now();
    let deadline = deadline_from_timeout_secs(options.timeout_secs);
    let analysis = RelationAnalysis::new(program, model);
    let record = options.dump_smt.is_some();
    let mut stats = RefinementStats::default();

    let result = match options.solver {
        SolverChoice::Z3 => {
            let mut session = Session::new(
                Z3Solver::new(),
                &analysis,
                record,
                deadline,
                cancel.clone(),
            );
            let result = solve(&mut session, options, goal, deadline, cancel, &mut stats);
            session.dump(options.dump_smt.as_deref());
            stats.encoded_tuples = session.enc.num_encoded_tuples();
            result?
        }
        SolverChoice::Script => {
            let mut session = Session::new(
                ScriptSolver::new(),
                &analysis,
                record,
                deadline,
                cancel.clone(),
            );
            let result = solve(&mut session, options, goal, deadline, cancel, &mut stats);
            session.dump(options.dump_smt.as_deref());
            stats.encoded_tuples = session.enc.num_encoded_tuples();
            result?
        }
    };
    stats.elapsed = started.elapsed();

    info!(
        program = %program.name,
        verdict = result.verdict_class(),
        rounds = stats.rounds,
        refinements = stats.refinements,
        encoded_tuples = stats.encoded_tuples,
        candidate_tuples = analysis.computed_tuples(),
        "verification finished"
    );
    Ok(Report { result, stats })
}

/// Axioms that constrain anything. One without candidate edges holds on
/// every execution.
pub(crate) fn active_axioms<'a>(analysis: &RelationAnalysis<'a>) -> Vec<&'a Axiom> {
    let all = analysis.model.axioms();
    let active: Vec<&Axiom> = all
        .iter()
        .filter(|a| !a.is_trivially_consistent(analysis))
        .collect();
    if active.len() < all.len() {
        debug!(skipped = all.len() - active.len(), "axioms hold trivially");
    }
    active
}

fn solve<S>(
    session: &mut Session<'_, S>,
    options: &VerifyOptions,
    goal: Goal,
    deadline: Option<Instant>,
    cancel: &CancelFlag,
    stats: &mut RefinementStats,
) -> Result<VerificationResult, EngineError>
where
    S: SmtSolver,
    S::Error: Display,
{
    let axioms = active_axioms(session.analysis());
    let enc = &mut session.enc;
    enc.encode_program();
    let reach = enc.encode_reachability();
    enc.assert_term(reach);

    match goal {
        Goal::Reach(CheckMode::Refinement) => {
            return refine(session, options.max_rounds, deadline, cancel, stats)
        }
        Goal::Reach(CheckMode::Eager) => {
            for axiom in axioms {
                let c = axiom.consistent(enc);
                enc.assert_term(c);
            }
        }
        Goal::Violate => {
            let broken: Vec<SmtTerm> = axioms.iter().map(|a| a.inconsistent(enc)).collect();
            enc.assert_term(SmtTerm::or_any(broken));
        }
    }

    if cancel.is_cancelled() {
        return Ok(VerificationResult::Unknown {
            reason: "Verification cancelled.".into(),
        });
    }
    stats.rounds = 1;
    match session.check()? {
        Answer::Sat(model) => session.witness(&model),
        Answer::Unsat => Ok(VerificationResult::Unreachable),
        Answer::Unknown(reason) => Ok(VerificationResult::Unknown { reason }),
        Answer::Cancelled => Ok(VerificationResult::Unknown {
            reason: "Verification cancelled.".into(),
        }),
        Answer::OutOfTime => {
            warn!("deadline reached before solving");
            Ok(VerificationResult::Unknown {
                reason: timeout_unknown_reason("Verification"),
            })
        }
    }
}

/// An independent verification task for [`verify_all`].
#[derive(Debug, Clone)]
pub struct VerificationTask {
    pub name: String,
    pub program: Program,
    pub model: MemoryModel,
    pub options: VerifyOptions,
}

/// Result of one task of [`verify_all`].
#[derive(Debug)]
pub struct TaskOutcome {
    pub name: String,
    pub outcome: Result<Report, EngineError>,
}

/// Verify independent tasks in parallel, each with its own solver. Outcomes
/// come back in task order.
pub fn verify_all(tasks: &[VerificationTask], cancel: &CancelFlag) -> Vec<TaskOutcome> {
    info!(tasks = tasks.len(), "verifying tasks in parallel");
    tasks
        .par_iter()
        .map(|task| TaskOutcome {
            name: task.name.clone(),
            outcome: verify_with_cancel(&task.program, &task.model, &task.options, cancel),
        })
        .collect()
}
