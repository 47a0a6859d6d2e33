//! Counterexample-guided refinement of the consistency encoding.
//!
//! Rounds start from program semantics and reachability only. A SAT model
//! is decoded into an execution and every axiom is evaluated on it; a
//! violated axiom contributes a cut over the edges of its witness, which
//! excludes the current execution while keeping every consistent one. The
//! loop ends with the first consistent model, with UNSAT, or when the round
//! or time budget runs out.

use std::fmt::Display;
use std::time::Instant;

use relax_smt::solver::SmtSolver;
use relax_wmm::ExecutionGraph;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::error::EngineError;
use crate::pipeline::active_axioms;
use crate::result::{RefinementStats, VerificationResult};
use crate::session::{Answer, Session};
use crate::timeout::{deadline_exceeded, timeout_unknown_reason};

pub(crate) fn refine<S>(
    session: &mut Session<'_, S>,
    max_rounds: usize,
    deadline: Option<Instant>,
    cancel: &CancelFlag,
    stats: &mut RefinementStats,
) -> Result<VerificationResult, EngineError>
where
    S: SmtSolver,
    S::Error: Display,
{
    let analysis = session.analysis();
    let axioms = active_axioms(analysis);

    for round in 1..=max_rounds {
        if cancel.is_cancelled() {
            info!(round, "refinement cancelled");
            return Ok(VerificationResult::Unknown {
                reason: "Refinement cancelled.".into(),
            });
        }
        if deadline_exceeded(deadline) {
            warn!(round, "refinement deadline reached");
            return Ok(VerificationResult::Unknown {
                reason: timeout_unknown_reason("Refinement"),
            });
        }

        stats.rounds = round;
        let model = match session.check()? {
            Answer::Sat(model) => model,
            Answer::Unsat => {
                info!(round, "refinement closed: no consistent execution");
                return Ok(VerificationResult::Unreachable);
            }
            Answer::Unknown(reason) => return Ok(VerificationResult::Unknown { reason }),
            Answer::Cancelled => {
                info!(round, "refinement cancelled mid-solve");
                return Ok(VerificationResult::Unknown {
                    reason: "Refinement cancelled.".into(),
                });
            }
            Answer::OutOfTime => {
                warn!(round, "refinement deadline reached");
                return Ok(VerificationResult::Unknown {
                    reason: timeout_unknown_reason("Refinement"),
                });
            }
        };

        let graph = ExecutionGraph::decode(analysis, &model)?;
        let violations: Vec<_> = axioms
            .iter()
            .filter_map(|&axiom| axiom.check(&graph).map(|v| (axiom, v)))
            .collect();
        if violations.is_empty() {
            info!(round, "refinement found a consistent execution");
            return session.witness(&model);
        }

        for (axiom, violation) in &violations {
            debug!(round, axiom = %axiom, ?violation, "axiom violated");
            let cut = axiom.refinement(violation, &mut session.enc);
            session.enc.assert_term(cut);
        }
        stats.refinements += violations.len();
        info!(
            round,
            violated = violations.len(),
            encoded_tuples = session.enc.num_encoded_tuples(),
            "refinement round"
        );
    }

    warn!(max_rounds, "refinement round limit reached");
    Ok(VerificationResult::Unknown {
        reason: format!("Refinement did not converge within {max_rounds} rounds."),
    })
}
