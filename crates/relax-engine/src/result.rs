use std::fmt;
use std::time::Duration;

use relax_ir::{EventId, Program};
use relax_wmm::{ExecutionGraph, Tuple};

/// One executed event of a witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessEvent {
    pub id: EventId,
    pub label: String,
    /// Observed memory value, for memory events.
    pub value: Option<i64>,
}

/// A concrete execution reaching the checked condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    pub events: Vec<WitnessEvent>,
    pub rf: Vec<Tuple>,
    pub co: Vec<Tuple>,
    /// Final value of every location, by location name.
    pub final_values: Vec<(String, i64)>,
}

impl Witness {
    pub fn from_graph(program: &Program, graph: &ExecutionGraph<'_>) -> Self {
        let events = graph
            .executed_events()
            .map(|id| WitnessEvent {
                id,
                label: program.event(id).to_string(),
                value: graph.value(id),
            })
            .collect();
        let final_values = graph
            .final_values()
            .iter()
            .map(|(&loc, &v)| {
                let name = program
                    .location_name(loc)
                    .map_or_else(|| format!("#{loc}"), str::to_string);
                (name, v)
            })
            .collect();
        Self {
            events,
            rf: graph.rf().sorted(),
            co: graph.co().sorted(),
            final_values,
        }
    }
}

fn write_edges(f: &mut fmt::Formatter<'_>, name: &str, edges: &[Tuple]) -> fmt::Result {
    write!(f, "{name}:")?;
    for t in edges {
        write!(f, " {t}")?;
    }
    writeln!(f)
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Execution:")?;
        for e in &self.events {
            match e.value {
                Some(v) => writeln!(f, "  {} = {v}", e.label)?,
                None => writeln!(f, "  {}", e.label)?,
            }
        }
        write_edges(f, "rf", &self.rf)?;
        write_edges(f, "co", &self.co)?;
        write!(f, "final:")?;
        for (name, v) in &self.final_values {
            write!(f, " {name}={v}")?;
        }
        Ok(())
    }
}

/// Outcome of a verification task.
#[derive(Debug, Clone)]
pub enum VerificationResult {
    /// Some execution allowed by the model reaches the condition.
    Reachable { witness: Witness },
    /// No execution allowed by the model reaches the condition.
    Unreachable,
    /// Verification was inconclusive.
    Unknown { reason: String },
}

impl VerificationResult {
    /// Machine-readable verdict class, independent of witness details.
    pub fn verdict_class(&self) -> &'static str {
        match self {
            VerificationResult::Reachable { .. } => "reachable",
            VerificationResult::Unreachable => "unreachable",
            VerificationResult::Unknown { .. } => "unknown",
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, VerificationResult::Reachable { .. })
    }

    pub fn witness(&self) -> Option<&Witness> {
        match self {
            VerificationResult::Reachable { witness } => Some(witness),
            _ => None,
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationResult::Reachable { witness } => {
                writeln!(f, "RESULT: REACHABLE")?;
                write!(f, "{witness}")
            }
            VerificationResult::Unreachable => write!(f, "RESULT: UNREACHABLE"),
            VerificationResult::Unknown { reason } => {
                writeln!(f, "RESULT: UNKNOWN")?;
                write!(f, "Reason: {reason}")
            }
        }
    }
}

/// Counters collected while solving one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefinementStats {
    /// Solver calls.
    pub rounds: usize,
    /// Cuts added after a violated axiom.
    pub refinements: usize,
    /// Tuples with a defined edge variable at the end of the task.
    pub encoded_tuples: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RefinementStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} round(s), {} refinement(s), {} encoded tuple(s) in {:.3}s",
            self.rounds,
            self.refinements,
            self.encoded_tuples,
            self.elapsed.as_secs_f64()
        )
    }
}

/// A result together with the statistics of the run that produced it.
#[derive(Debug, Clone)]
pub struct Report {
    pub result: VerificationResult,
    pub stats: RefinementStats,
}
