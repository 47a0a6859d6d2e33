use std::path::PathBuf;

/// Which solver backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverChoice {
    #[default]
    Z3,
    /// Record the query as an SMT-LIB2 script without solving it.
    Script,
}

/// How axioms reach the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckMode {
    /// Assert every axiom's consistency formula before a single solve.
    Eager,
    /// Solve without axioms and cut off violating executions round by round.
    #[default]
    Refinement,
}

/// Options for one verification task.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub solver: SolverChoice,
    pub mode: CheckMode,
    /// Wall-clock budget for the whole task; 0 disables it.
    pub timeout_secs: u64,
    pub max_rounds: usize,
    /// Write every declaration and assertion sent to the solver here.
    pub dump_smt: Option<PathBuf>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            solver: SolverChoice::Z3,
            mode: CheckMode::Refinement,
            timeout_secs: 300,
            max_rounds: 1000,
            dump_smt: None,
        }
    }
}
