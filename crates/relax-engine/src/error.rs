use relax_ir::ProgramError;
use relax_wmm::WmmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Program error: {0}")]
    Program(#[from] ProgramError),
    #[error("Memory model error: {0}")]
    Model(#[from] WmmError),
    #[error("Solver error: {0}")]
    Solver(String),
}
