#![doc = include_str!("../README.md")]

//! Verification driver.
//!
//! Validates a program and a memory model, encodes them through
//! `relax-wmm`, and decides reachability of the program's assertion with an
//! eager or a refinement strategy.

pub mod cancel;
pub mod error;
pub mod options;
pub mod pipeline;
mod refinement;
pub mod result;
mod session;
mod timeout;

pub use cancel::CancelFlag;
pub use error::EngineError;
pub use options::{CheckMode, SolverChoice, VerifyOptions};
pub use pipeline::{
    find_violation, verify, verify_all, verify_with_cancel, TaskOutcome, VerificationTask,
};
pub use result::{RefinementStats, Report, VerificationResult, Witness, WitnessEvent};
