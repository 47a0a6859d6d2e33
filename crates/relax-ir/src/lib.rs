#![doc = include_str!("../README.md")]

//! Events of a compiled concurrent program.
//!
//! The program is read-only for a whole verification session: relation
//! analyses and encoders borrow it and never mutate it.

pub mod event;
pub mod filter;
pub mod program;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;

pub use event::{final_value_var, value_var, Event, EventId, EventKind, LocationId, ThreadId};
pub use filter::EventFilter;
pub use program::{Location, Program, ProgramBuilder, ProgramError, Thread};
