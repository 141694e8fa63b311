//! Durable workflow execution.
//!
//! - `executor`: runs compiled graphs step by step against a checkpoint store,
//!   stopping at pause-before nodes and recording failures as checkpoints.

pub mod executor;

pub use executor::{Executor, ExecutorError, PauseHandler, RunOutcome};
