//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (ledgerflow-infra) implements. The core crate never depends on any
//! specific storage technology. In-memory implementations live in
//! [`memory`] for tests and ephemeral runs.

pub mod checkpoint;
pub mod memory;
pub mod review;
