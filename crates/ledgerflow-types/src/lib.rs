//! Shared domain types for Ledgerflow.
//!
//! This crate contains the types used across the workflow engine: checkpoints
//! and thread status, review tickets, capability outcomes, configuration, the
//! invoice workflow state, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod capability;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod invoice;
pub mod review;
