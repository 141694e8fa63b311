//! Infrastructure layer for Ledgerflow.
//!
//! Contains implementations of the ports defined in `ledgerflow-core`:
//! SQLite checkpoint storage and review queue, the JSON-RPC capability worker
//! router, configuration loading and data directory resolution.

pub mod capability;
pub mod config;
pub mod filesystem;
pub mod sqlite;
