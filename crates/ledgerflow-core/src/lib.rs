//! Workflow engine and repository trait definitions for Ledgerflow.
//!
//! This crate defines the graph model, the durable executor, and the "ports"
//! (checkpoint store, review queue, capability router) that the
//! infrastructure layer implements. It depends only on `ledgerflow-types` --
//! never on `ledgerflow-infra` or any database/IO crate.

pub mod capability;
pub mod graph;
pub mod invoice;
pub mod repository;
pub mod service;
pub mod workflow;
