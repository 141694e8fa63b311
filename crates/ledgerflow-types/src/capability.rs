//! Capability worker types: call outcomes and pool configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of one capability invocation, classified once at the router.
///
/// Callers branch on this and never inspect raw worker responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The operation ran and returned a payload.
    Success { payload: Value },
    /// The operation ran and reported a business failure.
    ApplicationError { message: String },
    /// The worker could not be reached or did not answer.
    TransportError { message: String },
}

impl ToolOutcome {
    pub fn success(payload: Value) -> Self {
        ToolOutcome::Success { payload }
    }

    pub fn application_error(message: impl Into<String>) -> Self {
        ToolOutcome::ApplicationError {
            message: message.into(),
        }
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        ToolOutcome::TransportError {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// The payload of a successful call.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            ToolOutcome::Success { payload } => Some(payload),
            _ => None,
        }
    }

    /// Error message for either failure kind.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::ApplicationError { message } | ToolOutcome::TransportError { message } => {
                Some(message)
            }
        }
    }
}

/// How the router reaches a pool's worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Spawn `command args...` and speak JSON-RPC over its stdin/stdout.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// POST JSON-RPC messages to `{base_url}/jsonrpc`.
    Http {
        base_url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// A named group of operations served by one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub transport: TransportConfig,
    /// Operations the pool exposes. Empty means "accept any".
    #[serde(default)]
    pub operations: Vec<String>,
}

impl PoolConfig {
    pub fn serves(&self, operation: &str) -> bool {
        self.operations.is_empty() || self.operations.iter().any(|op| op == operation)
    }
}
