//! Scripted router for tests: canned outcomes per operation, call recording.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use ledgerflow_types::capability::{PoolConfig, ToolOutcome};
use serde_json::{Value, json};

use super::CapabilityRouter;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub pool: String,
    pub operation: String,
    pub arguments: Value,
}

#[derive(Default)]
pub struct ScriptedRouter {
    defaults: Mutex<HashMap<String, ToolOutcome>>,
    queued: Mutex<HashMap<String, VecDeque<ToolOutcome>>>,
    calls: Mutex<Vec<RecordedCall>>,
    pools: Mutex<Vec<String>>,
}

impl ScriptedRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome returned for every call to `operation` unless one is queued.
    pub fn respond(self, operation: &str, outcome: ToolOutcome) -> Self {
        self.defaults
            .lock()
            .unwrap()
            .insert(operation.to_string(), outcome);
        self
    }

    /// One-shot outcome consumed by the next call to `operation`.
    pub fn enqueue(&self, operation: &str, outcome: ToolOutcome) {
        self.queued
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.operation).collect()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }
}

impl CapabilityRouter for ScriptedRouter {
    fn register_pool(&self, name: &str, _config: PoolConfig) {
        self.pools.lock().unwrap().push(name.to_string());
    }

    fn pools(&self) -> Vec<String> {
        self.pools.lock().unwrap().clone()
    }

    async fn invoke(&self, pool: &str, operation: &str, arguments: Value) -> ToolOutcome {
        self.calls.lock().unwrap().push(RecordedCall {
            pool: pool.to_string(),
            operation: operation.to_string(),
            arguments,
        });

        if let Some(outcome) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        self.defaults
            .lock()
            .unwrap()
            .get(operation)
            .cloned()
            .unwrap_or_else(|| ToolOutcome::success(json!({})))
    }
}
