//! Graph model: workflow state, node contract and graph compilation.
//!
//! A workflow is a directed graph of named nodes. Each node receives the
//! full current state and returns a partial update holding only the fields
//! it computed; the executor merges that update into the state with
//! [`GraphState::merge`].

pub mod builder;

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use builder::{CompiledGraph, GraphBuilder, GraphError, RouteError};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// State carried through a workflow graph.
///
/// `merge` must follow "later non-null wins": a field present in `update`
/// overwrites the current value, an absent field keeps it.
pub trait GraphState:
    Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn merge(&mut self, update: Self);
}

/// Overwrite `target` only when `update` holds a value.
pub fn merge_field<T>(target: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *target = update;
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Execution context handed to every node call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContext {
    pub thread_id: String,
    /// Step number the node's result will be committed as.
    pub step: u64,
    pub node: String,
}

impl NodeContext {
    /// Stable key for external side-effects of this step.
    ///
    /// A step may run twice if the process dies before its checkpoint is
    /// written; workers use this key to deduplicate.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.thread_id, self.step, self.node)
    }
}

/// A node operation failed. Recorded as a FAILED checkpoint by the executor.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("missing input field: {0}")]
    MissingInput(String),

    #[error("capability '{operation}' failed: {message}")]
    Capability { operation: String, message: String },

    #[error("{0}")]
    Failed(String),
}

pub type NodeFuture<'a, S> = Pin<Box<dyn Future<Output = Result<S, NodeError>> + Send + 'a>>;

/// One unit of work in a graph.
pub trait Node<S>: Send + Sync {
    fn call<'a>(&'a self, ctx: &'a NodeContext, state: &'a S) -> NodeFuture<'a, S>;
}

/// Adapts an async closure taking owned context and state into a [`Node`].
pub struct FnNode<F>(F);

impl<F> FnNode<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<S, F, Fut> Node<S> for FnNode<F>
where
    S: GraphState,
    F: Fn(NodeContext, S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, NodeError>> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a NodeContext, state: &'a S) -> NodeFuture<'a, S> {
        Box::pin((self.0)(ctx.clone(), state.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_field_keeps_prior_value_on_none() {
        let mut target = Some(1);
        merge_field(&mut target, None);
        assert_eq!(target, Some(1));
        merge_field(&mut target, Some(2));
        assert_eq!(target, Some(2));
    }

    #[test]
    fn test_idempotency_key() {
        let ctx = NodeContext {
            thread_id: "t-9".to_string(),
            step: 4,
            node: "posting".to_string(),
        };
        assert_eq!(ctx.idempotency_key(), "t-9:4:posting");
    }
}
