//! Capability router backed by out-of-process workers.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use ledgerflow_core::capability::CapabilityRouter;
use ledgerflow_types::capability::{PoolConfig, ToolOutcome, TransportConfig};
use ledgerflow_types::config::{GlobalConfig, RouterConfig};
use serde_json::Value;

use super::protocol::{JsonRpcResponse, classify};
use super::session::{SessionError, WorkerSession};

/// Routes operations to registered worker pools.
///
/// Each call opens a fresh session (spawn or connect, handshake, one
/// `tools/call`), so a crashed worker affects only the call in flight. The
/// whole session is bounded by `call_timeout`.
pub struct WorkerRouter {
    pools: DashMap<String, PoolConfig>,
    client_name: String,
    call_timeout: Duration,
    http: reqwest::Client,
}

impl WorkerRouter {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            pools: DashMap::new(),
            client_name: config.client_name.clone(),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            http: reqwest::Client::new(),
        }
    }

    /// Router with every `[pools.*]` entry of the config registered.
    pub fn from_config(config: &GlobalConfig) -> Self {
        let router = Self::new(&config.router);
        for (name, pool) in &config.pools {
            router.register_pool(name, pool.clone());
        }
        router
    }

    async fn call(
        &self,
        transport: &TransportConfig,
        operation: &str,
        arguments: Value,
    ) -> Result<JsonRpcResponse, SessionError> {
        let mut session = WorkerSession::open(transport, &self.client_name, &self.http).await?;
        session.call_tool(operation, arguments).await
    }
}

impl CapabilityRouter for WorkerRouter {
    fn register_pool(&self, name: &str, config: PoolConfig) {
        tracing::info!(
            pool = name,
            operations = config.operations.len(),
            "registered capability pool"
        );
        self.pools.insert(name.to_string(), config);
    }

    fn pools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    async fn invoke(&self, pool: &str, operation: &str, arguments: Value) -> ToolOutcome {
        let Some(config) = self.pools.get(pool).map(|entry| entry.value().clone()) else {
            tracing::warn!(pool, operation, "call to unregistered pool");
            return ToolOutcome::transport_error(format!("pool '{pool}' is not registered"));
        };
        if !config.serves(operation) {
            tracing::warn!(pool, operation, "operation not served by pool");
            return ToolOutcome::transport_error(format!(
                "pool '{pool}' does not serve '{operation}'"
            ));
        }

        let started = Instant::now();
        let result = tokio::time::timeout(
            self.call_timeout,
            self.call(&config.transport, operation, arguments),
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) => {
                let outcome = classify(response);
                match &outcome {
                    ToolOutcome::Success { .. } => {
                        tracing::debug!(pool, operation, elapsed_ms, "capability call succeeded")
                    }
                    ToolOutcome::TransportError { message } => tracing::warn!(
                        pool,
                        operation,
                        elapsed_ms,
                        error = %message,
                        "capability returned a malformed response"
                    ),
                    other => tracing::info!(
                        pool,
                        operation,
                        elapsed_ms,
                        error = other.error_message().unwrap_or_default(),
                        "capability reported an application error"
                    ),
                }
                outcome
            }
            Ok(Err(err)) => {
                tracing::warn!(pool, operation, elapsed_ms, error = %err, "capability transport failure");
                ToolOutcome::transport_error(err.to_string())
            }
            Err(_) => {
                tracing::warn!(pool, operation, elapsed_ms, "capability call timed out");
                ToolOutcome::transport_error(format!(
                    "'{operation}' timed out after {}s",
                    self.call_timeout.as_secs()
                ))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    const INIT_REPLY: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"test-worker"}}}"#;

    /// A worker that completes the handshake and answers `tools/call` with `reply`.
    fn worker(reply: &str) -> PoolConfig {
        let script = format!(
            r#"while IFS= read -r line; do
  case "$line" in
    *'"method":"initialize"'*) printf '%s\n' '{INIT_REPLY}' ;;
    *'"method":"tools/call"'*) printf '%s\n' '{reply}' ;;
  esac
done"#
        );
        sh_pool(&script, vec![])
    }

    fn sh_pool(script: &str, operations: Vec<&str>) -> PoolConfig {
        PoolConfig {
            transport: TransportConfig::Stdio {
                command: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                env: HashMap::new(),
            },
            operations: operations.into_iter().map(str::to_string).collect(),
        }
    }

    fn router(timeout_secs: u64) -> WorkerRouter {
        WorkerRouter::new(&RouterConfig {
            call_timeout_secs: timeout_secs,
            ..RouterConfig::default()
        })
    }

    #[tokio::test]
    async fn test_stdio_call_success() {
        let router = router(10);
        router.register_pool(
            "common",
            worker(r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"{\"score\":0.92}"}]}}"#),
        );

        let outcome = router
            .invoke("common", "compute_match_score", json!({"invoice_data": {}}))
            .await;
        assert_eq!(outcome, ToolOutcome::success(json!({"score": 0.92})));
    }

    #[tokio::test]
    async fn test_stdio_application_error() {
        let router = router(10);
        router.register_pool(
            "atlas",
            worker(r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"ledger closed"}],"isError":true}}"#),
        );

        let outcome = router.invoke("atlas", "post_to_erp", json!({})).await;
        assert_eq!(outcome, ToolOutcome::application_error("ledger closed"));
    }

    #[tokio::test]
    async fn test_worker_notifications_before_replies_are_skipped() {
        let router = router(10);
        let note = r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","data":"warming up"}}"#;
        let reply = r#"{"jsonrpc":"2.0","id":2,"result":{"structuredContent":{"txn_id":"TXN-9"}}}"#;
        let script = format!(
            r#"while IFS= read -r line; do
  case "$line" in
    *'"method":"initialize"'*) printf '%s\n' '{note}' '{INIT_REPLY}' ;;
    *'"method":"tools/call"'*) printf '%s\n' '{note}' '{reply}' ;;
  esac
done"#
        );
        router.register_pool("atlas", sh_pool(&script, vec![]));

        let outcome = router.invoke("atlas", "post_to_erp", json!({})).await;
        assert_eq!(outcome, ToolOutcome::success(json!({"txn_id": "TXN-9"})));
    }

    #[tokio::test]
    async fn test_worker_crash_is_transport_error() {
        let router = router(10);
        let script = format!(
            r#"read -r line; printf '%s\n' '{INIT_REPLY}'; read -r line; read -r line; exit 1"#
        );
        router.register_pool("atlas", sh_pool(&script, vec![]));

        let outcome = router.invoke("atlas", "enrich_vendor", json!({})).await;
        assert!(matches!(outcome, ToolOutcome::TransportError { .. }));
        assert!(outcome.error_message().unwrap().contains("closed"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_transport_error() {
        let router = router(10);
        router.register_pool(
            "atlas",
            PoolConfig {
                transport: TransportConfig::Stdio {
                    command: "/nonexistent/ledgerflow-worker".to_string(),
                    args: vec![],
                    env: HashMap::new(),
                },
                operations: vec![],
            },
        );

        let outcome = router.invoke("atlas", "ocr_extract", json!({})).await;
        assert!(matches!(outcome, ToolOutcome::TransportError { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let router = router(1);
        router.register_pool("atlas", sh_pool("sleep 5", vec![]));

        let outcome = router.invoke("atlas", "fetch_erp_data", json!({})).await;
        assert_eq!(
            outcome,
            ToolOutcome::transport_error("'fetch_erp_data' timed out after 1s")
        );
    }

    #[tokio::test]
    async fn test_unknown_pool_and_operation() {
        let router = router(10);
        router.register_pool("common", sh_pool("exit 0", vec!["normalize_vendor"]));

        let missing = router.invoke("billing", "normalize_vendor", json!({})).await;
        assert_eq!(
            missing,
            ToolOutcome::transport_error("pool 'billing' is not registered")
        );

        let unserved = router.invoke("common", "post_to_erp", json!({})).await;
        assert_eq!(
            unserved,
            ToolOutcome::transport_error("pool 'common' does not serve 'post_to_erp'")
        );
        assert_eq!(router.pools(), vec!["common".to_string()]);
    }
}
