//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! `WorkflowService` is generic over the state and storage traits; AppState
//! pins it to the invoice workflow and the SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use ledgerflow_core::capability::BoxCapabilityRouter;
use ledgerflow_core::invoice::{StageSettings, build_invoice_graph};
use ledgerflow_core::service::WorkflowService;
use ledgerflow_infra::capability::WorkerRouter;
use ledgerflow_infra::config::load_global_config;
use ledgerflow_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use ledgerflow_infra::sqlite::checkpoint::SqliteCheckpointStore;
use ledgerflow_infra::sqlite::pool::{DatabasePool, database_url};
use ledgerflow_infra::sqlite::review::SqliteReviewQueue;
use ledgerflow_types::config::GlobalConfig;
use ledgerflow_types::invoice::InvoiceState;

/// Concrete type alias for the service generics pinned to infra implementations.
pub type ConcreteWorkflowService =
    WorkflowService<InvoiceState, SqliteCheckpointStore, SqliteReviewQueue>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub workflow_service: Arc<ConcreteWorkflowService>,
    pub router: Arc<BoxCapabilityRouter>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: resolve the data dir, load config,
    /// connect to the DB and wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_data_dir(&data_dir).await?;

        let config = load_global_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&config, &data_dir)).await?;

        Self::from_parts(data_dir, config, db_pool)
    }

    /// Wire services over an already-open database.
    pub fn from_parts(
        data_dir: PathBuf,
        config: GlobalConfig,
        db_pool: DatabasePool,
    ) -> anyhow::Result<Self> {
        let router = Arc::new(BoxCapabilityRouter::new(WorkerRouter::from_config(&config)));
        let graph = build_invoice_graph(Arc::clone(&router), StageSettings::from_config(&config))?;

        let store = Arc::new(SqliteCheckpointStore::new(db_pool.clone()));
        let queue = Arc::new(SqliteReviewQueue::new(
            db_pool,
            config.workflow.review_base_url.clone(),
        ));
        let workflow_service = WorkflowService::new(graph, store, queue);

        tracing::debug!(
            data_dir = %data_dir.display(),
            pools = ?router.pools(),
            "application state ready"
        );

        Ok(Self {
            workflow_service: Arc::new(workflow_service),
            router,
            config: Arc::new(config),
            data_dir,
        })
    }

    /// State over a fresh temporary database with no worker pools.
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        std::mem::forget(dir);
        let db_pool = DatabasePool::new(&ledgerflow_infra::sqlite::pool::default_database_url(
            &data_dir,
        ))
        .await
        .unwrap();
        Self::from_parts(data_dir, GlobalConfig::default(), db_pool).unwrap()
    }
}
