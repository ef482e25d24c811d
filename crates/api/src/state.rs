use std::sync::Arc;

use dernek_domain::applications::InMemoryApplicationStore;
use dernek_domain::idempotency::{IdempotencyConfig, IdempotencyService, InMemoryIdempotencyStore};
use dernek_domain::ports::applications::ApplicationStore;
use dernek_domain::ports::idempotency::IdempotencyStore;
use dernek_domain::workflow::{TransitionTable, WorkflowConfig, WorkflowEngine, WorkflowService};
use dernek_infra::config::AppConfig;
use dernek_infra::db::DbConfig;
use dernek_infra::idempotency::RedisIdempotencyStore;
use dernek_infra::repositories::SurrealApplicationStore;
use dernek_infra::workflow_table::resolve_transition_table;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub workflow: WorkflowService,
    pub idempotency: IdempotencyService,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let table = resolve_transition_table(config.workflow_table_path())?;

        let applications: Arc<dyn ApplicationStore> = if config.uses_surreal() {
            let db_config = DbConfig::from_app_config(&config);
            Arc::new(SurrealApplicationStore::new(&db_config).await?)
        } else {
            tracing::warn!("using in-memory application store; data is lost on restart");
            Arc::new(InMemoryApplicationStore::new())
        };

        let idempotency: Arc<dyn IdempotencyStore> = match config.redis_url() {
            Some(url) => {
                Arc::new(RedisIdempotencyStore::connect_with_prefix(url, &config.redis_prefix).await?)
            }
            None => Arc::new(InMemoryIdempotencyStore::new(config.redis_prefix.clone())),
        };

        Ok(Self::with_stores(config, table, applications, idempotency))
    }

    pub fn with_stores(
        config: AppConfig,
        table: TransitionTable,
        applications: Arc<dyn ApplicationStore>,
        idempotency: Arc<dyn IdempotencyStore>,
    ) -> Self {
        let workflow = WorkflowService::new(
            Arc::new(WorkflowEngine::new(table)),
            applications,
            WorkflowConfig {
                write_timeout: config.workflow_write_timeout(),
            },
        );
        let idempotency = IdempotencyService::new(idempotency, IdempotencyConfig::default());
        Self {
            config,
            workflow,
            idempotency,
        }
    }
}
