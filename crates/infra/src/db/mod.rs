use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: strip_ws_scheme(&config.surreal_endpoint).to_string(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

/// The ws engine takes `host:port`; accept `ws://host:port` too.
fn strip_ws_scheme(endpoint: &str) -> &str {
    let endpoint = endpoint.trim();
    endpoint
        .strip_prefix("ws://")
        .unwrap_or(endpoint)
        .trim_end_matches('/')
}

pub async fn connect(db_config: &DbConfig) -> anyhow::Result<Surreal<Client>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(db_config.endpoint.as_str()).await?;
    db.signin(Root {
        username: &db_config.username,
        password: &db_config.password,
    })
    .await?;
    db.use_ns(&db_config.namespace)
        .use_db(&db_config.database)
        .await?;
    tracing::info!(
        endpoint = %db_config.endpoint,
        namespace = %db_config.namespace,
        database = %db_config.database,
        "connected to surrealdb"
    );
    Ok(db)
}
