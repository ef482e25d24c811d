use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub surreal_endpoint: String,
    pub surreal_ns: String,
    pub surreal_db: String,
    pub surreal_user: String,
    pub surreal_pass: String,
    pub redis_url: String,
    pub redis_prefix: String,
    pub jwt_secret: String,
    pub workflow_table_path: String,
    pub workflow_write_timeout_ms: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("surreal_endpoint", "127.0.0.1:8000")?
            .set_default("surreal_ns", "dernek")?
            .set_default("surreal_db", "aid")?
            .set_default("surreal_user", "root")?
            .set_default("surreal_pass", "root")?
            .set_default("redis_url", "")?
            .set_default("redis_prefix", "dernek:idem")?
            .set_default("jwt_secret", "dev-secret")?
            .set_default("workflow_table_path", "")?
            .set_default("workflow_write_timeout_ms", 10_000)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn is_test(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("test")
    }

    pub fn uses_surreal(&self) -> bool {
        self.data_backend.eq_ignore_ascii_case("surreal")
    }

    /// `None` when idempotency records should stay in process.
    pub fn redis_url(&self) -> Option<&str> {
        Some(self.redis_url.trim()).filter(|url| !url.is_empty())
    }

    pub fn workflow_table_path(&self) -> Option<&str> {
        Some(self.workflow_table_path.trim()).filter(|path| !path.is_empty())
    }

    pub fn workflow_write_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.workflow_write_timeout_ms.max(1))
    }
}
