use serde::Deserialize;

/// Application configuration, loaded from the environment with sensible
/// development defaults. Empty-string secrets mean the corresponding
/// feature is not configured.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    pub github_webhook_secret: String,
    pub actions_bearer_token: String,
    pub generator_mode: String,
    pub generator_url: String,
    pub generator_token: String,
    pub generator_timeout_ms: u64,
    pub http_timeout_secs: u64,
    pub ws_heartbeat_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("jwt_secret", "dev-secret")?
            .set_default("github_webhook_secret", "")?
            .set_default("actions_bearer_token", "")?
            .set_default("generator_mode", "http")?
            .set_default("generator_url", "http://127.0.0.1:8090/v1/generate")?
            .set_default("generator_token", "")?
            .set_default("generator_timeout_ms", 30_000)?
            .set_default("http_timeout_secs", 30)?
            .set_default("ws_heartbeat_secs", 15)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn actions_webhook_configured(&self) -> bool {
        !self.actions_bearer_token.is_empty()
    }
}
