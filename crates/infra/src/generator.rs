use std::time::Duration;

use docline_domain::DomainResult;
use docline_domain::error::DomainError;
use docline_domain::ports::BoxFuture;
use docline_domain::ports::generator::PlanGenerator;
use serde_json::{Value, json};

use crate::config::AppConfig;

/// HTTP client for the external plan-generation collaborator. Every call is
/// bounded by the configured timeout; a timed-out or failed call surfaces as
/// `DomainError::Upstream` and the caller commits nothing.
pub struct HttpPlanGenerator {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HttpPlanGenerator {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.generator_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: config.generator_url.clone(),
            token: config.generator_token.clone(),
        })
    }
}

impl PlanGenerator for HttpPlanGenerator {
    fn generate_plan(
        &self,
        payload: &Value,
        execute_updates: bool,
    ) -> BoxFuture<'_, DomainResult<Value>> {
        let body = json!({
            "payload": payload,
            "execute_updates": execute_updates,
        });
        Box::pin(async move {
            let mut request = self.client.post(&self.url).json(&body);
            if !self.token.is_empty() {
                request = request.bearer_auth(&self.token);
            }

            let response = request.send().await.map_err(|err| {
                DomainError::Upstream(format!("plan generator request failed: {err}"))
            })?;

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(%status, "plan generator rejected request");
                return Err(DomainError::Upstream(format!(
                    "plan generator returned {status}"
                )));
            }

            response.json::<Value>().await.map_err(|err| {
                DomainError::Upstream(format!("plan generator returned invalid JSON: {err}"))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use tokio::net::TcpListener;

    fn test_config(url: String, timeout_ms: u64) -> AppConfig {
        AppConfig {
            app_env: "test".into(),
            port: 0,
            log_level: "info".into(),
            jwt_secret: "test-secret".into(),
            github_webhook_secret: String::new(),
            actions_bearer_token: String::new(),
            generator_mode: "http".into(),
            generator_url: url,
            generator_token: String::new(),
            generator_timeout_ms: timeout_ms,
            http_timeout_secs: 30,
            ws_heartbeat_secs: 15,
        }
    }

    async fn spawn_stub(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/v1/generate")
    }

    #[tokio::test]
    async fn returns_generator_document() {
        async fn generate(Json(body): Json<Value>) -> Json<Value> {
            Json(json!({
                "execution_mode": "plan_only",
                "echo_execute": body["execute_updates"],
            }))
        }
        let url = spawn_stub(Router::new().route("/v1/generate", post(generate))).await;
        let generator = HttpPlanGenerator::from_config(&test_config(url, 2_000)).expect("client");

        let result = generator
            .generate_plan(&json!({"ref": "refs/heads/main"}), false)
            .await
            .expect("generate");
        assert_eq!(result["execution_mode"], "plan_only");
        assert_eq!(result["echo_execute"], json!(false));
    }

    #[tokio::test]
    async fn non_success_status_maps_to_upstream() {
        async fn generate() -> (axum::http::StatusCode, Json<Value>) {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "model unavailable"})),
            )
        }
        let url = spawn_stub(Router::new().route("/v1/generate", post(generate))).await;
        let generator = HttpPlanGenerator::from_config(&test_config(url, 2_000)).expect("client");

        let result = generator.generate_plan(&json!({}), false).await;
        assert!(matches!(result, Err(DomainError::Upstream(_))));
    }

    #[tokio::test]
    async fn slow_generator_times_out_as_upstream() {
        async fn generate() -> Json<Value> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Json(json!({"execution_mode": "plan_only"}))
        }
        let url = spawn_stub(Router::new().route("/v1/generate", post(generate))).await;
        let generator = HttpPlanGenerator::from_config(&test_config(url, 50)).expect("client");

        let result = generator.generate_plan(&json!({}), false).await;
        assert!(matches!(result, Err(DomainError::Upstream(_))));
    }
}
