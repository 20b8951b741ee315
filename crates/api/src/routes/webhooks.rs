use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::HeaderMap;
use axum::{Json, response::IntoResponse};
use docline_domain::auth::Role;
use docline_domain::plan::{DocumentationPlan, is_valid_plan_id};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;

use crate::error::{ApiError, map_domain_error};
use crate::middleware::{AuthContext, bearer_token};
use crate::observability;
use crate::routes::require_role;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";

type HmacSha256 = Hmac<Sha256>;

/// Checks the `sha256=<hex>` signature GitHub computes over the raw body.
/// `verify_slice` compares in constant time.
pub(crate) fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// GitHub push intake. Signature verification only applies when a webhook
/// secret is configured; the raw body is authenticated before any JSON
/// parsing happens.
pub(crate) async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if !state.config.github_webhook_secret.is_empty() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        if !verify_signature(&state.config.github_webhook_secret, &body, signature) {
            tracing::warn!("github webhook signature mismatch");
            return Err(ApiError::Unauthorized);
        }
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("push");
    if event != "push" {
        return Ok(Json(json!({ "status": "ignored", "event": event })));
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|err| ApiError::Validation(format!("invalid json payload: {err}")))?;

    let outcome = state
        .intake
        .handle_push(&payload)
        .await
        .map_err(map_domain_error)?;

    if outcome.relevant {
        observability::register_plan_activity("push", "plan_only");
        state.notifier.queue_update(json!({
            "plan_id": outcome.plan_id,
            "repository": outcome.repository,
            "branch": outcome.branch,
        }));
    }

    Ok(Json(json!({
        "status": if outcome.relevant { "plan_created" } else { "not_relevant" },
        "event": event,
        "plan_id": outcome.plan_id,
        "outcome": outcome,
    })))
}

/// CI automation intake, authenticated with a static bearer token. Returns
/// the generator result itself so the calling workflow can surface it.
pub(crate) async fn actions_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.config.actions_webhook_configured() {
        return Err(ApiError::NotConfigured);
    }
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    if token != state.config.actions_bearer_token {
        tracing::warn!("actions webhook bearer token mismatch");
        return Err(ApiError::Unauthorized);
    }

    let (mut result, plan) = state
        .intake
        .handle_actions_event(&payload)
        .await
        .map_err(map_domain_error)?;

    observability::register_plan_activity("actions", plan.execution_mode.as_str());
    state.notifier.queue_update(json!({
        "plan_id": plan.plan_id,
        "repository": plan.repository,
        "pr_number": plan.pr_number,
        "status": plan.status,
    }));

    if let Value::Object(map) = &mut result {
        map.insert("plan_id".into(), json!(plan.plan_id));
        map.insert("status".into(), json!(plan.status));
        map.insert("event".into(), json!("pull_request"));
    }
    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RerunRequest {
    #[serde(default)]
    execute_updates: bool,
}

/// Reviewer-gated regeneration; the only path where `execute_updates` may
/// reach the generator as true.
pub(crate) async fn rerun_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
    payload: Option<Json<RerunRequest>>,
) -> Result<Json<DocumentationPlan>, ApiError> {
    require_role(&auth, Role::Reviewer)?;
    if !is_valid_plan_id(&plan_id) {
        return Err(ApiError::NotFound);
    }
    let Json(request) = payload.unwrap_or_default();

    let plan = state
        .intake
        .rerun(&plan_id, request.execute_updates)
        .await
        .map_err(map_domain_error)?;

    observability::register_plan_activity("rerun", plan.execution_mode.as_str());
    state.notifier.queue_update(json!({
        "plan_id": plan.plan_id,
        "repository": plan.repository,
        "status": plan.status,
        "execution_mode": plan.execution_mode,
    }));

    Ok(Json(plan))
}
