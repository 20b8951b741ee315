mod webhooks;
mod ws;

use axum::extract::{Extension, Path, Query, State};
use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{get, post},
};
use docline_domain::auth::Role;
use docline_domain::identity::UserIdentity;
use docline_domain::plan::{
    DocumentationPlan, MAX_LIST_LIMIT, PlanListQuery, PlanStatus, is_valid_plan_id,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::middleware::AuthContext;
use crate::{
    error::{ApiError, map_domain_error},
    middleware as app_middleware, observability,
    state::AppState,
    validation,
};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/plans", get(list_plans))
        .route("/v1/plans/:plan_id", get(get_plan))
        .route("/v1/plans/:plan_id/link-review", post(link_review))
        .route("/v1/plans/:plan_id/rerun", post(webhooks::rerun_plan))
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/webhooks/github", post(webhooks::github_webhook))
        .route("/v1/webhooks/actions", post(webhooks::actions_webhook))
        .route("/v1/ws", get(ws::ws_upgrade))
        .merge(protected)
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer(&state.config))
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.app_env.eq_ignore_ascii_case("test") {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> Result<impl IntoResponse, ApiError> {
    observability::render_metrics().ok_or(ApiError::NotConfigured)
}

#[derive(Debug, Deserialize)]
struct PlanListParams {
    repository: Option<String>,
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_plans(
    State(state): State<AppState>,
    Query(params): Query<PlanListParams>,
) -> Result<Json<Vec<DocumentationPlan>>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(|raw| {
            raw.parse::<PlanStatus>()
                .map_err(|_| ApiError::Validation(format!("unknown plan status: {raw}")))
        })
        .transpose()?;

    let limit = match params.limit {
        Some(0) => {
            return Err(ApiError::Validation("limit must be at least 1".into()));
        }
        Some(limit) if limit > MAX_LIST_LIMIT => {
            return Err(ApiError::Validation(format!(
                "limit must be at most {MAX_LIST_LIMIT}"
            )));
        }
        Some(limit) => limit,
        // The repository fills in the default page size.
        None => 0,
    };

    let plans = state
        .plan_service
        .list(&PlanListQuery {
            repository: params.repository,
            status,
            limit,
        })
        .await
        .map_err(map_domain_error)?;
    Ok(Json(plans))
}

async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<DocumentationPlan>, ApiError> {
    // A malformed id can never name a stored plan.
    if !is_valid_plan_id(&plan_id) {
        return Err(ApiError::NotFound);
    }
    let plan = state
        .plan_service
        .get(&plan_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(plan))
}

#[derive(Debug, Deserialize, Validate)]
struct LinkReviewRequest {
    #[validate(length(min = 1, max = 128))]
    review_id: String,
    status: Option<PlanStatus>,
}

async fn link_review(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<LinkReviewRequest>,
) -> Result<Json<DocumentationPlan>, ApiError> {
    validation::validate(&payload)?;
    require_role(&auth, Role::Reviewer)?;
    if !is_valid_plan_id(&plan_id) {
        return Err(ApiError::NotFound);
    }

    let plan = state
        .plan_service
        .link_to_review(&plan_id, payload.review_id, payload.status)
        .await
        .map_err(map_domain_error)?;

    let event = serde_json::json!({
        "plan_id": plan.plan_id,
        "review_id": plan.review_id,
        "repository": plan.repository,
        "status": plan.status,
    });
    if plan.status == PlanStatus::Completed {
        state.notifier.review_completed(event);
    } else {
        state.notifier.review_created(event);
    }

    Ok(Json(plan))
}

pub(crate) fn require_role(auth: &AuthContext, required: Role) -> Result<UserIdentity, ApiError> {
    let identity = auth.identity.as_ref().ok_or(ApiError::Unauthorized)?;
    if !identity.role.at_least(required) {
        return Err(ApiError::Forbidden);
    }
    Ok(identity.clone())
}
