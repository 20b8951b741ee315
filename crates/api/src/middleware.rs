use axum::{
    body::Body,
    extract::MatchedPath,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::middleware::NoOpMiddleware;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

use docline_domain::auth::Role;
use docline_domain::identity::UserIdentity;
use docline_infra::config::AppConfig;

use crate::error::ApiError;
use crate::observability;
use crate::state::AppState;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const REQUEST_ID_HEADER: &str = "x-request-id";

// Webhook deliveries and reviewer clients are low-volume; this mostly
// guards against a retry storm from a misconfigured CI workflow.
const RATE_LIMIT_PER_SECOND: u64 = 50;
const RATE_LIMIT_BURST: u32 = 100;

#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct CorrelationId(pub String);

/// Outcome of token verification, attached to every request. Protected
/// routes reject anonymous contexts; webhook routes ignore them entirely
/// and authenticate by signature or bearer token instead.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub identity: Option<UserIdentity>,
    pub is_authenticated: bool,
}

impl AuthContext {
    fn anonymous() -> Self {
        Self {
            identity: None,
            is_authenticated: false,
        }
    }

    fn authenticated(identity: UserIdentity) -> Self {
        Self {
            identity: Some(identity),
            is_authenticated: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    email: Option<String>,
    role: Option<String>,
    #[allow(dead_code)]
    exp: usize,
}

/// Decodes a bearer token into the identity snapshot used for both HTTP
/// requests and websocket sessions.
pub fn verify_token(jwt_secret: &str, token: &str) -> Option<UserIdentity> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &validation,
    )
    .ok()?;

    let role = data.claims.role.as_deref().and_then(Role::parse)?;
    let user_id = data.claims.sub;
    Some(UserIdentity {
        email: data
            .claims
            .email
            .unwrap_or_else(|| format!("{user_id}@localhost")),
        user_id,
        role,
    })
}

#[derive(Clone)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let value = HeaderValue::from_str(&Uuid::now_v7().to_string()).ok()?;
        Some(RequestId::new(value))
    }
}

pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::x_request_id(UuidRequestId)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan> {
    TraceLayer::new_for_http().make_span_with(RequestSpan)
}

#[derive(Clone, Default)]
pub(crate) struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, req: &Request<B>) -> Span {
        info_span!(
            "http_request",
            method = %req.method(),
            uri = %req.uri(),
            request_id = %header_str(req.headers(), REQUEST_ID_HEADER).unwrap_or("-"),
            correlation_id = %header_str(req.headers(), CORRELATION_ID_HEADER).unwrap_or("-")
        )
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub fn timeout_layer(config: &AppConfig) -> TimeoutLayer {
    TimeoutLayer::new(Duration::from_secs(config.http_timeout_secs.max(1)))
}

pub type RateLimitLayer = GovernorLayer<PeerIpKeyExtractor, NoOpMiddleware>;

pub fn rate_limit_layer() -> RateLimitLayer {
    let config = GovernorConfigBuilder::default()
        .per_second(RATE_LIMIT_PER_SECOND)
        .burst_size(RATE_LIMIT_BURST)
        .finish()
        .unwrap_or_else(|| {
            tracing::error!("invalid rate limit settings; falling back to defaults");
            GovernorConfig::default()
        });
    GovernorLayer {
        config: Arc::new(config),
    }
}

/// Attaches an `AuthContext` to every request. A missing or invalid token
/// is not an error here; routes that need authentication reject later.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let context = match bearer_token(req.headers()) {
        Some(token) => match verify_token(&state.config.jwt_secret, token) {
            Some(identity) => AuthContext::authenticated(identity),
            None => {
                tracing::warn!("invalid auth token");
                AuthContext::anonymous()
            }
        },
        None => AuthContext::anonymous(),
    };
    req.extensions_mut().insert(context);
    next.run(req).await
}

pub async fn require_auth_middleware(req: Request<Body>, next: Next) -> Response {
    let authenticated = req
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.is_authenticated)
        .unwrap_or(false);
    if authenticated {
        next.run(req).await
    } else {
        ApiError::Unauthorized.into_response()
    }
}

/// Carries the caller's correlation id through to the response, minting one
/// when the caller did not send any.
pub async fn correlation_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(CORRELATION_ID_HEADER);
    let correlation_id = match req.headers().get(&header_name) {
        Some(value) => match value.to_str() {
            Ok(value) => value.to_string(),
            Err(_) => {
                return ApiError::Validation("invalid correlation id".into()).into_response();
            }
        },
        None => Uuid::now_v7().to_string(),
    };

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        req.headers_mut().insert(header_name.clone(), value);
    }
    req.extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(header_name, value);
    }
    response
}

pub async fn metrics_layer(req: Request<Body>, next: Next) -> Response {
    let start = std::time::Instant::now();
    let method = req.method().as_str().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let response = next.run(req).await;
    observability::register_http_request(&method, &route, response.status(), start.elapsed());
    response
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
}
