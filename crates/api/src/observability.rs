use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const HTTP_REQUESTS_TOTAL: &str = "docline_api_http_requests_total";
const HTTP_REQUEST_DURATION_SECONDS: &str = "docline_api_http_request_duration_seconds";
const HTTP_REQUEST_ERRORS_TOTAL: &str = "docline_api_http_errors_total";
const PLANS_CREATED_TOTAL: &str = "docline_api_plans_created_total";
const NOTIFICATIONS_TOTAL: &str = "docline_api_notifications_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn register_http_request(method: &str, route: &str, status: StatusCode, elapsed: Duration) {
    let method = method.to_string();
    let route = route.to_string();
    let status_code = status.as_u16().to_string();

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status_code.clone()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.clone(),
        "route" => route.clone()
    )
    .record(elapsed.as_secs_f64());

    if status.is_server_error() {
        counter!(
            HTTP_REQUEST_ERRORS_TOTAL,
            "method" => method,
            "route" => route,
            "status" => status_code
        )
        .increment(1);
    }
}

/// `source` names the intake path that produced the payload (`push`,
/// `actions`, `rerun` for regenerated plans).
pub fn register_plan_activity(source: &str, execution_mode: &str) {
    counter!(
        PLANS_CREATED_TOTAL,
        "source" => source.to_string(),
        "execution_mode" => execution_mode.to_string()
    )
    .increment(1);
}

pub fn register_notification(event: &str, route: &str, delivered: usize) {
    counter!(
        NOTIFICATIONS_TOTAL,
        "event" => event.to_string(),
        "route" => route.to_string()
    )
    .increment(delivered as u64);
}
