//! HTTP routes and handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, instrument, warn};

use crate::error::LimitExceeded;
use crate::flood::{Decision, FloodControlBackend};

/// Response header carrying the number of calls still admitted in the window.
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    retry_after_ms: u64,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
}

/// Build the router, with every identity-bearing route guarded by `gate`.
pub fn router<B>(gate: Arc<B>) -> Router
where
    B: FloodControlBackend<i64> + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/api/hello/:user_id", get(hello::<B>))
        .layer(TraceLayer::new_for_http())
        .with_state(gate)
}

async fn health_check() -> impl IntoResponse {
    Json(HealthBody { status: "ok" })
}

#[instrument(skip_all, fields(user_id = user_id))]
async fn hello<B>(State(gate): State<Arc<B>>, Path(user_id): Path<i64>) -> Response
where
    B: FloodControlBackend<i64> + 'static,
{
    match gate.check_identity(&user_id).await {
        Decision::Allowed { remaining } => {
            debug!(remaining = remaining, "Request admitted");
            (
                StatusCode::OK,
                [(RATELIMIT_REMAINING, remaining.to_string())],
                Json(MessageBody {
                    message: "Hello, World!",
                }),
            )
                .into_response()
        }
        Decision::Denied { retry_after } => {
            let err = LimitExceeded { retry_after };
            warn!(
                retry_after_ms = retry_after.as_millis() as u64,
                "Request rejected: {}", err
            );
            too_many_requests(err)
        }
    }
}

fn too_many_requests(err: LimitExceeded) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (header::RETRY_AFTER, retry_after_secs(err.retry_after).to_string()),
            (RATELIMIT_REMAINING, "0".to_string()),
        ],
        Json(ErrorBody {
            error: err.to_string(),
            retry_after_ms: err.retry_after.as_millis() as u64,
        }),
    )
        .into_response()
}

/// Whole seconds for the `retry-after` header, rounded up and at least one.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}
