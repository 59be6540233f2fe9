use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use statmon_common::sign;
use statmon_common::types::{Metric, MetricKind, MetricValue};
use statmon_storage::error::StorageError;
use utoipa::ToSchema;

/// Uniform response envelope for update and liveness endpoints.
///
/// `hash` echoes the computed signature of a successful single-metric
/// update so multi-hop clients can verify round-trip integrity.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

pub fn success(hash: Option<String>) -> Response {
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: "ok".to_string(),
            error: None,
            hash,
        }),
    )
        .into_response()
}

pub fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(StatusResponse {
            status: "error".to_string(),
            error: Some(message.into()),
            hash: None,
        }),
    )
        .into_response()
}

fn storage_failure(err: StorageError) -> Response {
    match &err {
        StorageError::NotFound { .. } => failure(StatusCode::NOT_FOUND, err.to_string()),
        StorageError::InvalidMetric(_) => failure(StatusCode::BAD_REQUEST, err.to_string()),
        StorageError::Unavailable(_) => failure(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        _ => {
            tracing::error!(error = %err, "storage operation failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
        }
    }
}

/// Validates one submitted metric; a signature mismatch anywhere rejects
/// the whole payload, so callers stop at the first error.
fn validate(state: &AppState, metric: &Metric) -> Result<(), Response> {
    if metric.id.is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "metric id is empty"));
    }
    if let Some(key) = &state.sign_key {
        let valid = metric
            .signature
            .as_deref()
            .map(|sig| sign::verify_hex(&metric.id, &metric.value, key, sig))
            .unwrap_or(false);
        if !valid {
            return Err(failure(
                StatusCode::BAD_REQUEST,
                format!("signature mismatch for metric '{}'", metric.id),
            ));
        }
    }
    Ok(())
}

/// Batch submission: the whole payload is validated, then applied as one
/// `update_many` call.
#[utoipa::path(
    post,
    path = "/updates/",
    tag = "Update",
    request_body = Vec<Metric>,
    responses(
        (status = 200, description = "Batch applied", body = StatusResponse),
        (status = 400, description = "Malformed or unauthenticated batch", body = StatusResponse)
    )
)]
pub async fn update_batch(State(state): State<AppState>, body: Bytes) -> Response {
    let batch: Vec<Metric> = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("invalid batch payload: {e}")),
    };
    if batch.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "batch cannot be empty");
    }
    for metric in &batch {
        if let Err(response) = validate(&state, metric) {
            return response;
        }
    }

    match state.storage.update_many(&batch).await {
        Ok(()) => success(None),
        Err(e) => storage_failure(e),
    }
}

/// Single-metric JSON submission. Kept for older agents; echoes the
/// computed signature when signing is configured.
#[utoipa::path(
    post,
    path = "/update/",
    tag = "Update",
    request_body = Metric,
    responses(
        (status = 200, description = "Metric applied", body = StatusResponse),
        (status = 400, description = "Malformed or unauthenticated metric", body = StatusResponse)
    )
)]
pub async fn update_one(State(state): State<AppState>, body: Bytes) -> Response {
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(metric) => metric,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("invalid metric payload: {e}")),
    };
    if let Err(response) = validate(&state, &metric) {
        return response;
    }

    let echo = state
        .sign_key
        .as_deref()
        .map(|key| sign::sign_hex(&metric.id, &metric.value, key));

    match state.storage.update(&metric.id, metric.value).await {
        Ok(()) => success(echo),
        Err(e) => storage_failure(e),
    }
}

/// Path-parameter submission, a thin adapter onto the same update call.
#[utoipa::path(
    post,
    path = "/update/{kind}/{id}/{value}",
    tag = "Update",
    responses(
        (status = 200, description = "Metric applied", body = StatusResponse),
        (status = 400, description = "Unknown kind or malformed value", body = StatusResponse)
    )
)]
pub async fn update_path(
    State(state): State<AppState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Response {
    let kind: MetricKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };
    let value = match MetricValue::parse(kind, &value) {
        Ok(value) => value,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };

    match state.storage.update(&id, value).await {
        Ok(()) => success(None),
        Err(e) => storage_failure(e),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ValueQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

/// Looks up the stored value for `{id, type}`; the response is signed when
/// a signing key is configured.
#[utoipa::path(
    post,
    path = "/value/",
    tag = "Value",
    request_body = ValueQuery,
    responses(
        (status = 200, description = "Stored metric", body = Metric),
        (status = 404, description = "Unknown metric", body = StatusResponse)
    )
)]
pub async fn value_query(State(state): State<AppState>, body: Bytes) -> Response {
    let query: ValueQuery = match serde_json::from_slice(&body) {
        Ok(query) => query,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("invalid query: {e}")),
    };

    match state.storage.read(&query.id, query.kind).await {
        Ok(value) => {
            let mut metric = Metric::new(query.id, value);
            if let Some(key) = &state.sign_key {
                metric.signature = Some(sign::sign_hex(&metric.id, &metric.value, key));
            }
            (StatusCode::OK, Json(metric)).into_response()
        }
        Err(e) => storage_failure(e),
    }
}

/// Legacy plain-text value read.
#[utoipa::path(
    get,
    path = "/value/{kind}/{id}",
    tag = "Value",
    responses(
        (status = 200, description = "Stored value as text"),
        (status = 404, description = "Unknown metric", body = StatusResponse)
    )
)]
pub async fn value_path(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    let kind: MetricKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };

    match state.storage.read(&id, kind).await {
        Ok(value) => (StatusCode::OK, value.text()).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// Full dump of the stored state, kind → name → value.
#[utoipa::path(
    get,
    path = "/values/",
    tag = "Value",
    responses((status = 200, description = "All stored metrics"))
)]
pub async fn values_dump(State(state): State<AppState>) -> Response {
    match state.storage.read_all().await {
        Ok(dump) => (StatusCode::OK, Json(dump)).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// Liveness probe: succeeds iff the storage backend answers its ping
/// within the timeout.
#[utoipa::path(
    get,
    path = "/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Backend reachable", body = StatusResponse),
        (status = 503, description = "Backend unavailable", body = StatusResponse)
    )
)]
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.storage.ping().await {
        Ok(()) => success(None),
        Err(e) => {
            tracing::warn!(error = %e, "storage ping failed");
            failure(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}
