// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use std::collections::BTreeMap;
use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use zapline_core::{HealthStatus, Job, JobStatus, SessionSnapshot, SessionStatus, ZaplineError};

use crate::server::GatewayState;
use crate::validation;

const DEFAULT_JOB_LIMIT: usize = 50;
const MAX_JOB_LIMIT: usize = 500;

// --- Bodies ---

/// Request body for POST /v1/sessions/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub destination: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub session_id: String,
    pub destination: String,
    pub message_id: String,
}

/// Request body for POST /v1/jobs.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub destination: String,
    pub text: String,
    /// RFC 3339, or `YYYY-MM-DD HH:MM[:SS]` in UTC.
    pub send_at: String,
}

#[derive(Debug, Deserialize)]
pub struct PairingCodeRequest {
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct PairingCodeResponse {
    pub session_id: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub session_id: String,
    pub status: SessionStatus,
    /// Pairing payload to render as a QR code; present only while `qr_pending`.
    pub qr: Option<String>,
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// --- Errors ---

/// An error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ZaplineError> for ApiError {
    fn from(err: ZaplineError) -> Self {
        let status = match &err {
            ZaplineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ZaplineError::SessionNotFound(_) | ZaplineError::JobNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ZaplineError::NotConnected { .. } => StatusCode::CONFLICT,
            ZaplineError::Transport { .. } => StatusCode::BAD_GATEWAY,
            ZaplineError::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ZaplineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ZaplineError::Config(_) | ZaplineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::warn!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn session_id(id: &str) -> ApiResult<&str> {
    validation::validate_session_id(id)?;
    Ok(id)
}

// --- Health ---

/// GET /health
///
/// Unauthenticated. 503 when any component is unhealthy.
pub async fn get_public_health(State(state): State<GatewayState>) -> Response {
    let checks = futures::future::join_all(
        state
            .health
            .components
            .iter()
            .map(|c| async move { (c.name().to_string(), c.health_check().await) }),
    )
    .await;

    let mut components = BTreeMap::new();
    let mut degraded = false;
    let mut unhealthy = false;
    for (name, result) in checks {
        let status = result.unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
        let detail = match &status {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded(d) => {
                degraded = true;
                Some(d.clone())
            }
            HealthStatus::Unhealthy(d) => {
                unhealthy = true;
                Some(d.clone())
            }
        };
        components.insert(
            name,
            ComponentHealth {
                status: status.label(),
                detail,
            },
        );
    }

    let (code, overall) = match (unhealthy, degraded) {
        (true, _) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
        (false, true) => (StatusCode::OK, "degraded"),
        (false, false) => (StatusCode::OK, "ok"),
    };
    let body = HealthResponse {
        status: overall,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        sessions: state.registry.len(),
        components,
    };
    (code, Json(body)).into_response()
}

// --- Sessions ---

/// GET /v1/sessions
pub async fn list_sessions(State(state): State<GatewayState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.registry.list(),
    })
}

/// GET /v1/sessions/{id}
pub async fn get_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let id = session_id(&id)?;
    state
        .registry
        .get(id)
        .map(Json)
        .ok_or_else(|| ZaplineError::SessionNotFound(id.to_string()).into())
}

/// POST /v1/sessions/{id}/start
pub async fn start_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let id = session_id(&id)?;
    Ok(Json(state.registry.get_or_create(id)))
}

/// GET /v1/sessions/{id}/qr
///
/// Starts the session if needed and reports the current pairing payload.
pub async fn get_qr(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<QrResponse>> {
    let id = session_id(&id)?;
    let snapshot = state.registry.get_or_create(id);
    Ok(Json(QrResponse {
        connected: snapshot.is_connected(),
        qr: snapshot.pairing_payload,
        status: snapshot.status,
        session_id: snapshot.session_id,
    }))
}

/// POST /v1/sessions/{id}/pairing-code
pub async fn request_pairing_code(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    payload: Result<Json<PairingCodeRequest>, JsonRejection>,
) -> ApiResult<Json<PairingCodeResponse>> {
    let id = session_id(&id)?;
    let Json(body) = payload?;
    let phone = validation::normalize_destination(
        &body.phone_number,
        state.default_country_code.as_deref(),
    )?;
    let code = state.registry.request_pairing_code(id, &phone).await?;
    Ok(Json(PairingCodeResponse {
        session_id: id.to_string(),
        code,
    }))
}

/// POST /v1/sessions/{id}/reconnect
pub async fn reconnect_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let id = session_id(&id)?;
    Ok(Json(state.registry.reconnect(id).await))
}

/// POST /v1/sessions/{id}/cleanup
pub async fn cleanup_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let id = session_id(&id)?;
    Ok(Json(state.registry.cleanup(id).await))
}

/// DELETE /v1/sessions/{id}
pub async fn teardown_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = session_id(&id)?;
    state.registry.teardown(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/sessions/{id}/messages
///
/// Immediate send. 409 when the session is not connected.
pub async fn send_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<Json<SendResponse>> {
    let id = session_id(&id)?;
    let Json(body) = payload?;
    let destination =
        validation::normalize_destination(&body.destination, state.default_country_code.as_deref())?;
    validation::validate_text(&body.text)?;

    let message_id = state.registry.send_text(id, &destination, &body.text).await?;
    Ok(Json(SendResponse {
        session_id: id.to_string(),
        destination,
        message_id: message_id.0,
    }))
}

// --- Jobs ---

/// POST /v1/jobs
pub async fn schedule_job(
    State(state): State<GatewayState>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let Json(body) = payload?;
    let new_job = validation::new_job(
        body.session_id.as_deref(),
        &body.destination,
        &body.text,
        &body.send_at,
        state.default_country_code.as_deref(),
    )?;

    let id = state.jobs.enqueue(&new_job).await?;
    let job = state
        .jobs
        .get_job(id)
        .await?
        .ok_or_else(|| ZaplineError::Internal(format!("job {id} vanished after enqueue")))?;
    tracing::info!(job_id = id, send_at = %job.send_at, "job scheduled");
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /v1/jobs?status=&limit=
pub async fn list_jobs(
    State(state): State<GatewayState>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            JobStatus::from_str(s)
                .map_err(|_| ZaplineError::InvalidInput(format!("unknown job status `{s}`")))
        })
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_JOB_LIMIT).clamp(1, MAX_JOB_LIMIT);
    let jobs = state.jobs.list_jobs(status, limit).await?;
    Ok(Json(JobListResponse { jobs }))
}

/// GET /v1/jobs/{id}
pub async fn get_job(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Job>> {
    state
        .jobs
        .get_job(id)
        .await?
        .map(Json)
        .ok_or_else(|| ZaplineError::JobNotFound(id).into())
}

/// POST /v1/jobs/{id}/cancel
///
/// Only queued jobs can be canceled; anything else is 409.
pub async fn cancel_job(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Job>> {
    let canceled = state.jobs.cancel_job(id).await?;
    let job = state
        .jobs
        .get_job(id)
        .await?
        .ok_or(ZaplineError::JobNotFound(id))?;
    if !canceled {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("job {id} is {}, only queued jobs can be canceled", job.status),
        ));
    }
    tracing::info!(job_id = id, "job canceled");
    Ok(Json(job))
}
