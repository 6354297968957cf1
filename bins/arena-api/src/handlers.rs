// HTTP route handlers for the Arena API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use arena_common::redis;
use arena_common::store::{challenge_stats, ChallengeStore};
use arena_common::types::{JudgeJob, Mode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics::{JOBS_ENQUEUED, REQUESTS_REJECTED};
use crate::AppState;

/// Same cap the worker enforces, checked here so oversized code never hits the queue
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub language: String,
    pub source_code: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub user_id: String,
    pub language: String,
    pub source_code: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub job_id: String,
}

/// Why a request was refused before queueing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    EmptySource,
    SourceTooLarge(usize),
    MissingUser,
}

impl Rejection {
    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::EmptySource => "empty_source",
            Rejection::SourceTooLarge(_) => "source_too_large",
            Rejection::MissingUser => "missing_user",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Rejection::EmptySource => "source_code must not be empty".to_string(),
            Rejection::SourceTooLarge(size) => format!(
                "source_code is {} bytes, limit is {} bytes",
                size, MAX_SOURCE_CODE_BYTES
            ),
            Rejection::MissingUser => "user_id is required to submit".to_string(),
        }
    }
}

/// Languages are not checked here: an unsupported one is judged as a failed run
pub fn validate_request(
    source_code: &str,
    user_id: Option<&str>,
    mode: Mode,
) -> Result<(), Rejection> {
    if source_code.trim().is_empty() {
        return Err(Rejection::EmptySource);
    }
    if source_code.len() > MAX_SOURCE_CODE_BYTES {
        return Err(Rejection::SourceTooLarge(source_code.len()));
    }
    if mode == Mode::Submit && user_id.map_or(true, |u| u.trim().is_empty()) {
        return Err(Rejection::MissingUser);
    }
    Ok(())
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

async fn enqueue(
    state: &AppState,
    challenge_id: String,
    user_id: Option<String>,
    language: String,
    source_code: String,
    mode: Mode,
) -> Response {
    if let Err(rejection) = validate_request(&source_code, user_id.as_deref(), mode) {
        REQUESTS_REJECTED
            .with_label_values(&[rejection.reason()])
            .inc();
        warn!(challenge_id = %challenge_id, reason = rejection.reason(), "Request rejected");
        return error_body(StatusCode::BAD_REQUEST, rejection.message());
    }

    // Unknown challenges are refused up front rather than failing in the worker
    match state.store.get_challenge_by_id(&challenge_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            REQUESTS_REJECTED
                .with_label_values(&["unknown_challenge"])
                .inc();
            return error_body(
                StatusCode::NOT_FOUND,
                format!("Challenge not found: {}", challenge_id),
            );
        }
        Err(e) => {
            error!(challenge_id = %challenge_id, error = %e, "Failed to load challenge");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load challenge");
        }
    }

    let job = JudgeJob::new(challenge_id, user_id, language, source_code, mode);
    let job_id = job.id;

    // Push to Redis queue
    let mut conn = state.redis.clone();
    match redis::push_job(&mut conn, &job).await {
        Ok(_) => {
            JOBS_ENQUEUED.with_label_values(&[&mode.to_string()]).inc();
            info!(
                job_id = %job_id,
                challenge_id = %job.challenge_id,
                language = %job.language,
                mode = %mode,
                "Job queued"
            );

            (
                StatusCode::CREATED,
                Json(EnqueueResponse {
                    job_id: job_id.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to queue job");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to queue job: {}", e),
            )
        }
    }
}

/// POST /challenges/{id}/run - Quick-run against the visible tier
pub async fn run_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Response {
    enqueue(
        &state,
        challenge_id,
        None,
        payload.language,
        payload.source_code,
        Mode::Run,
    )
    .await
}

/// POST /challenges/{id}/submit - Full judgement, recorded for the user
pub async fn submit_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    enqueue(
        &state,
        challenge_id,
        Some(payload.user_id),
        payload.language,
        payload.source_code,
        Mode::Submit,
    )
    .await
}

/// GET /challenges
pub async fn list_challenges(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_challenges().await {
        Ok(summaries) => (StatusCode::OK, Json(summaries)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list challenges");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list challenges")
        }
    }
}

/// GET /challenges/{id} - Public view without hidden or edge cases
pub async fn get_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Response {
    match state.store.get_challenge_by_id(&challenge_id).await {
        Ok(Some(challenge)) => (StatusCode::OK, Json(challenge.public_view())).into_response(),
        Ok(None) => error_body(
            StatusCode::NOT_FOUND,
            format!("Challenge not found: {}", challenge_id),
        ),
        Err(e) => {
            error!(challenge_id = %challenge_id, error = %e, "Failed to load challenge");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load challenge")
        }
    }
}

/// GET /users/{user_id}/stats
pub async fn user_stats(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Response {
    match challenge_stats(&state.store, &user_id).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            error!(user_id = %user_id, error = %e, "Failed to compute stats");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to compute stats")
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics
pub async fn metrics() -> Response {
    match crate::metrics::render() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// GET /job/{job_id} - Query judging outcome
pub async fn get_job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    // Parse job ID
    let job_uuid = match Uuid::parse_str(&job_id) {
        Ok(id) => id,
        Err(_) => return error_body(StatusCode::BAD_REQUEST, "Invalid job ID format"),
    };

    // Fetch outcome from Redis
    let mut conn = state.redis.clone();
    match redis::get_outcome(&mut conn, &job_uuid).await {
        Ok(Some(outcome)) => {
            info!(job_id = %job_id, state = ?outcome.state, "Job outcome retrieved");
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Ok(None) => {
            // Not stored yet: still queued or judging
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "job_id": job_id,
                    "status": "pending",
                    "message": "Job is queued or still executing"
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to fetch job outcome");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to query job status: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_run_request() {
        assert_eq!(validate_request("def f(): pass", None, Mode::Run), Ok(()));
        assert_eq!(
            validate_request("  \n", None, Mode::Run),
            Err(Rejection::EmptySource)
        );

        let huge = "x".repeat(MAX_SOURCE_CODE_BYTES + 1);
        assert_eq!(
            validate_request(&huge, None, Mode::Run),
            Err(Rejection::SourceTooLarge(MAX_SOURCE_CODE_BYTES + 1))
        );
    }

    #[test]
    fn test_validate_submit_needs_user() {
        assert_eq!(
            validate_request("code", None, Mode::Submit),
            Err(Rejection::MissingUser)
        );
        assert_eq!(
            validate_request("code", Some(" "), Mode::Submit),
            Err(Rejection::MissingUser)
        );
        assert_eq!(validate_request("code", Some("u1"), Mode::Submit), Ok(()));
    }

    #[test]
    fn test_request_payloads() {
        let submit: SubmitRequest = serde_json::from_str(
            r#"{"user_id": "u1", "language": "python", "source_code": "print(1)"}"#,
        )
        .unwrap();
        assert_eq!(submit.user_id, "u1");

        // any language name is accepted at the edge
        let run: RunRequest =
            serde_json::from_str(r#"{"language": "cobol", "source_code": "x"}"#).unwrap();
        assert_eq!(run.language, "cobol");
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(Rejection::MissingUser.reason(), "missing_user");
        assert!(Rejection::SourceTooLarge(5).message().contains("limit is 1048576 bytes"));
    }
}
