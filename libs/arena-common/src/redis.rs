use crate::types::{JobOutcome, JudgeJob};
use redis::{AsyncCommands, RedisResult};
use uuid::Uuid;

/// Redis key semantics shared by the API, the worker and the CLI.
/// Keeping them in one place means the producers and consumers never drift.

pub const QUEUE_KEY: &str = "arena:queue:judge";
pub const RESULT_PREFIX: &str = "arena:result";
pub const CHALLENGE_PREFIX: &str = "arena:challenge";
pub const CHALLENGE_INDEX_KEY: &str = "arena:challenges";
pub const CHALLENGE_TITLE_PREFIX: &str = "arena:challenge-title";
pub const SUBMISSION_PREFIX: &str = "arena:submission";
pub const USER_SUBMISSIONS_PREFIX: &str = "arena:submissions";

pub fn result_key(job_id: &Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

pub fn challenge_key(id: &str) -> String {
    format!("{}:{}", CHALLENGE_PREFIX, id)
}

/// Titles are normalized so that re-seeding "Two Sum " hits the same record
pub fn challenge_title_key(title: &str) -> String {
    format!("{}:{}", CHALLENGE_TITLE_PREFIX, title.trim().to_lowercase())
}

pub fn submission_key(id: &str) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, id)
}

pub fn user_submissions_key(user_id: &str) -> String {
    format!("{}:{}", USER_SUBMISSIONS_PREFIX, user_id)
}

fn serde_error(what: &'static str, e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, what, e.to_string()))
}

/// Push a judge job. RPUSH + BLPOP gives FIFO order.
pub async fn push_job(
    conn: &mut redis::aio::ConnectionManager,
    job: &JudgeJob,
) -> RedisResult<()> {
    let payload = serde_json::to_string(job).map_err(|e| serde_error("serialization error", e))?;
    conn.rpush(QUEUE_KEY, payload).await
}

/// A payload taken off the judge queue
#[derive(Debug)]
pub enum PoppedJob {
    Job(JudgeJob),
    /// Payload that does not decode as a job. `job_id` is set when the
    /// payload still carries a readable `id`, so the caller can report on it.
    Malformed {
        job_id: Option<Uuid>,
        payload: String,
        error: String,
    },
}

pub fn decode_job(payload: String) -> PoppedJob {
    match serde_json::from_str::<JudgeJob>(&payload) {
        Ok(job) => PoppedJob::Job(job),
        Err(e) => {
            let job_id = serde_json::from_str::<serde_json::Value>(&payload)
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_owned))
                .and_then(|id| Uuid::parse_str(&id).ok());
            PoppedJob::Malformed {
                job_id,
                payload,
                error: e.to_string(),
            }
        }
    }
}

/// Pop the next job, waiting at most `timeout_seconds` so the caller can observe shutdown.
/// Undecodable payloads are already off the queue and come back as `Malformed`.
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<PoppedJob>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_KEY, timeout_seconds).await?;

    Ok(result.map(|(_key, payload)| decode_job(payload)))
}

pub async fn store_outcome(
    conn: &mut redis::aio::ConnectionManager,
    outcome: &JobOutcome,
    ttl_seconds: u64,
) -> RedisResult<()> {
    let key = result_key(&outcome.job_id);
    let payload = serde_json::to_string(outcome).map_err(|e| serde_error("serialization error", e))?;
    conn.set_ex(&key, payload, ttl_seconds as _).await
}

pub async fn get_outcome(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &Uuid,
) -> RedisResult<Option<JobOutcome>> {
    let payload: Option<String> = conn.get(result_key(job_id)).await?;

    match payload {
        Some(data) => {
            let outcome: JobOutcome =
                serde_json::from_str(&data).map_err(|e| serde_error("deserialization error", e))?;
            Ok(Some(outcome))
        }
        None => Ok(None),
    }
}
