//! Challenge store and submission recorder.
//!
//! The judging core only ever reads challenges and appends submissions, so both
//! collaborators are small traits. `RedisStore` backs the deployed services;
//! `MemoryStore` backs tests and local tooling.

use crate::error::StoreError;
use crate::redis::{
    challenge_key, challenge_title_key, submission_key, user_submissions_key, CHALLENGE_INDEX_KEY,
};
use crate::types::{Challenge, ChallengeStats, ChallengeSummary, NewSubmission, Submission, Verdict};
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: String,
    pub created: bool,
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn get_challenge_by_id(&self, id: &str) -> StoreResult<Option<Challenge>>;

    async fn list_challenges(&self) -> StoreResult<Vec<ChallengeSummary>>;

    /// Insert or replace a challenge keyed by its title. An existing title keeps its id.
    async fn upsert_challenge(&self, challenge: Challenge) -> StoreResult<UpsertOutcome>;
}

#[async_trait]
pub trait SubmissionRecorder: Send + Sync {
    /// Append a finished submission and return its id
    async fn record(&self, submission: NewSubmission) -> StoreResult<String>;

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Submission>>;
}

/// Distinct challenges the user has at least one accepted submission for
pub async fn challenge_stats<R>(recorder: &R, user_id: &str) -> StoreResult<ChallengeStats>
where
    R: SubmissionRecorder + ?Sized,
{
    let submissions = recorder.list_for_user(user_id).await?;
    let completed: HashSet<&str> = submissions
        .iter()
        .filter(|s| s.record.verdict == Verdict::Accepted)
        .map(|s| s.record.challenge_id.as_str())
        .collect();

    Ok(ChallengeStats {
        completed_count: completed.len(),
    })
}

/// Reject records the judge could never run
pub fn validate_challenge(challenge: &Challenge) -> StoreResult<()> {
    if challenge.title.trim().is_empty() {
        return Err(StoreError::InvalidChallenge("title is empty".to_string()));
    }
    if challenge.time_limit_ms == 0 {
        return Err(StoreError::InvalidChallenge(format!(
            "{}: time limit must be positive",
            challenge.title
        )));
    }
    if challenge.test_cases.visible.is_empty() {
        return Err(StoreError::InvalidChallenge(format!(
            "{}: at least one visible test case is required",
            challenge.title
        )));
    }
    Ok(())
}

fn stamp_submission(submission: NewSubmission) -> Submission {
    Submission {
        id: Uuid::new_v4().to_string(),
        record: submission,
        submitted_at: Utc::now(),
    }
}

/// Redis-backed store; see `crate::redis` for key layout
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ChallengeStore for RedisStore {
    async fn get_challenge_by_id(&self, id: &str) -> StoreResult<Option<Challenge>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(challenge_key(id)).await?;
        match payload {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn list_challenges(&self) -> StoreResult<Vec<ChallengeSummary>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(CHALLENGE_INDEX_KEY).await?;

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let payload: Option<String> = conn.get(challenge_key(&id)).await?;
            if let Some(data) = payload {
                let challenge: Challenge = serde_json::from_str(&data)?;
                summaries.push(challenge.summary());
            }
        }
        summaries.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(summaries)
    }

    async fn upsert_challenge(&self, mut challenge: Challenge) -> StoreResult<UpsertOutcome> {
        validate_challenge(&challenge)?;
        let mut conn = self.conn.clone();

        let title_key = challenge_title_key(&challenge.title);
        let existing: Option<String> = conn.get(&title_key).await?;
        let created = existing.is_none();
        let id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());
        challenge.id = id.clone();

        let payload = serde_json::to_string(&challenge)?;
        let _: () = conn.set(challenge_key(&id), payload).await?;
        let _: () = conn.set(&title_key, &id).await?;
        let _: () = conn.sadd(CHALLENGE_INDEX_KEY, &id).await?;

        Ok(UpsertOutcome { id, created })
    }
}

#[async_trait]
impl SubmissionRecorder for RedisStore {
    async fn record(&self, submission: NewSubmission) -> StoreResult<String> {
        let mut conn = self.conn.clone();
        let submission = stamp_submission(submission);

        let payload = serde_json::to_string(&submission)?;
        let _: () = conn.set(submission_key(&submission.id), payload).await?;
        let _: () = conn
            .rpush(user_submissions_key(&submission.record.user_id), &submission.id)
            .await?;

        Ok(submission.id)
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Submission>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(user_submissions_key(user_id), 0, -1).await?;

        let mut submissions = Vec::with_capacity(ids.len());
        for id in ids {
            let payload: Option<String> = conn.get(submission_key(&id)).await?;
            if let Some(data) = payload {
                submissions.push(serde_json::from_str(&data)?);
            }
        }
        Ok(submissions)
    }
}

/// In-process store backing the judging and job-processing tests
#[derive(Default)]
pub struct MemoryStore {
    challenges: RwLock<HashMap<String, Challenge>>,
    submissions: RwLock<Vec<Submission>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-identified challenges, keeping their ids
    pub fn with_challenges(challenges: impl IntoIterator<Item = Challenge>) -> Self {
        let store = Self::new();
        {
            let mut map = store.challenges.write().unwrap_or_else(|e| e.into_inner());
            for challenge in challenges {
                map.insert(challenge.id.clone(), challenge);
            }
        }
        store
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn get_challenge_by_id(&self, id: &str) -> StoreResult<Option<Challenge>> {
        let map = self.challenges.read().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(id).cloned())
    }

    async fn list_challenges(&self) -> StoreResult<Vec<ChallengeSummary>> {
        let map = self.challenges.read().unwrap_or_else(|e| e.into_inner());
        let mut summaries: Vec<ChallengeSummary> = map.values().map(Challenge::summary).collect();
        summaries.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(summaries)
    }

    async fn upsert_challenge(&self, mut challenge: Challenge) -> StoreResult<UpsertOutcome> {
        validate_challenge(&challenge)?;
        let mut map = self.challenges.write().unwrap_or_else(|e| e.into_inner());

        let wanted = challenge_title_key(&challenge.title);
        let existing = map
            .values()
            .find(|c| challenge_title_key(&c.title) == wanted)
            .map(|c| c.id.clone());
        let created = existing.is_none();
        let id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());

        challenge.id = id.clone();
        map.insert(id.clone(), challenge);
        Ok(UpsertOutcome { id, created })
    }
}

#[async_trait]
impl SubmissionRecorder for MemoryStore {
    async fn record(&self, submission: NewSubmission) -> StoreResult<String> {
        let submission = stamp_submission(submission);
        let id = submission.id.clone();
        self.submissions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(submission);
        Ok(id)
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Submission>> {
        let submissions = self.submissions.read().unwrap_or_else(|e| e.into_inner());
        Ok(submissions
            .iter()
            .filter(|s| s.record.user_id == user_id)
            .cloned()
            .collect())
    }
}
