/// Judging Orchestrator - High-Level Glue
///
/// **Responsibility:**
/// Drive the case runner over the resolved test sequence and fold outcomes
/// into a verdict.
///
/// **Architecture:**
/// 1. Resolve cases for the mode (tiers.rs)
/// 2. Execute each case sequentially (runner.rs -> engine.rs)
/// 3. Score and aggregate (evaluator.rs)
///
/// Cases always run to the end of the suite, even after a failure, so the
/// caller sees the full breakdown. Nothing here retries.

use crate::evaluator::VerdictTally;
use crate::runner::{CaseRunner, Program};
use crate::tiers;
use arena_common::error::JudgeError;
use arena_common::store::{ChallengeStore, SubmissionRecorder};
use arena_common::types::{
    Challenge, JobOutcome, JudgeJob, JudgeResult, Mode, NewSubmission,
};
use tracing::{debug, error, info, instrument, warn};

pub struct Judge {
    runner: CaseRunner,
}

impl Judge {
    pub fn new(runner: CaseRunner) -> Self {
        Self { runner }
    }

    /// Judge source code against an already-loaded challenge
    #[instrument(
        skip(self, challenge, source_code),
        fields(challenge_id = %challenge.id, language = %language, mode = %mode)
    )]
    pub async fn judge(
        &self,
        challenge: &Challenge,
        source_code: &str,
        language: &str,
        mode: Mode,
    ) -> Result<JudgeResult, JudgeError> {
        let cases = tiers::resolve(challenge, mode);
        if cases.is_empty() {
            return Err(JudgeError::NoTestCases(challenge.id.clone()));
        }

        info!(
            cases = cases.len(),
            time_limit_ms = challenge.time_limit_ms,
            engine = self.runner.engine_name(),
            "Judging started"
        );

        let program = Program {
            source_code,
            language,
            entry_points: &challenge.entry_points,
            memory_limit_mb: challenge.memory_limit_mb,
        };

        let mut tally = VerdictTally::new();
        for (idx, case) in cases.iter().enumerate() {
            let outcome = self
                .runner
                .execute(
                    &program,
                    &case.case.input,
                    &case.case.expected_output,
                    challenge.time_limit_ms,
                )
                .await;

            debug!(
                case = idx + 1,
                tier = ?case.tier,
                passed = outcome.passed,
                elapsed_ms = outcome.elapsed_ms,
                error = ?outcome.error.as_ref().map(ToString::to_string),
                "Case finished"
            );
            tally.record(case, &outcome);
        }

        let result = tally.finish(&challenge.id, mode);
        info!(
            verdict = %result.verdict,
            passed = result.passed,
            total = result.total,
            execution_ms = result.execution_time_ms,
            "Judging complete"
        );
        Ok(result)
    }

    /// Look the challenge up first; an unknown id fails before anything runs
    pub async fn judge_by_id<S>(
        &self,
        store: &S,
        challenge_id: &str,
        source_code: &str,
        language: &str,
        mode: Mode,
    ) -> Result<JudgeResult, JudgeError>
    where
        S: ChallengeStore + ?Sized,
    {
        let challenge = store
            .get_challenge_by_id(challenge_id)
            .await?
            .ok_or_else(|| JudgeError::ChallengeNotFound(challenge_id.to_string()))?;

        self.judge(&challenge, source_code, language, mode).await
    }

    /// Quick-run over the visible tier. Never persisted.
    pub async fn run<S>(
        &self,
        store: &S,
        challenge_id: &str,
        source_code: &str,
        language: &str,
    ) -> Result<JudgeResult, JudgeError>
    where
        S: ChallengeStore + ?Sized,
    {
        self.judge_by_id(store, challenge_id, source_code, language, Mode::Run)
            .await
    }

    /// Full submission over every tier
    pub async fn submit<S>(
        &self,
        store: &S,
        challenge_id: &str,
        source_code: &str,
        language: &str,
    ) -> Result<JudgeResult, JudgeError>
    where
        S: ChallengeStore + ?Sized,
    {
        self.judge_by_id(store, challenge_id, source_code, language, Mode::Submit)
            .await
    }
}

/// Judge one queued job and, for submissions, record the result.
/// Always produces an outcome for the API to return.
#[instrument(skip_all, fields(job_id = %job.id, mode = %job.mode))]
pub async fn process_job<S, R>(judge: &Judge, store: &S, recorder: &R, job: &JudgeJob) -> JobOutcome
where
    S: ChallengeStore + ?Sized,
    R: SubmissionRecorder + ?Sized,
{
    let user_id = match (job.mode, job.user_id.as_deref()) {
        (Mode::Submit, None) => {
            warn!("Submit job has no user id");
            return JobOutcome::failed(job.id, JudgeError::MissingUser.to_string());
        }
        (_, user_id) => user_id,
    };

    let judged = match job.mode {
        Mode::Run => {
            judge
                .run(store, &job.challenge_id, &job.source_code, &job.language)
                .await
        }
        Mode::Submit => {
            judge
                .submit(store, &job.challenge_id, &job.source_code, &job.language)
                .await
        }
    };

    let result = match judged {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Judging failed");
            return JobOutcome::failed(job.id, e.to_string());
        }
    };

    let submission_id = match (job.mode, user_id) {
        (Mode::Submit, Some(user_id)) => {
            let submission =
                NewSubmission::from_result(user_id, &job.source_code, &job.language, &result);
            match recorder.record(submission).await {
                Ok(id) => {
                    info!(submission_id = %id, "Submission recorded");
                    Some(id)
                }
                Err(e) => {
                    // The verdict is still returned to the user
                    error!(error = %e, "Failed to record submission");
                    None
                }
            }
        }
        _ => None,
    };

    JobOutcome::completed(job.id, result, submission_id)
}
