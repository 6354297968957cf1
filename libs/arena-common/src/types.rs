use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Languages the judge can build a harness for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Python => "python",
        }
    }

    /// Parse a language name, case-insensitively.
    /// Unknown names return `None` so callers can turn them into a failed outcome.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "javascript" | "js" | "node" => Some(Language::Javascript),
            "python" | "py" | "python3" => Some(Language::Python),
            _ => None,
        }
    }

    pub fn all() -> [Language; 2] {
        [Language::Javascript, Language::Python]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Category label attached to edge-tier cases, carried through for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCategory {
    Empty,
    Null,
    LargeInput,
    Negative,
    Boundary,
    Overflow,
    Duplicate,
    Sorted,
    ReverseSorted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Positional arguments handed to the entry point
    pub input: Vec<Value>,
    pub expected_output: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCase {
    pub category: EdgeCategory,
    #[serde(flatten)]
    pub case: TestCase,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    #[serde(default)]
    pub visible: Vec<TestCase>,
    #[serde(default)]
    pub hidden: Vec<TestCase>,
    #[serde(default)]
    pub edge: Vec<EdgeCase>,
}

/// Display-only worked example shown next to the description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub output: String,
}

fn default_time_limit_ms() -> u64 {
    2000
}

fn default_memory_limit_mb() -> u32 {
    256
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// language name -> starter template
    #[serde(default)]
    pub starter_code: BTreeMap<String, String>,
    /// language name -> function (or `Solution` method) the harness calls
    #[serde(default)]
    pub entry_points: BTreeMap<String, String>,
    pub test_cases: TestSuite,
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
    /// Advisory unless the container engine is in use
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub estimated_time: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    pub fn summary(&self) -> ChallengeSummary {
        ChallengeSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            difficulty: self.difficulty,
            tags: self.tags.clone(),
            estimated_time: self.estimated_time.clone(),
        }
    }

    /// View safe to hand to a solver: hidden and edge tiers are reduced to counts
    pub fn public_view(&self) -> PublicChallenge {
        PublicChallenge {
            id: self.id.clone(),
            title: self.title.clone(),
            difficulty: self.difficulty,
            description: self.description.clone(),
            examples: self.examples.clone(),
            constraints: self.constraints.clone(),
            starter_code: self.starter_code.clone(),
            visible_cases: self.test_cases.visible.clone(),
            hidden_case_count: self.test_cases.hidden.len(),
            edge_case_count: self.test_cases.edge.len(),
            time_limit_ms: self.time_limit_ms,
            memory_limit_mb: self.memory_limit_mb,
            tags: self.tags.clone(),
            estimated_time: self.estimated_time.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSummary {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub estimated_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicChallenge {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub examples: Vec<Example>,
    pub constraints: Vec<String>,
    pub starter_code: BTreeMap<String, String>,
    pub visible_cases: Vec<TestCase>,
    pub hidden_case_count: usize,
    pub edge_case_count: usize,
    pub time_limit_ms: u64,
    pub memory_limit_mb: u32,
    pub tags: Vec<String>,
    pub estimated_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Visible,
    Hidden,
    Edge,
}

/// Quick-run judges the visible tier only; submit judges every tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Run,
    Submit,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Run => f.write_str("run"),
            Mode::Submit => f.write_str("submit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::RuntimeError => "Runtime Error",
        };
        f.write_str(s)
    }
}

/// One row of the per-case breakdown shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDetail {
    #[serde(rename = "type")]
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EdgeCategory>,
    pub passed: bool,
    pub expected: Value,
    /// `null` when the case produced no decodable value
    pub received: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate of one judging run, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub challenge_id: String,
    pub mode: Mode,
    pub verdict: Verdict,
    pub passed: usize,
    pub total: usize,
    pub execution_time_ms: u64,
    /// Peak memory when the engine can measure it; never synthesized
    pub memory_used_mb: Option<f64>,
    pub details: Vec<CaseDetail>,
}

/// Unit of work pushed by the API and consumed by the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeJob {
    pub id: Uuid,
    pub challenge_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Kept raw so that unsupported names reach the executor as failed cases
    pub language: String,
    pub source_code: String,
    pub mode: Mode,
    pub enqueued_at: DateTime<Utc>,
}

impl JudgeJob {
    pub fn new(
        challenge_id: impl Into<String>,
        user_id: Option<String>,
        language: impl Into<String>,
        source_code: impl Into<String>,
        mode: Mode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            challenge_id: challenge_id.into(),
            user_id,
            language: language.into(),
            source_code: source_code.into(),
            mode,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Completed,
    Failed,
}

/// What the worker stores for the API to hand back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JudgeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn completed(job_id: Uuid, result: JudgeResult, submission_id: Option<String>) -> Self {
        Self {
            job_id,
            state: JobState::Completed,
            result: Some(result),
            error: None,
            submission_id,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(job_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            job_id,
            state: JobState::Failed,
            result: None,
            error: Some(error.into()),
            submission_id: None,
            finished_at: Utc::now(),
        }
    }
}

/// Input to the submission recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub user_id: String,
    pub challenge_id: String,
    pub source_code: String,
    pub language: String,
    pub verdict: Verdict,
    pub passed: usize,
    pub total: usize,
    pub execution_time_ms: u64,
    pub memory_used_mb: Option<f64>,
    pub details: Vec<CaseDetail>,
}

impl NewSubmission {
    pub fn from_result(
        user_id: impl Into<String>,
        source_code: impl Into<String>,
        language: impl Into<String>,
        result: &JudgeResult,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            challenge_id: result.challenge_id.clone(),
            source_code: source_code.into(),
            language: language.into(),
            verdict: result.verdict,
            passed: result.passed,
            total: result.total,
            execution_time_ms: result.execution_time_ms,
            memory_used_mb: result.memory_used_mb,
            details: result.details.clone(),
        }
    }
}

/// A persisted submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    #[serde(flatten)]
    pub record: NewSubmission,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeStats {
    pub completed_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_language_parsing() {
        assert_eq!(Language::parse("python"), Some(Language::Python));
        assert_eq!(Language::parse("JavaScript"), Some(Language::Javascript));
        assert_eq!(Language::parse(" node "), Some(Language::Javascript));
        assert_eq!(Language::parse("cobol"), None);
        assert_eq!(Language::Python.to_string(), "python");
    }

    #[test]
    fn test_verdict_wire_names() {
        assert_eq!(
            serde_json::to_value(Verdict::TimeLimitExceeded).unwrap(),
            json!("Time Limit Exceeded")
        );
        assert_eq!(Verdict::WrongAnswer.to_string(), "Wrong Answer");
    }

    #[test]
    fn test_detail_shape() {
        let detail = CaseDetail {
            tier: Tier::Edge,
            category: Some(EdgeCategory::ReverseSorted),
            passed: false,
            expected: json!([0, 1]),
            received: Value::Null,
            error: Some("Time Limit Exceeded".to_string()),
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["type"], json!("edge"));
        assert_eq!(value["category"], json!("reverse_sorted"));
        assert_eq!(value["received"], Value::Null);

        let visible = CaseDetail {
            tier: Tier::Visible,
            category: None,
            passed: true,
            expected: json!(true),
            received: json!(true),
            error: None,
        };
        let value = serde_json::to_value(&visible).unwrap();
        assert!(value.get("category").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_challenge_from_authored_json() {
        let challenge: Challenge = serde_json::from_value(json!({
            "title": "Valid Parentheses",
            "difficulty": "Easy",
            "description": "Check brackets",
            "entryPoints": { "python": "is_valid", "javascript": "isValid" },
            "testCases": {
                "visible": [{ "input": ["()"], "expectedOutput": true }],
                "edge": [{ "category": "empty", "input": [""], "expectedOutput": true }]
            }
        }))
        .unwrap();

        assert_eq!(challenge.time_limit_ms, 2000);
        assert_eq!(challenge.entry_points["python"], "is_valid");
        assert!(challenge.test_cases.hidden.is_empty());
        assert_eq!(challenge.test_cases.edge[0].category, EdgeCategory::Empty);
        assert_eq!(challenge.test_cases.edge[0].case.input, vec![json!("")]);
    }

    #[test]
    fn test_public_view_hides_tiers() {
        let mut challenge: Challenge = serde_json::from_value(json!({
            "id": "c1",
            "title": "T",
            "difficulty": "Hard",
            "description": "",
            "testCases": {
                "visible": [{ "input": [1], "expectedOutput": 1 }],
                "hidden": [{ "input": [2], "expectedOutput": 2 }]
            }
        }))
        .unwrap();
        challenge.tags.push("Math".to_string());

        let view = challenge.public_view();
        assert_eq!(view.visible_cases.len(), 1);
        assert_eq!(view.hidden_case_count, 1);
        assert_eq!(view.edge_case_count, 0);
        let text = serde_json::to_string(&view).unwrap();
        assert!(!text.contains("\"hidden\""));
    }
}
