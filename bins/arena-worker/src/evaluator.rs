/// Test Evaluator - Language-Agnostic Judging Logic
///
/// **Core Responsibility:**
/// Compare decoded outputs against expected values and fold per-case
/// outcomes into a verdict.
///
/// **Critical Properties:**
/// - Knows nothing about processes, containers or harnesses
/// - Knows nothing about Redis
/// - Pure functions only; safe to call from concurrent judging runs
///
/// **Comparison Rules (`deep_equal`):**
/// - Primitives of the same type compare by value
/// - Numbers are equal within an absolute tolerance of 1e-5
/// - Arrays are compared as multisets: both sides are sorted first, and
///   nested arrays are sorted too, so `[[0,1]]` equals `[[1,0]]`.
///   Problems where order matters cannot be judged with this comparator.
/// - Objects need the same key count and recursively equal values per key
/// - Differing types are never equal
///
/// **Verdict Rules:**
/// - The first failing case decides the verdict
/// - Timeout -> Time Limit Exceeded, other errors -> Runtime Error,
///   clean mismatch -> Wrong Answer
/// - No failures -> Accepted

use crate::tiers::ResolvedCase;
use arena_common::types::{CaseDetail, JudgeResult, Mode, Verdict};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Fixed absolute tolerance for numeric comparison
pub const FLOAT_TOLERANCE: f64 = 1e-5;

/// Why a single case failed to produce a comparable value
#[derive(Debug, Clone, PartialEq)]
pub enum CaseError {
    TimeLimitExceeded,
    /// Non-zero exit, signal, or infrastructure failure; carries the captured text
    Runtime(String),
    /// Exited cleanly but stdout did not end in a JSON value
    InvalidOutput(String),
    UnsupportedLanguage(String),
}

impl CaseError {
    pub fn verdict(&self) -> Verdict {
        match self {
            CaseError::TimeLimitExceeded => Verdict::TimeLimitExceeded,
            _ => Verdict::RuntimeError,
        }
    }
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseError::TimeLimitExceeded => f.write_str("Time Limit Exceeded"),
            CaseError::Runtime(msg) => f.write_str(msg),
            CaseError::InvalidOutput(msg) => write!(f, "Invalid output: {}", msg),
            CaseError::UnsupportedLanguage(lang) => write!(f, "Unsupported language: {}", lang),
        }
    }
}

/// Result of executing one case. Produced by the case runner, consumed here.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    pub elapsed_ms: u64,
    pub passed: bool,
    /// Decoded return value; recorded whether or not it matched
    pub actual: Option<Value>,
    pub error: Option<CaseError>,
}

impl CaseOutcome {
    pub fn failed(error: CaseError, elapsed_ms: u64) -> Self {
        Self {
            elapsed_ms,
            passed: false,
            actual: None,
            error: Some(error),
        }
    }

    pub fn verdict(&self) -> Verdict {
        if self.passed {
            return Verdict::Accepted;
        }
        match &self.error {
            Some(error) => error.verdict(),
            None => Verdict::WrongAnswer,
        }
    }
}

/// Structural equality with multiset arrays and float tolerance
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    structural_equal(&canonicalize(a), &canonicalize(b))
}

fn structural_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() < FLOAT_TOLERANCE,
                _ => false,
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| structural_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| structural_equal(v, w)))
        }
        _ => false,
    }
}

/// Recursively sort every array, including arrays nested inside objects
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(canonicalize).collect();
            items.sort_by(canonical_cmp);
            Value::Array(items)
        }
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(map)
        }
        other => other.clone(),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over canonical values: type first, then value
fn canonical_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| canonical_cmp(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => {
            let mut left: Vec<(&String, &Value)> = x.iter().collect();
            let mut right: Vec<(&String, &Value)> = y.iter().collect();
            left.sort_by(|l, r| l.0.cmp(r.0));
            right.sort_by(|l, r| l.0.cmp(r.0));
            left.iter()
                .zip(&right)
                .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| canonical_cmp(lv, rv)))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| left.len().cmp(&right.len()))
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Convert one executed case into its user-facing detail row
pub fn evaluate_case(case: &ResolvedCase<'_>, outcome: &CaseOutcome) -> CaseDetail {
    CaseDetail {
        tier: case.tier,
        category: case.category,
        passed: outcome.passed,
        expected: case.case.expected_output.clone(),
        received: outcome.actual.clone().unwrap_or(Value::Null),
        error: outcome.error.as_ref().map(ToString::to_string),
    }
}

/// Running aggregate over a judging run, fed in execution order
#[derive(Debug)]
pub struct VerdictTally {
    verdict: Verdict,
    passed: usize,
    execution_time_ms: u64,
    details: Vec<CaseDetail>,
}

impl Default for VerdictTally {
    fn default() -> Self {
        Self::new()
    }
}

impl VerdictTally {
    pub fn new() -> Self {
        Self {
            verdict: Verdict::Accepted,
            passed: 0,
            execution_time_ms: 0,
            details: Vec::new(),
        }
    }

    pub fn record(&mut self, case: &ResolvedCase<'_>, outcome: &CaseOutcome) {
        self.execution_time_ms += outcome.elapsed_ms;
        if outcome.passed {
            self.passed += 1;
        } else if self.verdict == Verdict::Accepted {
            // first failure wins
            self.verdict = outcome.verdict();
        }
        self.details.push(evaluate_case(case, outcome));
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn finish(self, challenge_id: &str, mode: Mode) -> JudgeResult {
        JudgeResult {
            challenge_id: challenge_id.to_string(),
            mode,
            verdict: self.verdict,
            passed: self.passed,
            total: self.details.len(),
            execution_time_ms: self.execution_time_ms,
            memory_used_mb: None,
            details: self.details,
        }
    }
}
