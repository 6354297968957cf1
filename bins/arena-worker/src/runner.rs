// Single-case execution: harness -> temp file -> engine -> decoded outcome

use crate::config::LanguageConfigManager;
use crate::engine::{write_scratch_file, ExecutionEngine, RawRun, RunRequest};
use crate::evaluator::{deep_equal, CaseError, CaseOutcome};
use crate::harness::HarnessBuilder;
use anyhow::Result;
use arena_common::types::Language;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Safety limits to keep pathological submissions away from the engine
const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Stderr kept in the detail row; tracebacks carry the cause at the end
const MAX_ERROR_CHARS: usize = 4096;

/// The submission side of one case execution
#[derive(Debug, Clone, Copy)]
pub struct Program<'a> {
    pub source_code: &'a str,
    /// Raw name as requested; unknown names fail per case
    pub language: &'a str,
    pub entry_points: &'a BTreeMap<String, String>,
    pub memory_limit_mb: u32,
}

pub struct CaseRunner {
    engine: Arc<dyn ExecutionEngine>,
    languages: LanguageConfigManager,
    harness: HarnessBuilder,
}

impl CaseRunner {
    pub fn new(engine: Arc<dyn ExecutionEngine>, languages: LanguageConfigManager) -> Result<Self> {
        Ok(Self {
            engine,
            languages,
            harness: HarnessBuilder::new()?,
        })
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Execute one case. Never fails: every problem becomes a failed outcome.
    pub async fn execute(
        &self,
        program: &Program<'_>,
        input: &[Value],
        expected: &Value,
        time_limit_ms: u64,
    ) -> CaseOutcome {
        let unsupported = || {
            CaseOutcome::failed(CaseError::UnsupportedLanguage(program.language.to_string()), 0)
        };
        let Some(language) = Language::parse(program.language) else {
            return unsupported();
        };
        let Ok(runtime) = self.languages.get_config(&language) else {
            return unsupported();
        };

        if program.source_code.len() > MAX_SOURCE_CODE_BYTES {
            return runtime_failure(format!(
                "Source code exceeds maximum size of {} bytes",
                MAX_SOURCE_CODE_BYTES
            ));
        }
        let Some(entry_point) = program.entry_points.get(language.as_str()) else {
            return runtime_failure(format!("No entry point configured for {}", language));
        };

        let stdin = match serde_json::to_string(input) {
            Ok(s) => s,
            Err(e) => return runtime_failure(format!("Failed to encode test input: {}", e)),
        };
        if stdin.len() > MAX_TEST_INPUT_BYTES {
            return runtime_failure(format!(
                "Test input exceeds maximum size of {} bytes",
                MAX_TEST_INPUT_BYTES
            ));
        }

        let harness = match self.harness.render(language, program.source_code, entry_point) {
            Ok(h) => h,
            Err(e) => return runtime_failure(format!("{:#}", e)),
        };

        // Removed when `file` drops, on every path below
        let file = match write_scratch_file(&harness, &runtime.execution.file_extension) {
            Ok(f) => f,
            Err(e) => return runtime_failure(format!("{:#}", e)),
        };
        debug!(path = %file.path().display(), language = %language, "Harness written");

        let run = self
            .engine
            .run(RunRequest {
                runtime,
                harness_path: file.path(),
                stdin: &stdin,
                timeout_ms: time_limit_ms,
                memory_limit_mb: program.memory_limit_mb,
            })
            .await;

        if let Err(e) = &run {
            warn!(engine = self.engine.name(), error = %e, "Execution engine failure");
        }
        classify_run(run, expected, time_limit_ms)
    }
}

fn runtime_failure(message: String) -> CaseOutcome {
    CaseOutcome::failed(CaseError::Runtime(message), 0)
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skipped: String = text.chars().skip(count - max_chars).collect();
    format!("...{}", skipped)
}

fn failure_text(run: &RawRun) -> String {
    let stderr = run.stderr.trim();
    if !stderr.is_empty() {
        return tail(stderr, MAX_ERROR_CHARS);
    }
    match run.exit_code {
        Some(code) => format!("Process exited with code {}", code),
        None => "Process terminated abnormally".to_string(),
    }
}

/// Turn a raw launch into an outcome
pub fn classify_run(run: Result<RawRun>, expected: &Value, time_limit_ms: u64) -> CaseOutcome {
    let run = match run {
        Ok(run) => run,
        Err(e) => return runtime_failure(format!("Execution engine error: {:#}", e)),
    };

    if run.timed_out {
        return CaseOutcome::failed(CaseError::TimeLimitExceeded, time_limit_ms);
    }
    if run.output_limited {
        return CaseOutcome::failed(
            CaseError::Runtime("Output limit exceeded".to_string()),
            run.elapsed_ms,
        );
    }
    if run.exit_code != Some(0) {
        return CaseOutcome::failed(CaseError::Runtime(failure_text(&run)), run.elapsed_ms);
    }

    let Some(line) = run.stdout.lines().rev().map(str::trim).find(|l| !l.is_empty()) else {
        return CaseOutcome::failed(
            CaseError::InvalidOutput("program produced no output".to_string()),
            run.elapsed_ms,
        );
    };

    match serde_json::from_str::<Value>(line) {
        Ok(actual) => CaseOutcome {
            elapsed_ms: run.elapsed_ms,
            passed: deep_equal(&actual, expected),
            actual: Some(actual),
            error: None,
        },
        Err(e) => CaseOutcome::failed(
            CaseError::InvalidOutput(format!("{} in `{}`", e, tail(line, 200))),
            run.elapsed_ms,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::ScriptedEngine;
    use serde_json::json;

    fn entry_points() -> BTreeMap<String, String> {
        [
            ("python".to_string(), "two_sum".to_string()),
            ("javascript".to_string(), "twoSum".to_string()),
        ]
        .into_iter()
        .collect()
    }

    fn runner(engine: Arc<ScriptedEngine>) -> CaseRunner {
        CaseRunner::new(engine, LanguageConfigManager::defaults()).unwrap()
    }

    fn ok_run(stdout: &str) -> RawRun {
        RawRun {
            stdout: stdout.to_string(),
            exit_code: Some(0),
            elapsed_ms: 12,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_pass_uses_last_line() {
        let outcome = classify_run(Ok(ok_run("debug: 1\n\n[1, 0]\n")), &json!([0, 1]), 1000);
        assert!(outcome.passed);
        assert_eq!(outcome.actual, Some(json!([1, 0])));
        assert_eq!(outcome.elapsed_ms, 12);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_classify_mismatch_records_actual() {
        let outcome = classify_run(Ok(ok_run("[2, 3]\n")), &json!([0, 1]), 1000);
        assert!(!outcome.passed);
        assert_eq!(outcome.actual, Some(json!([2, 3])));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_classify_timeout_reports_deadline() {
        let run = RawRun {
            timed_out: true,
            elapsed_ms: 1004,
            ..Default::default()
        };
        let outcome = classify_run(Ok(run), &json!(1), 1000);
        assert_eq!(outcome.error, Some(CaseError::TimeLimitExceeded));
        assert_eq!(outcome.elapsed_ms, 1000);
        assert!(outcome.actual.is_none());
    }

    #[test]
    fn test_classify_nonzero_exit() {
        let run = RawRun {
            stderr: "Traceback...\nZeroDivisionError: division by zero\n".to_string(),
            exit_code: Some(1),
            elapsed_ms: 7,
            ..Default::default()
        };
        let outcome = classify_run(Ok(run), &json!(1), 1000);
        match outcome.error {
            Some(CaseError::Runtime(text)) => assert!(text.ends_with("division by zero")),
            other => panic!("unexpected error: {:?}", other),
        }

        let silent = RawRun {
            exit_code: Some(3),
            ..Default::default()
        };
        let outcome = classify_run(Ok(silent), &json!(1), 1000);
        assert_eq!(
            outcome.error,
            Some(CaseError::Runtime("Process exited with code 3".to_string()))
        );
    }

    #[test]
    fn test_classify_output_limit_ignores_trailing_answer() {
        let run = RawRun {
            stdout: format!("{}\n[0, 1]\n", "x".repeat(1024)),
            output_limited: true,
            elapsed_ms: 40,
            ..Default::default()
        };
        let outcome = classify_run(Ok(run), &json!([0, 1]), 1000);
        assert!(!outcome.passed);
        assert_eq!(
            outcome.error,
            Some(CaseError::Runtime("Output limit exceeded".to_string()))
        );
        assert_eq!(outcome.elapsed_ms, 40);
    }

    #[test]
    fn test_classify_unparsable_output() {
        let outcome = classify_run(Ok(ok_run("not json\n")), &json!(1), 1000);
        assert!(matches!(outcome.error, Some(CaseError::InvalidOutput(_))));

        let outcome = classify_run(Ok(ok_run("  \n")), &json!(1), 1000);
        assert!(matches!(outcome.error, Some(CaseError::InvalidOutput(_))));
    }

    #[test]
    fn test_classify_engine_error() {
        let outcome = classify_run(Err(anyhow::anyhow!("daemon down")), &json!(1), 1000);
        assert_eq!(outcome.verdict(), arena_common::types::Verdict::RuntimeError);
        assert!(outcome.error.unwrap().to_string().contains("daemon down"));
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 10), "abcdef");
        assert_eq!(tail("abcdef", 3), "...def");
    }

    #[tokio::test]
    async fn test_execute_passes_args_and_cleans_up() {
        let engine = Arc::new(ScriptedEngine::answering(|_| json!([0, 1])));
        let runner = runner(engine.clone());
        let entry_points = entry_points();
        let program = Program {
            source_code: "def two_sum(nums, target):\n    return [0, 1]\n",
            language: "python",
            entry_points: &entry_points,
            memory_limit_mb: 128,
        };

        let outcome = runner
            .execute(&program, &[json!([2, 7, 11, 15]), json!(9)], &json!([1, 0]), 1000)
            .await;

        assert!(outcome.passed);
        assert_eq!(
            engine.seen_stdin.lock().unwrap().as_slice(),
            &["[[2,7,11,15],9]".to_string()]
        );
        let paths = engine.seen_paths.lock().unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].extension().is_some_and(|e| e == "py"));
        assert!(!paths[0].exists(), "harness file must be removed");
    }

    #[tokio::test]
    async fn test_concurrent_executions_use_separate_files() {
        let engine = Arc::new(ScriptedEngine::answering(|args| args[1].clone()));
        let runner = runner(engine.clone());
        let entry_points = entry_points();
        let program = Program {
            source_code: "def two_sum(nums, target):\n    return target\n",
            language: "python",
            entry_points: &entry_points,
            memory_limit_mb: 128,
        };

        let (args1, expected1) = ([json!([1]), json!(1)], json!(1));
        let (args2, expected2) = ([json!([2]), json!(2)], json!(2));
        let (first, second) = tokio::join!(
            runner.execute(&program, &args1, &expected1, 1000),
            runner.execute(&program, &args2, &expected2, 1000),
        );

        assert!(first.passed);
        assert!(second.passed);
        let paths = engine.seen_paths.lock().unwrap();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn test_execute_cleans_up_after_engine_error() {
        let engine = Arc::new(ScriptedEngine::new(|_| Err(anyhow::anyhow!("spawn failed"))));
        let runner = runner(engine.clone());
        let entry_points = entry_points();
        let program = Program {
            source_code: "function twoSum() {}",
            language: "javascript",
            entry_points: &entry_points,
            memory_limit_mb: 128,
        };

        let outcome = runner.execute(&program, &[], &json!(null), 1000).await;
        assert!(matches!(outcome.error, Some(CaseError::Runtime(_))));
        let paths = engine.seen_paths.lock().unwrap();
        assert!(!paths[0].exists());
    }

    #[tokio::test]
    async fn test_unsupported_language_never_spawns() {
        let engine = Arc::new(ScriptedEngine::answering(|_| json!(null)));
        let runner = runner(engine.clone());
        let entry_points = entry_points();
        let program = Program {
            source_code: "puts 1",
            language: "ruby",
            entry_points: &entry_points,
            memory_limit_mb: 128,
        };

        let outcome = runner.execute(&program, &[], &json!(1), 1000).await;
        assert_eq!(
            outcome.error,
            Some(CaseError::UnsupportedLanguage("ruby".to_string()))
        );
        assert!(engine.seen_paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_language_without_runtime_is_unsupported() {
        let engine = Arc::new(ScriptedEngine::answering(|_| json!(null)));
        let python_only = LanguageConfigManager::from_configs(
            LanguageConfigManager::defaults()
                .get_config(&Language::Python)
                .cloned(),
        );
        let runner = CaseRunner::new(engine, python_only).unwrap();
        let entry_points = entry_points();
        let program = Program {
            source_code: "",
            language: "javascript",
            entry_points: &entry_points,
            memory_limit_mb: 128,
        };

        let outcome = runner.execute(&program, &[], &json!(1), 1000).await;
        assert_eq!(outcome.error.unwrap().to_string(), "Unsupported language: javascript");
    }

    #[tokio::test]
    async fn test_missing_entry_point_is_runtime_error() {
        let engine = Arc::new(ScriptedEngine::answering(|_| json!(null)));
        let runner = runner(engine.clone());
        let entry_points = BTreeMap::new();
        let program = Program {
            source_code: "def f(): pass",
            language: "python",
            entry_points: &entry_points,
            memory_limit_mb: 128,
        };

        let outcome = runner.execute(&program, &[], &json!(1), 1000).await;
        assert_eq!(
            outcome.error,
            Some(CaseError::Runtime("No entry point configured for python".to_string()))
        );
        assert!(engine.seen_paths.lock().unwrap().is_empty());
    }
}
