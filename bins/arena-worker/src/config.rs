// Runtime configuration management for the Arena worker
use anyhow::{bail, Context, Result};
use arena_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LANGUAGES_CONFIG: &str = "config/languages.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageExecution {
    /// Interpreter binary, e.g. `python3` or `node`
    pub command: String,
    /// Arguments placed before the harness path
    #[serde(default)]
    pub args: Vec<String>,
    pub file_extension: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub version: String,
    /// Image used by the container engine
    pub image: String,
    pub execution: LanguageExecution,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Registry of runtimes the worker can launch harnesses with
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<String, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load runtime configurations from a languages.json file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson = serde_json::from_str(content)?;
        Ok(Self::from_configs(languages_json.languages))
    }

    pub fn from_configs(configs: impl IntoIterator<Item = LanguageConfig>) -> Self {
        let configs = configs
            .into_iter()
            .map(|c| (c.name.to_lowercase(), c))
            .collect();
        Self { configs }
    }

    /// python3 and node from PATH; matches the shipped config/languages.json
    pub fn defaults() -> Self {
        Self::from_configs([
            LanguageConfig {
                name: "python".to_string(),
                version: "3.12".to_string(),
                image: "arena-python:latest".to_string(),
                execution: LanguageExecution {
                    command: "python3".to_string(),
                    args: vec!["-u".to_string()],
                    file_extension: ".py".to_string(),
                },
                memory_limit_mb: 256,
                cpu_limit: 0.5,
            },
            LanguageConfig {
                name: "javascript".to_string(),
                version: "20".to_string(),
                image: "arena-javascript:latest".to_string(),
                execution: LanguageExecution {
                    command: "node".to_string(),
                    args: vec![],
                    file_extension: ".js".to_string(),
                },
                memory_limit_mb: 256,
                cpu_limit: 0.5,
            },
        ])
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: &Language) -> Result<&LanguageConfig> {
        self.configs
            .get(language.as_str())
            .ok_or_else(|| anyhow::anyhow!("No runtime configured for language: {}", language))
    }

    /// List all configured languages
    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Which execution engine the worker launches harnesses through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Bare child process on the worker host
    Process,
    /// One container per execution
    Docker,
}

impl EngineKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "process" | "local" => Ok(EngineKind::Process),
            "docker" | "container" => Ok(EngineKind::Docker),
            other => bail!("Invalid engine '{}'. Valid options: process, docker", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub engine: EngineKind,
    pub languages_path: PathBuf,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let engine = match std::env::var("ARENA_ENGINE") {
            Ok(value) => EngineKind::parse(&value)?,
            Err(_) => EngineKind::Process,
        };
        let languages_path = std::env::var("ARENA_LANGUAGES_CONFIG")
            .unwrap_or_else(|_| DEFAULT_LANGUAGES_CONFIG.to_string())
            .into();

        Ok(Self {
            engine,
            languages_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_languages_json() {
        let manager = LanguageConfigManager::from_json(
            r#"{
                "languages": [{
                    "name": "Python",
                    "version": "3.11",
                    "image": "arena-python:3.11",
                    "execution": { "command": "python3", "file_extension": ".py" },
                    "memory_limit_mb": 128,
                    "cpu_limit": 1.0
                }]
            }"#,
        )
        .unwrap();

        let python = manager.get_config(&Language::Python).unwrap();
        assert_eq!(python.execution.command, "python3");
        assert!(python.execution.args.is_empty());
        assert!(manager.get_config(&Language::Javascript).is_err());
        assert_eq!(manager.list_languages(), vec!["python".to_string()]);
    }

    #[test]
    fn test_defaults_cover_supported_languages() {
        let manager = LanguageConfigManager::defaults();
        for language in Language::all() {
            assert!(manager.get_config(&language).is_ok(), "{} missing", language);
        }
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/languages.json");
        let manager = LanguageConfigManager::load(&path).unwrap();
        assert_eq!(manager.list_languages(), vec!["javascript", "python"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(LanguageConfigManager::load(Path::new("/nonexistent/languages.json")).is_err());
    }

    #[test]
    fn test_engine_kind() {
        assert_eq!(EngineKind::parse("Docker").unwrap(), EngineKind::Docker);
        assert_eq!(EngineKind::parse("process").unwrap(), EngineKind::Process);
        assert!(EngineKind::parse("vm").is_err());
    }
}
