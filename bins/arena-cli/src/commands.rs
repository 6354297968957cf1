// CLI commands for managing Arena
use anyhow::{bail, Context, Result};
use arena_common::store::{ChallengeStore, RedisStore};
use arena_common::types::Challenge;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const DEFAULT_LANGUAGES: &str = include_str!("../../../config/languages.json");
const DEFAULT_CHALLENGES: &str = include_str!("../../../config/challenges.json");

const DOCKERFILE_TEMPLATE: &str = r#"# GENERATED BY arena-cli - DO NOT EDIT
# {{name}} runner image for the container engine
FROM {{base_image}}

# The worker mounts the harness and the argument payload read-only under
# /box and redirects the payload into the interpreter through sh.
RUN command -v sh >/dev/null && command -v {{command}} >/dev/null

# Create non-root user for security
# node images already own uid 1000, so the uid is left to useradd
RUN useradd -m arena && \
    mkdir -p /box && \
    chown -R arena:arena /box

WORKDIR /box
USER arena
"#;

/// The subset of a runtime entry the CLI needs; other fields are ignored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub name: String,
    pub version: String,
    pub image: String,
    pub execution: ExecutionEntry,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub file_extension: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguagesJson {
    pub languages: Vec<LanguageEntry>,
}

/// Load languages configuration
fn load_languages_config(path: &Path) -> Result<LanguagesJson> {
    if !path.exists() {
        return Ok(LanguagesJson { languages: vec![] });
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Read an authored challenge file (a JSON array of challenges)
pub fn load_challenges(path: &Path) -> Result<Vec<Challenge>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Initialize a new Arena project
pub fn init_project(path: &str) -> Result<()> {
    println!("🚀 Initializing Arena project at: {}", path);

    let project_path = Path::new(path);

    // Create directories
    for dir in ["config", "dockerfiles"] {
        let dir_path = project_path.join(dir);
        fs::create_dir_all(&dir_path)
            .with_context(|| format!("Failed to create directory: {}", dir))?;
        println!("  ✅ Created: {}", dir);
    }

    // Existing files are left alone
    for (relative, content) in [
        ("config/languages.json", DEFAULT_LANGUAGES),
        ("config/challenges.json", DEFAULT_CHALLENGES),
    ] {
        let file_path = project_path.join(relative);
        if !file_path.exists() {
            fs::write(&file_path, content)
                .with_context(|| format!("Failed to write {}", relative))?;
            println!("  ✅ Created: {}", relative);
        }
    }

    println!("✅ Project initialized successfully!");
    println!("\n📋 Next steps:");
    println!("  1. Seed challenges: arena-cli seed");
    println!("  2. Start the worker and API with REDIS_URL set");
    println!("  3. Optional: arena-cli build-image --name python, then ARENA_ENGINE=docker");

    Ok(())
}

/// List all configured languages
pub fn list_languages(config_path: &str) -> Result<()> {
    let languages_json = load_languages_config(Path::new(config_path))?;

    if languages_json.languages.is_empty() {
        println!("No languages configured in {}.", config_path);
        println!("\n💡 Create the default set with: arena-cli init");
        return Ok(());
    }

    println!("📋 Configured Languages:\n");
    println!(
        "{:<12} {:<10} {:<28} {:<16} {:<10}",
        "Name", "Version", "Image", "Command", "CPU/Mem"
    );
    println!("{}", "─".repeat(84));

    for lang in &languages_json.languages {
        let command = std::iter::once(lang.execution.command.as_str())
            .chain(lang.execution.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:<12} {:<10} {:<28} {:<16} {:.1}/{} MB",
            lang.name, lang.version, lang.image, command, lang.cpu_limit, lang.memory_limit_mb
        );
    }

    println!("\n✅ Total: {} language(s)", languages_json.languages.len());

    Ok(())
}

async fn connect(redis_url: &str) -> Result<RedisStore> {
    let client = redis::Client::open(redis_url)
        .with_context(|| format!("Invalid Redis URL: {}", redis_url))?;
    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_url))?;
    Ok(RedisStore::new(conn))
}

/// Upsert every challenge in the file, keyed by title
pub async fn seed_challenges(file: &str, redis_url: &str) -> Result<()> {
    println!("🌱 Seeding challenges from: {}", file);

    let challenges = load_challenges(Path::new(file))?;
    if challenges.is_empty() {
        bail!("No challenges found in {}", file);
    }

    let store = connect(redis_url).await?;
    let mut created = 0;
    for challenge in challenges {
        let title = challenge.title.clone();
        let outcome = store
            .upsert_challenge(challenge)
            .await
            .with_context(|| format!("Failed to store challenge '{}'", title))?;
        if outcome.created {
            created += 1;
            println!("  ✅ Created: {} ({})", title, outcome.id);
        } else {
            println!("  🔄 Updated: {} ({})", title, outcome.id);
        }
    }

    println!("\n✅ Seeding complete: {} new challenge(s)", created);
    Ok(())
}

/// List challenges stored in Redis
pub async fn list_challenges(redis_url: &str) -> Result<()> {
    let store = connect(redis_url).await?;
    let summaries = store
        .list_challenges()
        .await
        .context("Failed to list challenges")?;

    if summaries.is_empty() {
        println!("No challenges stored.");
        println!("\n💡 Seed the defaults with: arena-cli seed");
        return Ok(());
    }

    println!("📋 Challenges:\n");
    println!("{:<38} {:<24} {:<8} {}", "Id", "Title", "Level", "Tags");
    println!("{}", "─".repeat(90));
    for summary in &summaries {
        println!(
            "{:<38} {:<24} {:<8} {}",
            summary.id,
            summary.title,
            format!("{:?}", summary.difficulty),
            summary.tags.join(", ")
        );
    }

    println!("\n✅ Total: {} challenge(s)", summaries.len());
    Ok(())
}

fn base_image(lang: &LanguageEntry) -> Result<String> {
    match lang.name.as_str() {
        "python" => Ok(format!("python:{}-slim", lang.version)),
        "javascript" => Ok(format!("node:{}-slim", lang.version)),
        other => bail!("No base image known for language '{}'", other),
    }
}

/// Render the runner Dockerfile for one runtime
pub fn render_dockerfile(lang: &LanguageEntry) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);

    handlebars
        .render_template(
            DOCKERFILE_TEMPLATE,
            &json!({
                "name": lang.name,
                "base_image": base_image(lang)?,
                "command": lang.execution.command,
            }),
        )
        .context("Failed to render Dockerfile template")
}

/// Generate the Dockerfile and build the runner image for a language
pub fn build_docker_image(name: &str, no_cache: bool, config_path: &str) -> Result<()> {
    println!("🐳 Building Docker image for: {}", name);

    let languages_json = load_languages_config(Path::new(config_path))?;
    let lang_config = languages_json
        .languages
        .iter()
        .find(|l| l.name == name)
        .ok_or_else(|| anyhow::anyhow!("Language '{}' not found in {}", name, config_path))?;

    let dockerfile_dir = PathBuf::from(format!("dockerfiles/{}", name));
    let dockerfile_path = dockerfile_dir.join("Dockerfile");
    fs::create_dir_all(&dockerfile_dir)
        .with_context(|| format!("Failed to create {}", dockerfile_dir.display()))?;
    fs::write(&dockerfile_path, render_dockerfile(lang_config)?)
        .context("Failed to write Dockerfile")?;
    println!("📄 Dockerfile: {}", dockerfile_path.display());

    let mut docker_args = vec![
        "build".to_string(),
        "-t".to_string(),
        lang_config.image.clone(),
        "-f".to_string(),
        dockerfile_path.to_string_lossy().to_string(),
    ];

    if no_cache {
        docker_args.push("--no-cache".to_string());
    }
    docker_args.push(dockerfile_dir.to_string_lossy().to_string());

    println!("\n🔨 Running: docker {}", docker_args.join(" "));
    println!("{}\n", "━".repeat(68));

    let status = Command::new("docker")
        .args(&docker_args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("Failed to execute docker build. Is Docker installed and running?")?;

    if !status.success() {
        bail!("Docker build failed with exit code: {:?}", status.code());
    }

    println!("\n{}", "━".repeat(68));
    println!("✅ Docker image built successfully: {}", lang_config.image);
    println!("\n💡 Run the worker with ARENA_ENGINE=docker to use it");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn languages() -> LanguagesJson {
        serde_json::from_str(DEFAULT_LANGUAGES).unwrap()
    }

    #[test]
    fn test_render_dockerfiles() {
        for lang in languages().languages {
            let dockerfile = render_dockerfile(&lang).unwrap();
            let from = dockerfile.lines().find(|l| l.starts_with("FROM ")).unwrap();
            match lang.name.as_str() {
                "python" => assert_eq!(from, "FROM python:3.12-slim"),
                "javascript" => assert_eq!(from, "FROM node:20-slim"),
                other => panic!("unexpected language {}", other),
            }
            assert!(dockerfile.contains(&format!("command -v {}", lang.execution.command)));
            assert!(dockerfile.contains("USER arena"));
            assert!(dockerfile.contains("useradd -m arena"));
            assert!(!dockerfile.contains("-u 1000"));
        }
    }

    #[test]
    fn test_unknown_runtime_has_no_image() {
        let mut lang = languages().languages.remove(0);
        lang.name = "cobol".to_string();
        assert!(render_dockerfile(&lang).is_err());
    }

    #[test]
    fn test_bundled_challenges_parse() {
        let challenges: Vec<Challenge> = serde_json::from_str(DEFAULT_CHALLENGES).unwrap();
        assert_eq!(challenges.len(), 2);

        let two_sum = &challenges[0];
        assert_eq!(two_sum.title, "Two Sum");
        assert_eq!(two_sum.entry_points["python"], "two_sum");
        let suite = &two_sum.test_cases;
        assert_eq!(
            (suite.visible.len(), suite.hidden.len(), suite.edge.len()),
            (3, 5, 5)
        );
        for challenge in &challenges {
            arena_common::store::validate_challenge(challenge).unwrap();
        }
    }

    #[test]
    fn test_init_project_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        init_project(root).unwrap();
        let challenges = dir.path().join("config/challenges.json");
        assert_eq!(load_challenges(&challenges).unwrap().len(), 2);
        assert_eq!(
            load_languages_config(&dir.path().join("config/languages.json"))
                .unwrap()
                .languages
                .len(),
            2
        );

        // user edits survive a second init
        fs::write(&challenges, "[]").unwrap();
        init_project(root).unwrap();
        assert_eq!(fs::read_to_string(&challenges).unwrap(), "[]");
        assert!(dir.path().join("dockerfiles").is_dir());
    }
}
