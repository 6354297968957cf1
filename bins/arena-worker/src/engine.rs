/// Execution Engine - Abstraction for Launching Harnesses
///
/// **Core Responsibility:**
/// Run an already-written harness file with a JSON payload on stdin under a
/// wall-clock deadline, and capture raw stdout/stderr/exit status.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (local process, container)
/// - Engine does NOT build harnesses or decode output
/// - Engine does NOT judge correctness
///
/// **Engines:**
/// - `ProcessEngine`: bare child process on the worker host. No isolation.
/// - `DockerEngine`: one container per execution, network disabled,
///   memory/CPU/pid limits applied.
///
/// Both engines stop buffering at `MAX_STDOUT_BYTES`/`MAX_STDERR_BYTES`.
/// A run that overflows stdout is killed and flagged `output_limited`.

use crate::config::LanguageConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Output caps; anything past them is never held in memory
pub const MAX_STDOUT_BYTES: usize = 16 * 1024 * 1024; // 16MB
pub const MAX_STDERR_BYTES: usize = 64 * 1024; // 64KB

/// Where the container engine mounts the argument payload
const CONTAINER_INPUT_PATH: &str = "/box/input.json";

/// Everything an engine needs to launch one harness
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub runtime: &'a LanguageConfig,
    pub harness_path: &'a Path,
    /// JSON-encoded argument list
    pub stdin: &'a str,
    pub timeout_ms: u64,
    /// Challenge memory budget; only container engines enforce it
    pub memory_limit_mb: u32,
}

/// Raw result of one launch, before any decoding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRun {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal or timed out
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    /// Stdout passed `MAX_STDOUT_BYTES` and the run was killed
    pub output_limited: bool,
    pub elapsed_ms: u64,
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` means infrastructure failure (spawn, daemon), not a user fault
    async fn run(&self, request: RunRequest<'_>) -> Result<RawRun>;
}

/// Launches the runtime as a local child process.
/// The child is killed when the deadline elapses (`kill_on_drop`).
#[derive(Debug, Default)]
pub struct ProcessEngine;

impl ProcessEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Write `contents` to a collision-free temp file (timestamp prefix + random suffix).
/// The file is removed when the handle drops.
pub fn write_scratch_file(contents: &str, suffix: &str) -> Result<NamedTempFile> {
    let prefix = format!("arena-{}-", chrono::Utc::now().timestamp_millis());
    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(suffix)
        .tempfile()
        .context("Failed to create scratch file")?;

    file.write_all(contents.as_bytes())
        .context("Failed to write scratch file")?;
    file.flush().context("Failed to flush scratch file")?;

    // Container runtimes read the file as an unprivileged user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .context("Failed to set scratch file permissions")?;
    }

    Ok(file)
}

/// Read at most `limit` bytes. The flag is set when the stream had more.
async fn read_capped<R>(reader: &mut R, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    (&mut *reader).take(limit as u64 + 1).read_to_end(&mut buf).await?;
    let exceeded = buf.len() > limit;
    buf.truncate(limit);
    Ok((buf, exceeded))
}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[async_trait]
impl ExecutionEngine for ProcessEngine {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn run(&self, request: RunRequest<'_>) -> Result<RawRun> {
        let execution = &request.runtime.execution;
        let mut child = Command::new(&execution.command)
            .args(&execution.args)
            .arg(request.harness_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn runtime '{}'", execution.command))?;

        let start = Instant::now();

        // Fed from a separate task so a child that never reads stdin cannot block us
        if let Some(mut stdin) = child.stdin.take() {
            let payload = request.stdin.as_bytes().to_vec();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!(error = %e, "Child closed stdin early");
                }
            });
        }

        let mut stdout_pipe = child.stdout.take().context("Child stdout was not captured")?;
        let mut stderr_pipe = child.stderr.take().context("Child stderr was not captured")?;

        let execution = async {
            let stdout_side = async {
                let read = read_capped(&mut stdout_pipe, MAX_STDOUT_BYTES).await;
                if matches!(read, Ok((_, true))) {
                    if let Err(e) = child.start_kill() {
                        debug!(error = %e, "Child exited before output-limit kill");
                    }
                }
                read
            };
            let stderr_side = async {
                let read = read_capped(&mut stderr_pipe, MAX_STDERR_BYTES).await;
                // Drain the rest so the child never stalls on a full pipe
                let _ = tokio::io::copy(&mut stderr_pipe, &mut tokio::io::sink()).await;
                read
            };
            let (stdout, stderr) = tokio::join!(stdout_side, stderr_side);
            let status = child.wait().await;
            (stdout, stderr, status)
        };

        let deadline = Duration::from_millis(request.timeout_ms);
        match tokio::time::timeout(deadline, execution).await {
            Ok((stdout, stderr, status)) => {
                let (stdout, output_limited) = stdout.context("Failed to read child stdout")?;
                let (stderr, _) = stderr.context("Failed to read child stderr")?;
                let status = status.context("Failed to wait for child process")?;

                let mut stderr = String::from_utf8_lossy(&stderr).into_owned();
                if let Some(signal) = signal_of(&status) {
                    stderr.push_str(&format!("\n[Process terminated by signal {}]", signal));
                }

                Ok(RawRun {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr,
                    exit_code: status.code().map(i64::from),
                    timed_out: false,
                    output_limited,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
            // `child` drops on return, which kills it
            Err(_) => Ok(RawRun {
                stdout: String::new(),
                stderr: String::from("[Execution timed out]"),
                exit_code: None,
                timed_out: true,
                output_limited: false,
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }
}

/// Container cleanup guard - guarantees container removal on drop
/// This ensures containers are cleaned up even if execution panics or is cancelled
struct ContainerGuard<'a> {
    docker: &'a Docker,
    container_id: String,
}

impl<'a> ContainerGuard<'a> {
    fn new(docker: &'a Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
        }
    }
}

impl<'a> Drop for ContainerGuard<'a> {
    fn drop(&mut self) {
        // Drop cannot be async; removal is handed to the runtime
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to clean up container");
            }
        });
    }
}

/// Container-per-execution engine
///
/// **Docker Execution Rules:**
/// 1. Pulls the runtime image if not present
/// 2. Bind-mounts the harness read-only at `/box/main<ext>`
/// 3. Mounts the argument payload read-only at `/box/input.json` and
///    redirects it into the runtime's stdin
/// 4. Network disabled; memory, CPU and pid limits enforced
/// 5. Kills the container on timeout; removes it on every path
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }

    /// Ensure the runtime image is available, pulling on cache miss
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull Docker image")?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    fn command(runtime: &LanguageConfig, target: &str, input: &str) -> Vec<String> {
        let mut runtime_cmd = vec![runtime.execution.command.clone()];
        runtime_cmd.extend(runtime.execution.args.iter().cloned());
        runtime_cmd.push(target.to_string());

        vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("{} < {}", runtime_cmd.join(" "), input),
        ]
    }
}

#[async_trait]
impl ExecutionEngine for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn run(&self, request: RunRequest<'_>) -> Result<RawRun> {
        let runtime = request.runtime;
        let image = runtime.image.as_str();
        self.ensure_image(image)
            .await
            .with_context(|| format!("Failed to ensure Docker image '{}' is available", image))?;

        let target = format!("/box/main{}", runtime.execution.file_extension);
        let host_path = request.harness_path.to_string_lossy().into_owned();

        // Large payloads do not fit in an env var or argv, so they travel as a file
        let input = write_scratch_file(request.stdin, ".json")?;
        let input_path = input.path().to_string_lossy().into_owned();
        let memory_mb = runtime.memory_limit_mb.max(request.memory_limit_mb) as i64;

        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(Self::command(runtime, &target, CONTAINER_INPUT_PATH)),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                binds: Some(vec![
                    format!("{}:{}:ro", host_path, target),
                    format!("{}:{}:ro", input_path, CONTAINER_INPUT_PATH),
                ]),
                memory: Some(memory_mb * 1024 * 1024),
                nano_cpus: Some((runtime.cpu_limit as f64 * 1_000_000_000.0) as i64),
                pids_limit: Some(64),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container_name = format!("arena-{}", uuid::Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create Docker container")?;
        let container_id = container.id.clone();
        let _guard = ContainerGuard::new(&self.docker, container_id.clone());

        let start = Instant::now();
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start Docker container")?;

        let execution = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let mut output_limited = false;

            let logs_options = Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: true,
                ..Default::default()
            });
            let mut logs = self.docker.logs(&container_id, logs_options);
            while let Some(output) = logs.next().await {
                match output {
                    Ok(LogOutput::StdOut { message }) => {
                        if stdout.len() + message.len() > MAX_STDOUT_BYTES {
                            let room = MAX_STDOUT_BYTES - stdout.len();
                            stdout.extend_from_slice(&message[..room]);
                            output_limited = true;
                            break;
                        }
                        stdout.extend_from_slice(&message);
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        let room = MAX_STDERR_BYTES.saturating_sub(stderr.len());
                        stderr.extend_from_slice(&message[..message.len().min(room)]);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Error reading container logs");
                        break;
                    }
                }
            }

            if output_limited {
                warn!(container_id = %container_id, "Output limit exceeded, killing container");
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container_id = %container_id, error = %e, "Failed to kill container");
                }
                return (stdout, stderr, None, true);
            }

            let wait_options = Some(WaitContainerOptions {
                condition: "not-running",
            });
            let mut wait = self.docker.wait_container(&container_id, wait_options);
            let exit_code = match wait.next().await {
                Some(Ok(response)) => Some(response.status_code),
                // bollard reports non-zero exits as an error carrying the code
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                    Some(code)
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to read container exit code");
                    None
                }
                None => None,
            };

            (stdout, stderr, exit_code, false)
        };

        let deadline = Duration::from_millis(request.timeout_ms);
        match tokio::time::timeout(deadline, execution).await {
            Ok((stdout, stderr, exit_code, output_limited)) => {
                let mut stderr = String::from_utf8_lossy(&stderr).into_owned();
                match exit_code {
                    Some(137) => stderr.push_str("\n[Container killed: likely exceeded memory limit]"),
                    Some(139) => stderr.push_str("\n[Container killed: segmentation fault]"),
                    _ => {}
                }
                Ok(RawRun {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr,
                    exit_code,
                    timed_out: false,
                    output_limited,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
            Err(_) => {
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container_id = %container_id, error = %e, "Failed to kill timed-out container");
                }
                Ok(RawRun {
                    stdout: String::new(),
                    stderr: String::from("[Execution timed out]"),
                    exit_code: None,
                    timed_out: true,
                    output_limited: false,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted engine for deterministic judging tests

    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    type Script = dyn Fn(&RunRequest<'_>) -> Result<RawRun> + Send + Sync;

    pub struct ScriptedEngine {
        script: Box<Script>,
        pub seen_paths: Mutex<Vec<PathBuf>>,
        pub seen_stdin: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        pub fn new<F>(script: F) -> Self
        where
            F: Fn(&RunRequest<'_>) -> Result<RawRun> + Send + Sync + 'static,
        {
            Self {
                script: Box::new(script),
                seen_paths: Mutex::new(Vec::new()),
                seen_stdin: Mutex::new(Vec::new()),
            }
        }

        /// Engine that answers every run with one JSON line on stdout
        pub fn answering<F>(answer: F) -> Self
        where
            F: Fn(&serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
        {
            Self::new(move |request| {
                let args: serde_json::Value = serde_json::from_str(request.stdin)?;
                Ok(RawRun {
                    stdout: format!("\n{}\n", answer(&args)),
                    exit_code: Some(0),
                    elapsed_ms: 5,
                    ..Default::default()
                })
            })
        }
    }

    #[async_trait]
    impl ExecutionEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn run(&self, request: RunRequest<'_>) -> Result<RawRun> {
            assert!(request.harness_path.exists(), "harness must exist while running");
            self.seen_paths
                .lock()
                .unwrap()
                .push(request.harness_path.to_path_buf());
            self.seen_stdin.lock().unwrap().push(request.stdin.to_string());
            // Let concurrent executions interleave while the harness is on disk
            tokio::task::yield_now().await;
            (self.script)(&request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LanguageConfigManager, LanguageExecution};
    use arena_common::types::Language;

    /// Runtime that feeds the harness file to `sh`
    fn shell_runtime() -> LanguageConfig {
        LanguageConfig {
            name: "sh".to_string(),
            version: "posix".to_string(),
            image: "busybox:latest".to_string(),
            execution: LanguageExecution {
                command: "sh".to_string(),
                args: Vec::new(),
                file_extension: ".sh".to_string(),
            },
            memory_limit_mb: 64,
            cpu_limit: 1.0,
        }
    }

    async fn run_script(script: &str, stdin: &str) -> RawRun {
        let runtime = shell_runtime();
        let harness = write_scratch_file(script, ".sh").unwrap();
        ProcessEngine::new()
            .run(RunRequest {
                runtime: &runtime,
                harness_path: harness.path(),
                stdin,
                timeout_ms: 20_000,
                memory_limit_mb: 64,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_docker_command_reads_mounted_input() {
        let manager = LanguageConfigManager::defaults();
        let python = manager.get_config(&Language::Python).unwrap();
        let cmd = DockerEngine::command(python, "/box/main.py", CONTAINER_INPUT_PATH);

        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[1], "-c");
        assert_eq!(cmd[2], "python3 -u /box/main.py < /box/input.json");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_docker_command_delivers_large_input() {
        // Well past the 128 KiB ceiling of a single env string
        let payload = format!("[{}]", vec!["1000000000"; 30_000].join(","));
        let input = write_scratch_file(&payload, ".json").unwrap();
        let harness = write_scratch_file("cat\n", ".sh").unwrap();

        let cmd = DockerEngine::command(
            &shell_runtime(),
            &harness.path().to_string_lossy(),
            &input.path().to_string_lossy(),
        );
        let output = Command::new(&cmd[0]).args(&cmd[1..]).output().await.unwrap();

        assert!(output.status.success());
        assert_eq!(String::from_utf8(output.stdout).unwrap(), payload);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_feeds_stdin() {
        let run = run_script("cat\n", "[[1, 2], 3]").await;
        assert_eq!(run.exit_code, Some(0));
        assert_eq!(run.stdout, "[[1, 2], 3]");
        assert!(!run.output_limited);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_kills_runaway_stdout() {
        let run = run_script("exec yes 0123456789abcdef\n", "[]").await;

        assert!(run.output_limited);
        assert!(!run.timed_out);
        assert_eq!(run.stdout.len(), MAX_STDOUT_BYTES);
        assert_ne!(run.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_caps_stderr() {
        let script = "head -c 200000 /dev/zero | tr '\\0' e >&2\necho '[0, 1]'\n";
        let run = run_script(script, "[]").await;

        assert_eq!(run.exit_code, Some(0));
        assert!(!run.output_limited);
        assert_eq!(run.stderr.len(), MAX_STDERR_BYTES);
        assert_eq!(run.stdout.trim(), "[0, 1]");
    }

    #[tokio::test]
    async fn test_scratch_file_removed_on_drop() {
        let file = write_scratch_file("print(1)", ".py").unwrap();
        let path = file.path().to_path_buf();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("arena-"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "print(1)");
        drop(file);
        assert!(!path.exists());
    }
}
