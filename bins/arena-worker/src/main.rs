mod config;
mod engine;
mod evaluator;
mod executor;
mod harness;
mod runner;
mod tiers;


use arena_common::config::ArenaConfig;
use arena_common::redis::{self, PoppedJob};
use arena_common::types::JobOutcome;
use arena_common::store::RedisStore;
use config::{EngineKind, LanguageConfigManager, WorkerConfig};
use engine::{DockerEngine, ExecutionEngine, ProcessEngine};
use executor::{process_job, Judge};
use runner::CaseRunner;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, instrument, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Arena Worker booting...");

    let arena_config = ArenaConfig::from_env();
    let worker_config = WorkerConfig::from_env()?;

    // Load language configurations
    let languages = if worker_config.languages_path.exists() {
        LanguageConfigManager::load(&worker_config.languages_path).map_err(|e| {
            error!("Failed to load language configurations: {}", e);
            e
        })?
    } else {
        warn!(
            path = %worker_config.languages_path.display(),
            "Language config not found, using built-in runtimes"
        );
        LanguageConfigManager::defaults()
    };
    info!("Loaded language configurations for: {:?}", languages.list_languages());

    let engine: Arc<dyn ExecutionEngine> = match worker_config.engine {
        EngineKind::Process => {
            warn!("Process engine runs submissions unsandboxed on this host");
            Arc::new(ProcessEngine::new())
        }
        EngineKind::Docker => Arc::new(DockerEngine::connect()?),
    };
    info!("Execution engine: {}", engine.name());

    let judge = Judge::new(CaseRunner::new(engine, languages)?);

    // Connect to Redis
    let client = ::redis::Client::open(arena_config.redis_url.as_str())?;
    let mut redis_conn = ::redis::aio::ConnectionManager::new(client).await?;
    let store = RedisStore::new(redis_conn.clone());

    info!("Connected to Redis: {}", arena_config.redis_url);

    // Setup graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        warn!("Received shutdown signal, stopping worker...");
    };

    tokio::select! {
        _ = worker_loop(&mut redis_conn, &judge, &store, &arena_config) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip_all)]
async fn worker_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    judge: &Judge,
    store: &RedisStore,
    config: &ArenaConfig,
) {
    loop {
        // BLPOP with a timeout so shutdown is noticed on an idle queue
        match redis::pop_job(redis_conn, config.poll_timeout_seconds).await {
            Ok(Some(PoppedJob::Job(job))) => {
                let job_id = job.id;
                info!(
                    job_id = %job_id,
                    challenge_id = %job.challenge_id,
                    language = %job.language,
                    mode = %job.mode,
                    source_size = job.source_code.len(),
                    "Received job"
                );

                let start = std::time::Instant::now();
                let outcome = process_job(judge, store, store, &job).await;
                info!(
                    job_id = %job_id,
                    state = ?outcome.state,
                    verdict = ?outcome.result.as_ref().map(|r| r.verdict),
                    wall_ms = start.elapsed().as_millis() as u64,
                    "Job finished"
                );

                // Persist outcome to Redis
                match redis::store_outcome(redis_conn, &outcome, config.result_ttl_seconds).await {
                    Ok(_) => {
                        info!(job_id = %job_id, "Outcome persisted to Redis");
                    }
                    Err(e) => {
                        // Non-fatal, the worker keeps serving
                        error!(job_id = %job_id, error = %e, "Failed to persist outcome");
                    }
                }
            }
            Ok(Some(PoppedJob::Malformed {
                job_id,
                payload,
                error,
            })) => {
                let preview: String = payload.chars().take(200).collect();
                warn!(job_id = ?job_id, error = %error, payload = %preview, "Dropping malformed job");

                // A recoverable id means a client is polling for this job
                if let Some(job_id) = job_id {
                    let outcome = JobOutcome::failed(job_id, format!("Malformed job payload: {}", error));
                    if let Err(e) =
                        redis::store_outcome(redis_conn, &outcome, config.result_ttl_seconds).await
                    {
                        error!(job_id = %job_id, error = %e, "Failed to persist outcome");
                    }
                }
            }
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
