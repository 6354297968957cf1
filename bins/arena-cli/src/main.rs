mod commands;

use anyhow::Result;
use arena_common::config::ArenaConfig;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arena-cli")]
#[command(about = "Arena CLI - Manage runtimes, runner images, and challenges", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Arena project
    Init {
        /// Project path
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// List configured language runtimes
    ListLangs {
        /// Path to languages.json
        #[arg(short, long, default_value = "config/languages.json")]
        config: String,
    },

    /// Upsert challenges from a JSON file into Redis
    Seed {
        /// Challenge file (JSON array)
        #[arg(short, long, default_value = "config/challenges.json")]
        file: String,

        /// Redis URL (defaults to REDIS_URL)
        #[arg(long)]
        redis_url: Option<String>,
    },

    /// List challenges stored in Redis
    Challenges {
        /// Redis URL (defaults to REDIS_URL)
        #[arg(long)]
        redis_url: Option<String>,
    },

    /// Generate and build the runner image for a language
    BuildImage {
        /// Language name
        #[arg(short, long)]
        name: String,

        /// Skip build cache
        #[arg(long, default_value = "false")]
        no_cache: bool,

        /// Path to languages.json
        #[arg(short, long, default_value = "config/languages.json")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let redis_url = |flag: Option<String>| flag.unwrap_or_else(|| ArenaConfig::from_env().redis_url);

    match cli.command {
        Commands::Init { path } => {
            commands::init_project(&path)?;
        }
        Commands::ListLangs { config } => {
            commands::list_languages(&config)?;
        }
        Commands::Seed { file, redis_url: url } => {
            commands::seed_challenges(&file, &redis_url(url)).await?;
        }
        Commands::Challenges { redis_url: url } => {
            commands::list_challenges(&redis_url(url)).await?;
        }
        Commands::BuildImage {
            name,
            no_cache,
            config,
        } => {
            commands::build_docker_image(&name, no_cache, &config)?;
        }
    }

    Ok(())
}
