mod commands;
mod logging;
mod sources;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tapline",
    version,
    about = "Desktop-resident ETL engine: relational sources to REST targets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one job to completion and report the outcome
    Run {
        /// Path to the job definitions JSON file
        definitions: PathBuf,
        /// Id of the job to run
        job_id: String,
        /// Persist dead letters to this directory
        #[arg(long)]
        dead_letter_dir: Option<PathBuf>,
    },
    /// Run scheduled jobs until interrupted
    Serve {
        /// Path to the job definitions JSON file
        definitions: PathBuf,
        /// Persist dead letters to this directory
        #[arg(long)]
        dead_letter_dir: Option<PathBuf>,
        /// Mirror tapped messages to JSON files in this directory
        #[arg(long)]
        message_dir: Option<PathBuf>,
    },
    /// Validate job definitions without running anything
    Check {
        /// Path to the job definitions JSON file
        definitions: PathBuf,
    },
    /// List dead-lettered messages from a durable directory
    Dlq {
        /// Directory holding failed_*.json files
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { definitions, job_id, dead_letter_dir } => {
            commands::run::execute(&definitions, &job_id, dead_letter_dir).await
        }
        Commands::Serve { definitions, dead_letter_dir, message_dir } => {
            commands::serve::execute(&definitions, dead_letter_dir, message_dir).await
        }
        Commands::Check { definitions } => commands::check::execute(&definitions),
        Commands::Dlq { dir } => commands::dlq::execute(&dir),
    }
}
