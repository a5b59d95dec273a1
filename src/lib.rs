pub mod clients;
pub mod codegen;
pub mod config;
pub mod media;
pub mod narration;
pub mod orchestrator;
pub mod process;
pub mod render;
pub mod store;
pub mod tts;

use clap::{Parser, Subcommand};
use clients::Clients;
use orchestrator::{GenerationRequest, JobError, JobOrchestrator};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "edututor",
    version,
    about = "Turns a prompt into a narrated educational video"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one job to completion and print its status
    Generate {
        prompt: String,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        grade_level: Option<String>,
        #[arg(long, default_value_t = 3.0)]
        duration_minutes: f64,
        #[arg(long)]
        voice_id: Option<String>,
    },
    /// Print the status of a job
    Status { job_id: String },
    /// Print the servable video path of a job
    Video { job_id: String },
}

#[derive(Serialize)]
struct GenerateOutput<'a> {
    job_id: &'a str,
    status: store::StatusReport,
}

pub fn run() -> Result<(), String> {
    // Load environment variables from .env file
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    runtime
        .block_on(execute(cli.command))
        .map_err(|e| e.to_string())
}

async fn execute(command: Command) -> Result<(), JobError> {
    let config = config::load()?;

    match command {
        Command::Generate {
            prompt,
            topic,
            grade_level,
            duration_minutes,
            voice_id,
        } => {
            let clients = Clients::from_env(&config);
            let orchestrator = JobOrchestrator::new(&clients, &config);
            let request = GenerationRequest {
                prompt,
                topic,
                grade_level,
                duration_minutes,
                voice_id,
            };

            let job = orchestrator.submit(request)?;
            let job_id = job.job_id.clone();
            job.wait().await;

            print_json(&GenerateOutput {
                job_id: &job_id,
                status: orchestrator.status(&job_id),
            })
        }
        Command::Status { job_id } => {
            let store = store::ArtifactStore::from_config(&config);
            print_json(&store.status(&job_id))
        }
        Command::Video { job_id } => {
            let store = store::ArtifactStore::from_config(&config);
            match store.video_path(&job_id) {
                Some(path) => {
                    println!("{}", path.display());
                    Ok(())
                }
                None => Err(JobError::InvalidRequest(format!(
                    "no servable video for {} ({})",
                    job_id,
                    store.status(&job_id).message
                ))),
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), JobError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| JobError::Unexpected(format!("status serialization failed: {}", e)))?;
    println!("{}", json);
    Ok(())
}
