use erp_intelligence_router::{
    agent::{Orchestrator, RunRequest},
    config::Settings,
    gemini::GeminiClient,
    staging::StagedFile,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: router <query> [file]";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(query) = args.next() else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    };

    let settings = Settings::from_env()?;

    // Specialists only read files from the upload directory, so the
    // argument is staged there like an HTTP upload
    let mut request = RunRequest::new(query);
    let mut staged = None;
    if let Some(file) = args.next().map(PathBuf::from) {
        match StagedFile::copy_from(&settings.upload_dir, &file).await {
            Ok(copy) => {
                request = request.with_file(copy.path());
                staged = Some(copy);
            }
            Err(e) => {
                // Handlers narrate the unreadable file instead of aborting
                warn!(path = %file.display(), error = %e, "Could not stage file");
                request = request.with_file(file);
            }
        }
    }

    let engine = Arc::new(GeminiClient::from_settings(&settings)?);
    let orchestrator = Orchestrator::from_settings(&settings, engine)?;

    info!(query = %request.query, "Running orchestrator");

    // Run orchestration
    let outcome = orchestrator.run(request).await;
    drop(staged);

    match outcome {
        Ok(state) => {
            println!("\n=== ROUTING RESULT ===");
            println!("Run ID: {}", state.run_id());
            println!("Agent Used: {}", state.agent_used());
            println!("\nAnswer:\n{}", state.answer());
            println!("\nTrace:");
            for (i, entry) in state.trace().iter().enumerate() {
                println!("  {}: {}", i + 1, entry);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprintln!("Agent Used: {}", failure.agent_used());
            eprintln!("{}", failure.error.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}
