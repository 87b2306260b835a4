use erp_intelligence_router::{
    agent::Orchestrator,
    api::{start_server, ApiState},
    config::Settings,
    gemini::GeminiClient,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    info!("ERP Intelligence Router - API Server");
    info!(
        project = %settings.project_name,
        model = %settings.model_name,
        port = settings.port,
        "Settings loaded"
    );

    // Create components
    let engine = Arc::new(GeminiClient::from_settings(&settings)?);
    let orchestrator = Arc::new(Orchestrator::from_settings(&settings, engine)?);

    let port = settings.port;
    let state = ApiState {
        orchestrator,
        settings: Arc::new(settings),
    };

    info!("Starting API server...");

    // Start API server
    start_server(state, port).await?;

    Ok(())
}
