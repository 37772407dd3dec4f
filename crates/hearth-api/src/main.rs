//! Hearth API server entry point.

use std::sync::Arc;

use hearth_api::clients::{HttpAgentResponder, HttpCampaignDirectory};
use hearth_api::config::AppConfig;
use hearth_api::error::AppError;
use hearth_api::state::AppState;
use hearth_api::telemetry;
use hearth_core::clock::SystemClock;
use hearth_event_store::pg_event_repository::PgEventRepository;
use hearth_session::SessionOrchestrator;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Read configuration from environment.
    let config = AppConfig::from_env()?;

    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;
    tracing::info!("Starting Hearth session orchestrator");

    let result = serve(config).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "server stopped with an error");
    }

    telemetry.shutdown();
    result
}

async fn serve(config: AppConfig) -> Result<(), AppError> {
    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    hearth_event_store::run_migrations(&pool).await?;

    // Wire the orchestrator to its collaborators.
    let http = reqwest::Client::new();
    let orchestrator = SessionOrchestrator::new(
        Arc::new(PgEventRepository::new(pool)),
        Arc::new(HttpCampaignDirectory::new(
            http.clone(),
            config.campaign_service_url.clone(),
        )),
        Arc::new(HttpAgentResponder::new(http, &config.agent_responder_url)),
        Arc::new(SystemClock),
        config.orchestrator,
    );

    let app = hearth_api::app(AppState::new(orchestrator));

    // Start server.
    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
