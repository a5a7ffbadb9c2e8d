mod configuration;
mod error;
mod routes;
mod state;

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = configuration::Settings::new()?;
    let state = state::AppState::from_settings(&settings);
    if state.documents.is_mock() {
        info!("serving mock EDI data");
    }

    let app = routes::configure(state).layer(routes::cors_layer(&settings.server.cors_origins()));

    let listener = tokio::net::TcpListener::bind(settings.server.address()).await?;
    info!("listening on {}", listener.local_addr()?);
    info!(environment = %settings.server.environment, "health check at /api/health");

    axum::serve(listener, app).await?;
    Ok(())
}
