//! cleanup-api server entry point

use anyhow::Result;
use cleanup_api::{ApiSettings, AppState, router};
use log::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env file is normal outside development
        if !e.not_found() {
            eprintln!("Failed to read .env: {e}");
        }
    }

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory (default database location)
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let settings = ApiSettings::from_env()?;
    if !settings.oauth_configured() {
        warn!("GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET not set; account linking is disabled");
    }
    let state = AppState::from_settings(&settings)?;
    info!("Using database at {}", settings.database_path.display());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("cleanup-api listening on {}", settings.bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
