//! Box Office daemon
//!
//! Hosts the reservation core: opens the database, runs the expiry sweeper
//! and shuts down cleanly on Ctrl-C.

use std::path::PathBuf;

use boxoffice_core::Sweeper;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod state;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting boxofficed");

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    // Initialize application state
    let app_state = match state::AppState::new(config_path) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize box office: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(data_dir = %app_state.data_dir().display(), "Box office ready");

    let sweeper = Sweeper::start(app_state.office.clone());

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }

    tracing::info!("Shutting down");
    sweeper.shutdown().await;
}
