//! Assistant chat server
//!
//! Entry point: load configuration and secrets, bind the assistant, serve.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use assistant_chat::config::{AppConfig, AssistantSettings};
use assistant_chat::{server, telemetry};
use dotenvy::dotenv;

#[tokio::main]
async fn main() {
    // Load .env (if present) before anything reads the environment
    let _ = dotenv();

    telemetry::init();

    let config = match AppConfig::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // Fail fast: both secrets must be present before any remote call
    let settings = match AssistantSettings::from_env() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Configuration error");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::start_server(config, settings).await {
        tracing::error!(error = %e, "Server failed to start");
        std::process::exit(1);
    }
}
