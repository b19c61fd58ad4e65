use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod db;
mod error;
mod history;
mod llm;
mod util;
mod viz;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Initialize the NL-to-SQL engine with the configured provider
    info!("Initializing AI provider: {}", config.llm.provider);
    let llm = match LlmManager::new(&config.llm) {
        Ok(llm) => llm,
        Err(e) => {
            error!("Failed to initialize AI provider: {}", e);
            return Err(e.into());
        }
    };

    // Create application state: connection registry + query history
    let app_state = Arc::new(AppState::new(config.clone(), llm));

    // Start the web server
    info!(
        "Starting nl-lens server on {}:{}",
        config.web.host, config.web.port
    );
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(std::io::Error::other(e.to_string()).into());
        }
    }

    Ok(())
}
