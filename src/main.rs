// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Balance Tracker server
//!
//! Serves the Google sign-in flow, the balance pages and the JSON API on
//! top of a Supabase project (auth and the `profiles` table).

use balance_tracker::{
    config::Config, db::PostgrestProfileStore, services::GoTrueClient, AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        site_url = %config.site_url,
        project = %config.project_ref(),
        "Starting Balance Tracker"
    );

    let auth_api = Arc::new(GoTrueClient::new(&config).expect("Failed to build auth client"));
    let profiles =
        Arc::new(PostgrestProfileStore::new(&config).expect("Failed to build profile store"));
    tracing::info!("Supabase clients initialized");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        auth_api,
        profiles,
    });

    // Build router
    let app = balance_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("balance_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
