// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitness-Progression API Server
//!
//! Turns workouts, videos, goals and logins into XP, levels, streaks and
//! achievements, and keeps each user's progression synced.

use fitness_progression::{
    config::{Config, RemoteStoreKind},
    db::{FirestoreDb, LocalFileStore, SnapshotStore},
    services::{BroadcastNotifier, CatalogService},
    time_utils::SystemClock,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Buffered notifications per subscriber before the slowest one lags.
const NOTIFICATION_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Fitness-Progression API");

    // Remote store; offline mode runs on the local mirror alone
    let remote: Arc<dyn SnapshotStore> = match config.remote_store {
        RemoteStoreKind::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore"),
        ),
        RemoteStoreKind::Offline => {
            tracing::warn!("Remote store disabled; running on the local mirror only");
            Arc::new(FirestoreDb::new_mock())
        }
    };
    let local: Arc<dyn SnapshotStore> = Arc::new(LocalFileStore::new(&config.local_store_dir));
    tracing::info!(dir = %config.local_store_dir.display(), "Local mirror ready");

    // Load achievement/challenge catalog
    tracing::info!(path = %config.catalog_path.display(), "Loading catalog");
    let catalog =
        CatalogService::load_from_file(&config.catalog_path).expect("Failed to load catalog");

    let notifier = Arc::new(BroadcastNotifier::new(NOTIFICATION_CAPACITY));
    let mut notifications = notifier.subscribe();
    tokio::spawn(async move {
        // Delivery is out of scope here; record what would be sent
        while let Ok(sent) = notifications.recv().await {
            tracing::info!(
                user_id = %sent.user_id,
                notification = ?sent.notification,
                "Notification"
            );
        }
    });

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        catalog,
        remote,
        local,
        Arc::new(SystemClock),
        notifier,
    ));

    // Build router
    let app = fitness_progression::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush every open session before exiting
    state.sessions.end_all().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fitness_progression=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
