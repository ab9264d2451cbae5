// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Fitness-Progression: XP, levels, streaks, achievements and challenges
//!
//! This crate provides the progression engine of a fitness app and the
//! backend API that feeds it events and keeps each user's state in sync
//! between a remote store and a local mirror.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SnapshotStore;
use services::{
    CatalogService, EventRouter, Notifier, SessionContext, SessionRegistry, SyncService,
};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub catalog: CatalogService,
    pub router: Arc<EventRouter>,
    pub sessions: SessionRegistry,
}

impl AppState {
    /// Wire the engine together from its outer dependencies.
    pub fn new(
        config: Config,
        catalog: CatalogService,
        remote: Arc<dyn SnapshotStore>,
        local: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let router = Arc::new(EventRouter::new(
            config.progression.clone(),
            clock.clone(),
            notifier,
        ));
        let sync = Arc::new(SyncService::new(remote, local, &config.progression, clock));
        let sessions = SessionRegistry::new(SessionContext {
            router: router.clone(),
            sync,
            catalog: Arc::new(catalog.catalog().clone()),
            settings: config.sync.clone(),
        });

        Self {
            config,
            catalog,
            router,
            sessions,
        }
    }
}
