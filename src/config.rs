// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Progression tuning (the XP curve, bonuses, retention caps) lives in
//! [`ProgressionSettings`]; its `Default` holds the production values.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which remote store backs the sync service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStoreKind {
    /// Google Cloud Firestore (or its emulator).
    Firestore,
    /// No remote store; every sync degrades to the local mirror.
    Offline,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Remote store backend
    pub remote_store: RemoteStoreKind,
    /// Directory holding the local snapshot mirror
    pub local_store_dir: PathBuf,
    /// Achievement/challenge catalog file
    pub catalog_path: PathBuf,
    /// Progression tuning
    pub progression: ProgressionSettings,
    /// Session persistence timing
    pub sync: SyncSettings,
}

/// Constants of the progression engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressionSettings {
    /// Highest reachable level; XP keeps accruing after it.
    pub max_level: u32,
    /// XP required to go from level 1 to level 2.
    pub curve_base: f64,
    /// Per-level growth factor of the requirement.
    pub curve_growth: f64,
    /// XP granted once per calendar day on login.
    pub login_bonus_xp: u64,
    /// Extra XP on every fifth consecutive day.
    pub streak_boost_xp: u64,
    /// Maximum retained XP history entries (most recent first).
    pub xp_history_cap: usize,
    /// Activity records older than this are pruned from saved snapshots.
    pub activity_retention_days: i64,
    /// Base XP for each event type.
    pub video_watched_xp: u64,
    pub workout_completed_xp: u64,
    pub goal_completed_xp: u64,
    /// Workout bonus: XP per full block of `workout_bonus_minutes`.
    pub workout_bonus_xp_per_block: u64,
    pub workout_bonus_minutes: u32,
    pub workout_bonus_cap_xp: u64,
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        Self {
            max_level: 50,
            curve_base: 100.0,
            curve_growth: 1.15,
            login_bonus_xp: 10,
            streak_boost_xp: 50,
            xp_history_cap: 50,
            activity_retention_days: 365,
            video_watched_xp: 10,
            workout_completed_xp: 50,
            goal_completed_xp: 100,
            workout_bonus_xp_per_block: 5,
            workout_bonus_minutes: 10,
            workout_bonus_cap_xp: 50,
        }
    }
}

/// Timing of session persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Periodic reconciliation interval while online.
    pub interval: Duration,
    /// Delay between the last mutation and the debounced save.
    pub save_debounce: Duration,
    /// First retry delay after a failed save; doubles up to `interval`.
    pub retry_base: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            save_debounce: Duration::from_millis(2000),
            retry_base: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Config for tests: offline remote store and a temp-dir local mirror.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            remote_store: RemoteStoreKind::Offline,
            local_store_dir: env::temp_dir().join("fitness-progression-test"),
            catalog_path: PathBuf::from("data/catalog.json"),
            progression: ProgressionSettings::default(),
            sync: SyncSettings::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let remote_store = match env::var("REMOTE_STORE")
            .unwrap_or_else(|_| "firestore".to_string())
            .as_str()
        {
            "firestore" => RemoteStoreKind::Firestore,
            "offline" => RemoteStoreKind::Offline,
            _ => return Err(ConfigError::Invalid("REMOTE_STORE")),
        };

        let gcp_project_id = match (env::var("GCP_PROJECT_ID"), remote_store) {
            (Ok(id), _) => id,
            (Err(_), RemoteStoreKind::Offline) => "local-dev".to_string(),
            (Err(_), RemoteStoreKind::Firestore) => {
                return Err(ConfigError::Missing("GCP_PROJECT_ID"))
            }
        };

        let progression = ProgressionSettings {
            max_level: parse_var("MAX_LEVEL", 50)?,
            ..ProgressionSettings::default()
        };
        if progression.max_level < 2 {
            return Err(ConfigError::Invalid("MAX_LEVEL"));
        }

        let sync = SyncSettings {
            interval: Duration::from_secs(parse_var("SYNC_INTERVAL_SECS", 300)?),
            save_debounce: Duration::from_millis(parse_var("SAVE_DEBOUNCE_MS", 2000)?),
            ..SyncSettings::default()
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id,
            port: parse_var("PORT", 8080)?,
            remote_store,
            local_store_dir: env::var("LOCAL_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".progression")),
            catalog_path: env::var("CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/catalog.json")),
            progression,
            sync,
        })
    }
}

/// Parse an optional numeric env var, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
