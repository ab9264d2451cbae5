// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use fitness_progression::config::{Config, SyncSettings};
use fitness_progression::db::{FirestoreDb, MemoryStore, SnapshotStore};
use fitness_progression::models::ProgressionState;
use fitness_progression::routes::create_router;
use fitness_progression::services::{CatalogService, RecordingNotifier};
use fitness_progression::time_utils::FixedClock;
use fitness_progression::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Small catalog with one entry per interesting metric.
///
/// `spring-sprint` is active at [`test_now`]; `winter-warmup` has expired.
#[allow(dead_code)]
pub const TEST_CATALOG: &str = r#"{
  "achievements": [
    { "id": "first-workout", "title": "First Sweat", "category": "workout",
      "rarity": "common", "metric": "workouts_completed", "requirement": 1,
      "reward": { "xp": 25 } },
    { "id": "first-video", "title": "Student", "category": "learning",
      "rarity": "common", "metric": "videos_watched", "requirement": 1,
      "reward": { "xp": 20 } },
    { "id": "level-2", "title": "Moving Up", "category": "milestone",
      "rarity": "common", "metric": "level_reached", "requirement": 2,
      "reward": { "xp": 30 } },
    { "id": "streak-3", "title": "Three in a Row", "category": "consistency",
      "rarity": "rare", "metric": "streak_days", "requirement": 3,
      "reward": { "xp": 40 } }
  ],
  "challenges": [
    { "id": "spring-sprint", "title": "Spring Sprint",
      "requirements": [
        { "description": "Complete 2 workouts", "metric": "workouts_completed", "target": 2 }
      ],
      "startDate": "2026-05-15T00:00:00Z", "endDate": "2026-06-30T00:00:00Z",
      "participants": 120, "rewards": { "xp": 200 } },
    { "id": "winter-warmup", "title": "Winter Warmup",
      "requirements": [
        { "description": "Complete a workout", "metric": "workouts_completed", "target": 1 }
      ],
      "startDate": "2026-01-01T00:00:00Z", "endDate": "2026-02-01T00:00:00Z",
      "rewards": { "xp": 100 } }
  ]
}"#;

/// 2026-06-01 09:00 UTC, a Monday.
#[allow(dead_code)]
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

/// Fast persistence timing; the periodic sync never fires during a test.
#[allow(dead_code)]
pub fn fast_sync() -> SyncSettings {
    SyncSettings {
        interval: Duration::from_secs(3600),
        save_debounce: Duration::from_millis(20),
        retry_base: Duration::from_millis(50),
    }
}

/// Everything a test needs to drive the app and inspect its surroundings.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub clock: Arc<FixedClock>,
    pub remote: Arc<MemoryStore>,
    pub local: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Create a test app backed by in-memory stores and a fixed clock.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
}

/// Same as [`create_test_app`] but over existing stores, so a second app
/// can pick up what a first one saved.
#[allow(dead_code)]
pub fn create_test_app_with(remote: Arc<MemoryStore>, local: Arc<MemoryStore>) -> TestApp {
    create_test_app_with_sync(remote, local, fast_sync())
}

/// Test app with custom persistence timing.
#[allow(dead_code)]
pub fn create_test_app_with_sync(
    remote: Arc<MemoryStore>,
    local: Arc<MemoryStore>,
    sync: SyncSettings,
) -> TestApp {
    let config = Config {
        sync,
        ..Config::test_default()
    };
    let catalog = CatalogService::load_from_json(TEST_CATALOG).expect("test catalog is valid");
    let clock = Arc::new(FixedClock::new(test_now()));
    let notifier = Arc::new(RecordingNotifier::default());

    let state = Arc::new(AppState::new(
        config,
        catalog,
        remote.clone(),
        local.clone(),
        clock.clone(),
        notifier.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        clock,
        remote,
        local,
        notifier,
    }
}

impl TestApp {
    /// Send a request and return status plus the parsed JSON body.
    #[allow(dead_code)]
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Decoded snapshot currently held by the remote store.
    #[allow(dead_code)]
    pub async fn remote_state(&self, user_id: &str) -> Option<ProgressionState> {
        stored_state(self.remote.as_ref(), user_id).await
    }

    /// Decoded snapshot currently held by the local mirror.
    #[allow(dead_code)]
    pub async fn local_state(&self, user_id: &str) -> Option<ProgressionState> {
        stored_state(self.local.as_ref(), user_id).await
    }
}

#[allow(dead_code)]
pub async fn stored_state(store: &dyn SnapshotStore, user_id: &str) -> Option<ProgressionState> {
    store
        .get_snapshot(user_id)
        .await
        .ok()
        .flatten()
        .map(|doc| doc.open().expect("stored snapshot opens"))
}

/// Parse a response body as JSON; an empty body becomes `Null`.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

/// Poll `check` until it holds or two seconds pass.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
