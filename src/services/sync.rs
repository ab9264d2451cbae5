// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Snapshot persistence across the remote store and the local mirror.
//!
//! Remote failures never interrupt the caller's flow: the local mirror is
//! still written, the failure is logged, and `SyncUnavailable` tells the
//! session to retry later. A snapshot that fails its integrity check is
//! treated as absent and never adopted.

use std::sync::Arc;

use crate::config::ProgressionSettings;
use crate::db::SnapshotStore;
use crate::error::{AppError, Result};
use crate::models::{ProgressionState, SnapshotDocument};
use crate::services::level::LevelCurve;
use crate::services::reconcile;
use crate::time_utils::Clock;

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Local,
}

#[derive(Clone)]
pub struct SyncService {
    remote: Arc<dyn SnapshotStore>,
    local: Arc<dyn SnapshotStore>,
    curve: LevelCurve,
    xp_history_cap: usize,
    activity_retention_days: i64,
    clock: Arc<dyn Clock>,
}

impl SyncService {
    pub fn new(
        remote: Arc<dyn SnapshotStore>,
        local: Arc<dyn SnapshotStore>,
        settings: &ProgressionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            local,
            curve: LevelCurve::from_settings(settings),
            xp_history_cap: settings.xp_history_cap,
            activity_retention_days: settings.activity_retention_days,
            clock,
        }
    }

    /// Copy of `state` with the next version and sync time, pruned for storage.
    fn prepare(&self, state: &ProgressionState) -> Result<(ProgressionState, SnapshotDocument)> {
        let now = self.clock.now();
        let mut next = state.clone();
        next.version = state.version + 1;
        next.last_sync_at = Some(now);
        next.prune_activity_log(now, self.activity_retention_days);

        let doc = SnapshotDocument::seal(&next)?;
        Ok((next, doc))
    }

    /// Write the next version to the remote store and mirror it locally.
    ///
    /// Returns the state as saved. If the remote write fails the local
    /// mirror is still written and the result is `SyncUnavailable`.
    pub async fn save(&self, state: &ProgressionState) -> Result<ProgressionState> {
        let (next, doc) = self.prepare(state)?;

        let remote_result = self.remote.put_snapshot(&doc).await;
        self.mirror(&doc).await;

        match remote_result {
            Ok(()) => {
                tracing::info!(
                    user_id = %next.user_id,
                    version = next.version,
                    store = self.remote.name(),
                    "Snapshot saved"
                );
                Ok(next)
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %next.user_id,
                    version = next.version,
                    store = self.remote.name(),
                    error = %e,
                    "Remote save failed; continuing on local mirror"
                );
                Err(AppError::SyncUnavailable(e.to_string()))
            }
        }
    }

    /// Write only the local mirror (offline mode).
    pub async fn save_local(&self, state: &ProgressionState) -> Result<()> {
        let (_, doc) = self.prepare(state)?;
        self.local.put_snapshot(&doc).await
    }

    async fn mirror(&self, doc: &SnapshotDocument) {
        if let Err(e) = self.local.put_snapshot(doc).await {
            tracing::warn!(user_id = %doc.user_id, error = %e, "Local mirror write failed");
        }
    }

    /// Remote first; on unavailability, absence or corruption fall back to
    /// the local mirror.
    pub async fn load(&self, user_id: &str) -> Result<Option<(ProgressionState, LoadSource)>> {
        match self.fetch_remote(user_id).await {
            Ok(Some(state)) => return Ok(Some((state, LoadSource::Remote))),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Remote load failed; trying local mirror");
            }
        }

        Ok(self
            .fetch_local(user_id)
            .await
            .map(|state| (state, LoadSource::Local)))
    }

    /// Load both copies and merge them when both exist.
    ///
    /// A local mirror that is ahead of the remote (a save that never reached
    /// it) is not lost this way.
    pub async fn restore(&self, user_id: &str) -> Option<ProgressionState> {
        let remote = match self.fetch_remote(user_id).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Remote unavailable at startup; degraded mode");
                None
            }
        };
        let local = self.fetch_local(user_id).await;

        match (local, remote) {
            (Some(local), Some(remote)) => Some(self.reconcile(&local, &remote)),
            (local, remote) => local.or(remote),
        }
    }

    /// Read and verify the remote copy.
    ///
    /// A corrupt snapshot is logged and reported as absent; an unreachable
    /// store is `SyncUnavailable`.
    pub async fn fetch_remote(&self, user_id: &str) -> Result<Option<ProgressionState>> {
        let doc = self
            .remote
            .get_snapshot(user_id)
            .await
            .map_err(|e| AppError::SyncUnavailable(e.to_string()))?;
        Ok(doc.and_then(|doc| self.verified(doc, self.remote.name())))
    }

    async fn fetch_local(&self, user_id: &str) -> Option<ProgressionState> {
        match self.local.get_snapshot(user_id).await {
            Ok(doc) => doc.and_then(|doc| self.verified(doc, self.local.name())),
            Err(e) => {
                tracing::error!(user_id, error = %e, "Local mirror unreadable; ignoring it");
                None
            }
        }
    }

    fn verified(&self, doc: SnapshotDocument, store: &str) -> Option<ProgressionState> {
        match doc.open() {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!(
                    user_id = %doc.user_id,
                    version = doc.version,
                    store,
                    error = %e,
                    "Rejected corrupt snapshot"
                );
                None
            }
        }
    }

    /// Merge two divergent states without losing progress from either.
    pub fn reconcile(&self, local: &ProgressionState, remote: &ProgressionState) -> ProgressionState {
        let merged = reconcile::reconcile(local, remote, &self.curve, self.xp_history_cap);
        if merged.level.total_xp != local.level.total_xp
            || merged.tracker.achievements != local.tracker.achievements
        {
            tracing::info!(
                user_id = %merged.user_id,
                local_xp = local.level.total_xp,
                remote_xp = remote.level.total_xp,
                merged_xp = merged.level.total_xp,
                "Reconciled divergent snapshots"
            );
        }
        merged
    }

    /// Fetch, merge and save in one go; returns the saved state.
    pub async fn force_sync(&self, state: &ProgressionState) -> Result<ProgressionState> {
        let merged = match self.fetch_remote(&state.user_id).await? {
            Some(remote) => self.reconcile(state, &remote),
            None => state.clone(),
        };
        self.save(&merged).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{LevelState, XpCategory, XpGrant};
    use crate::time_utils::FixedClock;
    use chrono::{TimeZone, Utc};

    struct Harness {
        remote: Arc<MemoryStore>,
        local: Arc<MemoryStore>,
        sync: SyncService,
    }

    fn harness() -> Harness {
        let remote = Arc::new(MemoryStore::new());
        let local = Arc::new(MemoryStore::new());
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap());
        let sync = SyncService::new(
            remote.clone(),
            local.clone(),
            &ProgressionSettings::default(),
            Arc::new(clock),
        );
        Harness {
            remote,
            local,
            sync,
        }
    }

    fn state(total_xp: u64) -> ProgressionState {
        let curve = LevelCurve::default();
        let level = curve.state_for_total(total_xp, &LevelState::starting(100));
        ProgressionState::new("user-1", level)
    }

    #[tokio::test]
    async fn test_save_bumps_version_and_mirrors() {
        let h = harness();

        let saved = h.sync.save(&state(40)).await.unwrap();

        assert_eq!(saved.version, 1);
        assert!(saved.last_sync_at.is_some());
        assert_eq!(h.remote.write_count(), 1);
        assert_eq!(h.local.write_count(), 1);

        let again = h.sync.save(&saved).await.unwrap();
        assert_eq!(again.version, 2);
    }

    #[tokio::test]
    async fn test_remote_outage_degrades_to_local() {
        let h = harness();
        h.remote.set_available(false);

        let result = h.sync.save(&state(40)).await;

        assert!(matches!(result, Err(AppError::SyncUnavailable(_))));
        assert_eq!(h.local.write_count(), 1);

        let (loaded, source) = h.sync.load("user-1").await.unwrap().unwrap();
        assert_eq!(source, LoadSource::Local);
        assert_eq!(loaded.level.total_xp, 40);
    }

    #[tokio::test]
    async fn test_load_prefers_remote() {
        let h = harness();
        h.sync.save(&state(70)).await.unwrap();

        let (loaded, source) = h.sync.load("user-1").await.unwrap().unwrap();
        assert_eq!(source, LoadSource::Remote);
        assert_eq!(loaded.level.total_xp, 70);
    }

    #[tokio::test]
    async fn test_load_nothing() {
        let h = harness();
        assert!(h.sync.load("user-1").await.unwrap().is_none());
        assert!(h.sync.restore("user-1").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_remote_treated_as_absent() {
        let h = harness();
        let mut value = serde_json::to_value(state(500)).unwrap();
        value.as_object_mut().unwrap().remove("achievements");
        h.remote.insert_raw(SnapshotDocument {
            user_id: "user-1".to_string(),
            version: 9,
            updated_at: Utc::now(),
            checksum: None,
            payload: value.to_string(),
        });

        assert!(h.sync.fetch_remote("user-1").await.unwrap().is_none());
        assert!(h.sync.load("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_merges_local_ahead_of_remote() {
        let h = harness();
        let saved = h.sync.save(&state(100)).await.unwrap();

        // A later save that only reached the local mirror
        h.remote.set_available(false);
        let mut ahead = saved.clone();
        ahead.level = LevelCurve::default().state_for_total(300, &ahead.level);
        ahead.xp_history.push(XpGrant::new(
            200,
            "Offline workout",
            XpCategory::Bonus,
            Utc::now(),
        ));
        assert!(h.sync.save(&ahead).await.is_err());
        h.remote.set_available(true);

        let restored = h.sync.restore("user-1").await.unwrap();
        assert_eq!(restored.level.total_xp, 300);
        assert_eq!(restored.xp_history.len(), 1);
    }

    #[tokio::test]
    async fn test_force_sync_merges_remote_progress() {
        let h = harness();
        let base = h.sync.save(&state(0)).await.unwrap();

        // Another device earned XP and saved version 2
        let mut other = base.clone();
        other.level = LevelCurve::default().state_for_total(250, &other.level);
        h.sync.save(&other).await.unwrap();

        // This device is still at version 1 with its own gains
        let mut mine = base.clone();
        mine.level = LevelCurve::default().state_for_total(60, &mine.level);
        assert!(h.sync.save(&mine).await.is_err());

        let synced = h.sync.force_sync(&mine).await.unwrap();
        assert_eq!(synced.level.total_xp, 250);
        assert_eq!(synced.version, 3);
    }
}
