// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Aggregate progression state and its persisted envelope.
//!
//! [`ProgressionState`] serializes to the sync snapshot layout. The stores
//! never see it directly; they hold a [`SnapshotDocument`] whose payload is
//! the snapshot JSON plus a SHA-256 checksum of that payload.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::{ActivityRecord, Goal, LevelState, UserStats, XpGrant};
use crate::services::achievements::AchievementTracker;

/// Top-level snapshot keys without which a snapshot is rejected.
pub const REQUIRED_FIELDS: [&str; 3] = ["achievements", "levelSystem", "goals"];

/// Everything the engine knows about one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionState {
    pub user_id: String,
    /// Achievements, challenges and daily challenges
    #[serde(flatten)]
    pub tracker: AchievementTracker,
    #[serde(default)]
    pub user_stats: UserStats,
    #[serde(rename = "levelSystem")]
    pub level: LevelState,
    /// Most recent first, capped
    #[serde(default)]
    pub xp_history: Vec<XpGrant>,
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub activity_log: Vec<ActivityRecord>,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl ProgressionState {
    pub fn new(user_id: &str, level: LevelState) -> Self {
        Self {
            user_id: user_id.to_string(),
            tracker: AchievementTracker::default(),
            user_stats: UserStats::default(),
            level,
            xp_history: Vec::new(),
            goals: Vec::new(),
            activity_log: Vec::new(),
            last_sync_at: None,
            version: 0,
        }
    }

    /// Activity records newer than `days` days, oldest first.
    pub fn recent_activity(&self, now: DateTime<Utc>, days: i64) -> Vec<&ActivityRecord> {
        let cutoff = now - Duration::days(days);
        self.activity_log
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .collect()
    }

    /// Drop activity records older than the retention window.
    pub fn prune_activity_log(&mut self, now: DateTime<Utc>, retention_days: i64) {
        let cutoff = now - Duration::days(retention_days);
        self.activity_log.retain(|r| r.timestamp >= cutoff);
    }
}

/// Stored form of a snapshot, identical in the remote and local stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    pub user_id: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub checksum: Option<String>,
    pub payload: String,
}

impl SnapshotDocument {
    /// Serialize a state that already carries its new version and sync time.
    pub fn seal(state: &ProgressionState) -> Result<Self> {
        let payload = serde_json::to_string(state)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Snapshot encode failed: {}", e)))?;

        Ok(Self {
            user_id: state.user_id.clone(),
            version: state.version,
            updated_at: state.last_sync_at.unwrap_or_else(Utc::now),
            checksum: Some(payload_checksum(&payload)),
            payload,
        })
    }

    /// Decode and verify the payload.
    ///
    /// Fails with `CorruptSnapshot` on a checksum mismatch, unparseable JSON,
    /// a missing required top-level field, or a user id that does not match
    /// the envelope.
    pub fn open(&self) -> Result<ProgressionState> {
        if let Some(expected) = &self.checksum {
            let actual = payload_checksum(&self.payload);
            if &actual != expected {
                return Err(AppError::CorruptSnapshot(format!(
                    "checksum mismatch for user {}",
                    self.user_id
                )));
            }
        }

        let value: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|e| AppError::CorruptSnapshot(format!("invalid JSON: {}", e)))?;

        let object = value
            .as_object()
            .ok_or_else(|| AppError::CorruptSnapshot("payload is not an object".to_string()))?;

        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !object.contains_key(**f)) {
            return Err(AppError::CorruptSnapshot(format!(
                "missing required field '{}'",
                missing
            )));
        }

        let state: ProgressionState = serde_json::from_value(value)
            .map_err(|e| AppError::CorruptSnapshot(format!("schema mismatch: {}", e)))?;

        if state.user_id != self.user_id {
            return Err(AppError::CorruptSnapshot(format!(
                "payload belongs to user {}, envelope to {}",
                state.user_id, self.user_id
            )));
        }

        Ok(state)
    }
}

/// Hex SHA-256 of a snapshot payload.
pub fn payload_checksum(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn state() -> ProgressionState {
        let mut state = ProgressionState::new("user-1", LevelState::starting(100));
        state.version = 3;
        state.last_sync_at = Some(Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap());
        state
    }

    /// A state with every collection and optional field filled in.
    fn populated_state() -> ProgressionState {
        use crate::models::{
            Achievement, AchievementCategory, ActivityType, Challenge, ChallengeRequirement,
            ChallengeReward, DailyChallenge, MetricKey, Rarity, Reward, XpCategory,
        };

        let at = Utc.with_ymd_and_hms(2026, 1, 28, 18, 30, 0).unwrap();
        let mut state = state();
        state.level = LevelState {
            current_level: 3,
            current_xp: 20,
            total_xp: 235,
            xp_to_next_level: 132,
            last_login_date: Some(at.date_naive()),
            consecutive_days: 5,
            last_boost_date: Some(at.date_naive()),
            total_boosts_received: 1,
        };
        state.tracker.achievements = vec![Achievement {
            id: "first-workout".to_string(),
            title: "First Sweat".to_string(),
            description: "Finish a workout".to_string(),
            category: AchievementCategory::Workout,
            rarity: Rarity::Common,
            metric: MetricKey::WorkoutsCompleted,
            requirement: 1,
            current_progress: 1,
            is_unlocked: true,
            unlocked_at: Some(at),
            reward: Reward {
                xp: 25,
                title: Some("Rookie".to_string()),
            },
        }];
        state.tracker.challenges = vec![Challenge {
            id: "spring-sprint".to_string(),
            title: "Spring Sprint".to_string(),
            description: String::new(),
            requirements: vec![ChallengeRequirement {
                description: "Complete 2 workouts".to_string(),
                metric: MetricKey::WorkoutsCompleted,
                target: 2,
                current: 1,
            }],
            start_date: at - Duration::days(10),
            end_date: at + Duration::days(20),
            is_completed: false,
            completed_at: None,
            participants: 120,
            rewards: ChallengeReward { xp: 200 },
        }];
        state.tracker.daily_challenges = vec![DailyChallenge {
            id: "daily-2026-01-28-videos".to_string(),
            date: at.date_naive(),
            title: "Watch a video".to_string(),
            metric: MetricKey::VideosWatched,
            target: 1,
            current: 1,
            reward_xp: 15,
            is_completed: true,
            completed_at: Some(at),
        }];
        state.goals = vec![Goal {
            id: "g1".to_string(),
            title: "Stretch daily".to_string(),
            unit: "days".to_string(),
            target_value: 30.0,
            current_value: 12.5,
            deadline: Some(at.date_naive() + Duration::days(30)),
            is_completed: false,
            completed_at: None,
        }];
        state.xp_history = vec![
            XpGrant::new(25, "Unlocked First Sweat", XpCategory::Bonus, at),
            XpGrant::new(10, "Daily login", XpCategory::LoginStreak, at - Duration::hours(2)),
        ];
        state.activity_log = vec![ActivityRecord::new(
            "user-1",
            ActivityType::WorkoutCompleted,
            at,
            serde_json::json!({ "durationMinutes": 30 }),
        )];
        state.user_stats.workouts_completed = 1;
        state.user_stats.workout_minutes = 30;
        state.user_stats.longest_streak = 5;
        state.user_stats.activities_by_month.insert("2025-12".to_string(), 4);
        state.user_stats.activities_by_month.insert("2026-01".to_string(), 11);
        state.user_stats.updated_at = Some(at);
        state
    }

    #[test]
    fn test_seal_open_preserves_state() {
        let original = populated_state();
        let doc = SnapshotDocument::seal(&original).unwrap();

        assert_eq!(doc.version, 3);
        assert_eq!(doc.updated_at, original.last_sync_at.unwrap());
        assert_eq!(doc.open().unwrap(), original);
    }

    #[test]
    fn test_payload_uses_snapshot_field_names() {
        let doc = SnapshotDocument::seal(&state()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&doc.payload).unwrap();
        for field in ["achievements", "challenges", "dailyChallenges", "levelSystem", "goals"] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let mut doc = SnapshotDocument::seal(&state()).unwrap();
        doc.payload = doc.payload.replace("\"version\":3", "\"version\":4");

        assert!(matches!(doc.open(), Err(AppError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let mut value = serde_json::to_value(state()).unwrap();
        value.as_object_mut().unwrap().remove("levelSystem");
        let doc = SnapshotDocument {
            user_id: "user-1".to_string(),
            version: 3,
            updated_at: Utc::now(),
            checksum: None,
            payload: value.to_string(),
        };

        let err = doc.open().unwrap_err();
        assert!(err.to_string().contains("levelSystem"));
    }

    #[test]
    fn test_activity_window_and_pruning() {
        use crate::models::ActivityType;

        let now = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
        let mut state = state();
        for days_ago in [400, 100, 10] {
            state.activity_log.push(ActivityRecord::new(
                "user-1",
                ActivityType::Login,
                now - Duration::days(days_ago),
                serde_json::Value::Null,
            ));
        }

        assert_eq!(state.recent_activity(now, 90).len(), 1);

        state.prune_activity_log(now, 365);
        assert_eq!(state.activity_log.len(), 2);
        assert_eq!(state.recent_activity(now, 365).len(), 2);
    }

    #[test]
    fn test_user_mismatch_rejected() {
        let mut doc = SnapshotDocument::seal(&state()).unwrap();
        doc.user_id = "someone-else".to_string();
        assert!(matches!(doc.open(), Err(AppError::CorruptSnapshot(_))));
    }
}
