//! User statistics aggregates for dashboard queries.
//!
//! These aggregates are updated in the same unit as the XP and achievement
//! changes of an event, so the dashboard never has to scan the activity log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::ProgressEvent;
use crate::time_utils::month_key;

/// Pre-computed statistics for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    // ─── Activity Counters ───────────────────────────────────────
    #[serde(default)]
    pub videos_watched: u32,
    #[serde(default)]
    pub workouts_completed: u32,
    #[serde(default)]
    pub workout_minutes: u64,
    #[serde(default)]
    pub goals_completed: u32,
    #[serde(default)]
    pub challenges_completed: u32,
    #[serde(default)]
    pub login_days: u32,

    // ─── Progression ─────────────────────────────────────────────
    #[serde(default)]
    pub achievements_unlocked: u32,
    #[serde(default)]
    pub longest_streak: u32,

    // ─── Time Series ─────────────────────────────────────────────
    /// Event count per month ("YYYY-MM" format)
    #[serde(default)]
    pub activities_by_month: HashMap<String, u32>,

    // ─── Metadata ────────────────────────────────────────────────
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            videos_watched: 0,
            workouts_completed: 0,
            workout_minutes: 0,
            goals_completed: 0,
            challenges_completed: 0,
            login_days: 0,
            achievements_unlocked: 0,
            longest_streak: 0,
            activities_by_month: HashMap::new(),
            updated_at: None,
        }
    }
}

impl UserStats {
    /// Count an event.
    pub fn update_from_event(&mut self, event: &ProgressEvent, now: DateTime<Utc>) {
        match event {
            ProgressEvent::VideoWatched { .. } => self.videos_watched += 1,
            ProgressEvent::WorkoutCompleted {
                duration_minutes, ..
            } => {
                self.workouts_completed += 1;
                self.workout_minutes += u64::from(*duration_minutes);
            }
            ProgressEvent::GoalCompleted { .. } => self.goals_completed += 1,
            ProgressEvent::ChallengeCompleted { .. } => self.challenges_completed += 1,
            ProgressEvent::Login => self.login_days += 1,
        }
        self.touch_month(now.date_naive());
        self.updated_at = Some(now);
    }

    pub fn record_streak(&mut self, consecutive_days: u32) {
        self.longest_streak = self.longest_streak.max(consecutive_days);
    }

    fn touch_month(&mut self, day: NaiveDate) {
        *self.activities_by_month.entry(month_key(day)).or_insert(0) += 1;
    }

    /// Field-wise maximum of two aggregates.
    pub fn merge_max(&self, other: &UserStats) -> UserStats {
        let mut activities_by_month = self.activities_by_month.clone();
        for (month, count) in &other.activities_by_month {
            let entry = activities_by_month.entry(month.clone()).or_insert(0);
            *entry = (*entry).max(*count);
        }

        UserStats {
            videos_watched: self.videos_watched.max(other.videos_watched),
            workouts_completed: self.workouts_completed.max(other.workouts_completed),
            workout_minutes: self.workout_minutes.max(other.workout_minutes),
            goals_completed: self.goals_completed.max(other.goals_completed),
            challenges_completed: self.challenges_completed.max(other.challenges_completed),
            login_days: self.login_days.max(other.login_days),
            achievements_unlocked: self.achievements_unlocked.max(other.achievements_unlocked),
            longest_streak: self.longest_streak.max(other.longest_streak),
            activities_by_month,
            updated_at: self.updated_at.max(other.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_update_from_workout() {
        let mut stats = UserStats::default();
        let event = ProgressEvent::WorkoutCompleted {
            workout_id: "w1".to_string(),
            duration_minutes: 45,
        };

        stats.update_from_event(&event, at(15));

        assert_eq!(stats.workouts_completed, 1);
        assert_eq!(stats.workout_minutes, 45);
        assert_eq!(stats.activities_by_month.get("2026-01"), Some(&1));
        assert_eq!(stats.updated_at, Some(at(15)));
    }

    #[test]
    fn test_merge_max_takes_higher_per_field() {
        let mut a = UserStats::default();
        let mut b = UserStats::default();
        a.videos_watched = 5;
        a.workouts_completed = 1;
        b.videos_watched = 2;
        b.workouts_completed = 4;
        a.activities_by_month.insert("2026-01".to_string(), 3);
        b.activities_by_month.insert("2026-01".to_string(), 7);
        b.activities_by_month.insert("2026-02".to_string(), 1);

        let merged = a.merge_max(&b);

        assert_eq!(merged.videos_watched, 5);
        assert_eq!(merged.workouts_completed, 4);
        assert_eq!(merged.activities_by_month.get("2026-01"), Some(&7));
        assert_eq!(merged.activities_by_month.get("2026-02"), Some(&1));
    }

    #[test]
    fn test_longest_streak_never_drops() {
        let mut stats = UserStats::default();
        stats.record_streak(9);
        stats.record_streak(2);
        assert_eq!(stats.longest_streak, 9);
    }
}
