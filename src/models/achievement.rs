// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Achievements, challenges, and the metrics that drive them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Counter or gauge that achievements and challenges track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    VideosWatched,
    WorkoutsCompleted,
    WorkoutMinutes,
    GoalsCompleted,
    ChallengesCompleted,
    LoginDays,
    StreakDays,
    LevelReached,
}

impl MetricKey {
    /// Gauges report an absolute value instead of a delta.
    pub fn is_gauge(self) -> bool {
        matches!(self, MetricKey::StreakDays | MetricKey::LevelReached)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Workout,
    Learning,
    Consistency,
    Milestone,
    Challenge,
}

impl std::str::FromStr for AchievementCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workout" => Ok(Self::Workout),
            "learning" => Ok(Self::Learning),
            "consistency" => Ok(Self::Consistency),
            "milestone" => Ok(Self::Milestone),
            "challenge" => Ok(Self::Challenge),
            other => Err(format!("unknown achievement category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub xp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One-time unlockable milestone over a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: AchievementCategory,
    pub rarity: Rarity,
    pub metric: MetricKey,
    pub requirement: u64,
    /// Never decreases; clamped to `requirement`
    #[serde(default)]
    pub current_progress: u64,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
    pub reward: Reward,
}

impl Achievement {
    /// Catalog entry reset to zero progress.
    pub fn fresh(&self) -> Self {
        Self {
            current_progress: 0,
            is_unlocked: false,
            unlocked_at: None,
            ..self.clone()
        }
    }

    /// Percentage towards the requirement, 0-100.
    pub fn progress_percent(&self) -> u32 {
        if self.requirement == 0 {
            return 100;
        }
        ((self.current_progress.min(self.requirement) * 100) / self.requirement) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequirement {
    pub description: String,
    pub metric: MetricKey,
    pub target: u64,
    #[serde(default)]
    pub current: u64,
}

impl ChallengeRequirement {
    pub fn is_met(&self) -> bool {
        self.current >= self.target
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeReward {
    pub xp: u64,
}

/// Where a challenge sits relative to its time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Upcoming,
    Active,
    Completed,
    Expired,
}

impl std::str::FromStr for ChallengeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown challenge status: {}", other)),
        }
    }
}

/// Time-boxed multi-requirement goal over `[start_date, end_date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub requirements: Vec<ChallengeRequirement>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub participants: u32,
    pub rewards: ChallengeReward,
}

impl Challenge {
    pub fn fresh(&self) -> Self {
        Self {
            is_completed: false,
            completed_at: None,
            requirements: self
                .requirements
                .iter()
                .map(|r| ChallengeRequirement {
                    current: 0,
                    ..r.clone()
                })
                .collect(),
            ..self.clone()
        }
    }

    pub fn requirements_met(&self) -> bool {
        self.requirements.iter().all(ChallengeRequirement::is_met)
    }

    /// Completion wins over expiry: a completed challenge stays completed.
    pub fn status(&self, now: DateTime<Utc>) -> ChallengeStatus {
        if self.is_completed {
            ChallengeStatus::Completed
        } else if now >= self.end_date {
            ChallengeStatus::Expired
        } else if now < self.start_date {
            ChallengeStatus::Upcoming
        } else {
            ChallengeStatus::Active
        }
    }
}

/// Per-day challenge generated from a template pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChallenge {
    pub id: String,
    pub date: NaiveDate,
    pub title: String,
    pub metric: MetricKey,
    pub target: u64,
    #[serde(default)]
    pub current: u64,
    pub reward_xp: u64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn challenge() -> Challenge {
        Challenge {
            id: "c1".to_string(),
            title: "Spring Sprint".to_string(),
            description: String::new(),
            requirements: vec![ChallengeRequirement {
                description: "Complete 3 workouts".to_string(),
                metric: MetricKey::WorkoutsCompleted,
                target: 3,
                current: 0,
            }],
            start_date: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap(),
            is_completed: false,
            completed_at: None,
            participants: 12,
            rewards: ChallengeReward { xp: 200 },
        }
    }

    #[test]
    fn test_challenge_status_window() {
        let c = challenge();
        let before = Utc.with_ymd_and_hms(2026, 2, 28, 23, 0, 0).unwrap();
        let during = Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap();
        assert_eq!(c.status(before), ChallengeStatus::Upcoming);
        assert_eq!(c.status(during), ChallengeStatus::Active);
        // End of the window is exclusive
        assert_eq!(c.status(c.end_date), ChallengeStatus::Expired);
    }

    #[test]
    fn test_completed_challenge_never_reports_expired() {
        let mut c = challenge();
        c.is_completed = true;
        let later = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(c.status(later), ChallengeStatus::Completed);
    }

    #[test]
    fn test_metric_gauges() {
        assert!(MetricKey::StreakDays.is_gauge());
        assert!(MetricKey::LevelReached.is_gauge());
        assert!(!MetricKey::WorkoutMinutes.is_gauge());
    }
}
