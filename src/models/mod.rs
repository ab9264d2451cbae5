// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the progression engine.

pub mod achievement;
pub mod activity;
pub mod event;
pub mod level;
pub mod snapshot;
pub mod stats;

pub use achievement::{
    Achievement, AchievementCategory, Challenge, ChallengeRequirement, ChallengeReward,
    ChallengeStatus, DailyChallenge, MetricKey, Rarity, Reward,
};
pub use activity::{ActivityRecord, ActivityType, Goal};
pub use event::{Notification, ProgressEvent};
pub use level::{LevelState, XpCategory, XpGrant, XpIntent};
pub use snapshot::{ProgressionState, SnapshotDocument};
pub use stats::UserStats;
