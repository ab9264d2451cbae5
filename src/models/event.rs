// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Inbound progress events and outbound notifications.

use crate::models::activity::ActivityType;
use crate::models::achievement::Achievement;
use serde::{Deserialize, Serialize};

/// Event reported by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    VideoWatched {
        video_id: String,
        #[serde(default)]
        duration_seconds: u32,
    },
    WorkoutCompleted {
        workout_id: String,
        duration_minutes: u32,
    },
    GoalCompleted {
        goal_id: String,
    },
    ChallengeCompleted {
        challenge_id: String,
    },
    Login,
}

impl ProgressEvent {
    pub fn activity_type(&self) -> ActivityType {
        match self {
            ProgressEvent::VideoWatched { .. } => ActivityType::VideoWatched,
            ProgressEvent::WorkoutCompleted { .. } => ActivityType::WorkoutCompleted,
            ProgressEvent::GoalCompleted { .. } => ActivityType::GoalCompleted,
            ProgressEvent::ChallengeCompleted { .. } => ActivityType::ChallengeCompleted,
            ProgressEvent::Login => ActivityType::Login,
        }
    }

    /// Payload stored as the activity record's metadata.
    pub fn metadata(&self) -> serde_json::Value {
        match self {
            ProgressEvent::VideoWatched {
                video_id,
                duration_seconds,
            } => serde_json::json!({ "videoId": video_id, "durationSeconds": duration_seconds }),
            ProgressEvent::WorkoutCompleted {
                workout_id,
                duration_minutes,
            } => serde_json::json!({ "workoutId": workout_id, "durationMinutes": duration_minutes }),
            ProgressEvent::GoalCompleted { goal_id } => serde_json::json!({ "goalId": goal_id }),
            ProgressEvent::ChallengeCompleted { challenge_id } => {
                serde_json::json!({ "challengeId": challenge_id })
            }
            ProgressEvent::Login => serde_json::Value::Null,
        }
    }
}

/// Plain data event for the notification layer to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    AchievementUnlocked {
        achievement: Achievement,
    },
    LevelUp {
        new_level: u32,
        xp_gained: u64,
    },
    StreakMilestone {
        days: u32,
    },
    ChallengeCompleted {
        challenge_id: String,
        title: String,
        xp: u64,
    },
    DailyChallengeCompleted {
        id: String,
        title: String,
        xp: u64,
    },
}
