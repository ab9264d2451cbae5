// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Level state and the XP grant log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A user's position on the level curve plus daily-login bookkeeping.
///
/// `current_xp` is the XP accumulated inside `current_level`; it stays below
/// the requirement of the next level except at the max level, where it keeps
/// growing. `total_xp` is lifetime XP and never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelState {
    pub current_level: u32,
    pub current_xp: u64,
    pub total_xp: u64,
    /// Derived; 0 at max level
    pub xp_to_next_level: u64,
    #[serde(default)]
    pub last_login_date: Option<NaiveDate>,
    #[serde(default)]
    pub consecutive_days: u32,
    #[serde(default)]
    pub last_boost_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_boosts_received: u32,
}

impl LevelState {
    /// Level 1 with no XP; `xp_to_next_level` is the level-2 requirement.
    pub fn starting(xp_to_next_level: u64) -> Self {
        Self {
            current_level: 1,
            current_xp: 0,
            total_xp: 0,
            xp_to_next_level,
            last_login_date: None,
            consecutive_days: 0,
            last_boost_date: None,
            total_boosts_received: 0,
        }
    }
}

/// Why XP was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpCategory {
    GoalCompletion,
    ChallengeCompletion,
    LoginStreak,
    Bonus,
}

/// Immutable XP log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpGrant {
    pub id: String,
    pub amount: u64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub category: XpCategory,
}

impl XpGrant {
    pub fn new(
        amount: u64,
        reason: impl Into<String>,
        category: XpCategory,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            amount,
            reason: reason.into(),
            timestamp: at,
            category,
        }
    }
}

/// Request to grant XP, produced by the tracker and executed by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpIntent {
    pub amount: u64,
    pub reason: String,
    pub category: XpCategory,
}

impl XpIntent {
    pub fn new(amount: u64, reason: impl Into<String>, category: XpCategory) -> Self {
        Self {
            amount,
            reason: reason.into(),
            category,
        }
    }
}

/// Push a grant to the front of a most-recent-first log, evicting beyond `cap`.
pub fn push_grant(history: &mut Vec<XpGrant>, grant: XpGrant, cap: usize) {
    history.insert(0, grant);
    history.truncate(cap);
}
