// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! XP/level curve.
//!
//! Entering level 1 costs nothing; going from `L-1` to `L` (for `L >= 2`)
//! costs `floor(base * growth^(L-2))`. All functions here are pure so a
//! grant can be replayed during reconciliation with identical results.

use crate::config::ProgressionSettings;
use crate::error::{AppError, Result};
use crate::models::LevelState;
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const CURVE_EPSILON: f64 = 1e-6;

/// Progressive level cost curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCurve {
    base: f64,
    growth: f64,
    max_level: u32,
}

/// Outcome of applying a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpApplication {
    pub state: LevelState,
    pub did_level_up: bool,
    pub new_level: u32,
    pub levels_gained: u32,
}

/// Read-only view of a level state for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LevelSummary {
    pub current_level: u32,
    pub max_level: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub current_xp: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_xp: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub xp_to_next_level: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub next_level_requirement: u64,
    pub progress_percent: u32,
    pub consecutive_days: u32,
}

impl LevelCurve {
    pub fn new(base: f64, growth: f64, max_level: u32) -> Self {
        Self {
            base,
            growth,
            max_level: max_level.max(1),
        }
    }

    pub fn from_settings(settings: &ProgressionSettings) -> Self {
        Self::new(settings.curve_base, settings.curve_growth, settings.max_level)
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// XP needed to advance from `level - 1` into `level`.
    pub fn xp_required_for_level(&self, level: u32) -> u64 {
        if level <= 1 {
            return 0;
        }
        let exact = self.base * self.growth.powi(level as i32 - 2);
        // 100.0 * 1.15 == 114.99999999999999 in f64
        (exact + CURVE_EPSILON).floor() as u64
    }

    /// Lifetime XP at which `level` is entered.
    pub fn cumulative_xp_for_level(&self, level: u32) -> u64 {
        (2..=level).map(|l| self.xp_required_for_level(l)).sum()
    }

    /// Requirement of the next level, or 0 at max level.
    fn next_requirement(&self, level: u32) -> u64 {
        if level >= self.max_level {
            0
        } else {
            self.xp_required_for_level(level + 1)
        }
    }

    /// Fresh level-1 state.
    pub fn initial_state(&self) -> LevelState {
        LevelState::starting(self.next_requirement(1))
    }

    /// Add `amount` XP and roll over as many levels as it pays for.
    ///
    /// Negative amounts fail with `InvalidGrant` and leave nothing changed.
    pub fn apply_xp(&self, state: &LevelState, amount: i64) -> Result<XpApplication> {
        if amount < 0 {
            return Err(AppError::InvalidGrant(format!(
                "XP amount must not be negative (got {})",
                amount
            )));
        }
        let amount = amount as u64;

        let mut next = state.clone();
        next.total_xp = next.total_xp.saturating_add(amount);
        next.current_xp = next.current_xp.saturating_add(amount);

        let start_level = next.current_level;
        while next.current_level < self.max_level {
            let required = self.xp_required_for_level(next.current_level + 1);
            if next.current_xp < required {
                break;
            }
            next.current_xp -= required;
            next.current_level += 1;
        }

        next.xp_to_next_level = match self.next_requirement(next.current_level) {
            0 => 0,
            required => required.saturating_sub(next.current_xp),
        };

        let levels_gained = next.current_level - start_level;
        Ok(XpApplication {
            new_level: next.current_level,
            did_level_up: levels_gained > 0,
            levels_gained,
            state: next,
        })
    }

    /// Rebuild level fields from lifetime XP, keeping login bookkeeping.
    pub fn state_for_total(&self, total_xp: u64, template: &LevelState) -> LevelState {
        let mut level = 1;
        let mut remaining = total_xp;
        while level < self.max_level {
            let required = self.xp_required_for_level(level + 1);
            if remaining < required {
                break;
            }
            remaining -= required;
            level += 1;
        }

        LevelState {
            current_level: level,
            current_xp: remaining,
            total_xp,
            xp_to_next_level: match self.next_requirement(level) {
                0 => 0,
                required => required - remaining,
            },
            ..template.clone()
        }
    }

    /// `round(current / next_requirement * 100)`, 100 at max level.
    pub fn progress_percent(&self, state: &LevelState) -> u32 {
        let required = self.next_requirement(state.current_level);
        if required == 0 {
            return 100;
        }
        let percent = (state.current_xp as f64 / required as f64 * 100.0).round();
        percent.min(100.0) as u32
    }

    pub fn summary(&self, state: &LevelState) -> LevelSummary {
        LevelSummary {
            current_level: state.current_level,
            max_level: self.max_level,
            current_xp: state.current_xp,
            total_xp: state.total_xp,
            xp_to_next_level: state.xp_to_next_level,
            next_level_requirement: self.next_requirement(state.current_level),
            progress_percent: self.progress_percent(state),
            consecutive_days: state.consecutive_days,
        }
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::from_settings(&ProgressionSettings::default())
    }
}
