// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Merge of two divergent snapshots of one user's progression.
//!
//! Scalars take the higher of the two sides; collections are unioned by id.
//! Nothing either side has earned is dropped: total XP, level, every
//! achievement's progress and every unlock survive the merge.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::{
    Achievement, ActivityRecord, Challenge, DailyChallenge, Goal, LevelState, ProgressionState,
    XpGrant,
};
use crate::services::achievements::AchievementTracker;
use crate::services::level::LevelCurve;
use crate::services::streak;

/// Merge `local` and `remote` into one state.
///
/// Display fields of entries present on both sides come from `local`.
pub fn reconcile(
    local: &ProgressionState,
    remote: &ProgressionState,
    curve: &LevelCurve,
    xp_history_cap: usize,
) -> ProgressionState {
    let activity_log = merge_activity(&local.activity_log, &remote.activity_log);
    let mut user_stats = local.user_stats.merge_max(&remote.user_stats);
    // Days split across devices can join into a longer run than either side saw
    user_stats.record_streak(streak::longest_streak(&activity_log));

    ProgressionState {
        user_id: local.user_id.clone(),
        tracker: AchievementTracker {
            achievements: merge_by_id(
                &local.tracker.achievements,
                &remote.tracker.achievements,
                |a| &a.id,
                merge_achievement,
            ),
            challenges: merge_by_id(
                &local.tracker.challenges,
                &remote.tracker.challenges,
                |c| &c.id,
                merge_challenge,
            ),
            daily_challenges: merge_by_id(
                &local.tracker.daily_challenges,
                &remote.tracker.daily_challenges,
                |d| &d.id,
                merge_daily,
            ),
        },
        user_stats,
        level: merge_level(&local.level, &remote.level, curve),
        xp_history: merge_history(&local.xp_history, &remote.xp_history, xp_history_cap),
        goals: merge_by_id(&local.goals, &remote.goals, |g| &g.id, merge_goal),
        activity_log,
        last_sync_at: local.last_sync_at.max(remote.last_sync_at),
        version: local.version.max(remote.version),
    }
}

/// Union by id: local order first, then entries only the remote has.
fn merge_by_id<T, K, M>(local: &[T], remote: &[T], key: K, merge: M) -> Vec<T>
where
    T: Clone,
    K: Fn(&T) -> &String,
    M: Fn(&T, &T) -> T,
{
    let mut merged: Vec<T> = local
        .iter()
        .map(|l| match remote.iter().find(|r| key(r) == key(l)) {
            Some(r) => merge(l, r),
            None => l.clone(),
        })
        .collect();

    let local_ids: HashSet<&String> = local.iter().map(&key).collect();
    merged.extend(
        remote
            .iter()
            .filter(|r| !local_ids.contains(key(r)))
            .cloned(),
    );
    merged
}

/// Earliest of two optional timestamps; a known time beats an unknown one.
fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn merge_level(local: &LevelState, remote: &LevelState, curve: &LevelCurve) -> LevelState {
    let bookkeeping = LevelState {
        last_login_date: local.last_login_date.max(remote.last_login_date),
        consecutive_days: local.consecutive_days.max(remote.consecutive_days),
        last_boost_date: local.last_boost_date.max(remote.last_boost_date),
        total_boosts_received: local.total_boosts_received.max(remote.total_boosts_received),
        ..local.clone()
    };

    let total_xp = local.total_xp.max(remote.total_xp);
    let derived = curve.state_for_total(total_xp, &bookkeeping);

    // A side whose level is ahead of what its XP pays for keeps that level
    let highest = local.current_level.max(remote.current_level);
    if derived.current_level >= highest {
        return derived;
    }
    let ahead = if local.current_level >= remote.current_level {
        local
    } else {
        remote
    };
    tracing::warn!(
        level = ahead.current_level,
        derived = derived.current_level,
        total_xp,
        "Level ahead of lifetime XP; keeping the higher level"
    );
    LevelState {
        current_level: ahead.current_level,
        current_xp: ahead.current_xp,
        xp_to_next_level: ahead.xp_to_next_level,
        total_xp,
        ..bookkeeping
    }
}

fn merge_achievement(local: &Achievement, remote: &Achievement) -> Achievement {
    let is_unlocked = local.is_unlocked || remote.is_unlocked;
    Achievement {
        current_progress: local.current_progress.max(remote.current_progress),
        is_unlocked,
        unlocked_at: if is_unlocked {
            earliest(local.unlocked_at, remote.unlocked_at)
        } else {
            None
        },
        ..local.clone()
    }
}

fn merge_challenge(local: &Challenge, remote: &Challenge) -> Challenge {
    let mut merged = local.clone();
    merged.is_completed = local.is_completed || remote.is_completed;
    merged.completed_at = earliest(local.completed_at, remote.completed_at);
    merged.participants = local.participants.max(remote.participants);

    for requirement in &mut merged.requirements {
        if let Some(other) = remote
            .requirements
            .iter()
            .find(|r| r.metric == requirement.metric && r.description == requirement.description)
        {
            requirement.current = requirement.current.max(other.current);
        }
    }
    merged
}

fn merge_daily(local: &DailyChallenge, remote: &DailyChallenge) -> DailyChallenge {
    DailyChallenge {
        current: local.current.max(remote.current),
        is_completed: local.is_completed || remote.is_completed,
        completed_at: earliest(local.completed_at, remote.completed_at),
        ..local.clone()
    }
}

fn merge_goal(local: &Goal, remote: &Goal) -> Goal {
    Goal {
        current_value: local.current_value.max(remote.current_value),
        is_completed: local.is_completed || remote.is_completed,
        completed_at: earliest(local.completed_at, remote.completed_at),
        ..local.clone()
    }
}

/// Union by id, most recent first, capped.
fn merge_history(local: &[XpGrant], remote: &[XpGrant], cap: usize) -> Vec<XpGrant> {
    let mut history: Vec<XpGrant> = merge_by_id(local, remote, |g| &g.id, |l, _| l.clone());
    // Stable, so grants from one dispatch keep their local order
    history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    history.truncate(cap);
    history
}

/// Union by id, oldest first.
fn merge_activity(local: &[ActivityRecord], remote: &[ActivityRecord]) -> Vec<ActivityRecord> {
    let mut log = merge_by_id(local, remote, |r| &r.id, |l, _| l.clone());
    log.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    log
}
