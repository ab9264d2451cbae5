// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event router: the single ingress for progression changes.
//!
//! Each operation runs against a draft copy of the state:
//! 1. Append the activity record
//! 2. Advance achievement/challenge progress
//! 3. Collect the XP to grant (base + duration bonus + unlock rewards)
//! 4. Apply every grant through the level curve
//! 5. Collect notifications
//!
//! The draft replaces the live state only when every step succeeded, and
//! notifications are published only after that commit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::ProgressionSettings;
use crate::error::{AppError, Result};
use crate::models::level::push_grant;
use crate::models::{
    Achievement, ActivityRecord, Goal, MetricKey, Notification, ProgressEvent, ProgressionState,
    XpCategory, XpGrant, XpIntent,
};
use crate::services::achievements::ProgressUpdate;
use crate::services::catalog::Catalog;
use crate::services::level::LevelCurve;
use crate::services::notifier::Notifier;
use crate::services::streak::{self, StreakEvaluator};
use crate::time_utils::Clock;

/// What one router call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub xp_granted: u64,
    pub level: u32,
    pub leveled_up: bool,
    pub unlocked: Vec<Achievement>,
    pub notifications: Vec<Notification>,
}

impl DispatchOutcome {
    /// Outcome of a call that changed nothing.
    fn unchanged(state: &ProgressionState) -> Self {
        Self {
            level: state.level.current_level,
            ..Self::default()
        }
    }
}

/// Effects collected while a draft is being mutated.
#[derive(Default)]
struct Effects {
    xp: u64,
    levels_gained: u32,
    progress: ProgressUpdate,
    notifications: Vec<Notification>,
}

impl Effects {
    fn into_outcome(mut self, state: &ProgressionState) -> DispatchOutcome {
        let mut notifications: Vec<Notification> = self
            .progress
            .unlocked
            .iter()
            .map(|a| Notification::AchievementUnlocked {
                achievement: a.clone(),
            })
            .collect();
        notifications.extend(self.progress.daily_completed.iter().map(|d| {
            Notification::DailyChallengeCompleted {
                id: d.id.clone(),
                title: d.title.clone(),
                xp: d.reward_xp,
            }
        }));
        notifications.append(&mut self.notifications);
        if self.levels_gained > 0 {
            notifications.push(Notification::LevelUp {
                new_level: state.level.current_level,
                xp_gained: self.xp,
            });
        }

        DispatchOutcome {
            xp_granted: self.xp,
            level: state.level.current_level,
            leveled_up: self.levels_gained > 0,
            unlocked: self.progress.unlocked,
            notifications,
        }
    }
}

/// Routes events into the tracker and level curve.
#[derive(Clone)]
pub struct EventRouter {
    settings: ProgressionSettings,
    curve: LevelCurve,
    streaks: StreakEvaluator,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl EventRouter {
    pub fn new(
        settings: ProgressionSettings,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            curve: LevelCurve::from_settings(&settings),
            streaks: StreakEvaluator::from_settings(&settings),
            settings,
            clock,
            notifier,
        }
    }

    pub fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    pub fn settings(&self) -> &ProgressionSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fresh state for a user seen for the first time.
    pub fn new_state(&self, user_id: &str) -> ProgressionState {
        ProgressionState::new(user_id, self.curve.initial_state())
    }

    /// Process one event as a single unit.
    ///
    /// Fails with `ChallengeNotEligible` for an ineligible challenge and with
    /// `EventProcessing` for anything else; on failure `state` is untouched.
    pub fn dispatch(
        &self,
        state: &mut ProgressionState,
        event: ProgressEvent,
    ) -> Result<DispatchOutcome> {
        if matches!(event, ProgressEvent::Login) {
            return self.check_daily_login(state);
        }

        let now = self.clock.now();
        self.commit(state, |router, draft| {
            router
                .apply_event(draft, &event, now)
                .map_err(|e| match e {
                    AppError::ChallengeNotEligible(_) => e,
                    other => AppError::EventProcessing(other.to_string()),
                })
        })
        .inspect_err(|e| {
            tracing::warn!(user_id = %state.user_id, error = %e, ?event, "Dispatch rejected");
        })
    }

    /// Grant ad-hoc XP (welcome bonus and the like).
    pub fn add_xp(
        &self,
        state: &mut ProgressionState,
        amount: i64,
        reason: &str,
        category: XpCategory,
    ) -> Result<DispatchOutcome> {
        if amount < 0 {
            tracing::warn!(user_id = %state.user_id, amount, reason, "Rejected negative XP grant");
            return Err(AppError::InvalidGrant(format!(
                "XP amount must not be negative (got {})",
                amount
            )));
        }

        let now = self.clock.now();
        let intent = XpIntent::new(amount as u64, reason, category);
        self.commit(state, |router, draft| {
            let mut effects = Effects::default();
            router.ensure_today(draft, now);
            router.apply_intents(draft, vec![intent], now, &mut effects)?;
            Ok(effects)
        })
    }

    /// Count today's login once: login record, streak, bonus, and boost.
    pub fn check_daily_login(&self, state: &mut ProgressionState) -> Result<DispatchOutcome> {
        let now = self.clock.now();
        let Some(plan) =
            self.streaks
                .plan_daily_login(&state.user_id, &state.level, &state.activity_log, now)
        else {
            tracing::debug!(user_id = %state.user_id, "Daily login already counted");
            return Ok(DispatchOutcome::unchanged(state));
        };

        self.commit(state, |router, draft| {
            let mut effects = Effects::default();
            router.ensure_today(draft, now);

            draft.activity_log.push(plan.record.clone());
            draft.level.last_login_date = Some(plan.today);
            draft.level.consecutive_days = plan.consecutive_days;
            draft.user_stats.update_from_event(&ProgressEvent::Login, now);
            draft.user_stats.record_streak(plan.consecutive_days);

            let mut progress = draft.tracker.update_progress(MetricKey::LoginDays, 1, now);
            progress.extend(draft.tracker.observe_metric(
                MetricKey::StreakDays,
                u64::from(plan.consecutive_days),
                now,
            ));

            let mut intents = vec![XpIntent::new(
                plan.login_bonus_xp,
                "Daily login bonus",
                XpCategory::LoginStreak,
            )];
            if let Some(boost) = plan.boost_xp {
                intents.push(XpIntent::new(
                    boost,
                    format!("{}-day streak boost", plan.consecutive_days),
                    XpCategory::LoginStreak,
                ));
                draft.level.last_boost_date = Some(plan.today);
                draft.level.total_boosts_received += 1;
            }
            intents.extend(progress.rewards.iter().cloned());
            draft.user_stats.achievements_unlocked += progress.unlocked.len() as u32;
            effects.progress.extend(progress);

            if let Some(days) = plan.milestone {
                effects
                    .notifications
                    .push(Notification::StreakMilestone { days });
            }

            router.apply_intents(draft, intents, now, &mut effects)?;
            tracing::info!(
                user_id = %draft.user_id,
                consecutive_days = plan.consecutive_days,
                boosted = plan.boost_xp.is_some(),
                "Daily login counted"
            );
            Ok(effects)
        })
    }

    /// Complete a challenge whose requirements are met.
    pub fn complete_challenge(
        &self,
        state: &mut ProgressionState,
        challenge_id: &str,
    ) -> Result<DispatchOutcome> {
        self.dispatch(
            state,
            ProgressEvent::ChallengeCompleted {
                challenge_id: challenge_id.to_string(),
            },
        )
    }

    /// Seed catalog entries, then let gauge achievements catch up with the
    /// user's current level and streak.
    pub fn initialize_achievements(
        &self,
        state: &mut ProgressionState,
        catalog: &Catalog,
    ) -> Result<DispatchOutcome> {
        let now = self.clock.now();
        self.commit(state, |router, draft| {
            let mut effects = Effects::default();
            let added = draft.tracker.initialize(catalog);
            router.ensure_today(draft, now);

            let mut progress = draft.tracker.observe_metric(
                MetricKey::LevelReached,
                u64::from(draft.level.current_level),
                now,
            );
            progress.extend(draft.tracker.observe_metric(
                MetricKey::StreakDays,
                u64::from(draft.level.consecutive_days),
                now,
            ));
            let intents = progress.rewards.clone();
            draft.user_stats.achievements_unlocked += progress.unlocked.len() as u32;
            effects.progress.extend(progress);
            router.apply_intents(draft, intents, now, &mut effects)?;

            tracing::debug!(user_id = %draft.user_id, added, "Catalog initialized");
            Ok(effects)
        })
    }

    /// Register or update a goal; a completed goal stays completed.
    pub fn upsert_goal(&self, state: &mut ProgressionState, goal: Goal) -> Result<Goal> {
        if !goal.target_value.is_finite() || goal.target_value <= 0.0 {
            return Err(AppError::BadRequest(format!(
                "goal {} needs a positive target",
                goal.id
            )));
        }
        if !goal.current_value.is_finite() || goal.current_value < 0.0 {
            return Err(AppError::BadRequest(format!(
                "goal {} has an invalid current value",
                goal.id
            )));
        }

        let stored = match state.goals.iter_mut().find(|g| g.id == goal.id) {
            Some(existing) => {
                existing.title = goal.title;
                existing.unit = goal.unit;
                existing.target_value = goal.target_value;
                existing.current_value = goal.current_value;
                existing.deadline = goal.deadline;
                existing.clone()
            }
            None => {
                let fresh = Goal {
                    is_completed: false,
                    completed_at: None,
                    ..goal
                };
                state.goals.push(fresh.clone());
                fresh
            }
        };
        Ok(stored)
    }

    // ─── Internals ───────────────────────────────────────────────

    /// Run `mutate` on a draft and swap it in only on success.
    fn commit<F>(&self, state: &mut ProgressionState, mutate: F) -> Result<DispatchOutcome>
    where
        F: FnOnce(&Self, &mut ProgressionState) -> Result<Effects>,
    {
        let mut draft = state.clone();
        let effects = mutate(self, &mut draft)?;
        let outcome = effects.into_outcome(&draft);
        *state = draft;

        for notification in &outcome.notifications {
            self.notifier.notify(&state.user_id, notification);
        }
        Ok(outcome)
    }

    fn ensure_today(&self, draft: &mut ProgressionState, now: DateTime<Utc>) {
        draft.tracker.ensure_daily_challenges(now.date_naive());
    }

    fn apply_event(
        &self,
        draft: &mut ProgressionState,
        event: &ProgressEvent,
        now: DateTime<Utc>,
    ) -> Result<Effects> {
        let mut effects = Effects::default();
        self.ensure_today(draft, now);

        // (a) activity record
        draft.activity_log.push(ActivityRecord::new(
            &draft.user_id,
            event.activity_type(),
            now,
            event.metadata(),
        ));
        draft.user_stats.update_from_event(event, now);

        // (b) progress, plus the event's own reward
        let mut intents = Vec::new();
        let mut progress = ProgressUpdate::default();
        match event {
            ProgressEvent::VideoWatched { .. } => {
                intents.push(XpIntent::new(
                    self.settings.video_watched_xp,
                    "Watched a training video",
                    XpCategory::Bonus,
                ));
                progress.extend(draft.tracker.update_progress(MetricKey::VideosWatched, 1, now));
            }
            ProgressEvent::WorkoutCompleted {
                duration_minutes, ..
            } => {
                let bonus = self.workout_bonus(*duration_minutes);
                intents.push(XpIntent::new(
                    self.settings.workout_completed_xp + bonus,
                    format!("Completed a {}-minute workout", duration_minutes),
                    XpCategory::Bonus,
                ));
                progress.extend(draft.tracker.update_progress(
                    MetricKey::WorkoutsCompleted,
                    1,
                    now,
                ));
                progress.extend(draft.tracker.update_progress(
                    MetricKey::WorkoutMinutes,
                    u64::from(*duration_minutes),
                    now,
                ));
            }
            ProgressEvent::GoalCompleted { goal_id } => {
                let goal = draft
                    .goals
                    .iter_mut()
                    .find(|g| &g.id == goal_id)
                    .ok_or_else(|| AppError::NotFound(format!("Goal {}", goal_id)))?;
                if goal.is_completed {
                    return Err(AppError::EventProcessing(format!(
                        "goal {} is already completed",
                        goal_id
                    )));
                }
                goal.is_completed = true;
                goal.completed_at = Some(now);
                intents.push(XpIntent::new(
                    self.settings.goal_completed_xp,
                    format!("Goal completed: {}", goal.title),
                    XpCategory::GoalCompletion,
                ));
                progress.extend(draft.tracker.update_progress(MetricKey::GoalsCompleted, 1, now));
            }
            ProgressEvent::ChallengeCompleted { challenge_id } => {
                let (challenge, intent) = draft.tracker.complete_challenge(challenge_id, now)?;
                intents.push(intent);
                effects.notifications.push(Notification::ChallengeCompleted {
                    challenge_id: challenge.id.clone(),
                    title: challenge.title.clone(),
                    xp: challenge.rewards.xp,
                });
                progress.extend(draft.tracker.update_progress(
                    MetricKey::ChallengesCompleted,
                    1,
                    now,
                ));
            }
            ProgressEvent::Login => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "login events are handled by check_daily_login"
                )));
            }
        }

        // Any activity can extend the streak
        let today = now.date_naive();
        let streak_days = streak::consecutive_days(&draft.activity_log, today);
        draft.level.consecutive_days = streak_days;
        draft.user_stats.record_streak(streak_days);
        progress.extend(
            draft
                .tracker
                .observe_metric(MetricKey::StreakDays, u64::from(streak_days), now),
        );

        // (c) base reward first, then one grant per unlock
        intents.extend(progress.rewards.iter().cloned());
        draft.user_stats.achievements_unlocked += progress.unlocked.len() as u32;
        effects.progress.extend(progress);

        // (d) apply
        self.apply_intents(draft, intents, now, &mut effects)?;

        tracing::info!(
            user_id = %draft.user_id,
            xp = effects.xp,
            level = draft.level.current_level,
            unlocked = effects.progress.unlocked.len(),
            "Event dispatched"
        );
        Ok(effects)
    }

    /// Workout bonus: XP per full block of minutes, capped.
    fn workout_bonus(&self, duration_minutes: u32) -> u64 {
        if self.settings.workout_bonus_minutes == 0 {
            return 0;
        }
        let blocks = u64::from(duration_minutes / self.settings.workout_bonus_minutes);
        (blocks * self.settings.workout_bonus_xp_per_block).min(self.settings.workout_bonus_cap_xp)
    }

    /// Apply grants in order; level-ups can unlock level achievements whose
    /// rewards are queued behind the current grants.
    fn apply_intents(
        &self,
        draft: &mut ProgressionState,
        intents: Vec<XpIntent>,
        now: DateTime<Utc>,
        effects: &mut Effects,
    ) -> Result<()> {
        let mut queue: VecDeque<XpIntent> = intents.into();

        while let Some(intent) = queue.pop_front() {
            let amount = i64::try_from(intent.amount).map_err(|_| {
                AppError::InvalidGrant(format!("XP amount {} out of range", intent.amount))
            })?;
            let applied = self.curve.apply_xp(&draft.level, amount)?;
            draft.level = applied.state;

            push_grant(
                &mut draft.xp_history,
                XpGrant::new(intent.amount, intent.reason, intent.category, now),
                self.settings.xp_history_cap,
            );
            effects.xp += intent.amount;

            if applied.did_level_up {
                effects.levels_gained += applied.levels_gained;
                tracing::info!(
                    user_id = %draft.user_id,
                    new_level = applied.new_level,
                    total_xp = draft.level.total_xp,
                    "Level up"
                );
                let unlocked = draft.tracker.observe_metric(
                    MetricKey::LevelReached,
                    u64::from(applied.new_level),
                    now,
                );
                queue.extend(unlocked.rewards.iter().cloned());
                draft.user_stats.achievements_unlocked += unlocked.unlocked.len() as u32;
                effects.progress.extend(unlocked);
            }
        }
        Ok(())
    }
}
