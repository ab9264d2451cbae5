// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Achievement, challenge and daily-challenge progress tracking.
//!
//! The tracker never grants XP itself. Unlocks and completions come back as
//! [`XpIntent`]s that the event router applies, so every reward goes through
//! exactly one path.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{
    Achievement, AchievementCategory, Challenge, ChallengeStatus, DailyChallenge, MetricKey,
    XpCategory, XpIntent,
};
use crate::services::catalog::Catalog;

/// Daily challenges older than this many days are dropped.
const DAILY_RETENTION_DAYS: i64 = 7;
const DAILY_CHALLENGES_PER_DAY: usize = 3;

/// (title, metric, target, reward XP)
const DAILY_TEMPLATES: [(&str, MetricKey, u64, u64); 6] = [
    ("Watch a training video", MetricKey::VideosWatched, 1, 15),
    ("Complete a workout", MetricKey::WorkoutsCompleted, 1, 25),
    ("Train for 30 minutes", MetricKey::WorkoutMinutes, 30, 30),
    ("Watch 3 training videos", MetricKey::VideosWatched, 3, 35),
    ("Complete 2 workouts", MetricKey::WorkoutsCompleted, 2, 40),
    ("Train for 60 minutes", MetricKey::WorkoutMinutes, 60, 50),
];

/// Achievement and challenge progress for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementTracker {
    pub achievements: Vec<Achievement>,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(default)]
    pub daily_challenges: Vec<DailyChallenge>,
}

/// What a progress update changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Achievements that crossed their requirement in this call
    pub unlocked: Vec<Achievement>,
    /// Daily challenges completed in this call
    pub daily_completed: Vec<DailyChallenge>,
    /// One reward per unlock/completion, never coalesced
    pub rewards: Vec<XpIntent>,
}

impl ProgressUpdate {
    pub fn extend(&mut self, other: ProgressUpdate) {
        self.unlocked.extend(other.unlocked);
        self.daily_completed.extend(other.daily_completed);
        self.rewards.extend(other.rewards);
    }

    pub fn is_empty(&self) -> bool {
        self.unlocked.is_empty() && self.daily_completed.is_empty()
    }
}

impl AchievementTracker {
    /// Seed catalog entries, merging by id.
    ///
    /// Existing entries keep their progress, unlock state and requirement;
    /// only display fields are refreshed. Entries missing from the catalog
    /// are kept. Returns the number of newly seeded entries.
    pub fn initialize(&mut self, catalog: &Catalog) -> usize {
        let mut added = 0;

        for def in &catalog.achievements {
            match self.achievements.iter_mut().find(|a| a.id == def.id) {
                Some(existing) => {
                    existing.title = def.title.clone();
                    existing.description = def.description.clone();
                    existing.rarity = def.rarity;
                    existing.reward = def.reward.clone();
                    existing.current_progress = existing.current_progress.max(def.current_progress);
                }
                None => {
                    self.achievements.push(def.fresh());
                    added += 1;
                }
            }
        }

        for def in &catalog.challenges {
            match self.challenges.iter_mut().find(|c| c.id == def.id) {
                Some(existing) => {
                    existing.title = def.title.clone();
                    existing.description = def.description.clone();
                    existing.participants = existing.participants.max(def.participants);
                }
                None => {
                    self.challenges.push(def.fresh());
                    added += 1;
                }
            }
        }

        added
    }

    /// Add `delta` to every achievement, active challenge requirement and
    /// today's daily challenge tracking `metric`.
    pub fn update_progress(
        &mut self,
        metric: MetricKey,
        delta: u64,
        now: DateTime<Utc>,
    ) -> ProgressUpdate {
        if delta == 0 {
            return ProgressUpdate::default();
        }
        self.advance(metric, now, |current| current.saturating_add(delta))
    }

    /// Raise progress on a gauge metric to `value`; lower values are ignored.
    pub fn observe_metric(
        &mut self,
        metric: MetricKey,
        value: u64,
        now: DateTime<Utc>,
    ) -> ProgressUpdate {
        self.advance(metric, now, |_| value)
    }

    fn advance(
        &mut self,
        metric: MetricKey,
        now: DateTime<Utc>,
        step: impl Fn(u64) -> u64,
    ) -> ProgressUpdate {
        let mut update = ProgressUpdate::default();

        for achievement in self
            .achievements
            .iter_mut()
            .filter(|a| a.metric == metric && !a.is_unlocked)
        {
            let proposed = step(achievement.current_progress);
            achievement.current_progress = proposed
                .max(achievement.current_progress)
                .min(achievement.requirement);

            if achievement.current_progress >= achievement.requirement {
                achievement.is_unlocked = true;
                achievement.unlocked_at = Some(now);
                tracing::info!(
                    achievement_id = %achievement.id,
                    reward_xp = achievement.reward.xp,
                    "Achievement unlocked"
                );
                if achievement.reward.xp > 0 {
                    update.rewards.push(XpIntent::new(
                        achievement.reward.xp,
                        format!("Achievement unlocked: {}", achievement.title),
                        XpCategory::Bonus,
                    ));
                }
                update.unlocked.push(achievement.clone());
            }
        }

        for challenge in self
            .challenges
            .iter_mut()
            .filter(|c| c.status(now) == ChallengeStatus::Active)
        {
            for requirement in challenge
                .requirements
                .iter_mut()
                .filter(|r| r.metric == metric)
            {
                let proposed = step(requirement.current);
                requirement.current = proposed.max(requirement.current).min(requirement.target);
            }
        }

        let today = now.date_naive();
        for daily in self
            .daily_challenges
            .iter_mut()
            .filter(|d| d.date == today && d.metric == metric && !d.is_completed)
        {
            let proposed = step(daily.current);
            daily.current = proposed.max(daily.current).min(daily.target);

            if daily.current >= daily.target {
                daily.is_completed = true;
                daily.completed_at = Some(now);
                tracing::info!(daily_id = %daily.id, "Daily challenge completed");
                if daily.reward_xp > 0 {
                    update.rewards.push(XpIntent::new(
                        daily.reward_xp,
                        format!("Daily challenge: {}", daily.title),
                        XpCategory::ChallengeCompletion,
                    ));
                }
                update.daily_completed.push(daily.clone());
            }
        }

        update
    }

    /// Mark a challenge completed and return its reward.
    ///
    /// Only legal before `end_date`, while not yet completed, and with every
    /// requirement counter at its target.
    pub fn complete_challenge(
        &mut self,
        challenge_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Challenge, XpIntent)> {
        let challenge = self
            .challenges
            .iter_mut()
            .find(|c| c.id == challenge_id)
            .ok_or_else(|| AppError::NotFound(format!("Challenge {}", challenge_id)))?;

        if challenge.is_completed {
            return Err(AppError::ChallengeNotEligible(format!(
                "{} is already completed",
                challenge_id
            )));
        }
        if now >= challenge.end_date {
            return Err(AppError::ChallengeNotEligible(format!(
                "{} expired at {}",
                challenge_id, challenge.end_date
            )));
        }
        if !challenge.requirements_met() {
            return Err(AppError::ChallengeNotEligible(format!(
                "{} requirements not met",
                challenge_id
            )));
        }

        challenge.is_completed = true;
        challenge.completed_at = Some(now);

        let intent = XpIntent::new(
            challenge.rewards.xp,
            format!("Challenge completed: {}", challenge.title),
            XpCategory::ChallengeCompletion,
        );
        Ok((challenge.clone(), intent))
    }

    /// Generate today's daily challenges if missing and drop stale ones.
    /// Returns true when new challenges were created.
    pub fn ensure_daily_challenges(&mut self, today: NaiveDate) -> bool {
        let cutoff = today - Duration::days(DAILY_RETENTION_DAYS);
        self.daily_challenges.retain(|d| d.date > cutoff);

        if self.daily_challenges.iter().any(|d| d.date == today) {
            return false;
        }

        let offset = today.num_days_from_ce().unsigned_abs() as usize;
        for slot in 0..DAILY_CHALLENGES_PER_DAY {
            let (title, metric, target, reward_xp) =
                DAILY_TEMPLATES[(offset + slot * 2) % DAILY_TEMPLATES.len()];
            self.daily_challenges.push(DailyChallenge {
                id: format!("daily-{}-{}", today, slot),
                date: today,
                title: title.to_string(),
                metric,
                target,
                current: 0,
                reward_xp,
                is_completed: false,
                completed_at: None,
            });
        }
        true
    }

    // ─── Read-only projections ───────────────────────────────────

    pub fn challenges_with_status(
        &self,
        status: ChallengeStatus,
        now: DateTime<Utc>,
    ) -> Vec<&Challenge> {
        self.challenges
            .iter()
            .filter(|c| c.status(now) == status)
            .collect()
    }

    pub fn active_challenges(&self, now: DateTime<Utc>) -> Vec<&Challenge> {
        self.challenges_with_status(ChallengeStatus::Active, now)
    }

    pub fn completed_challenges(&self) -> Vec<&Challenge> {
        self.challenges.iter().filter(|c| c.is_completed).collect()
    }

    pub fn achievements_by_category(&self, category: AchievementCategory) -> Vec<&Achievement> {
        self.achievements
            .iter()
            .filter(|a| a.category == category)
            .collect()
    }

    pub fn unlocked_achievements(&self) -> Vec<&Achievement> {
        self.achievements.iter().filter(|a| a.is_unlocked).collect()
    }

    pub fn daily_challenges_for(&self, day: NaiveDate) -> Vec<&DailyChallenge> {
        self.daily_challenges
            .iter()
            .filter(|d| d.date == day)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChallengeRequirement, ChallengeReward, Rarity, Reward};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    fn achievement(id: &str, metric: MetricKey, requirement: u64, xp: u64) -> Achievement {
        Achievement {
            id: id.to_string(),
            title: format!("Title {}", id),
            description: String::new(),
            category: AchievementCategory::Workout,
            rarity: Rarity::Common,
            metric,
            requirement,
            current_progress: 0,
            is_unlocked: false,
            unlocked_at: None,
            reward: Reward { xp, title: None },
        }
    }

    fn challenge(id: &str, end: DateTime<Utc>) -> Challenge {
        Challenge {
            id: id.to_string(),
            title: "Week of Sweat".to_string(),
            description: String::new(),
            requirements: vec![
                ChallengeRequirement {
                    description: "Complete 2 workouts".to_string(),
                    metric: MetricKey::WorkoutsCompleted,
                    target: 2,
                    current: 0,
                },
                ChallengeRequirement {
                    description: "Watch a video".to_string(),
                    metric: MetricKey::VideosWatched,
                    target: 1,
                    current: 0,
                },
            ],
            start_date: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            end_date: end,
            is_completed: false,
            completed_at: None,
            participants: 0,
            rewards: ChallengeReward { xp: 300 },
        }
    }

    fn tracker() -> AchievementTracker {
        let catalog = Catalog {
            achievements: vec![
                achievement("five-workouts", MetricKey::WorkoutsCompleted, 5, 50),
                achievement("first-workout", MetricKey::WorkoutsCompleted, 1, 20),
                achievement("first-video", MetricKey::VideosWatched, 1, 10),
            ],
            challenges: vec![challenge(
                "week",
                Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap(),
            )],
        };
        let mut tracker = AchievementTracker::default();
        tracker.initialize(&catalog);
        tracker
    }

    #[test]
    fn test_progress_accumulates_to_single_unlock() {
        let mut tracker = tracker();

        let first = tracker.update_progress(MetricKey::WorkoutsCompleted, 3, now());
        let second = tracker.update_progress(MetricKey::WorkoutsCompleted, 2, now());

        let five = tracker
            .achievements
            .iter()
            .find(|a| a.id == "five-workouts")
            .unwrap();
        assert_eq!(five.current_progress, 5);
        assert!(five.is_unlocked);

        let unlocks_of_five = first
            .unlocked
            .iter()
            .chain(second.unlocked.iter())
            .filter(|a| a.id == "five-workouts")
            .count();
        assert_eq!(unlocks_of_five, 1);
        assert!(second.unlocked.iter().any(|a| a.id == "five-workouts"));
    }

    #[test]
    fn test_multiple_unlocks_each_report_reward() {
        let mut tracker = tracker();

        let update = tracker.update_progress(MetricKey::WorkoutsCompleted, 5, now());

        assert_eq!(update.unlocked.len(), 2);
        let mut amounts: Vec<u64> = update.rewards.iter().map(|r| r.amount).collect();
        amounts.sort();
        assert_eq!(amounts, vec![20, 50]);
    }

    #[test]
    fn test_unlocked_achievement_is_frozen() {
        let mut tracker = tracker();
        tracker.update_progress(MetricKey::VideosWatched, 1, now());
        let unlocked_at = tracker.achievements[2].unlocked_at;

        let later = now() + Duration::days(3);
        let update = tracker.update_progress(MetricKey::VideosWatched, 10, later);

        assert!(update.unlocked.is_empty());
        let video = &tracker.achievements[2];
        assert_eq!(video.current_progress, 1);
        assert_eq!(video.unlocked_at, unlocked_at);
    }

    #[test]
    fn test_progress_clamped_to_requirement() {
        let mut tracker = tracker();
        tracker.update_progress(MetricKey::WorkoutsCompleted, 100, now());
        let five = &tracker.achievements[0];
        assert_eq!(five.current_progress, 5);
    }

    #[test]
    fn test_gauge_never_lowers_progress() {
        let mut tracker = AchievementTracker {
            achievements: vec![achievement("streak-7", MetricKey::StreakDays, 7, 70)],
            ..Default::default()
        };

        tracker.observe_metric(MetricKey::StreakDays, 4, now());
        tracker.observe_metric(MetricKey::StreakDays, 1, now());
        assert_eq!(tracker.achievements[0].current_progress, 4);

        let update = tracker.observe_metric(MetricKey::StreakDays, 7, now());
        assert_eq!(update.unlocked.len(), 1);
    }

    #[test]
    fn test_reinitialize_keeps_progress() {
        let mut tracker = tracker();
        tracker.update_progress(MetricKey::WorkoutsCompleted, 3, now());

        let catalog = Catalog {
            achievements: vec![achievement("five-workouts", MetricKey::WorkoutsCompleted, 5, 75)],
            challenges: vec![],
        };
        let added = tracker.initialize(&catalog);

        assert_eq!(added, 0);
        let five = &tracker.achievements[0];
        assert_eq!(five.current_progress, 3);
        assert_eq!(five.reward.xp, 75);
        // Entries absent from the new catalog are kept
        assert_eq!(tracker.achievements.len(), 3);
    }

    #[test]
    fn test_complete_challenge_requires_met_requirements() {
        let mut tracker = tracker();
        let result = tracker.complete_challenge("week", now());
        assert!(matches!(result, Err(AppError::ChallengeNotEligible(_))));

        tracker.update_progress(MetricKey::WorkoutsCompleted, 2, now());
        tracker.update_progress(MetricKey::VideosWatched, 1, now());
        let (challenge, intent) = tracker.complete_challenge("week", now()).unwrap();

        assert!(challenge.is_completed);
        assert_eq!(intent.amount, 300);
        assert_eq!(intent.category, XpCategory::ChallengeCompletion);

        let again = tracker.complete_challenge("week", now());
        assert!(matches!(again, Err(AppError::ChallengeNotEligible(_))));
    }

    #[test]
    fn test_expired_challenge_not_completable() {
        let mut tracker = AchievementTracker {
            challenges: vec![challenge(
                "old",
                Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
            )],
            ..Default::default()
        };

        let result = tracker.complete_challenge("old", now());

        assert!(matches!(result, Err(AppError::ChallengeNotEligible(_))));
        assert!(!tracker.challenges[0].is_completed);
        assert_eq!(tracker.expired_count(now()), 1);
    }

    #[test]
    fn test_expired_challenge_counters_frozen() {
        let mut tracker = AchievementTracker {
            challenges: vec![challenge(
                "old",
                Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
            )],
            ..Default::default()
        };
        tracker.update_progress(MetricKey::WorkoutsCompleted, 2, now());
        assert_eq!(tracker.challenges[0].requirements[0].current, 0);
    }

    #[test]
    fn test_unknown_challenge_not_found() {
        let mut tracker = tracker();
        let result = tracker.complete_challenge("nope", now());
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_daily_challenges_generated_once_per_day() {
        let mut tracker = AchievementTracker::default();
        let today = now().date_naive();

        assert!(tracker.ensure_daily_challenges(today));
        assert!(!tracker.ensure_daily_challenges(today));
        assert_eq!(tracker.daily_challenges_for(today).len(), DAILY_CHALLENGES_PER_DAY);

        let ids: std::collections::HashSet<_> =
            tracker.daily_challenges.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids.len(), DAILY_CHALLENGES_PER_DAY);
    }

    #[test]
    fn test_daily_challenges_pruned_after_a_week() {
        let mut tracker = AchievementTracker::default();
        let today = now().date_naive();
        tracker.ensure_daily_challenges(today);
        tracker.ensure_daily_challenges(today + Duration::days(DAILY_RETENTION_DAYS));

        assert!(tracker.daily_challenges_for(today).is_empty());
    }

    #[test]
    fn test_daily_challenge_completes_once() {
        let mut tracker = AchievementTracker::default();
        tracker.daily_challenges.push(DailyChallenge {
            id: "daily-test".to_string(),
            date: now().date_naive(),
            title: "Complete a workout".to_string(),
            metric: MetricKey::WorkoutsCompleted,
            target: 1,
            current: 0,
            reward_xp: 25,
            is_completed: false,
            completed_at: None,
        });

        let first = tracker.update_progress(MetricKey::WorkoutsCompleted, 1, now());
        let second = tracker.update_progress(MetricKey::WorkoutsCompleted, 1, now());

        assert_eq!(first.daily_completed.len(), 1);
        assert_eq!(first.rewards.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_category_projection() {
        let tracker = tracker();
        assert_eq!(
            tracker
                .achievements_by_category(AchievementCategory::Workout)
                .len(),
            3
        );
        assert!(tracker
            .achievements_by_category(AchievementCategory::Learning)
            .is_empty());
    }

    impl AchievementTracker {
        fn expired_count(&self, now: DateTime<Utc>) -> usize {
            self.challenges_with_status(ChallengeStatus::Expired, now)
                .len()
        }
    }
}
