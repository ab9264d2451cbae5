// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Streak and daily-login evaluation.
//!
//! Streaks are derived from the activity log by calendar day. A streak is
//! live when its most recent day is today or yesterday; anything older has
//! lapsed and counts as zero.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

use crate::config::ProgressionSettings;
use crate::models::{ActivityRecord, ActivityType, LevelState};

/// Every fifth consecutive day earns the streak boost.
const BOOST_EVERY_DAYS: u32 = 5;
/// Milestones fire on these days and on every multiple of seven.
const MILESTONE_DAYS: [u32; 3] = [1, 30, 100];
const WEEKLY_MILESTONE: u32 = 7;

/// Distinct calendar days with at least one record.
pub fn active_days<'a>(records: impl IntoIterator<Item = &'a ActivityRecord>) -> BTreeSet<NaiveDate> {
    records.into_iter().map(ActivityRecord::day).collect()
}

/// Length of the run of consecutive active days ending at the most recent
/// active day, or 0 if that day is neither `today` nor yesterday.
///
/// Records dated after `today` are ignored.
pub fn consecutive_days<'a>(
    records: impl IntoIterator<Item = &'a ActivityRecord>,
    today: NaiveDate,
) -> u32 {
    let days = active_days(records);
    let mut walk = days.range(..=today).rev();

    let Some(&most_recent) = walk.next() else {
        return 0;
    };
    if (today - most_recent).num_days() > 1 {
        return 0;
    }

    let mut streak = 1;
    let mut previous = most_recent;
    for &day in walk {
        if (previous - day).num_days() != 1 {
            break;
        }
        streak += 1;
        previous = day;
    }
    streak
}

/// Longest run of consecutive active days anywhere in the log.
pub fn longest_streak<'a>(records: impl IntoIterator<Item = &'a ActivityRecord>) -> u32 {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<NaiveDate> = None;

    for day in active_days(records) {
        current = match previous {
            Some(p) if (day - p).num_days() == 1 => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(day);
    }
    longest
}

/// Advisory milestone days: 1, 30, 100 and every seventh day.
pub fn is_milestone(days: u32) -> bool {
    days > 0 && (MILESTONE_DAYS.contains(&days) || days % WEEKLY_MILESTONE == 0)
}

/// Whether the streak boost is owed for `today`.
pub fn boost_due(consecutive_days: u32, last_boost_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    consecutive_days > 0
        && consecutive_days % BOOST_EVERY_DAYS == 0
        && last_boost_date != Some(today)
}

/// Effects of the first login of a calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginPlan {
    pub today: NaiveDate,
    pub record: ActivityRecord,
    pub consecutive_days: u32,
    pub login_bonus_xp: u64,
    pub boost_xp: Option<u64>,
    pub milestone: Option<u32>,
}

/// Decides daily-login bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakEvaluator {
    login_bonus_xp: u64,
    streak_boost_xp: u64,
}

impl StreakEvaluator {
    pub fn new(login_bonus_xp: u64, streak_boost_xp: u64) -> Self {
        Self {
            login_bonus_xp,
            streak_boost_xp,
        }
    }

    pub fn from_settings(settings: &ProgressionSettings) -> Self {
        Self::new(settings.login_bonus_xp, settings.streak_boost_xp)
    }

    /// Plan today's login, or `None` if today's login was already counted.
    pub fn plan_daily_login(
        &self,
        user_id: &str,
        level: &LevelState,
        log: &[ActivityRecord],
        now: DateTime<Utc>,
    ) -> Option<LoginPlan> {
        let today = now.date_naive();
        if level.last_login_date == Some(today) {
            return None;
        }

        let record = ActivityRecord::new(user_id, ActivityType::Login, now, serde_json::Value::Null);
        let streak = consecutive_days(log.iter().chain(std::iter::once(&record)), today);

        Some(LoginPlan {
            today,
            consecutive_days: streak,
            login_bonus_xp: self.login_bonus_xp,
            boost_xp: boost_due(streak, level.last_boost_date, today).then_some(self.streak_boost_xp),
            milestone: is_milestone(streak).then_some(streak),
            record,
        })
    }
}

impl Default for StreakEvaluator {
    fn default() -> Self {
        Self::from_settings(&ProgressionSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn record_on(d: u32, hour: u32) -> ActivityRecord {
        ActivityRecord::new(
            "user-1",
            ActivityType::WorkoutCompleted,
            Utc.with_ymd_and_hms(2026, 5, d, hour, 0, 0).unwrap(),
            serde_json::Value::Null,
        )
    }

    #[test]
    fn test_consecutive_run_ending_today() {
        let log = vec![record_on(10, 8), record_on(11, 23), record_on(12, 0), record_on(12, 18)];
        assert_eq!(consecutive_days(&log, day(12)), 3);
    }

    #[test]
    fn test_run_ending_yesterday_is_live() {
        let log = vec![record_on(10, 8), record_on(11, 8)];
        assert_eq!(consecutive_days(&log, day(12)), 2);
    }

    #[test]
    fn test_streak_lapses_after_gap() {
        // Active D-2, D-1, D; queried on D+3
        let log = vec![record_on(8, 9), record_on(9, 9), record_on(10, 9)];
        assert_eq!(consecutive_days(&log, day(13)), 0);
    }

    #[test]
    fn test_gap_ends_walk() {
        let log = vec![record_on(5, 9), record_on(6, 9), record_on(8, 9), record_on(9, 9)];
        assert_eq!(consecutive_days(&log, day(9)), 2);
    }

    #[test]
    fn test_future_records_ignored() {
        let log = vec![record_on(9, 9), record_on(20, 9)];
        assert_eq!(consecutive_days(&log, day(10)), 1);
    }

    #[test]
    fn test_empty_log() {
        assert_eq!(consecutive_days(&[], day(1)), 0);
        assert_eq!(longest_streak(&[]), 0);
    }

    #[test]
    fn test_longest_streak_finds_historical_run() {
        let log: Vec<_> = [1, 2, 3, 4, 10, 11].iter().map(|d| record_on(*d, 7)).collect();
        assert_eq!(longest_streak(&log), 4);
    }

    #[test]
    fn test_milestones() {
        let fired: Vec<u32> = (0..=35).filter(|d| is_milestone(*d)).collect();
        assert_eq!(fired, vec![1, 7, 14, 21, 28, 30, 35]);
        assert!(is_milestone(100));
    }

    #[test]
    fn test_boost_guarded_by_last_boost_date() {
        assert!(boost_due(5, None, day(5)));
        assert!(boost_due(10, Some(day(4)), day(5)));
        assert!(!boost_due(5, Some(day(5)), day(5)));
        assert!(!boost_due(4, None, day(5)));
        assert!(!boost_due(0, None, day(5)));
    }

    #[test]
    fn test_plan_skips_second_login_same_day() {
        let evaluator = StreakEvaluator::default();
        let mut level = LevelState::starting(100);
        let now = Utc.with_ymd_and_hms(2026, 5, 12, 7, 0, 0).unwrap();

        let plan = evaluator.plan_daily_login("user-1", &level, &[], now).unwrap();
        assert_eq!(plan.consecutive_days, 1);
        assert_eq!(plan.milestone, Some(1));
        assert_eq!(plan.boost_xp, None);

        level.last_login_date = Some(plan.today);
        let later = now + Duration::hours(10);
        assert!(evaluator.plan_daily_login("user-1", &level, &[plan.record], later).is_none());
    }

    #[test]
    fn test_plan_fifth_day_boost() {
        let evaluator = StreakEvaluator::new(10, 50);
        let log: Vec<_> = (8..=11).map(|d| record_on(d, 9)).collect();
        let level = LevelState {
            last_login_date: Some(day(11)),
            ..LevelState::starting(100)
        };
        let now = Utc.with_ymd_and_hms(2026, 5, 12, 6, 0, 0).unwrap();

        let plan = evaluator.plan_daily_login("user-1", &level, &log, now).unwrap();

        assert_eq!(plan.consecutive_days, 5);
        assert_eq!(plan.login_bonus_xp, 10);
        assert_eq!(plan.boost_xp, Some(50));
        assert_eq!(plan.milestone, None);
    }
}
