// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Progression API, one resource tree per user.
//!
//! Every handler goes through the user's session, starting it on first use,
//! so requests for one user are serialized by that session.

use crate::error::{AppError, Result};
use crate::models::{
    Achievement, AchievementCategory, ActivityRecord, Challenge, ChallengeStatus, DailyChallenge,
    Goal, ProgressEvent, UserStats, XpCategory, XpGrant,
};
use crate::services::{DispatchOutcome, EndReport, LevelSummary, SessionHandle};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const DEFAULT_ACTIVITY_DAYS: i64 = 90;
const MAX_ACTIVITY_DAYS: i64 = 365;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/users/{user_id}/session",
            post(start_session).delete(end_session),
        )
        .route("/api/users/{user_id}/events", post(dispatch_event))
        .route("/api/users/{user_id}/xp", post(add_xp))
        .route("/api/users/{user_id}/login", post(daily_login))
        .route("/api/users/{user_id}/progress", get(get_progress))
        .route("/api/users/{user_id}/achievements", get(get_achievements))
        .route("/api/users/{user_id}/challenges", get(get_challenges))
        .route(
            "/api/users/{user_id}/challenges/{challenge_id}/complete",
            post(complete_challenge),
        )
        .route(
            "/api/users/{user_id}/daily-challenges",
            get(get_daily_challenges),
        )
        .route("/api/users/{user_id}/goals/{goal_id}", put(upsert_goal))
        .route("/api/users/{user_id}/xp-history", get(get_xp_history))
        .route("/api/users/{user_id}/activity", get(get_activity))
        .route("/api/users/{user_id}/stats", get(get_stats))
        .route("/api/users/{user_id}/sync", post(force_sync))
}

async fn session(state: &AppState, user_id: &str) -> Result<SessionHandle> {
    if user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user id must not be empty".to_string()));
    }
    state.sessions.start(user_id).await
}

// ─── Session ─────────────────────────────────────────────────

/// Overview returned when a session starts and by `/progress`.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProgressResponse {
    pub user_id: String,
    pub level: LevelSummary,
    pub achievements_unlocked: usize,
    pub achievements_total: usize,
    pub active_challenges: usize,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub version: u64,
    pub last_sync_at: Option<String>,
}

async fn progress_response(state: &AppState, handle: &SessionHandle) -> Result<ProgressResponse> {
    let snapshot = handle.snapshot().await?;
    let now = state.router.now();
    Ok(ProgressResponse {
        level: state.router.curve().summary(&snapshot.level),
        achievements_unlocked: snapshot.tracker.unlocked_achievements().len(),
        achievements_total: snapshot.tracker.achievements.len(),
        active_challenges: snapshot.tracker.active_challenges(now).len(),
        version: snapshot.version,
        last_sync_at: snapshot.last_sync_at.map(format_utc_rfc3339),
        user_id: snapshot.user_id,
    })
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ProgressResponse>> {
    let handle = session(&state, &user_id).await?;
    tracing::info!(user_id = %user_id, "Session requested");
    Ok(Json(progress_response(&state, &handle).await?))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<EndReport>> {
    Ok(Json(state.sessions.end(&user_id).await?))
}

async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ProgressResponse>> {
    let handle = session(&state, &user_id).await?;
    Ok(Json(progress_response(&state, &handle).await?))
}

// ─── Events and XP ───────────────────────────────────────────

async fn dispatch_event(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(event): Json<ProgressEvent>,
) -> Result<Json<DispatchOutcome>> {
    let handle = session(&state, &user_id).await?;
    Ok(Json(handle.dispatch(event).await?))
}

#[derive(Deserialize)]
pub struct AddXpRequest {
    pub amount: i64,
    pub reason: String,
    pub category: Option<XpCategory>,
}

async fn add_xp(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<AddXpRequest>,
) -> Result<Json<DispatchOutcome>> {
    if request.reason.trim().is_empty() {
        return Err(AppError::BadRequest("reason must not be empty".to_string()));
    }
    let handle = session(&state, &user_id).await?;
    let category = request.category.unwrap_or(XpCategory::Bonus);
    Ok(Json(
        handle
            .add_xp(request.amount, request.reason, category)
            .await?,
    ))
}

async fn daily_login(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<DispatchOutcome>> {
    let handle = session(&state, &user_id).await?;
    Ok(Json(handle.check_daily_login().await?))
}

// ─── Achievements and Challenges ─────────────────────────────

#[derive(Deserialize)]
struct AchievementsQuery {
    category: Option<String>,
}

async fn get_achievements(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<AchievementsQuery>,
) -> Result<Json<Vec<Achievement>>> {
    let snapshot = session(&state, &user_id).await?.snapshot().await?;

    let achievements = match params.category.as_deref() {
        Some(raw) => {
            let category: AchievementCategory = raw.parse().map_err(AppError::BadRequest)?;
            snapshot
                .tracker
                .achievements_by_category(category)
                .into_iter()
                .cloned()
                .collect()
        }
        None => snapshot.tracker.achievements,
    };
    Ok(Json(achievements))
}

#[derive(Deserialize)]
struct ChallengesQuery {
    status: Option<String>,
}

#[derive(Serialize)]
pub struct ChallengeView {
    #[serde(flatten)]
    pub challenge: Challenge,
    pub status: ChallengeStatus,
}

async fn get_challenges(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<ChallengesQuery>,
) -> Result<Json<Vec<ChallengeView>>> {
    let wanted: Option<ChallengeStatus> = params
        .status
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let snapshot = session(&state, &user_id).await?.snapshot().await?;
    let now = state.router.now();

    let views = snapshot
        .tracker
        .challenges
        .into_iter()
        .map(|challenge| ChallengeView {
            status: challenge.status(now),
            challenge,
        })
        .filter(|view| wanted.is_none_or(|status| view.status == status))
        .collect();
    Ok(Json(views))
}

async fn complete_challenge(
    State(state): State<Arc<AppState>>,
    Path((user_id, challenge_id)): Path<(String, String)>,
) -> Result<Json<DispatchOutcome>> {
    let handle = session(&state, &user_id).await?;
    Ok(Json(handle.complete_challenge(&challenge_id).await?))
}

async fn get_daily_challenges(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<DailyChallenge>>> {
    let snapshot = session(&state, &user_id).await?.snapshot().await?;
    let today = state.router.now().date_naive();
    Ok(Json(
        snapshot
            .tracker
            .daily_challenges_for(today)
            .into_iter()
            .cloned()
            .collect(),
    ))
}

// ─── Goals ───────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalRequest {
    pub title: String,
    #[serde(default)]
    pub unit: String,
    pub target_value: f64,
    #[serde(default)]
    pub current_value: f64,
    pub deadline: Option<NaiveDate>,
}

async fn upsert_goal(
    State(state): State<Arc<AppState>>,
    Path((user_id, goal_id)): Path<(String, String)>,
    Json(request): Json<GoalRequest>,
) -> Result<Json<Goal>> {
    let handle = session(&state, &user_id).await?;
    let goal = Goal {
        id: goal_id,
        title: request.title,
        unit: request.unit,
        target_value: request.target_value,
        current_value: request.current_value,
        deadline: request.deadline,
        is_completed: false,
        completed_at: None,
    };
    Ok(Json(handle.upsert_goal(goal).await?))
}

// ─── History and Stats ───────────────────────────────────────

async fn get_xp_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<XpGrant>>> {
    let snapshot = session(&state, &user_id).await?.snapshot().await?;
    Ok(Json(snapshot.xp_history))
}

#[derive(Deserialize)]
struct ActivityQuery {
    days: Option<i64>,
}

async fn get_activity(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityRecord>>> {
    let days = params.days.unwrap_or(DEFAULT_ACTIVITY_DAYS);
    if !(1..=MAX_ACTIVITY_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_ACTIVITY_DAYS
        )));
    }

    let snapshot = session(&state, &user_id).await?.snapshot().await?;
    let now = state.router.now();
    Ok(Json(
        snapshot
            .recent_activity(now, days)
            .into_iter()
            .cloned()
            .collect(),
    ))
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStats>> {
    let snapshot = session(&state, &user_id).await?.snapshot().await?;
    Ok(Json(snapshot.user_stats))
}

// ─── Sync ────────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub version: u64,
    pub last_sync_at: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_xp: u64,
}

async fn force_sync(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SyncResponse>> {
    let synced = session(&state, &user_id).await?.force_sync().await?;
    Ok(Json(SyncResponse {
        version: synced.version,
        last_sync_at: synced.last_sync_at.map(format_utc_rfc3339),
        total_xp: synced.level.total_xp,
    }))
}
