// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod achievements;
pub mod catalog;
pub mod level;
pub mod notifier;
pub mod reconcile;
pub mod router;
pub mod session;
pub mod streak;
pub mod sync;

pub use achievements::{AchievementTracker, ProgressUpdate};
pub use catalog::{Catalog, CatalogError, CatalogService};
pub use level::{LevelCurve, LevelSummary, XpApplication};
pub use notifier::{BroadcastNotifier, Notifier, RecordingNotifier, UserNotification};
pub use router::{DispatchOutcome, EventRouter};
pub use session::{EndReport, SessionContext, SessionHandle, SessionRegistry};
pub use streak::{LoginPlan, StreakEvaluator};
pub use sync::{LoadSource, SyncService};
