// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user progression sessions.
//!
//! Each session is a single tokio task that owns the user's state. Callers
//! talk to it through a command queue, so concurrent requests for one user
//! are applied one at a time against the same in-memory state. Mutations
//! apply immediately; persistence happens in the background:
//!
//! - a debounced save after the last mutation
//! - a periodic sync (fetch remote, merge, save) while online
//! - exponential backoff after a failed save or fetch
//!
//! Background I/O runs in spawned tasks whose results come back to the
//! session as messages, so a merge is applied in one step or not at all.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::SyncSettings;
use crate::error::{AppError, Result};
use crate::models::{Goal, ProgressEvent, ProgressionState, XpCategory};
use crate::services::catalog::Catalog;
use crate::services::router::{DispatchOutcome, EventRouter};
use crate::services::sync::SyncService;

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Shared dependencies of every session.
#[derive(Clone)]
pub struct SessionContext {
    pub router: Arc<EventRouter>,
    pub sync: Arc<SyncService>,
    pub catalog: Arc<Catalog>,
    pub settings: SyncSettings,
}

/// Result of ending a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndReport {
    pub user_id: String,
    pub version: u64,
    /// False when the final save only reached the local mirror
    pub remote_saved: bool,
}

enum Command {
    Dispatch {
        event: ProgressEvent,
        response: oneshot::Sender<Result<DispatchOutcome>>,
    },
    AddXp {
        amount: i64,
        reason: String,
        category: XpCategory,
        response: oneshot::Sender<Result<DispatchOutcome>>,
    },
    DailyLogin {
        response: oneshot::Sender<Result<DispatchOutcome>>,
    },
    UpsertGoal {
        goal: Goal,
        response: oneshot::Sender<Result<Goal>>,
    },
    Snapshot {
        response: oneshot::Sender<ProgressionState>,
    },
    ForceSync {
        response: oneshot::Sender<Result<ProgressionState>>,
    },
    SetOnline {
        online: bool,
    },
    Shutdown {
        response: oneshot::Sender<EndReport>,
    },
}

/// Completion of a background task.
enum Background {
    Fetched(Result<Option<ProgressionState>>),
    Saved {
        revision: u64,
        sealed: u64,
        result: Result<ProgressionState>,
    },
    SavedLocal {
        sealed: u64,
        result: Result<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightKind {
    Fetch,
    Save,
    SaveLocal,
}

struct InFlight {
    kind: FlightKind,
    handle: JoinHandle<()>,
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    user_id: String,
    commands: mpsc::Sender<Command>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    /// Start the session task for `state`.
    pub fn spawn(ctx: SessionContext, state: ProgressionState) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let user_id = state.user_id.clone();
        let actor = SessionActor::new(ctx, state);
        let task = tokio::spawn(actor.run(receiver));

        Self {
            user_id,
            commands,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (response, receiver) = oneshot::channel();
        self.commands
            .send(make(response))
            .await
            .map_err(|_| AppError::SessionClosed(self.user_id.clone()))?;
        receiver
            .await
            .map_err(|_| AppError::SessionClosed(self.user_id.clone()))
    }

    pub async fn dispatch(&self, event: ProgressEvent) -> Result<DispatchOutcome> {
        self.request(|response| Command::Dispatch { event, response })
            .await?
    }

    pub async fn add_xp(
        &self,
        amount: i64,
        reason: impl Into<String>,
        category: XpCategory,
    ) -> Result<DispatchOutcome> {
        let reason = reason.into();
        self.request(|response| Command::AddXp {
            amount,
            reason,
            category,
            response,
        })
        .await?
    }

    pub async fn check_daily_login(&self) -> Result<DispatchOutcome> {
        self.request(|response| Command::DailyLogin { response })
            .await?
    }

    pub async fn complete_challenge(&self, challenge_id: &str) -> Result<DispatchOutcome> {
        self.dispatch(ProgressEvent::ChallengeCompleted {
            challenge_id: challenge_id.to_string(),
        })
        .await
    }

    pub async fn upsert_goal(&self, goal: Goal) -> Result<Goal> {
        self.request(|response| Command::UpsertGoal { goal, response })
            .await?
    }

    /// Copy of the current in-memory state.
    pub async fn snapshot(&self) -> Result<ProgressionState> {
        self.request(|response| Command::Snapshot { response })
            .await
    }

    /// Fetch, merge and save now; resolves once the save finished.
    pub async fn force_sync(&self) -> Result<ProgressionState> {
        self.request(|response| Command::ForceSync { response })
            .await?
    }

    /// Pause (`false`) or resume (`true`) remote sync.
    pub async fn set_online(&self, online: bool) -> Result<()> {
        self.commands
            .send(Command::SetOnline { online })
            .await
            .map_err(|_| AppError::SessionClosed(self.user_id.clone()))
    }

    /// Flush, stop timers and background work, and wait for the task to exit.
    pub async fn shutdown(&self) -> Result<EndReport> {
        let report = self
            .request(|response| Command::Shutdown { response })
            .await?;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::error!(user_id = %self.user_id, error = %e, "Session task failed");
            }
        }
        Ok(report)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

struct SessionActor {
    ctx: SessionContext,
    state: ProgressionState,
    /// Bumped on every mutation
    revision: u64,
    /// Last revision that reached the remote store
    saved_revision: u64,
    /// Highest version written to either store, local-only saves included
    sealed_version: u64,
    online: bool,
    closing: bool,
    failures: u32,
    save_at: Option<Instant>,
    retry_at: Option<Instant>,
    in_flight: Option<InFlight>,
    /// Force-sync callers waiting for the next cycle
    queued_syncs: Vec<oneshot::Sender<Result<ProgressionState>>>,
    /// Force-sync callers served by the running cycle
    active_syncs: Vec<oneshot::Sender<Result<ProgressionState>>>,
    background: mpsc::UnboundedSender<Background>,
    background_rx: Option<mpsc::UnboundedReceiver<Background>>,
}

impl SessionActor {
    fn new(ctx: SessionContext, state: ProgressionState) -> Self {
        let (background, background_rx) = mpsc::unbounded_channel();
        let sealed_version = state.version;
        Self {
            ctx,
            state,
            revision: 0,
            saved_revision: 0,
            sealed_version,
            online: true,
            closing: false,
            failures: 0,
            save_at: None,
            retry_at: None,
            in_flight: None,
            queued_syncs: Vec::new(),
            active_syncs: Vec::new(),
            background,
            background_rx: Some(background_rx),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let Some(mut background_rx) = self.background_rx.take() else {
            return;
        };
        let interval = self.ctx.settings.interval;
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(user_id = %self.state.user_id, version = self.state.version, "Session started");

        loop {
            let idle = self.in_flight.is_none();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { response }) => {
                        let report = self.shutdown(&mut background_rx).await;
                        let _ = response.send(report);
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.shutdown(&mut background_rx).await;
                        break;
                    }
                },
                Some(done) = background_rx.recv() => self.on_background(done),
                _ = wait_until(self.save_at), if idle => {
                    self.save_at = None;
                    self.start_save();
                }
                _ = wait_until(self.retry_at), if idle && self.online => {
                    self.retry_at = None;
                    self.start_sync();
                }
                _ = ticker.tick(), if idle && self.online => {
                    tracing::debug!(user_id = %self.state.user_id, "Periodic sync");
                    self.start_sync();
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        let router = Arc::clone(&self.ctx.router);
        match command {
            Command::Dispatch { event, response } => {
                let result = router.dispatch(&mut self.state, event);
                self.after_mutation(result.is_ok());
                let _ = response.send(result);
            }
            Command::AddXp {
                amount,
                reason,
                category,
                response,
            } => {
                let result = router.add_xp(&mut self.state, amount, &reason, category);
                self.after_mutation(result.is_ok());
                let _ = response.send(result);
            }
            Command::DailyLogin { response } => {
                let before = self.state.level.last_login_date;
                let result = router.check_daily_login(&mut self.state);
                self.after_mutation(self.state.level.last_login_date != before);
                let _ = response.send(result);
            }
            Command::UpsertGoal { goal, response } => {
                let result = router.upsert_goal(&mut self.state, goal);
                self.after_mutation(result.is_ok());
                let _ = response.send(result);
            }
            Command::Snapshot { response } => {
                let _ = response.send(self.state.clone());
            }
            Command::ForceSync { response } => {
                if !self.online {
                    let _ = response.send(Err(AppError::SyncUnavailable(
                        "session is offline".to_string(),
                    )));
                    return;
                }
                self.queued_syncs.push(response);
                if self.in_flight.is_none() {
                    self.start_sync();
                }
            }
            Command::SetOnline { online } => self.set_online(online),
            Command::Shutdown { .. } => {}
        }
    }

    fn after_mutation(&mut self, changed: bool) {
        if changed {
            self.revision += 1;
            // Each mutation pushes the save back
            self.save_at = Some(Instant::now() + self.ctx.settings.save_debounce);
        }
    }

    fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    fn set_online(&mut self, online: bool) {
        if self.online == online {
            return;
        }
        self.online = online;
        tracing::info!(user_id = %self.state.user_id, online, "Connectivity changed");

        if online {
            self.failures = 0;
            self.retry_at = Some(Instant::now());
        } else {
            self.retry_at = None;
            for waiter in self.queued_syncs.drain(..) {
                let _ = waiter.send(Err(AppError::SyncUnavailable(
                    "session went offline".to_string(),
                )));
            }
        }
    }

    // ─── Background work ─────────────────────────────────────────

    fn start_sync(&mut self) {
        let sync = Arc::clone(&self.ctx.sync);
        let user_id = self.state.user_id.clone();
        let background = self.background.clone();

        self.active_syncs.append(&mut self.queued_syncs);
        let handle = tokio::spawn(async move {
            let result = sync.fetch_remote(&user_id).await;
            let _ = background.send(Background::Fetched(result));
        });
        self.in_flight = Some(InFlight {
            kind: FlightKind::Fetch,
            handle,
        });
    }

    fn start_save(&mut self) {
        let now = self.ctx.router.now();
        let retention = self.ctx.router.settings().activity_retention_days;
        self.state.prune_activity_log(now, retention);

        let sync = Arc::clone(&self.ctx.sync);
        let snapshot = self.next_snapshot();
        let sealed = snapshot.version + 1;
        let revision = self.revision;
        let background = self.background.clone();

        let (kind, handle) = if self.online {
            let handle = tokio::spawn(async move {
                let result = sync.save(&snapshot).await;
                let _ = background.send(Background::Saved {
                    revision,
                    sealed,
                    result,
                });
            });
            (FlightKind::Save, handle)
        } else {
            let handle = tokio::spawn(async move {
                let result = sync.save_local(&snapshot).await;
                let _ = background.send(Background::SavedLocal { sealed, result });
            });
            (FlightKind::SaveLocal, handle)
        };
        self.in_flight = Some(InFlight { kind, handle });
    }

    /// State to hand to the sync service, which seals it at `version + 1`.
    ///
    /// The version continues after every earlier write, including saves
    /// that only reached the local mirror, so it never repeats.
    fn next_snapshot(&self) -> ProgressionState {
        let mut snapshot = self.state.clone();
        snapshot.version = snapshot.version.max(self.sealed_version);
        snapshot
    }

    fn on_background(&mut self, done: Background) {
        self.in_flight = None;

        match done {
            Background::Fetched(Ok(remote)) => {
                if let Some(remote) = remote {
                    let merged = self.ctx.sync.reconcile(&self.state, &remote);
                    if merged != self.state {
                        self.state = merged;
                        self.revision += 1;
                    }
                }
                if self.closing {
                    return;
                }
                if self.is_dirty() || !self.active_syncs.is_empty() {
                    self.start_save();
                } else {
                    self.failures = 0;
                }
            }
            Background::Fetched(Err(e)) => self.on_failure(e),
            Background::Saved {
                revision,
                result: Ok(saved),
                ..
            } => {
                self.sealed_version = self.sealed_version.max(saved.version);
                self.state.version = saved.version;
                self.state.last_sync_at = saved.last_sync_at;
                self.saved_revision = revision;
                self.failures = 0;
                self.retry_at = None;

                for waiter in self.active_syncs.drain(..) {
                    let _ = waiter.send(Ok(self.state.clone()));
                }
                if self.is_dirty() && self.save_at.is_none() && !self.closing {
                    self.save_at = Some(Instant::now() + self.ctx.settings.save_debounce);
                }
            }
            Background::Saved {
                sealed,
                result: Err(e),
                ..
            } => {
                // The local mirror may hold this version even though the remote refused it
                self.sealed_version = self.sealed_version.max(sealed);
                self.on_failure(e);
            }
            Background::SavedLocal { sealed, result } => {
                self.sealed_version = self.sealed_version.max(sealed);
                if let Err(e) = result {
                    tracing::warn!(user_id = %self.state.user_id, error = %e, "Offline save failed");
                }
            }
        }

        if !self.closing && self.in_flight.is_none() && !self.queued_syncs.is_empty() {
            self.start_sync();
        }
    }

    fn on_failure(&mut self, error: AppError) {
        self.failures += 1;
        let delay = backoff(&self.ctx.settings, self.failures);
        if !self.closing {
            self.retry_at = Some(Instant::now() + delay);
        }

        tracing::warn!(
            user_id = %self.state.user_id,
            error = %error,
            failures = self.failures,
            retry_in_ms = delay.as_millis() as u64,
            "Sync failed; will retry"
        );
        for waiter in self.active_syncs.drain(..) {
            let _ = waiter.send(Err(AppError::SyncUnavailable(error.to_string())));
        }
    }

    async fn shutdown(
        &mut self,
        background_rx: &mut mpsc::UnboundedReceiver<Background>,
    ) -> EndReport {
        self.closing = true;
        self.save_at = None;
        self.retry_at = None;

        if let Some(flight) = self.in_flight.take() {
            match flight.kind {
                // A save that may already have reached the store is let finish
                FlightKind::Save | FlightKind::SaveLocal => {
                    let _ = flight.handle.await;
                    while let Ok(done) = background_rx.try_recv() {
                        self.on_background(done);
                    }
                }
                FlightKind::Fetch => flight.handle.abort(),
            }
        }

        let remote_saved = if !self.is_dirty() && self.saved_revision > 0 {
            true
        } else if self.online {
            match self.ctx.sync.save(&self.next_snapshot()).await {
                Ok(saved) => {
                    self.state.version = saved.version;
                    self.state.last_sync_at = saved.last_sync_at;
                    self.saved_revision = self.revision;
                    true
                }
                Err(_) => false,
            }
        } else {
            if let Err(e) = self.ctx.sync.save_local(&self.next_snapshot()).await {
                tracing::warn!(user_id = %self.state.user_id, error = %e, "Final offline save failed");
            }
            false
        };

        for waiter in self.queued_syncs.drain(..).chain(self.active_syncs.drain(..)) {
            let _ = waiter.send(Err(AppError::SessionClosed(self.state.user_id.clone())));
        }

        tracing::info!(
            user_id = %self.state.user_id,
            version = self.state.version,
            remote_saved,
            "Session ended"
        );
        EndReport {
            user_id: self.state.user_id.clone(),
            version: self.state.version,
            remote_saved,
        }
    }
}

/// `retry_base * 2^(failures - 1)`, capped at the sync interval.
fn backoff(settings: &SyncSettings, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    settings
        .retry_base
        .saturating_mul(1u32 << exponent)
        .min(settings.interval)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Running sessions by user id.
pub struct SessionRegistry {
    ctx: SessionContext,
    sessions: DashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            sessions: DashMap::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// The user's running session, starting one if needed.
    ///
    /// A new session restores the merged remote/local snapshot (or starts
    /// fresh) and seeds the catalog.
    pub async fn start(&self, user_id: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.get(user_id) {
            return Ok(handle);
        }

        let router = &self.ctx.router;
        let mut state = match self.ctx.sync.restore(user_id).await {
            Some(state) => state,
            None => {
                tracing::info!(user_id, "No snapshot found; starting fresh");
                router.new_state(user_id)
            }
        };
        router.initialize_achievements(&mut state, &self.ctx.catalog)?;

        let handle = match self.sessions.entry(user_id.to_string()) {
            // A task that exited without going through `end`
            Entry::Occupied(mut existing) if existing.get().is_closed() => {
                tracing::warn!(user_id, "Replacing closed session");
                let handle = SessionHandle::spawn(self.ctx.clone(), state);
                existing.insert(handle.clone());
                handle
            }
            // Lost a race with a concurrent start
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let handle = SessionHandle::spawn(self.ctx.clone(), state);
                slot.insert(handle.clone());
                handle
            }
        };
        Ok(handle)
    }

    /// The running session, if any.
    pub fn get(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions
            .get(user_id)
            .map(|h| h.value().clone())
            .filter(|h| !h.is_closed())
    }

    /// End a session: final save, then no task for it remains.
    pub async fn end(&self, user_id: &str) -> Result<EndReport> {
        let (_, handle) = self
            .sessions
            .remove(user_id)
            .ok_or_else(|| AppError::NotFound(format!("Session for {}", user_id)))?;
        handle.shutdown().await
    }

    /// End every session concurrently (server shutdown).
    pub async fn end_all(&self) {
        let user_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let results = join_all(user_ids.iter().map(|user_id| self.end(user_id))).await;
        for (user_id, result) in user_ids.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to end session");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
