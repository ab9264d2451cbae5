// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Outbound notification sinks.

use crate::models::Notification;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Receiver of notification intents. Delivery is the implementor's concern.
pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: &str, notification: &Notification);
}

/// A notification tagged with its user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotification {
    pub user_id: String,
    pub notification: Notification,
}

/// Fans notifications out to any number of subscribers.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<UserNotification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserNotification> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, user_id: &str, notification: &Notification) {
        // No subscribers is not an error
        let _ = self.sender.send(UserNotification {
            user_id: user_id.to_string(),
            notification: notification.clone(),
        });
    }
}

/// Keeps every notification in memory; useful for tests and replay.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<UserNotification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<UserNotification> {
        match self.seen.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.seen.lock() {
            guard.clear();
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user_id: &str, notification: &Notification) {
        if let Ok(mut guard) = self.seen.lock() {
            guard.push(UserNotification {
                user_id: user_id.to_string(),
                notification: notification.clone(),
            });
        }
    }
}
