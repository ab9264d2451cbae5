// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory snapshot store with a switchable outage, for tests and demos.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::db::SnapshotStore;
use crate::error::AppError;
use crate::models::SnapshotDocument;

/// Behaves like the remote store, version guard included.
#[derive(Debug)]
pub struct MemoryStore {
    docs: DashMap<String, SnapshotDocument>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Store a document as-is, bypassing the version guard.
    pub fn insert_raw(&self, doc: SnapshotDocument) {
        self.docs.insert(doc.user_id.clone(), doc);
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Database("store unavailable".to_string()))
        }
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_snapshot(&self, user_id: &str) -> Result<Option<SnapshotDocument>, AppError> {
        self.check_available()?;
        Ok(self.docs.get(user_id).map(|d| d.value().clone()))
    }

    async fn put_snapshot(&self, doc: &SnapshotDocument) -> Result<(), AppError> {
        self.check_available()?;

        match self.docs.entry(doc.user_id.clone()) {
            Entry::Occupied(mut stored) => {
                if stored.get().version >= doc.version {
                    return Err(AppError::Database(format!(
                        "version conflict: stored {} >= {}",
                        stored.get().version,
                        doc.version
                    )));
                }
                stored.insert(doc.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(doc.clone());
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_snapshot(&self, user_id: &str) -> Result<(), AppError> {
        self.check_available()?;
        self.docs.remove(user_id);
        Ok(())
    }
}
