//! Snapshot persistence (Firestore remote, local file mirror, in-memory).

pub mod firestore;
pub mod local;
pub mod memory;

pub use firestore::FirestoreDb;
pub use local::LocalFileStore;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::SnapshotDocument;
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    /// Progression snapshots (keyed by user id)
    pub const PROGRESSION_SNAPSHOTS: &str = "progression_snapshots";
}

/// Key-value store of sealed snapshots, one per user.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn get_snapshot(&self, user_id: &str) -> Result<Option<SnapshotDocument>, AppError>;

    async fn put_snapshot(&self, doc: &SnapshotDocument) -> Result<(), AppError>;

    async fn delete_snapshot(&self, user_id: &str) -> Result<(), AppError>;
}
