// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local snapshot mirror on disk, one JSON file per user.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::db::SnapshotStore;
use crate::error::AppError;
use crate::models::SnapshotDocument;

/// Fixed storage key; the user id is appended per file.
const STORAGE_KEY: &str = "fitness_progression_v1";

#[derive(Debug, Clone)]
pub struct LocalFileStore {
    dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name keyed by the SHA-256 of the user id, so distinct ids never
    /// share a file and no id can escape the directory.
    fn path_for(&self, user_id: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(user_id.as_bytes()));
        self.dir.join(format!("{}_{}.json", STORAGE_KEY, digest))
    }
}

#[async_trait]
impl SnapshotStore for LocalFileStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_snapshot(&self, user_id: &str) -> Result<Option<SnapshotDocument>, AppError> {
        let path = self.path_for(user_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Database(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let doc: SnapshotDocument = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::CorruptSnapshot(format!("unreadable local snapshot {}: {}", path.display(), e))
        })?;
        if doc.user_id != user_id {
            return Err(AppError::CorruptSnapshot(format!(
                "local snapshot {} belongs to {}",
                path.display(),
                doc.user_id
            )));
        }
        Ok(Some(doc))
    }

    async fn put_snapshot(&self, doc: &SnapshotDocument) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Database(format!("Failed to create {}: {}", self.dir.display(), e)))?;

        let path = self.path_for(&doc.user_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(doc)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Snapshot encode failed: {}", e)))?;

        // Write-then-rename so a crash never leaves a torn file
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| AppError::Database(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AppError::Database(format!("Failed to replace {}: {}", path.display(), e)))?;

        tracing::debug!(user_id = %doc.user_id, version = doc.version, "Local snapshot written");
        Ok(())
    }

    async fn delete_snapshot(&self, user_id: &str) -> Result<(), AppError> {
        match tokio::fs::remove_file(self.path_for(user_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }
}
