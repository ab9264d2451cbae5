// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper for progression snapshots.
//!
//! One document per user in `progression_snapshots`, keyed by user id.
//! Writes are guarded by the snapshot version inside a transaction, so a
//! session holding stale state cannot overwrite newer progress.

use async_trait::async_trait;
use firestore::FirestoreConsistencySelector;

use crate::db::{collections, SnapshotStore};
use crate::error::AppError;
use crate::models::SnapshotDocument;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator gets an unauthenticated connection so that no local
        // credentials are picked up.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client.
    ///
    /// Every operation fails with `Database`, which the sync service treats
    /// as the remote store being unreachable.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

#[async_trait]
impl SnapshotStore for FirestoreDb {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn get_snapshot(&self, user_id: &str) -> Result<Option<SnapshotDocument>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROGRESSION_SNAPSHOTS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write `doc` unless the stored snapshot is at the same or a newer version.
    async fn put_snapshot(&self, doc: &SnapshotDocument) -> Result<(), AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Reading through the transaction makes a concurrent write to this
        // document fail the commit instead of being overwritten
        let tx_client = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );
        let current: Option<SnapshotDocument> = tx_client
            .fluent()
            .select()
            .by_id_in(collections::PROGRESSION_SNAPSHOTS)
            .obj()
            .one(&doc.user_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read snapshot in transaction: {}", e))
            })?;

        if let Some(stored) = current.filter(|stored| stored.version >= doc.version) {
            let _ = transaction.rollback().await;
            tracing::warn!(
                user_id = %doc.user_id,
                stored_version = stored.version,
                version = doc.version,
                "Refusing stale snapshot write"
            );
            return Err(AppError::Database(format!(
                "version conflict: stored {} >= {}",
                stored.version, doc.version
            )));
        }

        client
            .fluent()
            .update()
            .in_col(collections::PROGRESSION_SNAPSHOTS)
            .document_id(&doc.user_id)
            .object(doc)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add snapshot to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(user_id = %doc.user_id, version = doc.version, "Snapshot written");
        Ok(())
    }

    async fn delete_snapshot(&self, user_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::PROGRESSION_SNAPSHOTS)
            .document_id(user_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        tracing::info!(user_id, "Snapshot deleted");
        Ok(())
    }
}
