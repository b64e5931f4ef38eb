// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use zapline_config::model::StorageConfig;
use zapline_core::types::{CredentialBlob, Job, JobStatus, NewJob};
use zapline_core::{
    AdapterType, CredentialStore, HealthStatus, JobQueue, PluginAdapter, StorageAdapter,
    ZaplineError,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`](StorageAdapter::initialize) is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, ZaplineError> {
        self.db.get().ok_or_else(|| ZaplineError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self, db: &Database) -> Result<(), ZaplineError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!(path = %self.config.database_path, "WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT 1", [], |row| row.get(0))
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        if let Some(db) = self.db.get() {
            self.checkpoint(db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ZaplineError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ZaplineError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ZaplineError> {
        let db = self.db()?;
        self.checkpoint(db).await
    }
}

#[async_trait]
impl CredentialStore for SqliteStorage {
    async fn save_credentials(
        &self,
        session_id: &str,
        blob: &CredentialBlob,
    ) -> Result<(), ZaplineError> {
        queries::credentials::save(self.db()?, session_id, blob).await
    }

    async fn restore_credentials(
        &self,
        session_id: &str,
    ) -> Result<Option<CredentialBlob>, ZaplineError> {
        queries::credentials::restore(self.db()?, session_id).await
    }

    async fn delete_credentials(&self, session_id: &str) -> Result<(), ZaplineError> {
        queries::credentials::delete(self.db()?, session_id).await
    }

    async fn list_credential_sessions(&self) -> Result<Vec<String>, ZaplineError> {
        queries::credentials::list_sessions(self.db()?).await
    }
}

#[async_trait]
impl JobQueue for SqliteStorage {
    async fn enqueue(&self, job: &NewJob) -> Result<i64, ZaplineError> {
        queries::jobs::enqueue(self.db()?, job).await
    }

    async fn claim_due(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, ZaplineError> {
        queries::jobs::claim_due(self.db()?, limit, now).await
    }

    async fn mark_sent(&self, id: i64) -> Result<(), ZaplineError> {
        queries::jobs::mark_sent(self.db()?, id).await
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), ZaplineError> {
        queries::jobs::mark_failed(self.db()?, id, error).await
    }

    async fn get_job(&self, id: i64) -> Result<Option<Job>, ZaplineError> {
        queries::jobs::get_job(self.db()?, id).await
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, ZaplineError> {
        queries::jobs::list_jobs(self.db()?, status, limit).await
    }

    async fn cancel_job(&self, id: i64) -> Result<bool, ZaplineError> {
        queries::jobs::cancel_job(self.db()?, id).await
    }

    async fn fail_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<usize, ZaplineError> {
        queries::jobs::fail_stale_claims(self.db()?, claimed_before).await
    }
}
