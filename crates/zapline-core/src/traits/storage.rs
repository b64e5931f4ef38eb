// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage traits: backend lifecycle, credential persistence, and the job queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ZaplineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CredentialBlob, Job, JobStatus, NewJob};

/// Adapter for storage and persistence backends.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), ZaplineError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ZaplineError>;
}

/// Durable key-value persistence of per-session credential blobs.
///
/// Writes are all-or-nothing: a reader sees either the previous blob or the
/// new one, never a mix.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Replaces the stored blob for `session_id`.
    async fn save_credentials(
        &self,
        session_id: &str,
        blob: &CredentialBlob,
    ) -> Result<(), ZaplineError>;

    /// Returns the stored blob, or `None` when absent or unverifiable.
    async fn restore_credentials(
        &self,
        session_id: &str,
    ) -> Result<Option<CredentialBlob>, ZaplineError>;

    /// Removes the stored blob. Deleting a missing record is not an error.
    async fn delete_credentials(&self, session_id: &str) -> Result<(), ZaplineError>;

    /// Lists every session that has stored credentials.
    async fn list_credential_sessions(&self) -> Result<Vec<String>, ZaplineError>;
}

/// Durable queue of scheduled deliveries.
///
/// The queued -> processing transition is the only admission gate and must
/// be atomic against other dispatchers sharing the same store.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Persists a new job in `queued` state and returns its id.
    async fn enqueue(&self, job: &NewJob) -> Result<i64, ZaplineError>;

    /// Claims up to `limit` due jobs, earliest `send_at` first.
    ///
    /// Jobs that another dispatcher claimed between selection and update are
    /// skipped silently, so the result may be shorter than the due set.
    async fn claim_due(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>, ZaplineError>;

    /// `processing -> sent`, stamping `sent_at` and clearing any error.
    async fn mark_sent(&self, id: i64) -> Result<(), ZaplineError>;

    /// `processing -> failed`, recording `error`.
    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), ZaplineError>;

    /// Fetches a single job.
    async fn get_job(&self, id: i64) -> Result<Option<Job>, ZaplineError>;

    /// Lists jobs, newest first, optionally filtered by status.
    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, ZaplineError>;

    /// `queued -> failed` with error "canceled". Returns whether the job was still queued.
    async fn cancel_job(&self, id: i64) -> Result<bool, ZaplineError>;

    /// Fails jobs left in `processing` since before `claimed_before`.
    ///
    /// Returns the number of jobs marked `failed`.
    async fn fail_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<usize, ZaplineError>;
}
