// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential backup: the durable store behind a retry policy, plus a local file cache.
//!
//! Nothing here returns an error to the session. Durable store outages are
//! retried, logged, and then absorbed: a failed restore becomes a cold
//! start, a failed save is picked up by the next backup.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};
use zapline_core::{CredentialBlob, CredentialStore, ZaplineError};
use zapline_resilience::{retry, RetryPolicy};

/// Per-session credential files under one directory.
///
/// Writes go to a temp file that is renamed over the target, so a reader
/// never observes a partial blob.
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Every id is hex-encoded, so distinct ids never share a file.
    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.creds", hex::encode(session_id)))
    }

    pub async fn save(&self, session_id: &str, blob: &CredentialBlob) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(session_id);
        let tmp = target.with_extension("creds.tmp");
        tokio::fs::write(&tmp, blob.as_bytes()).await?;
        tokio::fs::rename(&tmp, &target).await
    }

    pub async fn load(&self, session_id: &str) -> std::io::Result<Option<CredentialBlob>> {
        match tokio::fs::read(self.path_for(session_id)).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(CredentialBlob(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn remove(&self, session_id: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Durable credential store access shared by every session.
pub struct CredentialBackup {
    store: Arc<dyn CredentialStore>,
    policy: RetryPolicy,
    local: Option<LocalCache>,
}

impl CredentialBackup {
    pub fn new(store: Arc<dyn CredentialStore>, policy: RetryPolicy, local: Option<LocalCache>) -> Self {
        Self {
            store,
            policy,
            local,
        }
    }

    /// Durable save. Returns `false` once the retry policy is exhausted.
    pub async fn save(&self, session_id: &str, blob: &CredentialBlob) -> bool {
        let result = retry(&self.policy, "credentials.save", || {
            self.store.save_credentials(session_id, blob)
        })
        .await;
        match result {
            Ok(()) => {
                debug!(session_id, bytes = blob.len(), "credentials backed up");
                true
            }
            Err(e) => {
                warn!(session_id, error = %e, "credential backup failed");
                false
            }
        }
    }

    /// Write-through to the local cache only.
    pub async fn save_local(&self, session_id: &str, blob: &CredentialBlob) {
        if let Some(local) = &self.local
            && let Err(e) = local.save(session_id, blob).await
        {
            warn!(session_id, error = %e, "local credential cache write failed");
        }
    }

    /// Restore from the durable store, falling back to the local cache.
    ///
    /// `None` means the session must pair from scratch.
    pub async fn restore(&self, session_id: &str) -> Option<CredentialBlob> {
        let durable = retry(&self.policy, "credentials.restore", || {
            self.store.restore_credentials(session_id)
        })
        .await;

        match durable {
            Ok(Some(blob)) => return Some(blob),
            Ok(None) => debug!(session_id, "no durable credentials"),
            Err(e) => warn!(session_id, error = %e, "durable credential restore failed"),
        }

        let local = self.local.as_ref()?;
        match local.load(session_id).await {
            Ok(Some(blob)) => {
                debug!(session_id, "credentials restored from local cache");
                Some(blob)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(session_id, error = %e, "local credential cache read failed");
                None
            }
        }
    }

    /// Remove both copies. Failures are logged, not returned.
    pub async fn delete(&self, session_id: &str) {
        if let Some(local) = &self.local
            && let Err(e) = local.remove(session_id).await
        {
            warn!(session_id, error = %e, "local credential cache delete failed");
        }
        let result: Result<(), ZaplineError> = retry(&self.policy, "credentials.delete", || {
            self.store.delete_credentials(session_id)
        })
        .await;
        if let Err(e) = result {
            warn!(session_id, error = %e, "durable credential delete failed");
        }
    }

    /// Sessions with durable credentials; empty if the store stays unreachable.
    pub async fn list(&self) -> Vec<String> {
        match retry(&self.policy, "credentials.list", || {
            self.store.list_credential_sessions()
        })
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "listing stored sessions failed, nothing to restore");
                Vec::new()
            }
        }
    }
}
