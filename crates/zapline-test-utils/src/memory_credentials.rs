// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory credential store with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use zapline_core::{CredentialBlob, CredentialStore, ZaplineError};

/// A [`CredentialStore`] backed by a `HashMap`.
///
/// `set_unavailable(true)` makes every operation fail with a retryable
/// storage error, which is how a locked or unreachable database looks to
/// the session layer.
#[derive(Default)]
pub struct MemoryCredentialStore {
    blobs: Mutex<HashMap<String, CredentialBlob>>,
    unavailable: AtomicBool,
    saves: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one blob per session.
    pub fn with_sessions<I, S>(sessions: I) -> Self
    where
        I: IntoIterator<Item = (S, CredentialBlob)>,
        S: Into<String>,
    {
        let blobs = sessions.into_iter().map(|(id, b)| (id.into(), b)).collect();
        Self {
            blobs: Mutex::new(blobs),
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Successful deletes so far.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub async fn stored(&self, session_id: &str) -> Option<CredentialBlob> {
        self.blobs.lock().await.get(session_id).cloned()
    }

    fn check(&self) -> Result<(), ZaplineError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ZaplineError::Storage {
                source: "credential store unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save_credentials(
        &self,
        session_id: &str,
        blob: &CredentialBlob,
    ) -> Result<(), ZaplineError> {
        self.check()?;
        self.blobs
            .lock()
            .await
            .insert(session_id.to_string(), blob.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn restore_credentials(
        &self,
        session_id: &str,
    ) -> Result<Option<CredentialBlob>, ZaplineError> {
        self.check()?;
        Ok(self.blobs.lock().await.get(session_id).cloned())
    }

    async fn delete_credentials(&self, session_id: &str) -> Result<(), ZaplineError> {
        self.check()?;
        self.blobs.lock().await.remove(session_id);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_credential_sessions(&self) -> Result<Vec<String>, ZaplineError> {
        self.check()?;
        let mut ids: Vec<String> = self.blobs.lock().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
