// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the gateway core with a mock transport: a temp
//! SQLite database for jobs and credentials, a session registry, and a
//! delivery dispatcher. Tests drive ticks by hand.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use zapline_config::ZaplineConfig;
use zapline_core::{
    CredentialBlob, CredentialStore, JobQueue, NewJob, SessionSnapshot, SessionStatus,
    StorageAdapter, ZaplineError,
};
use zapline_dispatch::DeliveryDispatcher;
use zapline_resilience::RetryPolicy;
use zapline_session::{CredentialBackup, LocalCache, SessionRegistry};
use zapline_storage::SqliteStorage;

use crate::mock_transport::MockTransport;

const WAIT: Duration = Duration::from_secs(5);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: ZaplineConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ZaplineConfig::default();
        config.session.restore_stagger_ms = 10;
        config.session.reconnect_delay_ms = 100;
        config.session.max_reconnect_delay_ms = 1_000;
        config.session.conflict_reconnect_delay_ms = 500;
        config.session.cleanup_reactivate_delay_ms = 50;
        config.credentials.base_delay_ms = 1;
        config.credentials.max_delay_ms = 5;
        config.dispatcher.store_base_delay_ms = 1;
        Self { config }
    }

    /// Adjust the configuration before the stack is built.
    pub fn with_config(mut self, f: impl FnOnce(&mut ZaplineConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ZaplineError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ZaplineError::Storage { source: e.into() })?;
        let mut config = self.config;
        config.storage.database_path = temp_dir.path().join("test.db").to_string_lossy().into_owned();
        config.session.auth_dir = temp_dir.path().join("auth").to_string_lossy().into_owned();

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let transport = Arc::new(MockTransport::new());

        let backup = Arc::new(CredentialBackup::new(
            storage.clone() as Arc<dyn CredentialStore>,
            RetryPolicy::from_credentials(&config.credentials),
            Some(LocalCache::new(&config.session.auth_dir)),
        ));
        let registry = Arc::new(SessionRegistry::new(
            transport.clone(),
            backup,
            &config.session,
        ));
        let dispatcher = DeliveryDispatcher::new(
            storage.clone() as Arc<dyn JobQueue>,
            registry.clone(),
            config.session.default_session_id.clone(),
            &config.dispatcher,
        );

        Ok(TestHarness {
            config,
            storage,
            transport,
            registry,
            dispatcher,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete gateway core wired to a mock transport.
pub struct TestHarness {
    pub config: ZaplineConfig,
    pub storage: Arc<SqliteStorage>,
    pub transport: Arc<MockTransport>,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: DeliveryDispatcher,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Wait until the session satisfies `predicate`, returning the last snapshot seen.
    pub async fn wait_for_status(&self, session_id: &str, status: SessionStatus) -> SessionSnapshot {
        self.registry
            .wait_for(session_id, WAIT, |s| s.status == status)
            .await
            .unwrap_or_else(|| SessionSnapshot::new(session_id))
    }

    /// Create a session and take it through pairing to `connected`.
    pub async fn connect_session(&self, session_id: &str) -> Result<SessionSnapshot, ZaplineError> {
        self.registry.get_or_create(session_id);
        self.wait_for_status(session_id, SessionStatus::QrPending).await;
        let link = self
            .transport
            .latest(session_id)
            .await
            .ok_or_else(|| ZaplineError::SessionNotFound(session_id.to_string()))?;
        link.complete_pairing(
            CredentialBlob(format!("creds-{session_id}").into_bytes()),
            &format!("{session_id}@mock"),
        )
        .await;
        let snapshot = self.wait_for_status(session_id, SessionStatus::Connected).await;
        if snapshot.is_connected() {
            Ok(snapshot)
        } else {
            Err(ZaplineError::Timeout { duration: WAIT })
        }
    }

    /// Enqueue a job directly, bypassing request validation.
    pub async fn schedule(
        &self,
        session_id: Option<&str>,
        destination: &str,
        text: &str,
        send_at: DateTime<Utc>,
    ) -> Result<i64, ZaplineError> {
        self.storage
            .enqueue(&NewJob {
                session_id: session_id.map(str::to_string),
                destination: destination.to_string(),
                body: text.to_string(),
                send_at,
            })
            .await
    }
}
