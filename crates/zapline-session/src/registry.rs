// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of live sessions.
//!
//! The registry owns one actor per session id. Creation is single-flight
//! through the map's entry lock, so two concurrent references to a new id
//! never spawn two actors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use zapline_config::model::SessionConfig;
use zapline_core::{
    DeliveryTarget, MessageId, SessionSnapshot, SessionStatus, TransportAdapter, ZaplineError,
};

use crate::credentials::CredentialBackup;
use crate::machine::{self, Command, SessionDeps, SessionHandle, SessionSettings};

pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    deps: SessionDeps,
    default_session_id: String,
    restore_stagger: Duration,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn TransportAdapter>,
        backup: Arc<CredentialBackup>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            deps: SessionDeps {
                transport,
                backup,
                settings: Arc::new(SessionSettings::from_config(config)),
            },
            default_session_id: config.default_session_id.clone(),
            restore_stagger: Duration::from_millis(config.restore_stagger_ms),
        }
    }

    /// Session used when a caller or a job does not name one.
    pub fn default_session_id(&self) -> &str {
        &self.default_session_id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn handle(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    fn get_or_create_handle(&self, session_id: &str) -> SessionHandle {
        let handle = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session_id, "creating session");
                machine::spawn(session_id, self.deps.clone(), Duration::ZERO)
            })
            .value()
            .clone();
        if handle.snapshot().status == SessionStatus::Uninitialized {
            handle.activate_now();
        }
        handle
    }

    /// Return the session's snapshot, creating and activating it if needed.
    pub fn get_or_create(&self, session_id: &str) -> SessionSnapshot {
        self.get_or_create_handle(session_id).snapshot()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.handle(session_id).map(|h| h.snapshot())
    }

    /// Every live session, sorted by id.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        snapshots
    }

    /// Stop the session's actor and forget it. Credentials are kept.
    pub async fn teardown(&self, session_id: &str) -> Result<(), ZaplineError> {
        let (_, handle) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| ZaplineError::SessionNotFound(session_id.to_string()))?;
        handle.request(Command::Shutdown).await;
        info!(session_id, "session torn down");
        Ok(())
    }

    /// End the current connection and activate again, keeping credentials.
    pub async fn reconnect(&self, session_id: &str) -> SessionSnapshot {
        let handle = self.get_or_create_handle(session_id);
        handle.request(Command::Reconnect).await;
        handle.snapshot()
    }

    /// Log out, drop credentials, and re-pair after a short pause.
    pub async fn cleanup(&self, session_id: &str) -> SessionSnapshot {
        let handle = self.get_or_create_handle(session_id);
        handle.request(Command::Cleanup).await;
        handle.snapshot()
    }

    /// Send through a connected session. Never waits for a connection.
    pub async fn send_text(
        &self,
        session_id: &str,
        destination: &str,
        text: &str,
    ) -> Result<MessageId, ZaplineError> {
        let not_connected = || ZaplineError::NotConnected {
            session_id: session_id.to_string(),
        };
        let view = self.handle(session_id).ok_or_else(not_connected)?.view();
        let connection = match view.connection {
            Some(conn) if view.snapshot.is_connected() => conn,
            _ => return Err(not_connected()),
        };
        let id = connection.send_text(destination, text).await?;
        debug!(session_id, message_id = %id.0, "text sent");
        Ok(id)
    }

    /// Ask the transport for a phone-number pairing code.
    pub async fn request_pairing_code(
        &self,
        session_id: &str,
        phone_number: &str,
    ) -> Result<String, ZaplineError> {
        let view = self.get_or_create_handle(session_id).view();
        if view.snapshot.is_connected() {
            return Err(ZaplineError::InvalidInput(format!(
                "session {session_id} is already paired"
            )));
        }
        let connection = view.connection.ok_or_else(|| ZaplineError::NotConnected {
            session_id: session_id.to_string(),
        })?;
        connection.request_pairing_code(phone_number).await
    }

    /// Wait up to `timeout` for the session's snapshot to satisfy `predicate`.
    ///
    /// Returns the latest snapshot either way, or `None` for an unknown session.
    pub async fn wait_for<P>(
        &self,
        session_id: &str,
        timeout: Duration,
        mut predicate: P,
    ) -> Option<SessionSnapshot>
    where
        P: FnMut(&SessionSnapshot) -> bool,
    {
        let handle = self.handle(session_id)?;
        let mut rx = handle.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|view| predicate(&view.snapshot))
                .await
                .map(|view| view.snapshot.clone())
        })
        .await;
        match waited {
            Ok(Ok(snapshot)) => Some(snapshot),
            _ => Some(handle.snapshot()),
        }
    }

    /// Activate every session with durable credentials, staggered.
    ///
    /// Sessions that are already live are left alone. Returns how many were started.
    pub async fn restore_all(&self) -> usize {
        let stored = self.deps.backup.list().await;
        let mut started = 0;
        for session_id in stored {
            let delay = self.restore_stagger.saturating_mul(started as u32);
            let mut inserted = false;
            self.sessions.entry(session_id.clone()).or_insert_with(|| {
                inserted = true;
                machine::spawn(&session_id, self.deps.clone(), delay)
            });
            if inserted {
                debug!(session_id = %session_id, delay_ms = delay.as_millis() as u64, "restore scheduled");
                started += 1;
            }
        }
        info!(count = started, "stored sessions scheduled for restore");
        started
    }

    /// Stop every session, waiting for each actor to finish.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<SessionHandle> = ids
            .iter()
            .filter_map(|id| self.sessions.remove(id).map(|(_, h)| h))
            .collect();
        let count = handles.len();
        futures::future::join_all(handles.iter().map(|h| h.request(Command::Shutdown))).await;
        info!(count, "all sessions stopped");
    }
}

#[async_trait]
impl DeliveryTarget for SessionRegistry {
    async fn deliver(
        &self,
        session_id: &str,
        destination: &str,
        text: &str,
    ) -> Result<MessageId, ZaplineError> {
        self.send_text(session_id, destination, text).await
    }
}
