// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport adapter for deterministic session tests.
//!
//! `MockTransport` hands out connections whose event streams the test
//! drives by hand through a [`MockLink`]. By default a connect without
//! credentials emits a pairing payload and a connect with credentials
//! opens straight away, which is what a real transport does.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use zapline_core::traits::adapter::PluginAdapter;
use zapline_core::{
    AdapterType, CredentialBlob, HealthStatus, MessageId, TransportAdapter, TransportConnection,
    TransportEvent, TransportHandle, ZaplineError,
};

const EVENT_BUFFER: usize = 32;

/// One `connect` call as seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRecord {
    pub session_id: String,
    pub credentials: Option<CredentialBlob>,
}

/// A connection handed out by [`MockTransport`].
pub struct MockConnection {
    session_id: String,
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: AtomicBool,
    logged_out: AtomicBool,
    ended: AtomicBool,
    message_seq: AtomicU32,
}

impl MockConnection {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            message_seq: AtomicU32::new(0),
        }
    }

    /// Every `(destination, text)` passed to `send_text`.
    pub async fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnection for MockConnection {
    async fn send_text(&self, destination: &str, text: &str) -> Result<MessageId, ZaplineError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ZaplineError::transport("mock send failure"));
        }
        self.sent
            .lock()
            .await
            .push((destination.to_string(), text.to_string()));
        let n = self.message_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageId(format!("mock-{}-{n}", self.session_id)))
    }

    async fn logout(&self) -> Result<(), ZaplineError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn end(&self) -> Result<(), ZaplineError> {
        self.ended.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, ZaplineError> {
        let digits: String = phone_number.chars().filter(|c| c.is_ascii_digit()).collect();
        let tail = &digits[digits.len().saturating_sub(4)..];
        Ok(format!("MOCK-{tail}"))
    }
}

/// Test-side end of one connection: push events, inspect sends.
#[derive(Clone)]
pub struct MockLink {
    events: mpsc::Sender<TransportEvent>,
    connection: Arc<MockConnection>,
}

impl MockLink {
    /// Deliver an event to the session. Dropped silently if the session
    /// has already let go of this connection.
    pub async fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event).await;
    }

    /// Walk a pairing through to an open connection.
    pub async fn complete_pairing(&self, blob: CredentialBlob, identity: &str) {
        self.emit(TransportEvent::CredentialsChanged(blob)).await;
        self.emit(TransportEvent::Connecting).await;
        self.emit(TransportEvent::Opened {
            identity: identity.to_string(),
        })
        .await;
    }

    pub fn connection(&self) -> Arc<MockConnection> {
        self.connection.clone()
    }

    /// True once the session dropped its event receiver.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

#[derive(Default)]
struct MockState {
    connects: Vec<ConnectRecord>,
    links: HashMap<String, MockLink>,
    fail_next: u32,
    hang: bool,
    pairing_seq: u32,
}

/// A scripted transport adapter.
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    auto_script: bool,
}

impl MockTransport {
    /// Transport that emits the usual opening events on every connect.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            auto_script: true,
        }
    }

    /// Transport that emits nothing on its own; the test drives every event.
    pub fn manual() -> Self {
        Self {
            auto_script: false,
            ..Self::new()
        }
    }

    /// Make the next `n` connects fail with a transport error.
    pub async fn fail_next_connects(&self, n: u32) {
        self.state.lock().await.fail_next = n;
    }

    /// Make every connect hang until toggled off.
    pub async fn set_hang_connects(&self, hang: bool) {
        self.state.lock().await.hang = hang;
    }

    pub async fn connects(&self) -> Vec<ConnectRecord> {
        self.state.lock().await.connects.clone()
    }

    pub async fn connect_count(&self, session_id: &str) -> usize {
        self.state
            .lock()
            .await
            .connects
            .iter()
            .filter(|c| c.session_id == session_id)
            .count()
    }

    /// The most recent connection handed to `session_id`.
    pub async fn latest(&self, session_id: &str) -> Option<MockLink> {
        self.state.lock().await.links.get(session_id).cloned()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    async fn connect(
        &self,
        session_id: &str,
        credentials: Option<CredentialBlob>,
    ) -> Result<TransportHandle, ZaplineError> {
        let mut state = self.state.lock().await;
        state.connects.push(ConnectRecord {
            session_id: session_id.to_string(),
            credentials: credentials.clone(),
        });

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ZaplineError::transport("mock connect refused"));
        }
        if state.hang {
            drop(state);
            std::future::pending::<()>().await;
            return Err(ZaplineError::Internal("unreachable".into()));
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let connection = Arc::new(MockConnection::new(session_id));
        if self.auto_script {
            match credentials {
                Some(_) => {
                    let _ = tx.try_send(TransportEvent::Connecting);
                    let _ = tx.try_send(TransportEvent::Opened {
                        identity: format!("{session_id}@mock"),
                    });
                }
                None => {
                    state.pairing_seq += 1;
                    let payload = format!("qr-{session_id}-{}", state.pairing_seq);
                    let _ = tx.try_send(TransportEvent::PairingAvailable(payload));
                }
            }
        }
        state.links.insert(
            session_id.to_string(),
            MockLink {
                events: tx,
                connection: connection.clone(),
            },
        );

        Ok(TransportHandle {
            connection,
            events: rx,
        })
    }
}
