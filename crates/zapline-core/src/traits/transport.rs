// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter traits for the external messaging capability.
//!
//! The transport owns pairing, framing and its own socket-level recovery.
//! Zapline only opens connections, consumes their lifecycle events and
//! asks them to send text.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ZaplineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CredentialBlob, MessageId, TransportEvent};

/// A live connection returned by [`TransportAdapter::connect`].
///
/// `events` yields lifecycle events until the connection ends; the stream
/// closing is equivalent to an unexplained disconnect.
pub struct TransportHandle {
    pub connection: Arc<dyn TransportConnection>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

/// Operations available on one open connection.
#[async_trait]
pub trait TransportConnection: Send + Sync + 'static {
    /// Sends a one-to-one text message.
    async fn send_text(&self, destination: &str, text: &str) -> Result<MessageId, ZaplineError>;

    /// Asks the transport to invalidate the session. Safe on a closed connection.
    async fn logout(&self) -> Result<(), ZaplineError>;

    /// Closes the connection without invalidating credentials. Idempotent.
    async fn end(&self) -> Result<(), ZaplineError>;

    /// Requests a phone-number pairing code as an alternative to the QR payload.
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, ZaplineError> {
        let _ = phone_number;
        Err(ZaplineError::transport(
            "pairing codes are not supported by this transport",
        ))
    }
}

/// Adapter that opens transport connections on behalf of sessions.
#[async_trait]
pub trait TransportAdapter: PluginAdapter {
    /// Begins a connection attempt, resuming from `credentials` when present.
    async fn connect(
        &self,
        session_id: &str,
        credentials: Option<CredentialBlob>,
    ) -> Result<TransportHandle, ZaplineError>;
}
