// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`TransportAdapter`] backed by the bridge sidecar.
//!
//! `connect` asks the bridge to start the session, then subscribes to the
//! session's event WebSocket. A pump task turns frames into
//! [`TransportEvent`]s until the bridge sends a close frame, the socket
//! drops, or the session ends the connection.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::{Stream, StreamExt};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use zapline_config::model::BridgeConfig;
use zapline_core::{
    AdapterType, CloseReason, CredentialBlob, HealthStatus, MessageId, PluginAdapter,
    TransportAdapter, TransportConnection, TransportEvent, TransportHandle, ZaplineError,
};

use crate::client::BridgeClient;
use crate::frames::{BridgeFrame, CloseClassifier};

#[derive(Serialize)]
struct ConnectRequest {
    credentials: Option<String>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Serialize)]
struct PairingCodeRequest<'a> {
    phone_number: &'a str,
}

#[derive(Deserialize)]
struct PairingCodeResponse {
    code: String,
}

/// Transport adapter speaking the bridge's HTTP + WebSocket contract.
pub struct BridgeTransport {
    client: BridgeClient,
    classifier: Arc<CloseClassifier>,
    event_buffer: usize,
}

impl BridgeTransport {
    pub fn new(config: &BridgeConfig) -> Result<Self, ZaplineError> {
        Ok(Self {
            client: BridgeClient::new(config)?,
            classifier: Arc::new(CloseClassifier::from_config(config)),
            event_buffer: config.event_buffer.max(1),
        })
    }

    /// HTTP-only handle on a session. Used by `connect`; its event pump is
    /// whatever `cancel` guards.
    pub fn connection(&self, session_id: &str) -> BridgeConnection {
        BridgeConnection {
            session_id: session_id.to_string(),
            client: self.client.clone(),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl PluginAdapter for BridgeTransport {
    fn name(&self) -> &str {
        "bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        let url = self.client.health_url()?;
        Ok(match self.client.send::<()>(Method::GET, url, None).await {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl TransportAdapter for BridgeTransport {
    async fn connect(
        &self,
        session_id: &str,
        credentials: Option<CredentialBlob>,
    ) -> Result<TransportHandle, ZaplineError> {
        let url = self.client.session_url(session_id, &["connect"])?;
        let events_url = self.client.events_url(session_id)?;
        let session_url = self.client.session_url(session_id, &[])?;
        let body = ConnectRequest {
            credentials: credentials.map(|blob| STANDARD.encode(blob.as_bytes())),
        };
        self.client.send(Method::POST, url, Some(&body)).await?;
        let pending = PendingSession {
            session_id: session_id.to_string(),
            client: self.client.clone(),
            url: Some(session_url),
        };

        let socket = match tokio_tungstenite::connect_async(events_url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                pending.abandon().await;
                return Err(ZaplineError::Transport {
                    message: format!("bridge event stream for {session_id} failed to open: {e}"),
                    source: Some(Box::new(e)),
                });
            }
        };
        pending.keep();
        info!(session_id, "bridge event stream open");

        let connection = self.connection(session_id);
        let (tx, rx) = mpsc::channel(self.event_buffer);
        tokio::spawn(pump_events(
            session_id.to_string(),
            socket,
            tx,
            self.classifier.clone(),
            connection.cancel.clone(),
        ));

        Ok(TransportHandle {
            connection: Arc::new(connection),
            events: rx,
        })
    }
}

/// A bridge session started by `connect` but not yet handed to the caller.
///
/// Dropped without [`keep`](Self::keep) (the connect future was cancelled),
/// it ends the session on the bridge in the background.
struct PendingSession {
    session_id: String,
    client: BridgeClient,
    url: Option<Url>,
}

impl PendingSession {
    fn keep(mut self) {
        self.url = None;
    }

    async fn abandon(mut self) {
        if let Some(url) = self.url.take() {
            end_abandoned(&self.client, &self.session_id, url).await;
        }
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        let Some(url) = self.url.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        let session_id = std::mem::take(&mut self.session_id);
        runtime.spawn(async move { end_abandoned(&client, &session_id, url).await });
    }
}

async fn end_abandoned(client: &BridgeClient, session_id: &str, url: Url) {
    match client.delete_idempotent(url).await {
        Ok(()) => debug!(session_id, "ended half-open bridge session"),
        Err(e) => warn!(session_id, error = %e, "failed to end half-open bridge session"),
    }
}

/// One session's connection on the bridge.
pub struct BridgeConnection {
    session_id: String,
    client: BridgeClient,
    cancel: CancellationToken,
}

#[async_trait]
impl TransportConnection for BridgeConnection {
    async fn send_text(&self, destination: &str, text: &str) -> Result<MessageId, ZaplineError> {
        let url = self.client.session_url(&self.session_id, &["messages"])?;
        let body = SendRequest {
            to: destination,
            text,
        };
        let response: SendResponse = self.client.send_json(Method::POST, url, Some(&body)).await?;
        Ok(MessageId(response.id))
    }

    async fn logout(&self) -> Result<(), ZaplineError> {
        let url = self.client.session_url(&self.session_id, &["logout"])?;
        self.client.send::<()>(Method::POST, url, None).await?;
        Ok(())
    }

    async fn end(&self) -> Result<(), ZaplineError> {
        self.cancel.cancel();
        let url = self.client.session_url(&self.session_id, &[])?;
        self.client.delete_idempotent(url).await
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, ZaplineError> {
        let url = self.client.session_url(&self.session_id, &["pairing-code"])?;
        let body = PairingCodeRequest { phone_number };
        let response: PairingCodeResponse =
            self.client.send_json(Method::POST, url, Some(&body)).await?;
        Ok(response.code)
    }
}

/// Forward frames from `socket` to `tx` until a close, a socket failure, or `cancel`.
///
/// The stream always ends with exactly one `Closed` event unless the
/// receiver is gone or the pump was cancelled.
pub async fn pump_events<S>(
    session_id: String,
    mut socket: S,
    tx: mpsc::Sender<TransportEvent>,
    classifier: Arc<CloseClassifier>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let closed = loop {
        let next = tokio::select! {
            next = socket.next() => next,
            _ = cancel.cancelled() => {
                debug!(session_id = %session_id, "event pump cancelled");
                return;
            }
            _ = tx.closed() => {
                debug!(session_id = %session_id, "event receiver dropped");
                return;
            }
        };

        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(Some(frame)))) => {
                break classifier.classify(Some(u16::from(frame.code)), frame.reason.as_str());
            }
            Some(Ok(Message::Close(None))) => {
                break CloseReason::Other("bridge closed the event stream".to_string());
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break CloseReason::Other(format!("bridge event stream failed: {e}")),
            None => break CloseReason::Other("event stream ended".to_string()),
        };

        let frame: BridgeFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "ignoring unrecognized bridge frame");
                continue;
            }
        };
        let event = match frame.into_event(&classifier) {
            Ok(event) => event,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "dropping malformed bridge frame");
                continue;
            }
        };
        let is_close = matches!(event, TransportEvent::Closed(_));
        if tx.send(event).await.is_err() || is_close {
            return;
        }
    };

    debug!(session_id = %session_id, reason = %closed, "bridge event stream closed");
    let _ = tx.send(TransportEvent::Closed(closed)).await;
}
