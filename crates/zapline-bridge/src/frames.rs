// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event frames pushed by the bridge over the session WebSocket.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use zapline_config::model::BridgeConfig;
use zapline_core::{CloseReason, CredentialBlob, TransportEvent, ZaplineError};

/// Close code the bridge uses for an invalidated (logged out) session.
pub const CLOSE_LOGGED_OUT: u16 = 401;
/// Close code the bridge uses when another client replaced this one.
pub const CLOSE_CONFLICT: u16 = 440;

/// One JSON frame, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeFrame {
    Pairing {
        payload: String,
    },
    /// Credential state, base64 encoded.
    Credentials {
        data: String,
    },
    Connecting,
    Open {
        identity: String,
    },
    Close {
        #[serde(default)]
        code: Option<u16>,
        #[serde(default)]
        reason: String,
    },
}

impl BridgeFrame {
    pub fn into_event(self, classifier: &CloseClassifier) -> Result<TransportEvent, ZaplineError> {
        Ok(match self {
            BridgeFrame::Pairing { payload } => TransportEvent::PairingAvailable(payload),
            BridgeFrame::Credentials { data } => {
                let bytes = STANDARD.decode(data.as_bytes()).map_err(|e| ZaplineError::Transport {
                    message: format!("bridge sent undecodable credentials: {e}"),
                    source: Some(Box::new(e)),
                })?;
                TransportEvent::CredentialsChanged(CredentialBlob(bytes))
            }
            BridgeFrame::Connecting => TransportEvent::Connecting,
            BridgeFrame::Open { identity } => TransportEvent::Opened { identity },
            BridgeFrame::Close { code, reason } => {
                TransportEvent::Closed(classifier.classify(code, &reason))
            }
        })
    }
}

/// Maps a bridge close (code plus free-text reason) onto a [`CloseReason`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseClassifier {
    conflict_markers: Vec<String>,
    logout_markers: Vec<String>,
}

impl CloseClassifier {
    pub fn new<I, J, S, T>(conflict_markers: I, logout_markers: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let lower = |s: &str| s.trim().to_lowercase();
        Self {
            conflict_markers: conflict_markers
                .into_iter()
                .map(|m| lower(m.as_ref()))
                .filter(|m| !m.is_empty())
                .collect(),
            logout_markers: logout_markers
                .into_iter()
                .map(|m| lower(m.as_ref()))
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(&config.conflict_markers, &config.logout_markers)
    }

    /// Explicit codes win; otherwise the reason text is matched case-insensitively.
    pub fn classify(&self, code: Option<u16>, reason: &str) -> CloseReason {
        let detail = if reason.is_empty() {
            "closed".to_string()
        } else {
            reason.to_string()
        };
        match code {
            Some(CLOSE_LOGGED_OUT) => return CloseReason::LoggedOut,
            Some(CLOSE_CONFLICT) => return CloseReason::Conflict(detail),
            _ => {}
        }

        let lowered = reason.to_lowercase();
        if self.conflict_markers.iter().any(|m| lowered.contains(m.as_str())) {
            CloseReason::Conflict(detail)
        } else if self.logout_markers.iter().any(|m| lowered.contains(m.as_str())) {
            CloseReason::LoggedOut
        } else {
            CloseReason::Other(detail)
        }
    }
}
