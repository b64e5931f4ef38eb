// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Zapline gateway.

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ZaplineError;

/// Transport-assigned identifier for a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

impl HealthStatus {
    /// Short label used in health responses.
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded(_) => "degraded",
            HealthStatus::Unhealthy(_) => "unhealthy",
        }
    }
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Transport,
    Storage,
}

// --- Sessions ---

/// Lifecycle status of a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    QrPending,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Why the transport closed a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CloseReason {
    /// Explicit logout, or the transport invalidated the session.
    LoggedOut,
    /// Another client took over the session, or the device was removed.
    Conflict(String),
    /// Any other closure (network drop, protocol restart, server close).
    Other(String),
}

impl CloseReason {
    /// Permanent closures are never followed by an automatic reconnect.
    pub fn is_permanent(&self) -> bool {
        matches!(self, CloseReason::LoggedOut)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::LoggedOut => write!(f, "logged out"),
            CloseReason::Conflict(detail) => write!(f, "conflict: {detail}"),
            CloseReason::Other(detail) => write!(f, "{detail}"),
        }
    }
}

/// Serialized authentication state that lets a session reconnect without re-pairing.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBlob(pub Vec<u8>);

impl CredentialBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for CredentialBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialBlob([redacted; {} bytes])", self.0.len())
    }
}

/// Lifecycle events emitted by a transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A pairing payload (QR-code content) is ready to be scanned.
    PairingAvailable(String),
    /// The authentication state changed and should be persisted.
    CredentialsChanged(CredentialBlob),
    /// Pairing was accepted and the connection is opening.
    Connecting,
    /// The connection is authenticated.
    Opened { identity: String },
    /// The connection closed.
    Closed(CloseReason),
}

/// Read-only view of a session, published by its state machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub pairing_payload: Option<String>,
    pub identity: Option<String>,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    pub last_disconnect: Option<CloseReason>,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// A freshly referenced session that has not been activated yet.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Uninitialized,
            pairing_payload: None,
            identity: None,
            last_backup_at: None,
            reconnect_attempts: 0,
            last_disconnect: None,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }
}

// --- Jobs ---

/// Delivery status of a scheduled job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Sent,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Sent | JobStatus::Failed)
    }
}

/// A scheduled outbound text message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: i64,
    pub session_id: Option<String>,
    pub destination: String,
    pub body: String,
    pub send_at: DateTime<Utc>,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A validated job submission, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub session_id: Option<String>,
    pub destination: String,
    pub body: String,
    pub send_at: DateTime<Utc>,
}

// --- Timestamps ---

/// Format a timestamp the way the store persists it.
///
/// Fixed width with millisecond precision, so lexical order of the stored
/// text equals chronological order.
pub fn to_storage_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp back into UTC.
pub fn from_storage_timestamp(raw: &str) -> Result<DateTime<Utc>, ZaplineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ZaplineError::Internal(format!("corrupt timestamp `{raw}`: {e}")))
}

/// Parse a caller-supplied schedule time.
///
/// Accepts RFC 3339 (any offset) or a naive `YYYY-MM-DD HH:MM[:SS]` /
/// `YYYY-MM-DDTHH:MM[:SS]` value interpreted as UTC.
///
/// Years outside `0000..=9999` are rejected: they have no fixed-width
/// storage form.
pub fn parse_schedule_time(raw: &str) -> Result<DateTime<Utc>, ZaplineError> {
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    let raw = raw.trim();
    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc()),
    };
    let Some(parsed) = parsed else {
        return Err(ZaplineError::InvalidInput(format!(
            "send_at `{raw}` is not a valid time"
        )));
    };
    if !(0..=9999).contains(&parsed.year()) {
        return Err(ZaplineError::InvalidInput(format!(
            "send_at `{raw}` is outside years 0000-9999"
        )));
    }
    Ok(parsed)
}
