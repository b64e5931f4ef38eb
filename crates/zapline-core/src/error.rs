// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Zapline messaging gateway.

use thiserror::Error;

/// The primary error type used across all Zapline adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ZaplineError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport adapter errors (connect failure, rejected send, bridge unreachable).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The session exists (or was referenced) but is not connected to the transport.
    #[error("session {session_id} is not connected")]
    NotConnected { session_id: String },

    /// No session with the given identifier is registered.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No job with the given identifier exists.
    #[error("job not found: {0}")]
    JobNotFound(i64),

    /// Caller-supplied input failed validation at the submission boundary.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZaplineError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        ZaplineError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Returns `true` for errors that mean "the session cannot send right now".
    pub fn is_not_connected(&self) -> bool {
        matches!(self, ZaplineError::NotConnected { .. })
    }

    /// Errors that may succeed on a later attempt (I/O against a store or the bridge).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ZaplineError::Storage { .. } | ZaplineError::Transport { .. } | ZaplineError::Timeout { .. }
        )
    }
}
