// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnect delay policy.

use std::time::Duration;

use zapline_config::model::SessionConfig;
use zapline_core::CloseReason;

/// What caused the session to need a new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectTrigger {
    Closed(CloseReason),
    /// Connect failed or timed out before any event arrived.
    SetupFailed,
}

/// Maps a reconnect trigger and the consecutive attempt count to a delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub conflict: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            base: Duration::from_millis(config.reconnect_delay_ms),
            max: Duration::from_millis(config.max_reconnect_delay_ms),
            conflict: Duration::from_millis(config.conflict_reconnect_delay_ms),
        }
    }

    /// `None` means "do not reconnect automatically".
    ///
    /// `attempt` counts reconnects already scheduled since the last successful open.
    pub fn delay_for(&self, trigger: &ReconnectTrigger, attempt: u32) -> Option<Duration> {
        match trigger {
            ReconnectTrigger::Closed(CloseReason::LoggedOut) => None,
            ReconnectTrigger::Closed(CloseReason::Conflict(_)) => Some(self.conflict),
            ReconnectTrigger::Closed(CloseReason::Other(_)) | ReconnectTrigger::SetupFailed => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                Some(self.base.saturating_mul(factor).min(self.max))
            }
        }
    }
}
