// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery target trait connecting the dispatcher to live sessions.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::types::MessageId;

/// Something that can deliver a text through a named session.
///
/// Implementations must fail fast with [`ZaplineError::NotConnected`] when
/// the session is absent or not connected; they never wait for a connection.
#[async_trait]
pub trait DeliveryTarget: Send + Sync + 'static {
    async fn deliver(
        &self,
        session_id: &str,
        destination: &str,
        text: &str,
    ) -> Result<MessageId, ZaplineError>;
}
