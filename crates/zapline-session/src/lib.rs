// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle management for the Zapline gateway.
//!
//! Each tenant session runs as one actor task that drives its transport
//! connection through pairing, connection and reconnects, and keeps its
//! credentials backed up. The [`SessionRegistry`] owns the actors and is
//! the delivery target used by the dispatcher.

pub mod credentials;
mod machine;
pub mod reconnect;
pub mod registry;

pub use credentials::{CredentialBackup, LocalCache};
pub use machine::SessionSettings;
pub use reconnect::{ReconnectPolicy, ReconnectTrigger};
pub use registry::SessionRegistry;
