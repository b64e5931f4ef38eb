// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Zapline gateway.
//!
//! Adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod delivery;
pub mod storage;
pub mod transport;

pub use adapter::PluginAdapter;
pub use delivery::DeliveryTarget;
pub use storage::{CredentialStore, JobQueue, StorageAdapter};
pub use transport::{TransportAdapter, TransportConnection, TransportHandle};
