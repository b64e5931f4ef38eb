// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Zapline integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without a transport sidecar.
//!
//! # Components
//!
//! - [`MockTransport`] - Scripted transport with per-connection event links
//! - [`MemoryCredentialStore`] - Credential store with failure injection
//! - [`TestHarness`] - Storage, sessions and dispatcher wired together

pub mod harness;
pub mod memory_credentials;
pub mod mock_transport;

pub use harness::TestHarness;
pub use memory_credentials::MemoryCredentialStore;
pub use mock_transport::{ConnectRecord, MockConnection, MockLink, MockTransport};
