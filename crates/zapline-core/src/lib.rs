// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Zapline messaging gateway.
//!
//! This crate provides the trait definitions, error type, and common types
//! shared by the session manager, the delivery dispatcher, and the adapters
//! (transport bridge, SQLite storage).

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ZaplineError;
pub use types::{
    AdapterType, CloseReason, CredentialBlob, HealthStatus, Job, JobStatus, MessageId, NewJob,
    SessionSnapshot, SessionStatus, TransportEvent,
};

pub use traits::{
    CredentialStore, DeliveryTarget, JobQueue, PluginAdapter, StorageAdapter, TransportAdapter,
    TransportConnection, TransportHandle,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [AdapterType::Transport, AdapterType::Storage] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn health_status_labels() {
        assert_eq!(HealthStatus::Healthy.label(), "healthy");
        assert_eq!(HealthStatus::Degraded("slow".into()).label(), "degraded");
        assert_eq!(HealthStatus::Unhealthy("down".into()).label(), "unhealthy");
    }

    #[test]
    fn new_snapshot_starts_uninitialized() {
        let snap = SessionSnapshot::new("tenant-1");
        assert_eq!(snap.status, SessionStatus::Uninitialized);
        assert!(snap.pairing_payload.is_none());
        assert!(!snap.is_connected());
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_transport<T: TransportAdapter>() {}
        fn _assert_storage<T: StorageAdapter + CredentialStore + JobQueue>() {}
        fn _assert_delivery<T: DeliveryTarget>() {}
    }
}
