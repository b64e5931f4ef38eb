// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable scheduled delivery for the Zapline gateway.
//!
//! The [`DeliveryDispatcher`] periodically claims due jobs from the
//! [`JobQueue`](zapline_core::JobQueue), hands each one to a
//! [`DeliveryTarget`](zapline_core::DeliveryTarget), and records the
//! outcome. Jobs are sent at most once: a claimed job that never got an
//! outcome is failed as interrupted on the next start instead of resent.

pub mod dispatcher;

pub use dispatcher::{DeliveryDispatcher, TickReport};
