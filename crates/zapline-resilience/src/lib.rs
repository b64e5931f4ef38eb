// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for the Zapline messaging gateway.
//!
//! Bounded retry with linear, exponential, or fixed backoff. Used around the
//! durable credential store and around job-outcome writes so a transient
//! storage failure does not strand a session or a job.

pub mod retry;

pub use retry::{RetryPolicy, retry};
