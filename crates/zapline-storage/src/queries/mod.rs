// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the job queue and the credential store.

pub mod credentials;
pub mod jobs;
