// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Zapline messaging gateway.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! connection per handle via `tokio-rusqlite`, the scheduled job queue, and
//! checksummed credential records.

pub mod adapter;
pub mod database;
pub mod migrations;
pub(crate) mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
