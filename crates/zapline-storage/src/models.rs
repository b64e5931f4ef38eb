// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the shared job types.

use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;
use zapline_core::types::{from_storage_timestamp, Job, JobStatus};

/// Column list matching [`job_from_row`].
pub(crate) const JOB_COLUMNS: &str =
    "id, session_id, destination, body, send_at, status, error, created_at, claimed_at, sent_at";

pub(crate) fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(5)?;
    let status = JobStatus::from_str(&status)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Job {
        id: row.get(0)?,
        session_id: row.get(1)?,
        destination: row.get(2)?,
        body: row.get(3)?,
        send_at: timestamp(row, 4)?,
        status,
        error: row.get(6)?,
        created_at: timestamp(row, 7)?,
        claimed_at: optional_timestamp(row, 8)?,
        sent_at: optional_timestamp(row, 9)?,
    })
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let raw: String = row.get(idx)?;
    from_storage_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<chrono::DateTime<chrono::Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        from_storage_timestamp(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}
