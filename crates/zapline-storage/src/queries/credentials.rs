// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable credential records, one row per session.
//!
//! Each blob is stored with its SHA-256 checksum. A row whose blob no longer
//! matches is reported as absent so the session cold-starts with a fresh
//! pairing instead of restoring a corrupt state.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::warn;
use zapline_core::types::{to_storage_timestamp, CredentialBlob};
use zapline_core::ZaplineError;

use crate::database::Database;

/// Lowercase hex SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Insert or replace the credentials for a session in one statement.
pub async fn save(db: &Database, session_id: &str, blob: &CredentialBlob) -> Result<(), ZaplineError> {
    let session_id = session_id.to_string();
    let bytes = blob.as_bytes().to_vec();
    let sum = checksum(&bytes);
    let updated_at = to_storage_timestamp(Utc::now());
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO credentials (session_id, blob, checksum, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                    blob = excluded.blob,
                    checksum = excluded.checksum,
                    updated_at = excluded.updated_at",
                params![session_id, bytes, sum, updated_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Load the credentials for a session, or `None` if absent or corrupt.
pub async fn restore(db: &Database, session_id: &str) -> Result<Option<CredentialBlob>, ZaplineError> {
    let id = session_id.to_string();
    let row = db
        .connection()
        .call(move |conn| -> Result<Option<(Vec<u8>, String)>, rusqlite::Error> {
            conn.query_row(
                "SELECT blob, checksum FROM credentials WHERE session_id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    Ok(match row {
        Some((bytes, stored)) if checksum(&bytes) == stored => Some(CredentialBlob(bytes)),
        Some(_) => {
            warn!(session_id, "stored credentials failed checksum, treating as absent");
            None
        }
        None => None,
    })
}

/// Delete the credentials for a session. Deleting an absent row is not an error.
pub async fn delete(db: &Database, session_id: &str) -> Result<(), ZaplineError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "DELETE FROM credentials WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Every session id with stored credentials, sorted.
pub async fn list_sessions(db: &Database) -> Result<Vec<String>, ZaplineError> {
    db.connection()
        .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT session_id FROM credentials ORDER BY session_id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
