// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled job queue.
//!
//! The `queued -> processing` update is conditional on the current status,
//! so a job is handed to at most one claimer even when several dispatchers
//! (in this process or another) share the database file.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use zapline_core::types::{to_storage_timestamp, Job, JobStatus, NewJob};
use zapline_core::ZaplineError;

use crate::database::Database;
use crate::models::{job_from_row, JOB_COLUMNS};

/// Error text recorded on a job canceled before it was claimed.
pub const CANCELED: &str = "canceled";

/// Error text recorded on a job whose claim outlived the process that made it.
pub const INTERRUPTED: &str = "interrupted";

/// Insert a new queued job. Returns its id.
pub async fn enqueue(db: &Database, job: &NewJob) -> Result<i64, ZaplineError> {
    let job = job.clone();
    let created_at = to_storage_timestamp(Utc::now());
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO jobs (session_id, destination, body, send_at, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'queued', ?5)",
                params![
                    job.session_id,
                    job.destination,
                    job.body,
                    to_storage_timestamp(job.send_at),
                    created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim up to `limit` due jobs, earliest `send_at` first.
///
/// Each candidate is moved to `processing` with a per-row conditional
/// update; a row another claimer got to first is skipped.
pub async fn claim_due(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Job>, ZaplineError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let now = to_storage_timestamp(now);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    db.connection()
        .call(move |conn| -> Result<Vec<Job>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let candidates: Vec<Job> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE status = 'queued' AND send_at <= ?1
                     ORDER BY send_at ASC, id ASC
                     LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![now, limit], job_from_row)?;
                rows.collect::<Result<_, _>>()?
            };

            let mut claimed = Vec::with_capacity(candidates.len());
            for job in candidates {
                let changed = tx.execute(
                    "UPDATE jobs SET status = 'processing', claimed_at = ?1
                     WHERE id = ?2 AND status = 'queued'",
                    params![now, job.id],
                )?;
                if changed == 1 {
                    claimed.push(Job {
                        status: JobStatus::Processing,
                        claimed_at: zapline_core::types::from_storage_timestamp(&now).ok(),
                        ..job
                    });
                }
            }

            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a successful send: `processing -> sent`.
pub async fn mark_sent(db: &Database, id: i64) -> Result<(), ZaplineError> {
    let sent_at = to_storage_timestamp(Utc::now());
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET status = 'sent', sent_at = ?1, error = NULL
                 WHERE id = ?2 AND status = 'processing'",
                params![sent_at, id],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    ensure_transitioned(db, id, changed, "sent").await
}

/// Record a failed send: `processing -> failed`.
pub async fn mark_failed(db: &Database, id: i64, error: &str) -> Result<(), ZaplineError> {
    let error = error.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET status = 'failed', error = ?1
                 WHERE id = ?2 AND status = 'processing'",
                params![error, id],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    ensure_transitioned(db, id, changed, "failed").await
}

/// Distinguish "no such job" from "job not in processing" after a conditional update.
async fn ensure_transitioned(
    db: &Database,
    id: i64,
    changed: usize,
    target: &str,
) -> Result<(), ZaplineError> {
    if changed == 1 {
        return Ok(());
    }
    match get_job(db, id).await? {
        None => Err(ZaplineError::JobNotFound(id)),
        Some(job) => Err(ZaplineError::InvalidInput(format!(
            "job {id} is {}, cannot mark {target}",
            job.status
        ))),
    }
}

/// Fetch one job by id.
pub async fn get_job(db: &Database, id: i64) -> Result<Option<Job>, ZaplineError> {
    db.connection()
        .call(move |conn| -> Result<Option<Job>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                job_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List jobs newest first, optionally filtered by status.
pub async fn list_jobs(
    db: &Database,
    status: Option<JobStatus>,
    limit: usize,
) -> Result<Vec<Job>, ZaplineError> {
    let status = status.map(|s| s.to_string());
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<Job>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status, limit], job_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Cancel a job that has not been claimed yet. Returns whether it applied.
pub async fn cancel_job(db: &Database, id: i64) -> Result<bool, ZaplineError> {
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET status = 'failed', error = ?1
                 WHERE id = ?2 AND status = 'queued'",
                params![CANCELED, id],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    Ok(changed == 1)
}

/// Fail every job claimed before `claimed_before` that never recorded an outcome.
///
/// Such a job may or may not have been sent; failing it rather than
/// re-queueing means it is never delivered twice.
pub async fn fail_stale_claims(
    db: &Database,
    claimed_before: DateTime<Utc>,
) -> Result<usize, ZaplineError> {
    let cutoff = to_storage_timestamp(claimed_before);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET status = 'failed', error = ?1
                 WHERE status = 'processing' AND claimed_at < ?2",
                params![INTERRUPTED, cutoff],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn new_job(send_at: DateTime<Utc>) -> NewJob {
        NewJob {
            session_id: None,
            destination: "5511999999999".to_string(),
            body: "hi".to_string(),
            send_at,
        }
    }

    #[tokio::test]
    async fn enqueue_then_claim_lifecycle() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();

        let id = enqueue(&db, &new_job(now - Duration::seconds(1))).await.unwrap();
        let stored = get_job(&db, id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
        assert!(stored.claimed_at.is_none());

        let claimed = claim_due(&db, 10, now).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
        assert_eq!(claimed[0].status, JobStatus::Processing);

        // Already claimed: a second pass sees nothing.
        assert!(claim_due(&db, 10, now).await.unwrap().is_empty());

        mark_sent(&db, id).await.unwrap();
        let sent = get_job(&db, id).await.unwrap().unwrap();
        assert_eq!(sent.status, JobStatus::Sent);
        assert!(sent.sent_at.is_some());
        assert!(sent.error.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn future_jobs_are_not_claimed_early() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let send_at = now + Duration::seconds(60);
        let id = enqueue(&db, &new_job(send_at)).await.unwrap();

        assert!(claim_due(&db, 10, now).await.unwrap().is_empty());
        assert!(claim_due(&db, 10, send_at - Duration::milliseconds(1))
            .await
            .unwrap()
            .is_empty());

        let claimed = claim_due(&db, 10, send_at).await.unwrap();
        assert_eq!(claimed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![id]);
    }

    #[tokio::test]
    async fn claim_respects_limit_and_send_at_order() {
        let (db, _dir) = setup_db().await;
        let base = Utc::now() - Duration::hours(1);

        // Insert 50 due jobs in reverse send_at order.
        let mut by_send_at = Vec::new();
        for i in (0..50).rev() {
            let send_at = base + Duration::seconds(i);
            let id = enqueue(&db, &new_job(send_at)).await.unwrap();
            by_send_at.push((send_at, id));
        }
        by_send_at.sort();
        let expected: Vec<i64> = by_send_at.iter().take(10).map(|(_, id)| *id).collect();

        let claimed = claim_due(&db, 10, Utc::now()).await.unwrap();
        assert_eq!(claimed.len(), 10);
        assert_eq!(claimed.iter().map(|j| j.id).collect::<Vec<_>>(), expected);
    }

    #[tokio::test]
    async fn equal_send_at_breaks_ties_by_id() {
        let (db, _dir) = setup_db().await;
        let at = Utc::now() - Duration::seconds(5);
        let first = enqueue(&db, &new_job(at)).await.unwrap();
        let second = enqueue(&db, &new_job(at)).await.unwrap();

        let claimed = claim_due(&db, 1, Utc::now()).await.unwrap();
        assert_eq!(claimed[0].id, first);
        let claimed = claim_due(&db, 1, Utc::now()).await.unwrap();
        assert_eq!(claimed[0].id, second);
    }

    #[tokio::test]
    async fn mark_failed_records_error_and_keeps_sent_at_empty() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, &new_job(Utc::now())).await.unwrap();
        claim_due(&db, 1, Utc::now()).await.unwrap();

        mark_failed(&db, id, "session default is not connected").await.unwrap();
        let job = get_job(&db, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("session default is not connected"));
        assert!(job.sent_at.is_none());
    }

    #[tokio::test]
    async fn terminal_jobs_cannot_be_marked_again() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, &new_job(Utc::now())).await.unwrap();
        claim_due(&db, 1, Utc::now()).await.unwrap();
        mark_sent(&db, id).await.unwrap();

        let err = mark_failed(&db, id, "late").await.unwrap_err();
        assert!(matches!(err, ZaplineError::InvalidInput(_)));
        let err = mark_sent(&db, 9_999).await.unwrap_err();
        assert!(matches!(err, ZaplineError::JobNotFound(9_999)));
    }

    #[tokio::test]
    async fn cancel_only_applies_to_queued_jobs() {
        let (db, _dir) = setup_db().await;
        let queued = enqueue(&db, &new_job(Utc::now() + Duration::hours(1))).await.unwrap();
        let claimed = enqueue(&db, &new_job(Utc::now() - Duration::seconds(1))).await.unwrap();
        claim_due(&db, 10, Utc::now()).await.unwrap();

        assert!(cancel_job(&db, queued).await.unwrap());
        assert!(!cancel_job(&db, queued).await.unwrap());
        assert!(!cancel_job(&db, claimed).await.unwrap());

        let job = get_job(&db, queued).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(CANCELED));
    }

    #[tokio::test]
    async fn stale_claims_fail_as_interrupted() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, &new_job(Utc::now() - Duration::minutes(30))).await.unwrap();
        let claim_time = Utc::now() - Duration::minutes(20);
        claim_due(&db, 1, claim_time).await.unwrap();

        // Not yet stale relative to an older cutoff.
        assert_eq!(
            fail_stale_claims(&db, claim_time - Duration::minutes(1)).await.unwrap(),
            0
        );
        assert_eq!(fail_stale_claims(&db, Utc::now()).await.unwrap(), 1);

        let job = get_job(&db, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(INTERRUPTED));
    }

    #[tokio::test]
    async fn list_filters_by_status_newest_first() {
        let (db, _dir) = setup_db().await;
        let a = enqueue(&db, &new_job(Utc::now() - Duration::seconds(2))).await.unwrap();
        let b = enqueue(&db, &new_job(Utc::now() + Duration::hours(1))).await.unwrap();
        claim_due(&db, 10, Utc::now()).await.unwrap();

        let all = list_jobs(&db, None, 10).await.unwrap();
        assert_eq!(all.iter().map(|j| j.id).collect::<Vec<_>>(), vec![b, a]);

        let queued = list_jobs(&db, Some(JobStatus::Queued), 10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, b);
    }

    #[tokio::test]
    async fn two_handles_never_claim_the_same_job() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let path = path.to_str().unwrap();
        let first = Database::open(path).await.unwrap();
        let second = Database::open(path).await.unwrap();

        for _ in 0..40 {
            enqueue(&first, &new_job(Utc::now() - Duration::seconds(1))).await.unwrap();
        }

        let now = Utc::now();
        let mut tasks = Vec::new();
        for db in [first.clone(), second.clone(), first.clone(), second.clone()] {
            tasks.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                loop {
                    let batch = claim_due(&db, 3, now).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    ids.extend(batch.into_iter().map(|j| j.id));
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(total, 40, "every job claimed");
        assert_eq!(all.len(), 40, "no job claimed twice");
    }
}
