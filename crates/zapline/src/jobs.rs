// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapline jobs` command implementation.

use std::str::FromStr;

use zapline_config::ZaplineConfig;
use zapline_core::{Job, JobQueue, JobStatus, StorageAdapter, ZaplineError};
use zapline_storage::SqliteStorage;

/// Print the most recent jobs, newest first.
pub async fn run_list(
    config: &ZaplineConfig,
    status: Option<&str>,
    limit: usize,
) -> Result<(), ZaplineError> {
    let status = status
        .map(|s| {
            JobStatus::from_str(s)
                .map_err(|_| ZaplineError::InvalidInput(format!("unknown job status `{s}`")))
        })
        .transpose()?;

    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let jobs = storage.list_jobs(status, limit).await?;
    storage.close().await?;

    if jobs.is_empty() {
        println!("no jobs");
        return Ok(());
    }
    println!(
        "{:>6}  {:<10}  {:<20}  {:<16}  {:<15}  ERROR",
        "ID", "STATUS", "SEND AT", "SESSION", "DESTINATION"
    );
    for job in &jobs {
        println!("{}", format_job_line(job));
    }
    Ok(())
}

fn format_job_line(job: &Job) -> String {
    format!(
        "{:>6}  {:<10}  {:<20}  {:<16}  {:<15}  {}",
        job.id,
        job.status.to_string(),
        job.send_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        job.session_id.as_deref().unwrap_or("-"),
        job.destination,
        job.error.as_deref().unwrap_or(""),
    )
}
