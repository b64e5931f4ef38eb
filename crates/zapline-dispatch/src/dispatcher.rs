// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The delivery worker loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use zapline_config::model::DispatcherConfig;
use zapline_core::{DeliveryTarget, Job, JobQueue, ZaplineError};
use zapline_resilience::{retry, RetryPolicy};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct DeliveryDispatcher {
    queue: Arc<dyn JobQueue>,
    target: Arc<dyn DeliveryTarget>,
    default_session_id: String,
    batch_size: usize,
    tick_interval: Duration,
    stale_claim: Duration,
    store_policy: RetryPolicy,
}

impl DeliveryDispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        target: Arc<dyn DeliveryTarget>,
        default_session_id: impl Into<String>,
        config: &DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            target,
            default_session_id: default_session_id.into(),
            batch_size: config.batch_size,
            tick_interval: Duration::from_secs(config.tick_interval_secs),
            stale_claim: Duration::from_secs(config.stale_claim_secs),
            store_policy: RetryPolicy::from_dispatcher(config),
        }
    }

    /// Claim and deliver everything due now.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Claim and deliver everything due at `now`. Jobs are sent one at a time.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let jobs = match self.queue.claim_due(self.batch_size, now).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "claiming due jobs failed, skipping tick");
                return TickReport::default();
            }
        };

        let mut report = TickReport {
            claimed: jobs.len(),
            ..TickReport::default()
        };
        for job in jobs {
            if self.deliver(&job).await {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                sent = report.sent,
                failed = report.failed,
                "dispatch tick complete"
            );
        }
        report
    }

    /// Send one claimed job and record the outcome. Returns whether it was sent.
    async fn deliver(&self, job: &Job) -> bool {
        let session_id = job.session_id.as_deref().unwrap_or(&self.default_session_id);
        match self
            .target
            .deliver(session_id, &job.destination, &job.body)
            .await
        {
            Ok(message_id) => {
                debug!(job_id = job.id, session_id, message_id = %message_id.0, "job sent");
                let recorded = retry(&self.store_policy, "jobs.mark_sent", || {
                    self.queue.mark_sent(job.id)
                })
                .await;
                self.log_unrecorded(job.id, recorded);
                true
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(job_id = job.id, session_id, error = %reason, "job delivery failed");
                let recorded = retry(&self.store_policy, "jobs.mark_failed", || {
                    self.queue.mark_failed(job.id, &reason)
                })
                .await;
                self.log_unrecorded(job.id, recorded);
                false
            }
        }
    }

    fn log_unrecorded(&self, job_id: i64, recorded: Result<(), ZaplineError>) {
        if let Err(e) = recorded {
            // The job stays in processing and is failed as interrupted on the next start.
            error!(job_id, error = %e, "could not record job outcome");
        }
    }

    /// Fail jobs whose claim is older than the configured threshold.
    pub async fn recover_stale_claims(&self) -> Result<usize, ZaplineError> {
        let threshold = chrono::Duration::from_std(self.stale_claim)
            .map_err(|e| ZaplineError::Internal(format!("stale claim threshold: {e}")))?;
        let Some(cutoff) = Utc::now().checked_sub_signed(threshold) else {
            return Ok(0);
        };
        let count = self.queue.fail_stale_claims(cutoff).await?;
        if count > 0 {
            warn!(count, "failed jobs left in processing by an earlier run");
        }
        Ok(count)
    }

    /// Tick every interval until `cancel` fires. A tick in progress completes.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(e) = self.recover_stale_claims().await {
            warn!(error = %e, "stale claim recovery failed");
        }

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.tick_interval.as_secs(),
            batch_size = self.batch_size,
            "dispatcher started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = cancel.cancelled() => {
                    info!("dispatcher shutting down");
                    break;
                }
            }
        }
    }
}
