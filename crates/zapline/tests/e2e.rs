// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests across the gateway, the dispatcher and sessions.
//!
//! Each test creates an isolated TestHarness with temp SQLite and a mock
//! transport. Tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use zapline_config::model::StorageConfig;
use zapline_core::{
    CredentialStore, JobQueue, JobStatus, PluginAdapter, SessionStatus, StorageAdapter,
};
use zapline_dispatch::DeliveryDispatcher;
use zapline_gateway::{GatewayState, build_router};
use zapline_resilience::RetryPolicy;
use zapline_session::{CredentialBackup, SessionRegistry};
use zapline_storage::SqliteStorage;
use zapline_test_utils::{MockTransport, TestHarness};

const TOKEN: &str = "e2e-token";

async fn harness() -> TestHarness {
    TestHarness::builder()
        .with_config(|c| c.gateway.bearer_token = Some(TOKEN.into()))
        .build()
        .await
        .unwrap()
}

fn router(harness: &TestHarness) -> axum::Router {
    build_router(GatewayState::new(
        &harness.config.gateway,
        harness.registry.clone(),
        harness.storage.clone() as Arc<dyn JobQueue>,
        vec![harness.storage.clone() as Arc<dyn PluginAdapter>],
    ))
}

async fn schedule_via_api(app: &axum::Router, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/jobs")
        .header("authorization", format!("Bearer {TOKEN}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn one_second_ago() -> String {
    (Utc::now() - chrono::Duration::seconds(1)).to_rfc3339()
}

// ---- Scheduled delivery ----

#[tokio::test]
async fn scheduled_job_is_sent_by_the_running_dispatcher() {
    let harness = harness().await;
    harness.connect_session("default").await.unwrap();
    let app = router(&harness);

    let (status, job) = schedule_via_api(
        &app,
        json!({"destination": "5511999999999", "text": "hi", "send_at": one_second_ago()}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = job["id"].as_i64().unwrap();

    let cancel = CancellationToken::new();
    let run = harness.dispatcher.run(cancel.clone());
    let watch = async {
        for _ in 0..250 {
            let job = harness.storage.get_job(id).await.unwrap().unwrap();
            if job.status.is_terminal() {
                cancel.cancel();
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cancel.cancel();
        panic!("job {id} was never delivered");
    };
    let ((), job) = tokio::join!(run, watch);

    assert_eq!(job.status, JobStatus::Sent);
    assert!(job.sent_at.is_some());
    let link = harness.transport.latest("default").await.unwrap();
    assert_eq!(
        link.connection().sent_messages().await,
        vec![("5511999999999".to_string(), "hi".to_string())]
    );
}

#[tokio::test]
async fn scheduled_job_fails_when_session_is_disconnected() {
    let harness = harness().await;
    let app = router(&harness);

    let (_, job) = schedule_via_api(
        &app,
        json!({"destination": "5511999999999", "text": "hi", "send_at": one_second_ago()}),
    )
    .await;
    let id = job["id"].as_i64().unwrap();

    let report = harness.dispatcher.tick().await;
    assert_eq!((report.claimed, report.failed), (1, 1));

    let job = harness.storage.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("not connected"));
    assert!(job.sent_at.is_none());
}

#[tokio::test]
async fn future_job_waits_for_its_time() {
    let harness = harness().await;
    harness.connect_session("default").await.unwrap();
    let app = router(&harness);

    let send_at = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
    let (_, job) = schedule_via_api(
        &app,
        json!({"destination": "5511999999999", "text": "later", "send_at": send_at}),
    )
    .await;
    let id = job["id"].as_i64().unwrap();

    assert_eq!(harness.dispatcher.tick().await.claimed, 0);
    let later = Utc::now() + chrono::Duration::hours(2);
    assert_eq!(harness.dispatcher.tick_at(later).await.sent, 1);
    let job = harness.storage.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Sent);
}

// ---- Restarts ----

#[tokio::test]
async fn claims_left_by_a_crash_are_failed_not_resent() {
    let harness = harness().await;
    harness.connect_session("default").await.unwrap();
    let past = Utc::now() - chrono::Duration::seconds(5);
    let crashed = harness
        .schedule(None, "5511999999999", "first", past)
        .await
        .unwrap();
    let pending = harness
        .schedule(None, "5511999999999", "second", past + chrono::Duration::seconds(1))
        .await
        .unwrap();

    // The "previous process" claims the first job and dies before sending.
    let claimed = harness.storage.claim_due(1, Utc::now()).await.unwrap();
    assert_eq!(claimed[0].id, crashed);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A fresh process opens the same database.
    let reopened = Arc::new(SqliteStorage::new(StorageConfig {
        database_path: harness.config.storage.database_path.clone(),
        ..StorageConfig::default()
    }));
    reopened.initialize().await.unwrap();
    let mut dispatcher_config = harness.config.dispatcher.clone();
    dispatcher_config.stale_claim_secs = 0;
    let dispatcher = DeliveryDispatcher::new(
        reopened.clone() as Arc<dyn JobQueue>,
        harness.registry.clone(),
        "default",
        &dispatcher_config,
    );

    assert_eq!(dispatcher.recover_stale_claims().await.unwrap(), 1);
    let report = dispatcher.tick().await;
    assert_eq!((report.claimed, report.sent), (1, 1));

    let crashed = reopened.get_job(crashed).await.unwrap().unwrap();
    assert_eq!(crashed.status, JobStatus::Failed);
    assert_eq!(crashed.error.as_deref(), Some("interrupted"));
    let pending = reopened.get_job(pending).await.unwrap().unwrap();
    assert_eq!(pending.status, JobStatus::Sent);

    let link = harness.transport.latest("default").await.unwrap();
    let sent = link.connection().sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "second");
}

#[tokio::test]
async fn paired_session_resumes_after_restart_without_pairing() {
    let harness = harness().await;
    harness.connect_session("tenant-1").await.unwrap();

    let mut stored = None;
    for _ in 0..100 {
        stored = harness.storage.restore_credentials("tenant-1").await.unwrap();
        if stored.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(stored.is_some(), "credentials never reached the durable store");

    // A second process: same store, fresh transport and registry.
    let transport = Arc::new(MockTransport::new());
    let backup = Arc::new(CredentialBackup::new(
        harness.storage.clone() as Arc<dyn CredentialStore>,
        RetryPolicy::from_credentials(&harness.config.credentials),
        None,
    ));
    let registry = SessionRegistry::new(transport.clone(), backup, &harness.config.session);

    assert_eq!(registry.restore_all().await, 1);
    let snapshot = registry
        .wait_for("tenant-1", Duration::from_secs(5), |s| s.is_connected())
        .await
        .unwrap();
    assert_eq!(snapshot.status, SessionStatus::Connected);
    assert!(snapshot.pairing_payload.is_none());

    let connects = transport.connects().await;
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].credentials, stored);

    registry.shutdown_all().await;
}
