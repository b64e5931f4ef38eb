// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle tests against a scripted transport, on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use zapline_config::model::{CredentialsConfig, SessionConfig};
use zapline_core::{CloseReason, CredentialBlob, SessionSnapshot, SessionStatus, TransportEvent};
use zapline_resilience::RetryPolicy;
use zapline_session::{CredentialBackup, SessionRegistry};
use zapline_test_utils::{MemoryCredentialStore, MockTransport};

const LONG: Duration = Duration::from_secs(600);

struct Fixture {
    registry: SessionRegistry,
    transport: Arc<MockTransport>,
    store: Arc<MemoryCredentialStore>,
}

fn fixture(transport: MockTransport, store: MemoryCredentialStore) -> Fixture {
    fixture_with(transport, store, SessionConfig::default())
}

fn fixture_with(
    transport: MockTransport,
    store: MemoryCredentialStore,
    config: SessionConfig,
) -> Fixture {
    let transport = Arc::new(transport);
    let store = Arc::new(store);
    let backup = Arc::new(CredentialBackup::new(
        store.clone(),
        RetryPolicy::from_credentials(&CredentialsConfig::default()),
        None,
    ));
    Fixture {
        registry: SessionRegistry::new(transport.clone(), backup, &config),
        transport,
        store,
    }
}

fn paired(id: &str) -> MemoryCredentialStore {
    MemoryCredentialStore::with_sessions([(id, CredentialBlob(format!("keys-{id}").into_bytes()))])
}

async fn wait_status(f: &Fixture, id: &str, status: SessionStatus) -> SessionSnapshot {
    let snap = f
        .registry
        .wait_for(id, LONG, |s| s.status == status)
        .await
        .expect("session exists");
    assert_eq!(snap.status, status, "session {id} never reached {status}");
    snap
}

async fn emit(f: &Fixture, id: &str, event: TransportEvent) {
    f.transport
        .latest(id)
        .await
        .expect("session has a connection")
        .emit(event)
        .await;
}

#[tokio::test(start_paused = true)]
async fn restored_session_connects_without_pairing() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");

    let snap = wait_status(&f, "s1", SessionStatus::Connected).await;
    assert_eq!(snap.identity.as_deref(), Some("s1@mock"));
    assert!(snap.pairing_payload.is_none());

    let connects = f.transport.connects().await;
    assert_eq!(connects.len(), 1);
    assert_eq!(
        connects[0].credentials,
        Some(CredentialBlob(b"keys-s1".to_vec()))
    );
}

#[tokio::test(start_paused = true)]
async fn get_or_create_is_single_flight() {
    let f = fixture(MockTransport::new(), MemoryCredentialStore::new());
    for _ in 0..5 {
        f.registry.get_or_create("s1");
    }
    wait_status(&f, "s1", SessionStatus::QrPending).await;
    assert_eq!(f.registry.len(), 1);
    assert_eq!(f.transport.connect_count("s1").await, 1);
}

#[tokio::test(start_paused = true)]
async fn pairing_flow_reaches_connected_and_backs_up() {
    let f = fixture(MockTransport::new(), MemoryCredentialStore::new());
    f.registry.get_or_create("s1");

    let snap = wait_status(&f, "s1", SessionStatus::QrPending).await;
    assert_eq!(snap.pairing_payload.as_deref(), Some("qr-s1-1"));

    let link = f.transport.latest("s1").await.unwrap();
    link.emit(TransportEvent::CredentialsChanged(CredentialBlob(b"fresh".to_vec())))
        .await;
    link.emit(TransportEvent::Connecting).await;
    let snap = wait_status(&f, "s1", SessionStatus::Connecting).await;
    assert!(snap.pairing_payload.is_none());

    link.emit(TransportEvent::Opened {
        identity: "5511999999999@mock".into(),
    })
    .await;
    let snap = wait_status(&f, "s1", SessionStatus::Connected).await;
    assert_eq!(snap.identity.as_deref(), Some("5511999999999@mock"));
    assert!(snap.last_backup_at.is_some());
    assert_eq!(
        f.store.stored("s1").await,
        Some(CredentialBlob(b"fresh".to_vec()))
    );
}

#[tokio::test(start_paused = true)]
async fn logged_out_session_never_reinitializes_on_its_own() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::Connected).await;

    emit(&f, "s1", TransportEvent::Closed(CloseReason::LoggedOut)).await;
    let snap = wait_status(&f, "s1", SessionStatus::Disconnected).await;
    assert_eq!(snap.last_disconnect, Some(CloseReason::LoggedOut));

    tokio::time::sleep(Duration::from_secs(3600)).await;
    let snap = f.registry.get("s1").unwrap();
    assert_eq!(snap.status, SessionStatus::Disconnected);
    assert_eq!(f.transport.connect_count("s1").await, 1);
    assert_eq!(f.store.stored("s1").await, None);
}

#[tokio::test(start_paused = true)]
async fn ordinary_close_reconnects_after_base_delay() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::Connected).await;
    let first = f.transport.latest("s1").await.unwrap();

    emit(
        &f,
        "s1",
        TransportEvent::Closed(CloseReason::Other("stream errored".into())),
    )
    .await;
    let snap = wait_status(&f, "s1", SessionStatus::Disconnected).await;
    assert_eq!(snap.reconnect_attempts, 1);
    assert!(first.connection().is_ended());
    let closed_at = Instant::now();

    let snap = wait_status(&f, "s1", SessionStatus::Connected).await;
    let waited = closed_at.elapsed();
    assert!(waited >= Duration::from_secs(5), "reconnected after {waited:?}");
    assert!(waited < Duration::from_secs(6), "reconnected after {waited:?}");
    assert_eq!(snap.reconnect_attempts, 0);
    assert_eq!(f.transport.connect_count("s1").await, 2);
}

#[tokio::test(start_paused = true)]
async fn conflict_waits_for_conflict_delay() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::Connected).await;

    emit(
        &f,
        "s1",
        TransportEvent::Closed(CloseReason::Conflict("replaced".into())),
    )
    .await;
    wait_status(&f, "s1", SessionStatus::Disconnected).await;
    let closed_at = Instant::now();

    wait_status(&f, "s1", SessionStatus::Connected).await;
    let waited = closed_at.elapsed();
    assert!(waited >= Duration::from_secs(30), "reconnected after {waited:?}");
    assert!(waited < Duration::from_secs(31), "reconnected after {waited:?}");
    assert!(f.store.stored("s1").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn store_outage_still_produces_pairing_payload() {
    let store = paired("s1");
    store.set_unavailable(true);
    let f = fixture(MockTransport::new(), store);
    f.registry.get_or_create("s1");

    let snap = wait_status(&f, "s1", SessionStatus::QrPending).await;
    assert!(snap.pairing_payload.is_some());
    assert_eq!(f.transport.connects().await[0].credentials, None);
}

#[tokio::test(start_paused = true)]
async fn connect_failures_back_off_then_recover() {
    let transport = MockTransport::new();
    transport.fail_next_connects(2).await;
    let f = fixture(transport, MemoryCredentialStore::new());
    let started = Instant::now();
    f.registry.get_or_create("s1");

    let snap = wait_status(&f, "s1", SessionStatus::Error).await;
    assert!(snap.last_error.unwrap().contains("mock connect refused"));

    let snap = wait_status(&f, "s1", SessionStatus::QrPending).await;
    assert!(snap.last_error.is_none());
    assert_eq!(f.transport.connect_count("s1").await, 3);
    // 5s after the first failure, 10s after the second.
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(15), "recovered after {waited:?}");
    assert!(waited < Duration::from_secs(16), "recovered after {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_is_a_setup_failure() {
    let transport = MockTransport::new();
    transport.set_hang_connects(true).await;
    let f = fixture(transport, MemoryCredentialStore::new());
    f.registry.get_or_create("s1");

    let snap = wait_status(&f, "s1", SessionStatus::Error).await;
    assert!(snap.last_error.unwrap().contains("timed out"));
    assert_eq!(snap.reconnect_attempts, 1);

    f.transport.set_hang_connects(false).await;
    wait_status(&f, "s1", SessionStatus::QrPending).await;
    assert_eq!(f.transport.connect_count("s1").await, 2);
}

#[tokio::test(start_paused = true)]
async fn credential_updates_are_debounced_with_trailing_flush() {
    let f = fixture(MockTransport::new(), MemoryCredentialStore::new());
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::QrPending).await;

    emit(
        &f,
        "s1",
        TransportEvent::CredentialsChanged(CredentialBlob(b"v1".to_vec())),
    )
    .await;
    f.registry
        .wait_for("s1", LONG, |s| s.last_backup_at.is_some())
        .await;
    assert_eq!(f.store.save_count(), 1);

    emit(
        &f,
        "s1",
        TransportEvent::CredentialsChanged(CredentialBlob(b"v2".to_vec())),
    )
    .await;
    emit(
        &f,
        "s1",
        TransportEvent::CredentialsChanged(CredentialBlob(b"v3".to_vec())),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(f.store.save_count(), 1);
    assert_eq!(f.store.stored("s1").await, Some(CredentialBlob(b"v1".to_vec())));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(f.store.save_count(), 2);
    assert_eq!(f.store.stored("s1").await, Some(CredentialBlob(b"v3".to_vec())));
}

#[tokio::test(start_paused = true)]
async fn connected_session_runs_forced_and_periodic_backups() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::Connected).await;
    assert_eq!(f.store.save_count(), 0);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(f.store.save_count(), 1);
    assert!(f.registry.get("s1").unwrap().last_backup_at.is_some());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(f.store.save_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn backups_stop_when_session_leaves_connected() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::Connected).await;

    emit(&f, "s1", TransportEvent::Closed(CloseReason::LoggedOut)).await;
    wait_status(&f, "s1", SessionStatus::Disconnected).await;

    tokio::time::sleep(Duration::from_secs(900)).await;
    assert_eq!(f.store.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_command_keeps_credentials() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::Connected).await;
    let old = f.transport.latest("s1").await.unwrap();

    f.registry.reconnect("s1").await;
    wait_status(&f, "s1", SessionStatus::Connected).await;

    assert!(old.connection().is_ended());
    assert!(!old.connection().is_logged_out());
    let connects = f.transport.connects().await;
    assert_eq!(connects.len(), 2);
    assert!(connects[1].credentials.is_some());
}

#[tokio::test(start_paused = true)]
async fn reconnect_command_revives_logged_out_session() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::Connected).await;
    emit(&f, "s1", TransportEvent::Closed(CloseReason::LoggedOut)).await;
    wait_status(&f, "s1", SessionStatus::Disconnected).await;

    f.registry.reconnect("s1").await;
    let snap = wait_status(&f, "s1", SessionStatus::QrPending).await;
    assert!(snap.pairing_payload.is_some());
}

#[tokio::test(start_paused = true)]
async fn cleanup_logs_out_and_yields_fresh_pairing() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::Connected).await;
    let old = f.transport.latest("s1").await.unwrap();

    let snap = f.registry.cleanup("s1").await;
    assert_eq!(snap.status, SessionStatus::Uninitialized);
    assert!(snap.identity.is_none());
    assert!(old.connection().is_logged_out());
    assert!(old.connection().is_ended());
    assert_eq!(f.store.stored("s1").await, None);
    assert!(f.store.delete_count() >= 1);

    let snap = wait_status(&f, "s1", SessionStatus::QrPending).await;
    assert!(snap.pairing_payload.is_some());
    assert_eq!(f.transport.connects().await[1].credentials, None);
}

#[tokio::test(start_paused = true)]
async fn polling_after_cleanup_waits_out_the_reactivate_delay() {
    let f = fixture(MockTransport::new(), paired("s1"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::Connected).await;
    f.registry.cleanup("s1").await;

    for _ in 0..3 {
        let snap = f.registry.get_or_create("s1");
        assert_eq!(snap.status, SessionStatus::Uninitialized);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert_eq!(f.transport.connect_count("s1").await, 1);
    assert_eq!(f.registry.get("s1").unwrap().status, SessionStatus::Uninitialized);

    let started = Instant::now();
    wait_status(&f, "s1", SessionStatus::QrPending).await;
    assert!(started.elapsed() <= Duration::from_millis(600));
    assert_eq!(f.transport.connect_count("s1").await, 2);
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_actor_and_forgets_session() {
    let f = fixture(MockTransport::new(), MemoryCredentialStore::new());
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::QrPending).await;
    let link = f.transport.latest("s1").await.unwrap();

    f.registry.teardown("s1").await.unwrap();
    assert!(f.registry.get("s1").is_none());
    assert!(link.is_closed());
    assert!(link.connection().is_ended());

    let err = f.registry.teardown("s1").await.unwrap_err();
    assert!(matches!(err, zapline_core::ZaplineError::SessionNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn send_text_requires_a_connected_session() {
    let f = fixture(MockTransport::new(), paired("s2"));

    let err = f.registry.send_text("ghost", "5511999999999", "hi").await.unwrap_err();
    assert!(err.is_not_connected());

    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::QrPending).await;
    let err = f.registry.send_text("s1", "5511999999999", "hi").await.unwrap_err();
    assert!(err.is_not_connected());

    f.registry.get_or_create("s2");
    wait_status(&f, "s2", SessionStatus::Connected).await;
    let id = f.registry.send_text("s2", "5511999999999", "hi").await.unwrap();
    assert_eq!(id.0, "mock-s2-1");
    let sent = f.transport.latest("s2").await.unwrap().connection().sent_messages().await;
    assert_eq!(sent, vec![("5511999999999".to_string(), "hi".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn pairing_code_needs_an_unpaired_connection() {
    let f = fixture(MockTransport::new(), paired("s2"));
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::QrPending).await;
    assert_eq!(
        f.registry.request_pairing_code("s1", "+55 11 99999-1234").await.unwrap(),
        "MOCK-1234"
    );

    f.registry.get_or_create("s2");
    wait_status(&f, "s2", SessionStatus::Connected).await;
    assert!(f.registry.request_pairing_code("s2", "5511999991234").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn restore_all_staggers_stored_sessions() {
    let store = MemoryCredentialStore::with_sessions([
        ("a", CredentialBlob(b"a".to_vec())),
        ("b", CredentialBlob(b"b".to_vec())),
        ("c", CredentialBlob(b"c".to_vec())),
    ]);
    let f = fixture(MockTransport::new(), store);
    let started = Instant::now();

    assert_eq!(f.registry.restore_all().await, 3);
    assert_eq!(f.registry.get("a").unwrap().status, SessionStatus::Initializing);
    assert_eq!(f.registry.get("c").unwrap().status, SessionStatus::Uninitialized);

    wait_status(&f, "c", SessionStatus::Connected).await;
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(4_000), "c restored after {waited:?}");
    assert!(waited < Duration::from_millis(5_000), "c restored after {waited:?}");
    let ids: Vec<String> = f.registry.list().into_iter().map(|s| s.session_id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    // Live sessions are not restored twice.
    assert_eq!(f.registry.restore_all().await, 0);
}

#[tokio::test(start_paused = true)]
async fn restore_all_with_store_down_starts_nothing() {
    let store = paired("s1");
    store.set_unavailable(true);
    let f = fixture(MockTransport::new(), store);
    assert_eq!(f.registry.restore_all().await, 0);
    assert!(f.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_all_flushes_pending_backup() {
    let config = SessionConfig {
        backup_debounce_secs: 3600,
        ..SessionConfig::default()
    };
    let f = fixture_with(MockTransport::new(), MemoryCredentialStore::new(), config);
    f.registry.get_or_create("s1");
    wait_status(&f, "s1", SessionStatus::QrPending).await;

    emit(&f, "s1", TransportEvent::CredentialsChanged(CredentialBlob(b"v1".to_vec()))).await;
    f.registry
        .wait_for("s1", LONG, |s| s.last_backup_at.is_some())
        .await;
    emit(&f, "s1", TransportEvent::CredentialsChanged(CredentialBlob(b"v2".to_vec()))).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    f.registry.shutdown_all().await;
    assert!(f.registry.is_empty());
    assert_eq!(f.store.stored("s1").await, Some(CredentialBlob(b"v2".to_vec())));
}
