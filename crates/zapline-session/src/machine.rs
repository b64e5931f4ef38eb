// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session state machine.
//!
//! Each session is one actor task that owns all of its mutable state:
//! the transport connection, the event stream, the backup timers and the
//! snapshot. Commands arrive over an mpsc channel and every state change is
//! published over a `watch` channel, so readers never lock the writer.
//! Timers are optional deadlines in the actor's `select!` loop; cancelling
//! a timer means clearing its deadline.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use zapline_config::model::SessionConfig;
use zapline_core::{
    CloseReason, CredentialBlob, SessionSnapshot, SessionStatus, TransportAdapter,
    TransportConnection, TransportEvent,
};

use crate::credentials::CredentialBackup;
use crate::reconnect::{ReconnectPolicy, ReconnectTrigger};

const COMMAND_BUFFER: usize = 16;

/// Timing knobs for a session actor, resolved from `[session]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    pub cleanup_reactivate_delay: Duration,
    pub backup_debounce: Duration,
    pub first_backup_delay: Duration,
    pub backup_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl SessionSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            cleanup_reactivate_delay: Duration::from_millis(config.cleanup_reactivate_delay_ms),
            backup_debounce: Duration::from_secs(config.backup_debounce_secs),
            first_backup_delay: Duration::from_secs(config.first_backup_delay_secs),
            backup_interval: Duration::from_secs(config.backup_interval_secs),
            reconnect: ReconnectPolicy::from_config(config),
        }
    }
}

/// Collaborators shared by every session actor.
#[derive(Clone)]
pub(crate) struct SessionDeps {
    pub transport: Arc<dyn TransportAdapter>,
    pub backup: Arc<CredentialBackup>,
    pub settings: Arc<SessionSettings>,
}

pub(crate) enum Command {
    /// Activate now if the session is still waiting for its start delay.
    Activate,
    Reconnect(oneshot::Sender<()>),
    Cleanup(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// What the actor publishes after every state change.
#[derive(Clone)]
pub(crate) struct SessionView {
    pub snapshot: SessionSnapshot,
    pub connection: Option<Arc<dyn TransportConnection>>,
}

/// Cloneable handle to a running session actor.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.view.borrow().snapshot.clone()
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Nudge a session that is waiting on its start delay. Never blocks.
    pub fn activate_now(&self) {
        let _ = self.commands.try_send(Command::Activate);
    }

    /// Send a command and wait for the actor to acknowledge it.
    ///
    /// Returns `false` if the actor has already stopped.
    pub async fn request(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(make(tx)).await.is_err() {
            return false;
        }
        rx.await.is_ok()
    }
}

/// Spawn the actor for `session_id`. It activates after `start_delay`.
pub(crate) fn spawn(session_id: &str, deps: SessionDeps, start_delay: Duration) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let mut snapshot = SessionSnapshot::new(session_id);
    if start_delay.is_zero() {
        snapshot.status = SessionStatus::Initializing;
    }
    let (view_tx, view_rx) = watch::channel(SessionView {
        snapshot: snapshot.clone(),
        connection: None,
    });

    let actor = SessionActor {
        id: session_id.to_string(),
        deps,
        commands: cmd_rx,
        view: view_tx,
        snapshot,
        connection: None,
        events: None,
        latest_blob: None,
        backup_pending: false,
        last_durable_save: None,
        activate_at: Some(Instant::now() + start_delay),
        cooling_down: false,
        backup_flush_at: None,
        first_backup_at: None,
        backup_tick_at: None,
    };
    tokio::spawn(actor.run());

    SessionHandle {
        commands: cmd_tx,
        view: view_rx,
    }
}

struct SessionActor {
    id: String,
    deps: SessionDeps,
    commands: mpsc::Receiver<Command>,
    view: watch::Sender<SessionView>,
    snapshot: SessionSnapshot,
    connection: Option<Arc<dyn TransportConnection>>,
    events: Option<mpsc::Receiver<TransportEvent>>,

    /// Most recent credential state seen from the transport or the store.
    latest_blob: Option<CredentialBlob>,
    /// `latest_blob` has not reached the durable store yet.
    backup_pending: bool,
    last_durable_save: Option<Instant>,

    activate_at: Option<Instant>,
    /// Set by `cleanup` until its reactivation delay has run out.
    cooling_down: bool,
    backup_flush_at: Option<Instant>,
    first_backup_at: Option<Instant>,
    backup_tick_at: Option<Instant>,
}

impl SessionActor {
    async fn run(mut self) {
        debug!(session_id = %self.id, "session actor started");
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown(ack)) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                event = next_event(&mut self.events) => {
                    let event = event.unwrap_or_else(|| {
                        TransportEvent::Closed(CloseReason::Other("event stream ended".into()))
                    });
                    self.handle_event(event).await;
                }
                _ = sleep_until_opt(self.activate_at) => self.activate().await,
                _ = sleep_until_opt(self.backup_flush_at) => {
                    self.backup_flush_at = None;
                    if self.backup_pending {
                        self.durable_save().await;
                    }
                }
                _ = sleep_until_opt(self.first_backup_at) => {
                    self.first_backup_at = None;
                    self.durable_save().await;
                }
                _ = sleep_until_opt(self.backup_tick_at) => {
                    self.backup_tick_at = Some(Instant::now() + self.deps.settings.backup_interval);
                    self.durable_save().await;
                }
            }
        }
        debug!(session_id = %self.id, "session actor stopped");
    }

    fn publish(&self) {
        self.view.send_replace(SessionView {
            snapshot: self.snapshot.clone(),
            connection: self.connection.clone(),
        });
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Activate => {
                if self.activate_at.is_some()
                    && !self.cooling_down
                    && self.snapshot.status == SessionStatus::Uninitialized
                {
                    self.activate().await;
                }
            }
            Command::Reconnect(ack) => {
                self.reconnect().await;
                let _ = ack.send(());
            }
            Command::Cleanup(ack) => {
                self.cleanup().await;
                let _ = ack.send(());
            }
            // Handled in the run loop so the actor can stop.
            Command::Shutdown(ack) => {
                let _ = ack.send(());
            }
        }
    }

    /// Restore credentials, then open a transport connection.
    async fn activate(&mut self) {
        self.activate_at = None;
        self.cooling_down = false;
        self.snapshot.status = SessionStatus::Initializing;
        self.snapshot.pairing_payload = None;
        self.snapshot.identity = None;
        self.publish();

        let credentials = self.deps.backup.restore(&self.id).await;
        if credentials.is_some() {
            self.latest_blob = credentials.clone();
        }
        info!(
            session_id = %self.id,
            restored = credentials.is_some(),
            "activating session"
        );

        let timeout = self.deps.settings.connect_timeout;
        let connect = self.deps.transport.connect(&self.id, credentials);
        match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(handle)) => {
                self.connection = Some(handle.connection);
                self.events = Some(handle.events);
                self.snapshot.last_error = None;
                self.publish();
            }
            Ok(Err(e)) => self.setup_failed(e.to_string()),
            Err(_) => self.setup_failed(format!(
                "transport connect timed out after {}s",
                timeout.as_secs()
            )),
        }
    }

    fn setup_failed(&mut self, error: String) {
        warn!(session_id = %self.id, error = %error, "session setup failed");
        self.connection = None;
        self.events = None;
        self.snapshot.status = SessionStatus::Error;
        self.snapshot.last_error = Some(error);
        self.schedule_reconnect(ReconnectTrigger::SetupFailed);
        self.publish();
    }

    fn schedule_reconnect(&mut self, trigger: ReconnectTrigger) {
        let attempt = self.snapshot.reconnect_attempts;
        match self.deps.settings.reconnect.delay_for(&trigger, attempt) {
            Some(delay) => {
                self.snapshot.reconnect_attempts = attempt.saturating_add(1);
                self.activate_at = Some(Instant::now() + delay);
                info!(
                    session_id = %self.id,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
            }
            None => info!(session_id = %self.id, "not reconnecting automatically"),
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PairingAvailable(payload) => {
                debug!(session_id = %self.id, "pairing payload available");
                self.snapshot.status = SessionStatus::QrPending;
                self.snapshot.pairing_payload = Some(payload);
            }
            TransportEvent::Connecting => {
                self.snapshot.status = SessionStatus::Connecting;
                self.snapshot.pairing_payload = None;
            }
            TransportEvent::Opened { identity } => {
                info!(session_id = %self.id, identity = %identity, "session connected");
                let now = Instant::now();
                self.snapshot.status = SessionStatus::Connected;
                self.snapshot.pairing_payload = None;
                self.snapshot.identity = Some(identity);
                self.snapshot.reconnect_attempts = 0;
                self.snapshot.last_error = None;
                self.first_backup_at = Some(now + self.deps.settings.first_backup_delay);
                self.backup_tick_at = Some(now + self.deps.settings.backup_interval);
            }
            TransportEvent::CredentialsChanged(blob) => {
                self.credentials_changed(blob).await;
            }
            TransportEvent::Closed(reason) => {
                self.closed(reason).await;
            }
        }
        self.publish();
    }

    /// Local write-through, then a debounced durable save with a trailing flush.
    async fn credentials_changed(&mut self, blob: CredentialBlob) {
        self.deps.backup.save_local(&self.id, &blob).await;
        self.latest_blob = Some(blob);
        self.backup_pending = true;

        let window = self.deps.settings.backup_debounce;
        match self.last_durable_save {
            Some(last) if last.elapsed() < window => {
                if self.backup_flush_at.is_none() {
                    self.backup_flush_at = Some(last + window);
                }
            }
            _ => self.durable_save().await,
        }
    }

    async fn durable_save(&mut self) {
        let Some(blob) = self.latest_blob.clone() else {
            return;
        };
        self.last_durable_save = Some(Instant::now());
        if self.deps.backup.save(&self.id, &blob).await {
            self.backup_pending = false;
            self.snapshot.last_backup_at = Some(Utc::now());
            self.publish();
        }
    }

    async fn closed(&mut self, reason: CloseReason) {
        info!(session_id = %self.id, reason = %reason, "session closed");
        self.end_connection().await;
        self.first_backup_at = None;
        self.backup_tick_at = None;
        self.snapshot.status = SessionStatus::Disconnected;
        self.snapshot.pairing_payload = None;
        self.snapshot.identity = None;
        self.snapshot.last_disconnect = Some(reason.clone());

        if reason.is_permanent() {
            self.drop_credentials().await;
        }
        self.schedule_reconnect(ReconnectTrigger::Closed(reason));
    }

    async fn drop_credentials(&mut self) {
        self.latest_blob = None;
        self.backup_pending = false;
        self.backup_flush_at = None;
        self.deps.backup.delete(&self.id).await;
    }

    async fn end_connection(&mut self) {
        self.events = None;
        if let Some(conn) = self.connection.take()
            && let Err(e) = conn.end().await
        {
            debug!(session_id = %self.id, error = %e, "transport end failed");
        }
    }

    fn clear_timers(&mut self) {
        self.activate_at = None;
        self.backup_flush_at = None;
        self.first_backup_at = None;
        self.backup_tick_at = None;
    }

    async fn flush_pending_backup(&mut self) {
        if self.backup_pending {
            self.durable_save().await;
        }
    }

    async fn reconnect(&mut self) {
        info!(session_id = %self.id, "reconnect requested");
        self.flush_pending_backup().await;
        self.end_connection().await;
        self.clear_timers();
        self.snapshot.reconnect_attempts = 0;
        self.activate().await;
    }

    async fn cleanup(&mut self) {
        info!(session_id = %self.id, "cleanup requested");
        if let Some(conn) = &self.connection
            && let Err(e) = conn.logout().await
        {
            debug!(session_id = %self.id, error = %e, "transport logout failed");
        }
        self.end_connection().await;
        self.clear_timers();
        self.drop_credentials().await;
        self.last_durable_save = None;
        self.snapshot = SessionSnapshot::new(self.id.clone());
        self.activate_at = Some(Instant::now() + self.deps.settings.cleanup_reactivate_delay);
        self.cooling_down = true;
        self.publish();
    }

    async fn shutdown(&mut self) {
        self.flush_pending_backup().await;
        self.end_connection().await;
        self.clear_timers();
        self.snapshot.status = SessionStatus::Disconnected;
        self.snapshot.pairing_payload = None;
        self.snapshot.identity = None;
        self.publish();
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
