// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Zapline messaging gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Zapline configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZaplineConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP control surface.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// SQLite database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session lifecycle timing.
    #[serde(default)]
    pub session: SessionConfig,

    /// Retry policy for the durable credential store.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Scheduled delivery dispatcher.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Transport bridge sidecar.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name, used in logs and the health response.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "zapline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP control surface configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Serve the HTTP control surface.
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token required on `/v1` routes. `None` rejects every
    /// authenticated request.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Country calling code prepended to destinations that lack it.
    #[serde(default)]
    pub default_country_code: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
            default_country_code: None,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[redacted]"))
            .field("default_country_code", &self.default_country_code)
            .finish()
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("zapline").join("zapline.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("zapline.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Session lifecycle configuration.
///
/// All delays are applied by the per-session state machine. Durations are
/// stored as plain integers so they can be overridden from env vars.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Session used when a caller or a job does not name one.
    #[serde(default = "default_session_id")]
    pub default_session_id: String,

    /// Directory holding the per-session local credential cache.
    #[serde(default = "default_auth_dir")]
    pub auth_dir: String,

    /// Reactivate every session with durable credentials at startup.
    #[serde(default = "default_auto_restore")]
    pub auto_restore: bool,

    /// Delay between consecutive session restores at startup.
    #[serde(default = "default_restore_stagger_ms")]
    pub restore_stagger_ms: u64,

    /// Upper bound on a single transport connect attempt.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Base reconnect delay after an ordinary close.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Cap on the exponential reconnect delay.
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Reconnect delay after another client took over the session.
    #[serde(default = "default_conflict_reconnect_delay_ms")]
    pub conflict_reconnect_delay_ms: u64,

    /// Pause between a cleanup and the fresh activation that follows it.
    #[serde(default = "default_cleanup_reactivate_delay_ms")]
    pub cleanup_reactivate_delay_ms: u64,

    /// Minimum spacing between durable credential backups.
    #[serde(default = "default_backup_debounce_secs")]
    pub backup_debounce_secs: u64,

    /// Forced backup shortly after a connection opens.
    #[serde(default = "default_first_backup_delay_secs")]
    pub first_backup_delay_secs: u64,

    /// Periodic backup while connected.
    #[serde(default = "default_backup_interval_secs")]
    pub backup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_session_id: default_session_id(),
            auth_dir: default_auth_dir(),
            auto_restore: default_auto_restore(),
            restore_stagger_ms: default_restore_stagger_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            conflict_reconnect_delay_ms: default_conflict_reconnect_delay_ms(),
            cleanup_reactivate_delay_ms: default_cleanup_reactivate_delay_ms(),
            backup_debounce_secs: default_backup_debounce_secs(),
            first_backup_delay_secs: default_first_backup_delay_secs(),
            backup_interval_secs: default_backup_interval_secs(),
        }
    }
}

fn default_session_id() -> String {
    "default".to_string()
}

fn default_auth_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("zapline").join("auth"))
        .unwrap_or_else(|| std::path::PathBuf::from("auth"))
        .to_string_lossy()
        .into_owned()
}

fn default_auto_restore() -> bool {
    true
}

fn default_restore_stagger_ms() -> u64 {
    2_000
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    60_000
}

fn default_conflict_reconnect_delay_ms() -> u64 {
    30_000
}

fn default_cleanup_reactivate_delay_ms() -> u64 {
    2_000
}

fn default_backup_debounce_secs() -> u64 {
    30
}

fn default_first_backup_delay_secs() -> u64 {
    10
}

fn default_backup_interval_secs() -> u64 {
    300
}

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base * attempt`.
    Linear,
    /// `base * 2^(attempt - 1)`.
    Exponential,
    /// `base` every time.
    Fixed,
}

/// Retry policy for durable credential store operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Total attempts per save or restore (including the first).
    #[serde(default = "default_credential_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts.
    #[serde(default = "default_credential_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on any single delay.
    #[serde(default = "default_credential_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_credential_backoff")]
    pub backoff: BackoffStrategy,

    /// Randomize each delay to 50-100% of its computed value.
    #[serde(default)]
    pub jitter: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_credential_attempts(),
            base_delay_ms: default_credential_base_delay_ms(),
            max_delay_ms: default_credential_max_delay_ms(),
            backoff: default_credential_backoff(),
            jitter: false,
        }
    }
}

fn default_credential_attempts() -> u32 {
    3
}

fn default_credential_base_delay_ms() -> u64 {
    1_000
}

fn default_credential_max_delay_ms() -> u64 {
    10_000
}

fn default_credential_backoff() -> BackoffStrategy {
    BackoffStrategy::Linear
}

/// Scheduled delivery dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Run the dispatcher loop.
    #[serde(default = "default_dispatcher_enabled")]
    pub enabled: bool,

    /// Seconds between ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Maximum jobs claimed per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Jobs left in `processing` longer than this at startup are failed.
    #[serde(default = "default_stale_claim_secs")]
    pub stale_claim_secs: u64,

    /// Attempts when recording a job outcome.
    #[serde(default = "default_store_max_attempts")]
    pub store_max_attempts: u32,

    /// Base delay between outcome-recording attempts.
    #[serde(default = "default_store_base_delay_ms")]
    pub store_base_delay_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_dispatcher_enabled(),
            tick_interval_secs: default_tick_interval_secs(),
            batch_size: default_batch_size(),
            stale_claim_secs: default_stale_claim_secs(),
            store_max_attempts: default_store_max_attempts(),
            store_base_delay_ms: default_store_base_delay_ms(),
        }
    }
}

fn default_dispatcher_enabled() -> bool {
    true
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_stale_claim_secs() -> u64 {
    300
}

fn default_store_max_attempts() -> u32 {
    3
}

fn default_store_base_delay_ms() -> u64 {
    500
}

/// Transport bridge sidecar configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Base URL of the bridge's HTTP API.
    #[serde(default = "default_bridge_url")]
    pub base_url: String,

    /// Timeout for a single bridge HTTP request.
    #[serde(default = "default_bridge_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Capacity of each session's event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Close reasons that mean another client took over the session.
    #[serde(default = "default_conflict_markers")]
    pub conflict_markers: Vec<String>,

    /// Close reasons that mean the session was logged out.
    #[serde(default = "default_logout_markers")]
    pub logout_markers: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            request_timeout_secs: default_bridge_timeout_secs(),
            event_buffer: default_event_buffer(),
            conflict_markers: default_conflict_markers(),
            logout_markers: default_logout_markers(),
        }
    }
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:3001".to_string()
}

fn default_bridge_timeout_secs() -> u64 {
    30
}

fn default_event_buffer() -> usize {
    64
}

fn default_conflict_markers() -> Vec<String> {
    vec![
        "conflict".to_string(),
        "replaced".to_string(),
        "device_removed".to_string(),
    ]
}

fn default_logout_markers() -> Vec<String> {
    vec!["logged out".to_string(), "logged_out".to_string()]
}
