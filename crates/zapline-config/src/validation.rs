// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, non-empty paths, and ordered delay bounds.

use crate::diagnostic::ConfigError;
use crate::model::ZaplineConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ZaplineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let host = config.gateway.host.trim();
    if host.is_empty() {
        fail("gateway.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if let Some(token) = &config.gateway.bearer_token
        && token.trim().is_empty()
    {
        fail("gateway.bearer_token must not be empty when set".to_string());
    }

    if let Some(code) = &config.gateway.default_country_code
        && (code.is_empty() || code.len() > 3 || !code.chars().all(|c| c.is_ascii_digit()))
    {
        fail(format!(
            "gateway.default_country_code must be 1-3 digits, got `{code}`"
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.session.default_session_id.trim().is_empty() {
        fail("session.default_session_id must not be empty".to_string());
    }

    if config.session.auth_dir.trim().is_empty() {
        fail("session.auth_dir must not be empty".to_string());
    }

    if config.session.connect_timeout_secs == 0 {
        fail("session.connect_timeout_secs must be at least 1".to_string());
    }

    if config.session.reconnect_delay_ms > config.session.max_reconnect_delay_ms {
        fail(format!(
            "session.reconnect_delay_ms ({}) must not exceed session.max_reconnect_delay_ms ({})",
            config.session.reconnect_delay_ms, config.session.max_reconnect_delay_ms
        ));
    }

    if config.session.backup_interval_secs == 0 {
        fail("session.backup_interval_secs must be at least 1".to_string());
    }

    if config.credentials.max_attempts == 0 {
        fail("credentials.max_attempts must be at least 1".to_string());
    }

    if config.credentials.base_delay_ms > config.credentials.max_delay_ms {
        fail(format!(
            "credentials.base_delay_ms ({}) must not exceed credentials.max_delay_ms ({})",
            config.credentials.base_delay_ms, config.credentials.max_delay_ms
        ));
    }

    if config.dispatcher.tick_interval_secs == 0 {
        fail("dispatcher.tick_interval_secs must be at least 1".to_string());
    }

    if config.dispatcher.batch_size == 0 {
        fail("dispatcher.batch_size must be at least 1".to_string());
    }

    if config.dispatcher.store_max_attempts == 0 {
        fail("dispatcher.store_max_attempts must be at least 1".to_string());
    }

    let url = config.bridge.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        fail(format!(
            "bridge.base_url `{url}` must start with http:// or https://"
        ));
    }

    if config.bridge.event_buffer == 0 {
        fail("bridge.event_buffer must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
