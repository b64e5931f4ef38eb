// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./zapline.toml` > `~/.config/zapline/zapline.toml` > `/etc/zapline/zapline.toml`
//! with environment variable overrides via `ZAPLINE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ZaplineConfig;

/// Config file sections, in the order the env provider tries them.
const SECTIONS: [&str; 7] = [
    "service",
    "gateway",
    "storage",
    "session",
    "credentials",
    "dispatcher",
    "bridge",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/zapline/zapline.toml` (system-wide)
/// 3. `~/.config/zapline/zapline.toml` (user XDG config)
/// 4. `./zapline.toml` (local directory)
/// 5. `ZAPLINE_*` environment variables
pub fn load_config() -> Result<ZaplineConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
pub fn load_config_from_str(toml_content: &str) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Config files in merge order: system, user, working directory.
///
/// Missing files are skipped at load time.
pub fn config_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc/zapline/zapline.toml")];
    if let Some(dir) = dirs::config_dir() {
        files.push(dir.join("zapline").join("zapline.toml"));
    }
    files.push(PathBuf::from("zapline.toml"));
    files
}

/// Build the layered Figment before extraction.
pub fn build_figment() -> Figment {
    let figment = Figment::new().merge(Serialized::defaults(ZaplineConfig::default()));
    config_files()
        .into_iter()
        .fold(figment, |figment, file| figment.merge(Toml::file(file)))
        .merge(env_provider())
}

/// Map `ZAPLINE_<SECTION>_<KEY>` onto `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")`: keys such as
/// `bearer_token` contain underscores, so `ZAPLINE_GATEWAY_BEARER_TOKEN`
/// must become `gateway.bearer_token`, not `gateway.bearer.token`.
fn env_provider() -> Env {
    Env::prefixed("ZAPLINE_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
