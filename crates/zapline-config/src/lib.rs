// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Zapline messaging gateway.
//!
//! Settings come from compiled defaults, up to three TOML files and
//! `ZAPLINE_*` environment variables (see [`loader`]). Unknown keys are
//! rejected at deserialization time, then [`validation`] checks values that
//! parse but make no sense together. Either failure comes back as a list of
//! [`ConfigError`]s for [`render_errors`].
//!
//! ```no_run
//! match zapline_config::load_and_validate() {
//!     Ok(config) => println!("gateway on {}:{}", config.gateway.host, config.gateway.port),
//!     Err(errors) => zapline_config::render_errors(&errors),
//! }
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::{Path, PathBuf};

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{BackoffStrategy, ZaplineConfig};

/// Load from the standard file locations and the environment, then validate.
pub fn load_and_validate() -> Result<ZaplineConfig, Vec<ConfigError>> {
    checked(loader::load_config(), || {
        loader::config_files()
            .iter()
            .filter_map(|file| read_source(&resolve(file)))
            .collect()
    })
}

/// Load one explicit file plus the environment, then validate.
pub fn load_and_validate_path(path: &Path) -> Result<ZaplineConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        read_source(&resolve(path)).into_iter().collect()
    })
}

/// Load a TOML string (no files, no environment), then validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<ZaplineConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        vec![(diagnostic::INLINE_SOURCE.to_string(), toml_content.to_string())]
    })
}

/// Validate a loaded config, or turn the load error into diagnostics.
///
/// Source texts are only read when there is an error to point into.
fn checked(
    loaded: Result<ZaplineConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<ZaplineConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => validation::validate_config(&config).map(|()| config),
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Where figment finds `path`: absolute paths as given, relative ones in
/// the working directory or the nearest parent that has them.
fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .ok()
        .and_then(|cwd| {
            cwd.ancestors()
                .map(|dir| dir.join(path))
                .find(|candidate| candidate.is_file())
        })
        .unwrap_or_else(|| path.to_path_buf())
}

fn read_source(path: &Path) -> Option<(String, String)> {
    let text = std::fs::read_to_string(path).ok()?;
    Some((path.display().to_string(), text))
}
