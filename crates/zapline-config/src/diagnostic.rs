// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config diagnostics: figment errors rendered as miette reports.
//!
//! Every zapline setting sits exactly one level deep (`[section]` then
//! `key = value`), so a figment error path is either empty (the offending
//! name is a section) or starts with the section. That shape drives both
//! the suggestions and the source span lookup below.

#![allow(unused_assignments)] // miette's Diagnostic derive trips this lint

use std::collections::BTreeMap;
use std::path::Path;

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::model::ZaplineConfig;

/// Name under which an in-memory TOML string is registered as a source.
pub const INLINE_SOURCE: &str = "<inline>";

/// Jaro-Winkler score a candidate must beat to be suggested.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A configuration problem, ready for [`render_errors`].
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown section `[{section}]`")]
    #[diagnostic(code(zapline::config::unknown_section), help("{help}"))]
    UnknownSection {
        section: String,
        suggestion: Option<String>,
        help: String,
        #[label("not a zapline section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("unknown key `{key}` in `[{section}]`")]
    #[diagnostic(code(zapline::config::unknown_key), help("{help}"))]
    UnknownKey {
        section: String,
        key: String,
        /// Closest key in the same section.
        suggestion: Option<String>,
        /// Another section that has a key with exactly this name.
        belongs_in: Option<String>,
        help: String,
        #[label("not accepted here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid value for `{key}`: {found}")]
    #[diagnostic(code(zapline::config::invalid_value), help("expected {expected}"))]
    InvalidValue {
        /// Dotted path, e.g. `dispatcher.batch_size`.
        key: String,
        found: String,
        expected: String,
        #[label("this value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("{message}")]
    #[diagnostic(code(zapline::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(zapline::config::other))]
    Other(String),
}

/// Convert every error carried by `err`.
///
/// `sources` pairs a display name (a file path or [`INLINE_SOURCE`]) with
/// that source's TOML text; they are only used to attach spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    let layout = SectionLayout::from_defaults();
    err.into_iter()
        .map(|error| convert(&error, &layout, sources))
        .collect()
}

fn convert(error: &figment::Error, layout: &SectionLayout, sources: &[(String, String)]) -> ConfigError {
    let source = source_for(error, sources);
    let section = error.path.first().map(String::as_str);

    match (&error.kind, section) {
        (Kind::UnknownField(name, _), None) => {
            let sections = layout.sections();
            let suggestion = closest(name, &sections);
            let help = match &suggestion {
                Some(s) => format!("did you mean `[{s}]`?"),
                None => format!("sections are: {}", sections.join(", ")),
            };
            let (span, src) = attach(source, |text| locate_section(text, name));
            ConfigError::UnknownSection {
                section: name.clone(),
                suggestion,
                help,
                span,
                src,
            }
        }
        (Kind::UnknownField(key, expected), Some(section)) => {
            let suggestion = closest(key, expected);
            let belongs_in = layout.section_owning(key).filter(|s| *s != section);
            let help = match (&suggestion, &belongs_in) {
                (_, Some(other)) => format!("`{key}` is a `[{other}]` setting"),
                (Some(s), None) => format!("did you mean `{s}`?"),
                (None, None) => format!("`[{section}]` accepts: {}", expected.join(", ")),
            };
            let (span, src) = attach(source, |text| locate_key(text, section, key));
            ConfigError::UnknownKey {
                section: section.to_string(),
                key: key.clone(),
                suggestion,
                belongs_in: belongs_in.map(str::to_string),
                help,
                span,
                src,
            }
        }
        (Kind::InvalidType(found, expected), _) => {
            invalid_value(error, source, found.to_string(), expected.clone())
        }
        (Kind::InvalidValue(found, expected), _) => {
            invalid_value(error, source, found.to_string(), expected.clone())
        }
        (Kind::UnknownVariant(found, accepted), _) => invalid_value(
            error,
            source,
            format!("`{found}`"),
            match closest(found, accepted) {
                Some(s) => format!("`{s}` (accepted: {})", accepted.join(", ")),
                None => format!("one of: {}", accepted.join(", ")),
            },
        ),
        _ => ConfigError::Other(error.to_string()),
    }
}

fn invalid_value(
    error: &figment::Error,
    source: Option<(&str, &str)>,
    found: String,
    expected: String,
) -> ConfigError {
    let (span, src) = match error.path.as_slice() {
        [section, key] => attach(source, |text| locate_key(text, section, key)),
        _ => (None, None),
    };
    ConfigError::InvalidValue {
        key: error.path.join("."),
        found,
        expected,
        span,
        src,
    }
}

/// The TOML text the error came from, if we were given it.
fn source_for<'a>(error: &figment::Error, sources: &'a [(String, String)]) -> Option<(&'a str, &'a str)> {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| s.file_path());
    let found = match file {
        Some(path) => sources.iter().find(|(name, _)| Path::new(name) == path),
        None => sources.iter().find(|(name, _)| name == INLINE_SOURCE),
    };
    found.map(|(name, text)| (name.as_str(), text.as_str()))
}

fn attach(
    source: Option<(&str, &str)>,
    find: impl FnOnce(&str) -> Option<SourceSpan>,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    match source {
        Some((name, text)) => match find(text) {
            Some(span) => (Some(span), Some(NamedSource::new(name, text.to_string()))),
            None => (None, None),
        },
        None => (None, None),
    }
}

/// Span of the `[section]` header.
fn locate_section(text: &str, section: &str) -> Option<SourceSpan> {
    scan(text).find_map(|line| match line {
        Line::Header { name, at, len } if name == section => Some(SourceSpan::new(at.into(), len)),
        _ => None,
    })
}

/// Span of `key` where it is assigned under `[section]`.
fn locate_key(text: &str, section: &str, key: &str) -> Option<SourceSpan> {
    let mut current = None;
    for line in scan(text) {
        match line {
            Line::Header { name, .. } => current = Some(name),
            Line::Assign { key: k, at } if current == Some(section) && k == key => {
                return Some(SourceSpan::new(at.into(), key.len()));
            }
            Line::Assign { .. } => {}
        }
    }
    None
}

enum Line<'a> {
    Header { name: &'a str, at: usize, len: usize },
    Assign { key: &'a str, at: usize },
}

/// Section headers and bare-key assignments with their byte offsets.
fn scan(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n').filter_map(move |raw| {
        let start = offset;
        offset += raw.len();
        let line = raw.trim_end();
        let body = line.trim_start();
        let at = start + (line.len() - body.len());
        if let Some(inner) = body.strip_prefix('[') {
            let name = inner.split(']').next()?.trim();
            let len = body.find(']').map_or(body.len(), |i| i + 1);
            return Some(Line::Header { name, at, len });
        }
        let (key, _) = body.split_once('=')?;
        let key = key.trim_end();
        if key.is_empty() || key.starts_with('#') {
            return None;
        }
        Some(Line::Assign { key, at })
    })
}

/// Closest candidate above [`SUGGESTION_THRESHOLD`].
pub fn closest<S: AsRef<str>>(unknown: &str, candidates: &[S]) -> Option<String> {
    candidates
        .iter()
        .map(|c| (c.as_ref(), strsim::jaro_winkler(unknown, c.as_ref())))
        .filter(|(_, score)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c.to_string())
}

/// Which keys each section accepts, read off the default config.
///
/// Unset optional keys are absent from the defaults, so they are not
/// found when checking for a key placed in the wrong section.
struct SectionLayout {
    sections: BTreeMap<String, Vec<String>>,
}

impl SectionLayout {
    fn from_defaults() -> Self {
        let mut sections = BTreeMap::new();
        if let Ok(toml::Value::Table(root)) = toml::Value::try_from(ZaplineConfig::default()) {
            for (name, value) in root {
                if let toml::Value::Table(keys) = value {
                    sections.insert(name, keys.keys().cloned().collect());
                }
            }
        }
        Self { sections }
    }

    fn sections(&self) -> Vec<&str> {
        self.sections.keys().map(String::as_str).collect()
    }

    fn section_owning(&self, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(_, keys)| keys.iter().any(|k| k == key))
            .map(|(name, _)| name.as_str())
    }
}

/// Print each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
