// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request validation at the submission boundary.
//!
//! Anything rejected here is answered with 400 and never reaches the queue.

use chrono::{DateTime, Utc};

use zapline_core::types::parse_schedule_time;
use zapline_core::{NewJob, ZaplineError};

const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;
/// Numbers at most this long are treated as national and get the default country code.
const MAX_NATIONAL_DIGITS: usize = 11;
const MAX_SESSION_ID_LEN: usize = 64;

/// Reduce a phone number to bare digits.
///
/// Common punctuation (`+`, spaces, `-`, `.`, parentheses) is dropped.
/// When `default_country_code` is set and the number looks national, the
/// code is prepended.
pub fn normalize_destination(
    raw: &str,
    default_country_code: Option<&str>,
) -> Result<String, ZaplineError> {
    let mut digits = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            '0'..='9' => digits.push(c),
            '+' | ' ' | '-' | '.' | '(' | ')' => {}
            other => {
                return Err(ZaplineError::InvalidInput(format!(
                    "destination contains invalid character `{other}`"
                )));
            }
        }
    }

    if let Some(code) = default_country_code.map(str::trim).filter(|c| !c.is_empty()) {
        if !digits.starts_with(code) && digits.len() <= MAX_NATIONAL_DIGITS {
            digits.insert_str(0, code);
        }
    }

    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return Err(ZaplineError::InvalidInput(format!(
            "destination must have {MIN_DIGITS} to {MAX_DIGITS} digits, got {}",
            digits.len()
        )));
    }
    Ok(digits)
}

pub fn validate_text(text: &str) -> Result<(), ZaplineError> {
    if text.trim().is_empty() {
        return Err(ZaplineError::InvalidInput("text must not be empty".into()));
    }
    Ok(())
}

pub fn validate_session_id(session_id: &str) -> Result<(), ZaplineError> {
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(ZaplineError::InvalidInput(format!(
            "session id must be 1 to {MAX_SESSION_ID_LEN} bytes"
        )));
    }
    if session_id.chars().any(|c| c.is_control() || c == '/') {
        return Err(ZaplineError::InvalidInput(
            "session id must not contain control characters or `/`".into(),
        ));
    }
    Ok(())
}

/// Validate a schedule request and build the job to enqueue.
pub fn new_job(
    session_id: Option<&str>,
    destination: &str,
    text: &str,
    send_at: &str,
    default_country_code: Option<&str>,
) -> Result<NewJob, ZaplineError> {
    if let Some(id) = session_id {
        validate_session_id(id)?;
    }
    let destination = normalize_destination(destination, default_country_code)?;
    validate_text(text)?;
    let send_at: DateTime<Utc> = parse_schedule_time(send_at)?;
    Ok(NewJob {
        session_id: session_id.map(str::to_string),
        destination,
        body: text.to_string(),
        send_at,
    })
}
