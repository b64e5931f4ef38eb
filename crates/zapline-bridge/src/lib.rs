// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter for the messaging bridge sidecar.
//!
//! The bridge owns the messaging protocol: pairing, framing, encryption and
//! socket-level recovery. Zapline drives it through a small HTTP API and
//! one event WebSocket per session:
//!
//! | Request | Purpose |
//! |---------|---------|
//! | `POST /sessions/{id}/connect` | start or resume, body `{"credentials": base64 \| null}` |
//! | `GET  /sessions/{id}/events` (WebSocket) | JSON [`BridgeFrame`]s |
//! | `POST /sessions/{id}/messages` | send `{"to", "text"}`, returns `{"id"}` |
//! | `POST /sessions/{id}/pairing-code` | `{"phone_number"}`, returns `{"code"}` |
//! | `POST /sessions/{id}/logout` | invalidate the session |
//! | `DELETE /sessions/{id}` | close without invalidating |
//! | `GET  /health` | liveness |

pub mod client;
pub mod frames;
pub mod transport;

pub use client::BridgeClient;
pub use frames::{BridgeFrame, CloseClassifier, CLOSE_CONFLICT, CLOSE_LOGGED_OUT};
pub use transport::{BridgeConnection, BridgeTransport};
