// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP control surface for Zapline.
//!
//! Operators use the gateway to start and pair sessions, send immediate
//! messages, and schedule, inspect or cancel delivery jobs. Every `/v1`
//! route requires a bearer token; `/health` is public.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod validation;

pub use auth::AuthConfig;
pub use server::{GatewayState, HealthState, bind, build_router, serve};
