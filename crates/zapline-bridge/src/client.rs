// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the bridge sidecar API.

use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use zapline_config::model::BridgeConfig;
use zapline_core::ZaplineError;

/// Shared HTTP plumbing: URL building and status handling.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BridgeClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, ZaplineError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ZaplineError::Config(format!("invalid bridge.base_url `{}`: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ZaplineError::Config(format!(
                "bridge.base_url `{}` cannot be used as a base URL",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ZaplineError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self { http, base_url })
    }

    /// `{base}/sessions/{id}/{suffix...}` with the id percent-encoded as one segment.
    pub fn session_url(&self, session_id: &str, suffix: &[&str]) -> Result<Url, ZaplineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ZaplineError::Config("bridge.base_url cannot be a base".into()))?
            .pop_if_empty()
            .push("sessions")
            .push(session_id)
            .extend(suffix);
        Ok(url)
    }

    /// The session event WebSocket, `ws://` or `wss://` matching the base scheme.
    pub fn events_url(&self, session_id: &str) -> Result<Url, ZaplineError> {
        let mut url = self.session_url(session_id, &["events"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ZaplineError::Config(format!("cannot derive {scheme} URL from {url}")))?;
        Ok(url)
    }

    pub fn health_url(&self) -> Result<Url, ZaplineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ZaplineError::Config("bridge.base_url cannot be a base".into()))?
            .pop_if_empty()
            .push("health");
        Ok(url)
    }

    /// Send a request and require a success status.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ZaplineError> {
        let what = format!("{method} {}", url.path());
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| ZaplineError::Transport {
            message: format!("{what}: bridge unreachable: {e}"),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        debug!(request = %what, status = %status, "bridge responded");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ZaplineError::transport(format!(
            "{what}: bridge returned {status}{}",
            if body.is_empty() {
                String::new()
            } else {
                format!(": {body}")
            }
        )))
    }

    /// Like [`send`](Self::send), then decode a JSON response body.
    pub async fn send_json<B, R>(&self, method: Method, url: Url, body: Option<&B>) -> Result<R, ZaplineError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send(method, url, body).await?;
        response.json::<R>().await.map_err(|e| ZaplineError::Transport {
            message: format!("bridge sent an unexpected response body: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// DELETE that treats "already gone" as success.
    pub async fn delete_idempotent(&self, url: Url) -> Result<(), ZaplineError> {
        let response = self
            .http
            .delete(url.clone())
            .send()
            .await
            .map_err(|e| ZaplineError::Transport {
                message: format!("DELETE {}: bridge unreachable: {e}", url.path()),
                source: Some(Box::new(e)),
            })?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(ZaplineError::transport(format!(
                "DELETE {}: bridge returned {status}",
                url.path()
            )))
        }
    }
}
