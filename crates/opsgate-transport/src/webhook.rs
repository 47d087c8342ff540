//! Primary channel: the workflow-automation webhook.
//!
//! One blocking `POST` per request with the `DispatchRequest` as the JSON
//! body. The reply body is returned undecoded beyond JSON parsing; the
//! verifier owns the response contract.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use opsgate_contracts::{
    error::{OpsError, OpsResult, TransportError, TransportErrorKind},
    execution::{Channel, DispatchRequest},
};
use opsgate_core::traits::Transport;

/// Header carrying the automation endpoint's API key.
pub const API_KEY_HEADER: &str = "X-N8N-API-KEY";

/// Longest slice of an error body quoted in a diagnostic.
const BODY_EXCERPT: usize = 200;

pub struct WebhookTransport {
    url: String,
    api_key: Option<String>,
    client: Client,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> OpsResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| OpsError::ConfigError {
            reason: format!("failed to build webhook client: {e}"),
        })?;
        Ok(Self { url: url.into(), api_key, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn error(&self, kind: TransportErrorKind, detail: impl Into<String>) -> TransportError {
        TransportError::new(Channel::Primary, kind, detail)
    }
}

impl Transport for WebhookTransport {
    fn channel(&self) -> Channel {
        Channel::Primary
    }

    fn send(&self, request: &DispatchRequest) -> Result<Value, TransportError> {
        let mut call = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            call = call.header(API_KEY_HEADER, key);
        }

        let response = call.send().map_err(|e| {
            let kind = if e.is_timeout() { TransportErrorKind::Timeout } else { TransportErrorKind::Network };
            self.error(kind, format!("POST {}: {e}", self.url))
        })?;

        let status = response.status();
        let text = response.text().map_err(|e| {
            let kind = if e.is_timeout() { TransportErrorKind::Timeout } else { TransportErrorKind::Network };
            self.error(kind, format!("reading reply from {}: {e}", self.url))
        })?;
        debug!(request_id = %request.request_id, status = status.as_u16(), bytes = text.len(), "webhook replied");

        if !status.is_success() {
            let excerpt: String = text.chars().take(BODY_EXCERPT).collect();
            return Err(self.error(
                TransportErrorKind::Status,
                format!("HTTP {} from {}: {}", status.as_u16(), self.url, excerpt.trim()),
            ));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| self.error(TransportErrorKind::Malformed, format!("reply is not JSON: {e}")))?;

        // Workflow "respond to webhook" nodes may wrap the object in a one-item array.
        match body {
            Value::Array(mut items) if items.len() == 1 && items[0].is_object() => Ok(items.remove(0)),
            other => Ok(other),
        }
    }
}
