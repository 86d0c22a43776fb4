//! WhatsApp transport: HTTP client for the Baileys provider service.
//!
//! The provider owns QR pairing and the socket lifecycle; the bridge only
//! sends text and asks whether the session is connected.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DispatchError};

/// Receipt for a message the transport accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Session state reported by the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, rename = "hasQR")]
    pub has_qr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A chat transport that can deliver plain text to an address.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Provider name, reported in dispatch receipts.
    fn name(&self) -> &str;

    /// Send `text` to `to`. Any non-success is `TransportUnavailable`.
    async fn send(&self, to: &str, text: &str) -> Result<SendReceipt, DispatchError>;

    /// Query whether the transport session is connected.
    async fn status(&self) -> Result<TransportStatus, DispatchError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Baileys provider client (`/baileys/send`, `/baileys/status`).
pub struct BaileysTransport {
    base_url: String,
    client: reqwest::Client,
}

impl BaileysTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ConfigError::http_client("baileys", e))?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/baileys/{path}", self.base_url)
    }
}

/// Callback endpoint on the provider that the workflow engine posts chat messages to.
pub fn webhook_url(base_url: &str) -> String {
    format!("{}/baileys/novu-webhook", base_url.trim_end_matches('/'))
}

fn unavailable(reason: impl Into<String>) -> DispatchError {
    DispatchError::TransportUnavailable {
        reason: reason.into(),
    }
}

#[async_trait]
impl ChannelTransport for BaileysTransport {
    fn name(&self) -> &str {
        "baileys"
    }

    async fn send(&self, to: &str, text: &str) -> Result<SendReceipt, DispatchError> {
        let resp = self
            .client
            .post(self.url("send"))
            .json(&serde_json::json!({ "to": to, "content": text }))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        // 503 (not paired) still carries {success: false, error}.
        let status = resp.status();
        let body: SendResponse = match resp.json().await {
            Ok(body) => body,
            Err(_) => return Err(unavailable(format!("send returned HTTP {status}"))),
        };

        if !body.success {
            return Err(unavailable(
                body.error
                    .unwrap_or_else(|| format!("send returned HTTP {status}")),
            ));
        }

        Ok(SendReceipt {
            message_id: body.message_id,
        })
    }

    async fn status(&self) -> Result<TransportStatus, DispatchError> {
        let resp = self
            .client
            .get(self.url("status"))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(unavailable(format!("status returned HTTP {}", resp.status())));
        }

        resp.json().await.map_err(|e| unavailable(e.to_string()))
    }
}
