//! Shared types for the notification pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Event ───────────────────────────────────────────────────────────

/// A domain event to route into a notification.
///
/// Built per stream record by the ingestion adapter, or supplied whole by
/// the manual trigger endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Canonical event type token, e.g. `PGR_CREATE`.
    pub event_type: String,
    pub tenant_id: String,
    #[serde(default)]
    pub recipient: Recipient,
    /// Raw event body; templates render against it.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Who the notification is for. At least one field is needed to deliver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Recipient {
    /// Identifier used for preference lookups: userId, then phone.
    pub fn lookup_id(&self) -> Option<&str> {
        [self.user_id.as_deref(), self.phone.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
    }

    /// Raw phone source for delivery: phone, then userId.
    pub fn phone_source(&self) -> Option<&str> {
        [self.phone.as_deref(), self.user_id.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
    }
}

// ── Channel ─────────────────────────────────────────────────────────

/// Outbound notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "WHATSAPP")]
    WhatsApp,
}

impl Channel {
    /// Token used in policy documents and transaction ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsApp => "WHATSAPP",
        }
    }

    /// Feature flag that must be `true` for outbound delivery.
    pub fn outbound_flag(&self) -> String {
        format!("{}_OUTBOUND_ENABLED", self.as_str())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Transaction id ──────────────────────────────────────────────────

/// Correlation id for one pipeline run. Not an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn derive(event: &Event, channel: Channel, at: DateTime<Utc>) -> Self {
        let recipient = event.recipient.lookup_id().unwrap_or("unknown");
        Self(format!(
            "{}-{}-{}-{}",
            event.event_type,
            channel.as_str(),
            recipient,
            at.timestamp_millis()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Sent,
    Skipped,
    /// Quiet hours. The caller may retry later.
    Deferred,
    RateLimited,
    /// Rendered but no transport configured.
    Simulated,
    Error,
}

impl OutcomeStatus {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Skipped => "SKIPPED",
            Self::Deferred => "DEFERRED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Simulated => "SIMULATED",
            Self::Error => "ERROR",
        }
    }
}

/// The sole externally observable result of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub status: OutcomeStatus,
    pub transaction_id: TransactionId,
    /// Reason string or dispatch receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl PipelineOutcome {
    pub fn new(status: OutcomeStatus, transaction_id: TransactionId) -> Self {
        Self {
            status,
            transaction_id,
            details: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.details = Some(serde_json::Value::String(reason.into()));
        self
    }

    pub fn with_receipt(mut self, receipt: serde_json::Value) -> Self {
        self.details = Some(receipt);
        self
    }

    /// Human-readable reason, when the details are a plain string.
    pub fn reason(&self) -> Option<&str> {
        self.details.as_ref().and_then(serde_json::Value::as_str)
    }

    /// Rendered message text carried by a `SENT`/`SIMULATED` receipt.
    pub fn message(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(serde_json::Value::as_str)
    }
}
