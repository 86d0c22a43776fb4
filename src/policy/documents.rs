//! Typed views of the policy documents stored in the config service.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::types::Channel;

/// Rate limit applied when guardrails name none for an event type.
pub const DEFAULT_MAX_PER_HOUR: u32 = 100;

/// Well-known policy document codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyCode {
    EventChannels,
    FeatureFlags,
    DeliveryGuardrails,
    TemplateBindings,
    LanguageStrategy,
}

impl PolicyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventChannels => "EVENT_CHANNELS",
            Self::FeatureFlags => "FEATURE_FLAGS",
            Self::DeliveryGuardrails => "DELIVERY_GUARDRAILS",
            Self::TemplateBindings => "TEMPLATE_BINDINGS",
            Self::LanguageStrategy => "LANGUAGE_STRATEGY",
        }
    }
}

// ── EVENT_CHANNELS ──────────────────────────────────────────────────

/// Event type → channels enabled for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventChannelMap {
    #[serde(default)]
    pub events: HashMap<String, EventChannelRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventChannelRule {
    #[serde(default)]
    pub channels: Vec<String>,
    /// Exempts every channel of this event from quiet hours.
    #[serde(default)]
    pub exempt_from_quiet_hours: bool,
    /// Exempts only the listed channels.
    #[serde(default)]
    pub quiet_hours_exempt_channels: Vec<String>,
}

impl EventChannelMap {
    pub fn rule_for(&self, event_type: &str) -> Option<&EventChannelRule> {
        self.events.get(event_type)
    }
}

impl EventChannelRule {
    pub fn enables(&self, channel: Channel) -> bool {
        self.channels.iter().any(|c| c == channel.as_str())
    }

    pub fn is_quiet_hours_exempt(&self, channel: Channel) -> bool {
        self.exempt_from_quiet_hours
            || self
                .quiet_hours_exempt_channels
                .iter()
                .any(|c| c == channel.as_str())
    }
}

// ── FEATURE_FLAGS ───────────────────────────────────────────────────

/// Named toggles. Only a literal `true` counts as enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureFlags(pub HashMap<String, serde_json::Value>);

impl FeatureFlags {
    pub fn is_enabled(&self, flag: &str) -> bool {
        matches!(self.0.get(flag), Some(serde_json::Value::Bool(true)))
    }
}

// ── DELIVERY_GUARDRAILS ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryGuardrails {
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitRule>,
}

impl DeliveryGuardrails {
    pub fn limit_for(&self, event_type: &str) -> u32 {
        self.rate_limits
            .get(event_type)
            .map(|rule| rule.max_per_hour)
            .unwrap_or(DEFAULT_MAX_PER_HOUR)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRule {
    #[serde(alias = "maxPerWindow")]
    pub max_per_hour: u32,
}

/// Daily quiet window in tenant-local hours, `[start, end)`.
///
/// `start > end` wraps across midnight (22→6 is quiet from 22:00 to 05:59).
/// `start < end` is a plain range (9→17). `start == end` is never quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

impl QuietHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start > self.end {
            hour >= self.start || hour < self.end
        } else {
            hour >= self.start && hour < self.end
        }
    }

    /// Tenant-local hour of `now`, using the document's offset if it has one.
    pub fn local_hour(&self, now: DateTime<Utc>, default_offset_minutes: i32) -> u32 {
        let offset = self.utc_offset_minutes.unwrap_or(default_offset_minutes);
        (now + Duration::minutes(i64::from(offset))).hour()
    }

    pub fn is_quiet_at(&self, now: DateTime<Utc>, default_offset_minutes: i32) -> bool {
        self.contains(self.local_hour(now, default_offset_minutes))
    }
}

// ── TEMPLATE_BINDINGS ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateBindings {
    #[serde(default)]
    pub bindings: Vec<TemplateBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBinding {
    pub event_type: String,
    pub channel: String,
    pub template_code: String,
}

impl TemplateBindings {
    pub fn find(&self, event_type: &str, channel: Channel) -> Option<&TemplateBinding> {
        self.bindings
            .iter()
            .find(|b| b.event_type == event_type && b.channel == channel.as_str())
    }
}

// ── LANGUAGE_STRATEGY ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageStrategy {
    #[serde(default)]
    pub default_locale: Option<String>,
}
