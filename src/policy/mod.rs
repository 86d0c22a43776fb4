//! Tenant policy and user preference lookups.
//!
//! Both stores are external services queried per event; nothing here caches.

pub mod documents;
pub mod lookup;
pub mod preferences;

pub use documents::{
    DeliveryGuardrails, EventChannelMap, EventChannelRule, FeatureFlags, LanguageStrategy,
    PolicyCode, QuietHours, RateLimitRule, TemplateBinding, TemplateBindings,
};
pub use lookup::{ConfigDocument, ConfigLookup, HttpConfigClient, fetch_policy};
pub use preferences::{HttpPreferenceClient, PreferenceLookup, UserPreference};
