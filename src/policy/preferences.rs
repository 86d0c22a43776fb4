//! User preference service client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, LookupError};
use crate::pipeline::types::Channel;

const SERVICE: &str = "user-preferences";

/// Preference record holding consent and language.
pub const PREFERENCE_CODE: &str = "USER_NOTIFICATION_PREFERENCES";

/// Consent value that permits delivery. Anything else denies it.
pub const CONSENT_GRANTED: &str = "GRANTED";

/// A user's notification preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreference {
    #[serde(default)]
    pub consent: HashMap<String, ConsentRecord>,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    #[serde(default)]
    pub status: Option<String>,
}

impl UserPreference {
    pub fn consent_granted(&self, channel: Channel) -> bool {
        self.consent
            .get(channel.as_str())
            .and_then(|c| c.status.as_deref())
            == Some(CONSENT_GRANTED)
    }
}

/// User preference lookup.
///
/// `Ok(None)` means the user has no record; callers must not read that as consent.
#[async_trait]
pub trait PreferenceLookup: Send + Sync {
    async fn fetch(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<Option<UserPreference>, LookupError>;
}

#[derive(Debug, Deserialize)]
struct PreferenceRow {
    #[serde(default)]
    payload: Option<UserPreference>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    preferences: Vec<PreferenceRow>,
}

/// HTTP client for `POST /user-preferences/v1/_search`.
pub struct HttpPreferenceClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpPreferenceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ConfigError::http_client("user-preferences", e))?,
        })
    }
}

#[async_trait]
impl PreferenceLookup for HttpPreferenceClient {
    async fn fetch(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<Option<UserPreference>, LookupError> {
        let body = serde_json::json!({
            "criteria": {
                "userId": user_id,
                "tenantId": tenant_id,
                "preferenceCode": PREFERENCE_CODE
            }
        });

        let resp = self
            .client
            .post(format!("{}/user-preferences/v1/_search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LookupError::from_reqwest(SERVICE, self.timeout, e))?;

        if !resp.status().is_success() {
            return Err(LookupError::Status {
                service: SERVICE.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let data: SearchResponse = resp
            .json()
            .await
            .map_err(|e| LookupError::from_reqwest(SERVICE, self.timeout, e))?;

        debug!(user_id, tenant_id, found = !data.preferences.is_empty(), "Preference lookup complete");
        Ok(data.preferences.into_iter().next().and_then(|row| row.payload))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn consent_requires_granted_status() {
        let prefs: UserPreference = serde_json::from_value(json!({
            "consent": {"WHATSAPP": {"status": "GRANTED"}},
            "preferredLanguage": "hi_IN"
        }))
        .unwrap();
        assert!(prefs.consent_granted(Channel::WhatsApp));
        assert_eq!(prefs.preferred_language.as_deref(), Some("hi_IN"));
    }

    #[test]
    fn revoked_or_missing_consent_is_denied() {
        let revoked: UserPreference =
            serde_json::from_value(json!({"consent": {"WHATSAPP": {"status": "REVOKED"}}})).unwrap();
        assert!(!revoked.consent_granted(Channel::WhatsApp));

        let lowercase: UserPreference =
            serde_json::from_value(json!({"consent": {"WHATSAPP": {"status": "granted"}}})).unwrap();
        assert!(!lowercase.consent_granted(Channel::WhatsApp));

        assert!(!UserPreference::default().consent_granted(Channel::WhatsApp));
    }

    #[test]
    fn search_response_takes_first_payload() {
        let data: SearchResponse = serde_json::from_value(json!({
            "preferences": [
                {"id": "1", "payload": {"preferredLanguage": "en_IN"}},
                {"id": "2", "payload": {"preferredLanguage": "hi_IN"}}
            ]
        }))
        .unwrap();
        let first = data.preferences.into_iter().next().and_then(|r| r.payload).unwrap();
        assert_eq!(first.preferred_language.as_deref(), Some("en_IN"));
    }
}
