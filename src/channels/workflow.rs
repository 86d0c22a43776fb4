//! Delegated workflow engine: Novu REST client.
//!
//! Once triggered, the engine renders its own templates and handles delivery
//! and retries. The bridge only registers the subscriber and fires the event.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::{ConfigError, DispatchError};

/// Body of a workflow trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub to: serde_json::Value,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub transaction_id: String,
}

/// An external engine that owns templating and delivery once triggered.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Create or update a subscriber. Idempotent.
    async fn identify(
        &self,
        subscriber_id: &str,
        attributes: serde_json::Value,
    ) -> Result<(), DispatchError>;

    /// Attach channel delivery credentials (e.g. a webhook URL) to a subscriber.
    async fn set_delivery_credentials(
        &self,
        subscriber_id: &str,
        provider_id: &str,
        credentials: serde_json::Value,
    ) -> Result<(), DispatchError>;

    /// Fire a workflow for one recipient.
    async fn trigger(&self, workflow_id: &str, request: TriggerRequest)
    -> Result<(), DispatchError>;
}

/// Novu API client.
pub struct NovuClient {
    api_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl NovuClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ConfigError::http_client("novu", e))?,
        })
    }

    fn auth_header(&self) -> String {
        format!("ApiKey {}", self.api_key.expose_secret())
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<(), String> {
        let resp = request
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(format!("HTTP {status}: {body}"))
        }
    }
}

#[async_trait]
impl WorkflowEngine for NovuClient {
    async fn identify(
        &self,
        subscriber_id: &str,
        attributes: serde_json::Value,
    ) -> Result<(), DispatchError> {
        let mut body = serde_json::json!({ "subscriberId": subscriber_id });
        if let (Some(target), serde_json::Value::Object(extra)) = (body.as_object_mut(), attributes)
        {
            target.extend(extra);
        }

        self.execute(
            self.client
                .post(format!("{}/v1/subscribers", self.api_url))
                .json(&body),
        )
        .await
        .map_err(|reason| DispatchError::RegistrationFailed { reason })
    }

    async fn set_delivery_credentials(
        &self,
        subscriber_id: &str,
        provider_id: &str,
        credentials: serde_json::Value,
    ) -> Result<(), DispatchError> {
        let body = serde_json::json!({
            "providerId": provider_id,
            "credentials": credentials,
        });

        self.execute(
            self.client
                .put(format!(
                    "{}/v1/subscribers/{subscriber_id}/credentials",
                    self.api_url
                ))
                .json(&body),
        )
        .await
        .map_err(|reason| DispatchError::RegistrationFailed { reason })
    }

    async fn trigger(
        &self,
        workflow_id: &str,
        request: TriggerRequest,
    ) -> Result<(), DispatchError> {
        let body = serde_json::json!({
            "name": workflow_id,
            "to": request.to,
            "payload": request.payload,
            "transactionId": request.transaction_id,
        });

        self.execute(
            self.client
                .post(format!("{}/v1/events/trigger", self.api_url))
                .json(&body),
        )
        .await
        .map_err(|reason| DispatchError::WorkflowTriggerFailed {
            workflow_id: workflow_id.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_header_uses_api_key_scheme() {
        let client = NovuClient::new(
            "http://novu-api:3000/",
            SecretString::from("k-123"),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.auth_header(), "ApiKey k-123");
        assert_eq!(client.api_url, "http://novu-api:3000");
    }

    #[test]
    fn trigger_request_serializes_camel_case() {
        let request = TriggerRequest {
            to: serde_json::json!({"subscriberId": "phone_91"}),
            payload: serde_json::Map::new(),
            transaction_id: "tx-1".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["transactionId"], "tx-1");
    }
}
