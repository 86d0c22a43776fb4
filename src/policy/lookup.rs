//! Config service client.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::POLICY_NAMESPACE;
use crate::error::{ConfigError, LookupError};

const SERVICE: &str = "config-service";

/// One active config record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(default)]
    pub config_code: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Tenant- and namespace-scoped config lookup.
///
/// `Ok(None)` means the store answered and holds no active record.
#[async_trait]
pub trait ConfigLookup: Send + Sync {
    async fn fetch(
        &self,
        tenant_id: &str,
        namespace: &str,
        config_code: &str,
    ) -> Result<Option<ConfigDocument>, LookupError>;
}

/// Fetch a policy document and decode its `content` as `T`.
pub async fn fetch_policy<T: DeserializeOwned>(
    lookup: &dyn ConfigLookup,
    tenant_id: &str,
    config_code: &str,
) -> Result<Option<T>, LookupError> {
    let Some(doc) = lookup.fetch(tenant_id, POLICY_NAMESPACE, config_code).await? else {
        return Ok(None);
    };
    if doc.content.is_null() {
        return Ok(None);
    }
    serde_json::from_value(doc.content)
        .map(Some)
        .map_err(|e| LookupError::Decode {
            service: SERVICE.to_string(),
            reason: format!("{config_code}: {e}"),
        })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    configs: Vec<ConfigDocument>,
}

/// HTTP client for `POST /configs/v1/_search`.
pub struct HttpConfigClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpConfigClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ConfigError::http_client("config-service", e))?,
        })
    }

    fn search_url(&self) -> String {
        format!("{}/configs/v1/_search", self.base_url)
    }
}

#[async_trait]
impl ConfigLookup for HttpConfigClient {
    async fn fetch(
        &self,
        tenant_id: &str,
        namespace: &str,
        config_code: &str,
    ) -> Result<Option<ConfigDocument>, LookupError> {
        let body = serde_json::json!({
            "criteria": {
                "tenantId": tenant_id,
                "namespace": namespace,
                "configCode": config_code,
                "status": "ACTIVE"
            }
        });

        let resp = self
            .client
            .post(self.search_url())
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

        debug!(
            tenant_id,
            config_code,
            found = !data.configs.is_empty(),
            "Config lookup complete"
        );
        Ok(data.configs.into_iter().next())
    }
}
