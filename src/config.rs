//! Configuration types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Namespace holding every policy document the bridge reads.
pub const POLICY_NAMESPACE: &str = "notification-orchestrator";

/// Locale used when neither the user nor the tenant names one.
pub const FALLBACK_LOCALE: &str = "en_IN";

/// Built-in event type → delegated workflow identifiers.
const DEFAULT_WORKFLOWS: &[(&str, &str)] = &[
    ("PGR_CREATE", "pgr-complaint-created"),
    ("PGR_CREATED", "pgr-complaint-created"),
    ("PGR_UPDATE", "pgr-status-changed"),
    ("PGR_STATUS_CHANGE", "pgr-status-changed"),
    ("PGR_RESOLVED", "pgr-complaint-resolved"),
];

/// How outbound notifications leave the bridge. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The workflow engine owns templates and delivery.
    NovuTemplates,
    /// Bridge renders templates and sends through the chat transport.
    BaileysDirect,
    /// Bridge renders templates and triggers a workflow named after the event
    /// type with the rendered text.
    NovuDirect,
    /// Bridge renders templates; nothing is sent.
    DryRun,
}

impl DeliveryMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NovuTemplates => "novu-templates",
            Self::BaileysDirect => "baileys-direct",
            Self::NovuDirect => "novu-direct",
            Self::DryRun => "dry-run",
        }
    }
}

/// Kafka consumer settings.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub brokers: Vec<String>,
    pub group_id: String,
    pub topics: Vec<String>,
}

/// Bridge configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub server_port: u16,
    pub config_service_url: String,
    pub user_preferences_url: String,
    pub novu_api_key: Option<SecretString>,
    pub novu_api_url: String,
    pub use_novu_templates: bool,
    pub use_baileys: bool,
    pub baileys_provider_url: String,
    pub kafka: KafkaSettings,
    /// Tenant assumed for stream records that carry none.
    pub default_tenant_id: String,
    /// Offset applied to quiet hours when the guardrails document has none.
    pub default_tenant_utc_offset_minutes: i32,
    /// Upper bound on every outbound HTTP call.
    pub http_timeout: Duration,
    pub workflow_map: HashMap<String, String>,
    /// Daily-rolling log file directory; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_port: 8202,
            config_service_url: "http://digit-config-service:8201".to_string(),
            user_preferences_url: "http://digit-user-preferences:8200".to_string(),
            novu_api_key: None,
            novu_api_url: "http://novu-api:3000".to_string(),
            use_novu_templates: false,
            use_baileys: false,
            baileys_provider_url: "http://baileys-provider:8203".to_string(),
            kafka: KafkaSettings {
                brokers: vec!["kafka:9092".to_string()],
                group_id: "digit-novu-bridge".to_string(),
                topics: vec!["pgr-create".to_string(), "pgr-update".to_string()],
            },
            default_tenant_id: "pg.citya".to_string(),
            default_tenant_utc_offset_minutes: 330, // IST
            http_timeout: Duration::from_secs(10),
            workflow_map: default_workflow_map(),
            log_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("SERVER_PORT") {
            config.server_port = parse_value("SERVER_PORT", &port)?;
        }
        if let Some(url) = lookup("CONFIG_SERVICE_URL") {
            config.config_service_url = url;
        }
        if let Some(url) = lookup("USER_PREFERENCES_URL") {
            config.user_preferences_url = url;
        }
        config.novu_api_key = lookup("NOVU_API_KEY")
            .filter(|k| !k.is_empty())
            .map(SecretString::from);
        if let Some(url) = lookup("NOVU_API_URL") {
            config.novu_api_url = url;
        }
        config.use_novu_templates = lookup("USE_NOVU_TEMPLATES").as_deref() == Some("true");
        config.use_baileys = lookup("USE_BAILEYS").as_deref() == Some("true");
        if let Some(url) = lookup("BAILEYS_PROVIDER_URL") {
            config.baileys_provider_url = url;
        }

        if let Some(brokers) = lookup("KAFKA_BROKERS") {
            config.kafka.brokers = split_list(&brokers);
        }
        if let Some(group) = lookup("KAFKA_GROUP_ID") {
            config.kafka.group_id = group;
        }
        if let Some(topics) = lookup("KAFKA_TOPICS") {
            config.kafka.topics = split_list(&topics);
        }

        if let Some(tenant) = lookup("DEFAULT_TENANT_ID") {
            config.default_tenant_id = tenant;
        }
        if let Some(offset) = lookup("DEFAULT_TENANT_UTC_OFFSET_MINUTES") {
            let minutes: i32 = parse_value("DEFAULT_TENANT_UTC_OFFSET_MINUTES", &offset)?;
            if !(-14 * 60..=14 * 60).contains(&minutes) {
                return Err(ConfigError::InvalidValue {
                    key: "DEFAULT_TENANT_UTC_OFFSET_MINUTES".into(),
                    message: format!("{minutes} is outside ±840 minutes"),
                });
            }
            config.default_tenant_utc_offset_minutes = minutes;
        }
        if let Some(secs) = lookup("HTTP_TIMEOUT_SECS") {
            let secs: u64 = parse_value("HTTP_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "HTTP_TIMEOUT_SECS".into(),
                    message: "timeout must be positive".into(),
                });
            }
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("NOVU_WORKFLOW_MAP") {
            let overrides: HashMap<String, String> =
                serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
                    key: "NOVU_WORKFLOW_MAP".into(),
                    message: e.to_string(),
                })?;
            config.workflow_map.extend(overrides);
        }
        config.log_dir = lookup("NOTIFY_BRIDGE_LOG_DIR").map(PathBuf::from);

        Ok(config)
    }

    /// Resolve the delivery strategy.
    ///
    /// Workflow delegation needs both the flag and an API key; without the
    /// key the bridge falls back to rendering locally. A key with neither flag
    /// set still delivers through the workflow engine, with locally rendered text.
    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.use_novu_templates && self.novu_api_key.is_some() {
            DeliveryMode::NovuTemplates
        } else if self.use_baileys {
            DeliveryMode::BaileysDirect
        } else if self.novu_api_key.is_some() {
            DeliveryMode::NovuDirect
        } else {
            DeliveryMode::DryRun
        }
    }
}

/// The built-in event type → workflow identifier map.
pub fn default_workflow_map() -> HashMap<String, String> {
    DEFAULT_WORKFLOWS
        .iter()
        .map(|(event, workflow)| (event.to_string(), workflow.to_string()))
        .collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = BridgeConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.server_port, 8202);
        assert_eq!(config.kafka.topics, vec!["pgr-create", "pgr-update"]);
        assert_eq!(config.default_tenant_id, "pg.citya");
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.delivery_mode(), DeliveryMode::DryRun);
    }

    #[test]
    fn lists_are_trimmed_and_filtered() {
        let config =
            BridgeConfig::from_lookup(lookup_from(&[("KAFKA_TOPICS", " a-b , ,c-d ")])).unwrap();
        assert_eq!(config.kafka.topics, vec!["a-b", "c-d"]);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = BridgeConfig::from_lookup(lookup_from(&[("SERVER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SERVER_PORT"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err =
            BridgeConfig::from_lookup(lookup_from(&[("HTTP_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn novu_mode_requires_api_key() {
        let without_key =
            BridgeConfig::from_lookup(lookup_from(&[("USE_NOVU_TEMPLATES", "true")])).unwrap();
        assert_eq!(without_key.delivery_mode(), DeliveryMode::DryRun);

        let with_key = BridgeConfig::from_lookup(lookup_from(&[
            ("USE_NOVU_TEMPLATES", "true"),
            ("USE_BAILEYS", "true"),
            ("NOVU_API_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(with_key.delivery_mode(), DeliveryMode::NovuTemplates);
    }

    #[test]
    fn baileys_flag_selects_direct_send() {
        let config = BridgeConfig::from_lookup(lookup_from(&[("USE_BAILEYS", "true")])).unwrap();
        assert_eq!(config.delivery_mode(), DeliveryMode::BaileysDirect);
        assert_eq!(config.delivery_mode().label(), "baileys-direct");
    }

    #[test]
    fn api_key_alone_renders_locally_and_delivers_through_novu() {
        let config = BridgeConfig::from_lookup(lookup_from(&[("NOVU_API_KEY", "key")])).unwrap();
        assert_eq!(config.delivery_mode(), DeliveryMode::NovuDirect);
        assert_eq!(config.delivery_mode().label(), "novu-direct");

        let with_baileys = BridgeConfig::from_lookup(lookup_from(&[
            ("NOVU_API_KEY", "key"),
            ("USE_BAILEYS", "true"),
        ]))
        .unwrap();
        assert_eq!(with_baileys.delivery_mode(), DeliveryMode::BaileysDirect);
    }

    #[test]
    fn workflow_map_overrides_merge_with_defaults() {
        let config = BridgeConfig::from_lookup(lookup_from(&[(
            "NOVU_WORKFLOW_MAP",
            r#"{"TL_APPLY": "tl-application-received", "PGR_CREATE": "custom"}"#,
        )]))
        .unwrap();
        assert_eq!(config.workflow_map["TL_APPLY"], "tl-application-received");
        assert_eq!(config.workflow_map["PGR_CREATE"], "custom");
        assert_eq!(config.workflow_map["PGR_RESOLVED"], "pgr-complaint-resolved");
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let err = BridgeConfig::from_lookup(lookup_from(&[(
            "DEFAULT_TENANT_UTC_OFFSET_MINUTES",
            "1000",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
