//! Error types for the notification bridge.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client for {service}: {reason}")]
    HttpClient { service: String, reason: String },
}

impl ConfigError {
    /// Wrap a client-builder failure for the named upstream service.
    pub fn http_client(service: &str, e: reqwest::Error) -> Self {
        Self::HttpClient {
            service: service.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Failures talking to the config store or the preference store.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("{service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("{service} timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("{service} returned HTTP {status}")]
    Status { service: String, status: u16 },

    #[error("{service} response could not be decoded: {reason}")]
    Decode { service: String, reason: String },
}

impl LookupError {
    /// Classify a reqwest failure for the named upstream service.
    pub fn from_reqwest(service: &str, timeout: Duration, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                service: service.to_string(),
                timeout,
            }
        } else if e.is_decode() {
            Self::Decode {
                service: service.to_string(),
                reason: e.to_string(),
            }
        } else {
            Self::RequestFailed {
                service: service.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Failures while resolving or delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No template binding found for event {event_type} on {channel}")]
    BindingMissing { event_type: String, channel: String },

    #[error("Template content not found for {template_code}")]
    TemplateMissing { template_code: String },

    #[error("No workflow mapped for event: {event_type}")]
    WorkflowUnmapped { event_type: String },

    #[error("Channel transport unavailable: {reason}")]
    TransportUnavailable { reason: String },

    #[error("Workflow {workflow_id} trigger failed: {reason}")]
    WorkflowTriggerFailed { workflow_id: String, reason: String },

    #[error("Workflow subscriber registration failed: {reason}")]
    RegistrationFailed { reason: String },

    #[error("Recipient has no usable address")]
    NoRecipientAddress,

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl DispatchError {
    /// Message reported to callers. Transport failures pass the transport's own reason through.
    pub fn detail(&self) -> String {
        match self {
            Self::TransportUnavailable { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Event-stream ingestion errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Source {name} failed to connect: {reason}")]
    ConnectFailed { name: String, reason: String },

    #[error("Source {name} receive failed: {reason}")]
    ReceiveFailed { name: String, reason: String },

    #[error("Source {name} commit failed: {reason}")]
    CommitFailed { name: String, reason: String },

    #[error("Record on {topic} has an empty payload")]
    EmptyPayload { topic: String },

    #[error("Record on {topic} is not valid JSON: {reason}")]
    InvalidPayload { topic: String, reason: String },
}

/// Failures inside one orchestration pass.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Preference lookup failed: {0}")]
    PreferenceLookup(LookupError),

    #[error("Guardrails lookup failed: {0}")]
    GuardrailsLookup(LookupError),

    #[error("Recipient has neither userId nor phone")]
    MissingRecipient,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl PipelineError {
    pub fn detail(&self) -> String {
        match self {
            Self::Dispatch(e) => e.detail(),
            other => other.to_string(),
        }
    }
}
