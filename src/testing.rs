//! In-memory stand-ins for the external services, shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::channels::transport::{ChannelTransport, SendReceipt, TransportStatus};
use crate::channels::workflow::{TriggerRequest, WorkflowEngine};
use crate::error::{DispatchError, LookupError};
use crate::pipeline::clock::Clock;
use crate::policy::lookup::{ConfigDocument, ConfigLookup};
use crate::policy::preferences::{PreferenceLookup, UserPreference};

/// Config store keyed by config code. Codes in `failing` return a lookup error.
#[derive(Default)]
pub struct StaticConfig {
    docs: HashMap<String, Value>,
    failing: HashSet<String>,
    pub requested: Mutex<Vec<String>>,
}

impl StaticConfig {
    pub fn with(mut self, code: &str, content: Value) -> Self {
        self.docs.insert(code.to_string(), content);
        self
    }

    pub fn failing(mut self, code: &str) -> Self {
        self.failing.insert(code.to_string());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigLookup for StaticConfig {
    async fn fetch(
        &self,
        _tenant_id: &str,
        _namespace: &str,
        config_code: &str,
    ) -> Result<Option<ConfigDocument>, LookupError> {
        self.requested.lock().unwrap().push(config_code.to_string());
        if self.failing.contains(config_code) {
            return Err(LookupError::RequestFailed {
                service: "config-service".into(),
                reason: "connection refused".into(),
            });
        }
        Ok(self.docs.get(config_code).map(|content| ConfigDocument {
            config_code: Some(config_code.to_string()),
            content: content.clone(),
        }))
    }
}

/// Preference store returning one fixed answer.
pub struct StaticPreferences {
    answer: Result<Option<Value>, ()>,
    pub calls: Mutex<u32>,
}

impl StaticPreferences {
    pub fn granted(language: Option<&str>) -> Self {
        let mut payload = serde_json::json!({ "consent": { "WHATSAPP": { "status": "GRANTED" } } });
        if let Some(lang) = language {
            payload["preferredLanguage"] = lang.into();
        }
        Self::payload(payload)
    }

    pub fn payload(payload: Value) -> Self {
        Self {
            answer: Ok(Some(payload)),
            calls: Mutex::new(0),
        }
    }

    pub fn missing() -> Self {
        Self {
            answer: Ok(None),
            calls: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: Err(()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PreferenceLookup for StaticPreferences {
    async fn fetch(
        &self,
        _user_id: &str,
        _tenant_id: &str,
    ) -> Result<Option<UserPreference>, LookupError> {
        *self.calls.lock().unwrap() += 1;
        match &self.answer {
            Ok(Some(payload)) => Ok(Some(
                serde_json::from_value(payload.clone()).expect("test payload decodes"),
            )),
            Ok(None) => Ok(None),
            Err(()) => Err(LookupError::Timeout {
                service: "user-preferences".into(),
                timeout: std::time::Duration::from_secs(10),
            }),
        }
    }
}

/// Transport that records sends, optionally failing each one.
#[derive(Default)]
pub struct RecordingTransport {
    pub fail_with: Option<String>,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, to: &str, text: &str) -> Result<SendReceipt, DispatchError> {
        if let Some(reason) = &self.fail_with {
            return Err(DispatchError::TransportUnavailable {
                reason: reason.clone(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), text.to_string()));
        Ok(SendReceipt {
            message_id: Some(format!("msg-{}", sent.len())),
        })
    }

    async fn status(&self) -> Result<TransportStatus, DispatchError> {
        Ok(TransportStatus {
            connected: self.fail_with.is_none(),
            ..Default::default()
        })
    }
}

/// Workflow engine that records every call.
#[derive(Default)]
pub struct RecordingWorkflow {
    pub fail_registration: bool,
    pub fail_trigger: bool,
    pub identified: Mutex<Vec<String>>,
    pub credentials: Mutex<Vec<(String, String, Value)>>,
    pub triggered: Mutex<Vec<(String, TriggerRequest)>>,
}

#[async_trait]
impl WorkflowEngine for RecordingWorkflow {
    async fn identify(&self, subscriber_id: &str, _attributes: Value) -> Result<(), DispatchError> {
        if self.fail_registration {
            return Err(DispatchError::RegistrationFailed {
                reason: "HTTP 500".into(),
            });
        }
        self.identified.lock().unwrap().push(subscriber_id.to_string());
        Ok(())
    }

    async fn set_delivery_credentials(
        &self,
        subscriber_id: &str,
        provider_id: &str,
        credentials: Value,
    ) -> Result<(), DispatchError> {
        self.credentials.lock().unwrap().push((
            subscriber_id.to_string(),
            provider_id.to_string(),
            credentials,
        ));
        Ok(())
    }

    async fn trigger(&self, workflow_id: &str, request: TriggerRequest) -> Result<(), DispatchError> {
        if self.fail_trigger {
            return Err(DispatchError::WorkflowTriggerFailed {
                workflow_id: workflow_id.to_string(),
                reason: "HTTP 502".into(),
            });
        }
        self.triggered
            .lock()
            .unwrap()
            .push((workflow_id.to_string(), request));
        Ok(())
    }
}

/// Clock pinned to one instant.
pub struct FixedClock(pub Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
