//! Delivery strategies. One is chosen at startup and used for every event.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channels::phone::{normalize_phone, subscriber_id};
use crate::channels::transport::ChannelTransport;
use crate::channels::transport::{BaileysTransport, webhook_url};
use crate::channels::workflow::{NovuClient, TriggerRequest, WorkflowEngine};
use crate::config::{BridgeConfig, DeliveryMode};
use crate::error::{ConfigError, DispatchError};
use crate::pipeline::template::{self, Template};
use crate::pipeline::types::{Channel, Event, OutcomeStatus, PipelineOutcome, TransactionId};
use crate::policy::documents::{PolicyCode, TemplateBindings};
use crate::policy::lookup::{ConfigLookup, fetch_policy};

/// Credential provider id the workflow engine uses for chat webhooks.
const CHAT_WEBHOOK_PROVIDER: &str = "chat-webhook";

/// Everything a strategy needs to deliver one event.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    pub event: &'a Event,
    pub channel: Channel,
    pub locale: &'a str,
    pub transaction_id: &'a TransactionId,
}

/// Result of best-effort subscriber registration. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    Failed { reason: String },
}

impl RegistrationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Failed { .. } => "failed",
        }
    }
}

/// The closed set of delivery strategies.
pub enum ChannelDispatcher {
    /// Trigger an external workflow with raw data; it renders and delivers.
    Workflow(WorkflowStrategy),
    /// Render locally and hand the text to a sink, or simulate without one.
    Direct(DirectStrategy),
}

/// Where a locally rendered message goes.
pub enum DirectSink {
    /// Chat transport: plain text to a phone number.
    Transport(Arc<dyn ChannelTransport>),
    /// Workflow engine: a workflow named after the event type, carrying the text.
    Workflow(Arc<dyn WorkflowEngine>),
}

pub struct WorkflowStrategy {
    engine: Arc<dyn WorkflowEngine>,
    workflow_map: HashMap<String, String>,
    webhook_url: String,
}

pub struct DirectStrategy {
    config: Arc<dyn ConfigLookup>,
    sink: Option<DirectSink>,
}

impl ChannelDispatcher {
    pub fn workflow(
        engine: Arc<dyn WorkflowEngine>,
        workflow_map: HashMap<String, String>,
        webhook_url: impl Into<String>,
    ) -> Self {
        Self::Workflow(WorkflowStrategy {
            engine,
            workflow_map,
            webhook_url: webhook_url.into(),
        })
    }

    pub fn direct(
        config: Arc<dyn ConfigLookup>,
        transport: Option<Arc<dyn ChannelTransport>>,
    ) -> Self {
        Self::Direct(DirectStrategy {
            config,
            sink: transport.map(DirectSink::Transport),
        })
    }

    /// Render locally, then trigger a workflow named after the event type.
    pub fn rendered_workflow(config: Arc<dyn ConfigLookup>, engine: Arc<dyn WorkflowEngine>) -> Self {
        Self::Direct(DirectStrategy {
            config,
            sink: Some(DirectSink::Workflow(engine)),
        })
    }

    /// Build the strategy for `mode`, creating whichever HTTP clients it needs.
    pub fn from_config(
        mode: DeliveryMode,
        config: &BridgeConfig,
        lookup: Arc<dyn ConfigLookup>,
    ) -> Result<Self, ConfigError> {
        let timeout = config.http_timeout;
        let novu = || -> Result<Arc<NovuClient>, ConfigError> {
            let api_key = config
                .novu_api_key
                .clone()
                .ok_or_else(|| ConfigError::MissingEnvVar("NOVU_API_KEY".into()))?;
            Ok(Arc::new(NovuClient::new(
                config.novu_api_url.clone(),
                api_key,
                timeout,
            )?))
        };

        Ok(match mode {
            DeliveryMode::NovuTemplates => Self::workflow(
                novu()?,
                config.workflow_map.clone(),
                webhook_url(&config.baileys_provider_url),
            ),
            DeliveryMode::NovuDirect => Self::rendered_workflow(lookup, novu()?),
            DeliveryMode::BaileysDirect => {
                let transport: Arc<dyn ChannelTransport> = Arc::new(BaileysTransport::new(
                    config.baileys_provider_url.clone(),
                    timeout,
                )?);
                Self::direct(lookup, Some(transport))
            }
            DeliveryMode::DryRun => Self::direct(lookup, None),
        })
    }

    /// Mode name reported by the health endpoint.
    pub fn mode_label(&self) -> &'static str {
        match self {
            Self::Workflow(_) => DeliveryMode::NovuTemplates.label(),
            Self::Direct(d) => match d.sink {
                Some(DirectSink::Transport(_)) => DeliveryMode::BaileysDirect.label(),
                Some(DirectSink::Workflow(_)) => DeliveryMode::NovuDirect.label(),
                None => DeliveryMode::DryRun.label(),
            },
        }
    }

    pub fn is_workflow(&self) -> bool {
        matches!(self, Self::Workflow(_))
    }

    /// The chat transport, when direct sending is configured.
    pub fn transport(&self) -> Option<&Arc<dyn ChannelTransport>> {
        match self {
            Self::Direct(DirectStrategy {
                sink: Some(DirectSink::Transport(transport)),
                ..
            }) => Some(transport),
            _ => None,
        }
    }

    pub async fn dispatch(
        &self,
        request: DispatchRequest<'_>,
    ) -> Result<PipelineOutcome, DispatchError> {
        match self {
            Self::Workflow(strategy) => strategy.dispatch(request).await,
            Self::Direct(strategy) => strategy.dispatch(request).await,
        }
    }
}

fn recipient_phone(event: &Event) -> Result<String, DispatchError> {
    event
        .recipient
        .phone_source()
        .map(normalize_phone)
        .ok_or(DispatchError::NoRecipientAddress)
}

impl WorkflowStrategy {
    async fn dispatch(
        &self,
        request: DispatchRequest<'_>,
    ) -> Result<PipelineOutcome, DispatchError> {
        let event = request.event;
        let workflow_id = self
            .workflow_map
            .get(&event.event_type)
            .ok_or_else(|| DispatchError::WorkflowUnmapped {
                event_type: event.event_type.clone(),
            })?;

        let phone = recipient_phone(event)?;
        let subscriber = subscriber_id(&phone);

        let registration = self.register(&subscriber, &phone).await;
        if let RegistrationOutcome::Failed { reason } = &registration {
            warn!(
                transaction_id = %request.transaction_id,
                subscriber_id = %subscriber,
                reason = %reason,
                "Subscriber setup failed, triggering anyway"
            );
        }

        let mut payload = event.data.clone();
        payload.insert("phoneNumber".into(), phone.clone().into());
        payload.insert("locale".into(), request.locale.into());

        self.engine
            .trigger(
                workflow_id,
                TriggerRequest {
                    to: serde_json::json!({ "subscriberId": subscriber, "phone": phone }),
                    payload,
                    transaction_id: request.transaction_id.to_string(),
                },
            )
            .await?;

        info!(
            transaction_id = %request.transaction_id,
            workflow_id = %workflow_id,
            "Workflow triggered"
        );

        Ok(
            PipelineOutcome::new(OutcomeStatus::Sent, request.transaction_id.clone()).with_receipt(
                serde_json::json!({
                    "workflow": workflow_id,
                    "provider": "novu",
                    "subscriberId": subscriber,
                    "registration": registration.label(),
                }),
            ),
        )
    }

    /// Identify the subscriber and attach the chat webhook. Errors are captured.
    async fn register(&self, subscriber: &str, phone: &str) -> RegistrationOutcome {
        let attributes = serde_json::json!({
            "phone": phone,
            "data": { "phoneNumber": phone }
        });
        if let Err(e) = self.engine.identify(subscriber, attributes).await {
            return RegistrationOutcome::Failed {
                reason: e.to_string(),
            };
        }

        let credentials = serde_json::json!({ "webhookUrl": self.webhook_url });
        match self
            .engine
            .set_delivery_credentials(subscriber, CHAT_WEBHOOK_PROVIDER, credentials)
            .await
        {
            Ok(()) => {
                debug!(subscriber_id = %subscriber, "Subscriber configured with chat webhook");
                RegistrationOutcome::Registered
            }
            Err(e) => RegistrationOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}

impl DirectStrategy {
    async fn dispatch(
        &self,
        request: DispatchRequest<'_>,
    ) -> Result<PipelineOutcome, DispatchError> {
        let event = request.event;
        let text = self.resolve_template(request).await?;
        let message = template::render(&text, &event.data);
        debug!(transaction_id = %request.transaction_id, "Message rendered");

        let Some(sink) = &self.sink else {
            info!(
                transaction_id = %request.transaction_id,
                message = %message,
                "No transport configured, simulating delivery"
            );
            return Ok(PipelineOutcome::new(
                OutcomeStatus::Simulated,
                request.transaction_id.clone(),
            )
            .with_receipt(serde_json::json!({ "message": message, "provider": "none" })));
        };

        let phone = recipient_phone(event)?;
        let receipt = match sink {
            DirectSink::Transport(transport) => {
                let receipt = transport.send(&phone, &message).await?;
                info!(
                    transaction_id = %request.transaction_id,
                    message_id = receipt.message_id.as_deref().unwrap_or("none"),
                    "Message sent"
                );
                serde_json::json!({
                    "message": message,
                    "messageId": receipt.message_id,
                    "provider": transport.name(),
                })
            }
            DirectSink::Workflow(engine) => {
                let subscriber = event
                    .recipient
                    .user_id
                    .clone()
                    .unwrap_or_else(|| phone.clone());
                // Event data wins over the rendered text on a key clash.
                let mut payload = serde_json::Map::new();
                payload.insert("message".into(), message.clone().into());
                payload.extend(event.data.clone());

                engine
                    .trigger(
                        &event.event_type,
                        TriggerRequest {
                            to: serde_json::json!({ "subscriberId": subscriber, "phone": phone }),
                            payload,
                            transaction_id: request.transaction_id.to_string(),
                        },
                    )
                    .await?;
                info!(
                    transaction_id = %request.transaction_id,
                    workflow_id = %event.event_type,
                    "Rendered message handed to workflow"
                );
                serde_json::json!({ "message": message, "provider": "novu" })
            }
        };

        Ok(PipelineOutcome::new(OutcomeStatus::Sent, request.transaction_id.clone())
            .with_receipt(receipt))
    }

    /// Binding → template document → localized text.
    async fn resolve_template(&self, request: DispatchRequest<'_>) -> Result<String, DispatchError> {
        let event = request.event;
        let bindings: Option<TemplateBindings> = fetch_policy(
            self.config.as_ref(),
            &event.tenant_id,
            PolicyCode::TemplateBindings.as_str(),
        )
        .await?;

        let template_code = bindings
            .as_ref()
            .and_then(|b| b.find(&event.event_type, request.channel))
            .map(|b| b.template_code.clone())
            .ok_or_else(|| DispatchError::BindingMissing {
                event_type: event.event_type.clone(),
                channel: request.channel.to_string(),
            })?;
        debug!(
            transaction_id = %request.transaction_id,
            template_code = %template_code,
            "Template binding found"
        );

        let template: Option<Template> =
            fetch_policy(self.config.as_ref(), &event.tenant_id, &template_code).await?;

        template
            .as_ref()
            .and_then(|t| t.text_for(request.locale))
            .map(str::to_string)
            .ok_or(DispatchError::TemplateMissing { template_code })
    }
}
