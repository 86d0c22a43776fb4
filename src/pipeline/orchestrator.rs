//! Notification orchestrator: runs one event through the gate chain.
//!
//! Gates, in order (the first to fail ends the run):
//! 1. Enablement: channel listed for the event type, else `SKIPPED`
//! 2. Feature flag: `<CHANNEL>_OUTBOUND_ENABLED`, else `SKIPPED`
//! 3. Quiet hours: tenant-local hour inside the window, else `DEFERRED`
//! 4. Rate limit: fixed window per (tenant, event, channel), else `RATE_LIMITED`
//! 5. Consent: preference status `GRANTED`, else `SKIPPED`
//! 6. Language: user preference → tenant default → fallback
//! 7. Dispatch: delegated workflow or direct send
//!
//! Consent runs after the rate limit, so a denied event still spends budget.
//! Lookup failures in gates 1–2 close the gate; a preference lookup failure
//! is an `ERROR`, never implied consent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::channels::dispatcher::{ChannelDispatcher, DispatchRequest};
use crate::config::FALLBACK_LOCALE;
use crate::error::PipelineError;
use crate::pipeline::clock::{Clock, SystemClock};
use crate::pipeline::rate_limit::{RateLimitKey, RateLimiter};
use crate::pipeline::types::{Channel, Event, OutcomeStatus, PipelineOutcome, TransactionId};
use crate::policy::documents::{
    DeliveryGuardrails, EventChannelMap, EventChannelRule, FeatureFlags, LanguageStrategy,
    PolicyCode,
};
use crate::policy::lookup::{ConfigLookup, fetch_policy};
use crate::policy::preferences::{PreferenceLookup, UserPreference};

/// Collaborators injected into the orchestrator.
pub struct OrchestratorDeps {
    pub config: Arc<dyn ConfigLookup>,
    pub preferences: Arc<dyn PreferenceLookup>,
    pub rate_limiter: Arc<RateLimiter>,
    pub dispatcher: Arc<ChannelDispatcher>,
    pub clock: Arc<dyn Clock>,
}

impl OrchestratorDeps {
    /// Deps with a fresh rate limiter and the system clock.
    pub fn new(
        config: Arc<dyn ConfigLookup>,
        preferences: Arc<dyn PreferenceLookup>,
        dispatcher: Arc<ChannelDispatcher>,
    ) -> Self {
        Self {
            config,
            preferences,
            rate_limiter: Arc::new(RateLimiter::new()),
            dispatcher,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Runs events through the gate chain and reports one outcome per event.
pub struct NotificationOrchestrator {
    deps: OrchestratorDeps,
    channel: Channel,
    default_utc_offset_minutes: i32,
}

impl NotificationOrchestrator {
    pub fn new(deps: OrchestratorDeps, channel: Channel, default_utc_offset_minutes: i32) -> Self {
        Self {
            deps,
            channel,
            default_utc_offset_minutes,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn dispatcher(&self) -> &Arc<ChannelDispatcher> {
        &self.deps.dispatcher
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.deps.rate_limiter
    }

    /// Process one event. Never fails; internal errors become `ERROR` outcomes.
    pub async fn process(&self, event: Event) -> PipelineOutcome {
        let now = self.deps.clock.now();
        let transaction_id = TransactionId::derive(&event, self.channel, now);
        info!(
            transaction_id = %transaction_id,
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            "Processing notification"
        );

        let outcome = match self.run(&event, &transaction_id, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(transaction_id = %transaction_id, error = %e, "Notification failed");
                PipelineOutcome::new(OutcomeStatus::Error, transaction_id).with_reason(e.detail())
            }
        };

        info!(
            transaction_id = %outcome.transaction_id,
            status = outcome.status.label(),
            "Notification finished"
        );
        outcome
    }

    async fn run(
        &self,
        event: &Event,
        tx: &TransactionId,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let channel = self.channel;
        let terminal = |status: OutcomeStatus, reason: String| -> Result<PipelineOutcome, PipelineError> {
            debug!(transaction_id = %tx, status = status.label(), reason = %reason, "Gate closed");
            Ok(PipelineOutcome::new(status, tx.clone()).with_reason(reason))
        };

        // 1. Enablement
        let Some(rule) = self.enabled_rule(event, tx).await else {
            return terminal(
                OutcomeStatus::Skipped,
                format!("{channel} not enabled for this event"),
            );
        };

        // 2. Feature flag
        if !self.outbound_enabled(event, tx).await {
            return terminal(OutcomeStatus::Skipped, format!("{channel} outbound disabled"));
        }

        // 3. Quiet hours
        let guardrails: DeliveryGuardrails = fetch_policy(
            self.deps.config.as_ref(),
            &event.tenant_id,
            PolicyCode::DeliveryGuardrails.as_str(),
        )
        .await
        .map_err(PipelineError::GuardrailsLookup)?
        .unwrap_or_default();

        if let Some(quiet) = guardrails.quiet_hours {
            if !rule.is_quiet_hours_exempt(channel)
                && quiet.is_quiet_at(now, self.default_utc_offset_minutes)
            {
                return terminal(
                    OutcomeStatus::Deferred,
                    "Quiet hours - will retry later".to_string(),
                );
            }
        }

        // 4. Rate limit
        let key = RateLimitKey::new(&event.tenant_id, &event.event_type, channel);
        let limit = guardrails.limit_for(&event.event_type);
        if !self.deps.rate_limiter.check_and_increment_at(&key, limit, now) {
            return terminal(
                OutcomeStatus::RateLimited,
                format!("Rate limit exceeded ({limit} per hour)"),
            );
        }

        // 5. Consent
        let user_id = event
            .recipient
            .lookup_id()
            .ok_or(PipelineError::MissingRecipient)?;
        let preference = self
            .deps
            .preferences
            .fetch(user_id, &event.tenant_id)
            .await
            .map_err(PipelineError::PreferenceLookup)?;
        if !preference
            .as_ref()
            .is_some_and(|p| p.consent_granted(channel))
        {
            return terminal(
                OutcomeStatus::Skipped,
                format!("User has not granted {channel} consent"),
            );
        }

        // 6. Language
        let locale = self.resolve_locale(event, preference.as_ref(), tx).await;
        debug!(transaction_id = %tx, locale = %locale, "Language resolved");

        // 7. Dispatch
        let outcome = self
            .deps
            .dispatcher
            .dispatch(DispatchRequest {
                event,
                channel,
                locale: &locale,
                transaction_id: tx,
            })
            .await?;

        Ok(outcome)
    }

    /// The event's channel rule, if this channel is enabled. Fails closed.
    async fn enabled_rule(&self, event: &Event, tx: &TransactionId) -> Option<EventChannelRule> {
        let map: Option<EventChannelMap> = fetch_policy(
            self.deps.config.as_ref(),
            &event.tenant_id,
            PolicyCode::EventChannels.as_str(),
        )
        .await
        .unwrap_or_else(|e| {
            warn!(transaction_id = %tx, error = %e, "Event channel lookup failed, treating as disabled");
            None
        });

        map?.events
            .remove(&event.event_type)
            .filter(|rule| rule.enables(self.channel))
    }

    /// Whether the outbound flag is on. Fails closed.
    async fn outbound_enabled(&self, event: &Event, tx: &TransactionId) -> bool {
        let flags: Option<FeatureFlags> = fetch_policy(
            self.deps.config.as_ref(),
            &event.tenant_id,
            PolicyCode::FeatureFlags.as_str(),
        )
        .await
        .unwrap_or_else(|e| {
            warn!(transaction_id = %tx, error = %e, "Feature flag lookup failed, treating as disabled");
            None
        });

        flags.is_some_and(|f| f.is_enabled(&self.channel.outbound_flag()))
    }

    async fn resolve_locale(
        &self,
        event: &Event,
        preference: Option<&UserPreference>,
        tx: &TransactionId,
    ) -> String {
        let strategy: Option<LanguageStrategy> = fetch_policy(
            self.deps.config.as_ref(),
            &event.tenant_id,
            PolicyCode::LanguageStrategy.as_str(),
        )
        .await
        .unwrap_or_else(|e| {
            warn!(transaction_id = %tx, error = %e, "Language strategy lookup failed, using fallback");
            None
        });

        resolve_locale(&[
            preference.and_then(|p| p.preferred_language.as_deref()),
            strategy.as_ref().and_then(|s| s.default_locale.as_deref()),
        ])
    }
}

/// First non-empty candidate, else the fallback locale.
pub fn resolve_locale(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .flatten()
        .find(|locale| !locale.is_empty())
        .copied()
        .unwrap_or(FALLBACK_LOCALE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::pipeline::types::Recipient;
    use crate::testing::{
        FixedClock, RecordingTransport, RecordingWorkflow, StaticConfig, StaticPreferences,
    };

    /// 12:00 IST.
    fn midday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 6, 30, 0).unwrap()
    }

    /// 23:30 IST.
    fn night() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap()
    }

    fn policy() -> StaticConfig {
        StaticConfig::default()
            .with(
                "EVENT_CHANNELS",
                json!({"events": {"PGR_CREATE": {"channels": ["WHATSAPP"]}}}),
            )
            .with("FEATURE_FLAGS", json!({"WHATSAPP_OUTBOUND_ENABLED": true}))
            .with(
                "DELIVERY_GUARDRAILS",
                json!({"quietHours": {"start": 22, "end": 6}, "rateLimits": {"PGR_CREATE": {"maxPerHour": 2}}}),
            )
            .with(
                "TEMPLATE_BINDINGS",
                json!({"bindings": [{"eventType": "PGR_CREATE", "channel": "WHATSAPP", "templateCode": "PGR_CREATE_WA"}]}),
            )
            .with(
                "PGR_CREATE_WA",
                json!({"templates": {"en_IN": "Hello {{name}}, complaint {{id}} received", "hi_IN": "Namaste {{name}}"}}),
            )
            .with("LANGUAGE_STRATEGY", json!({"defaultLocale": "en_IN"}))
    }

    fn event() -> Event {
        Event {
            event_type: "PGR_CREATE".into(),
            tenant_id: "pg.citya".into(),
            recipient: Recipient {
                user_id: Some("user-1".into()),
                phone: Some("9876543210".into()),
            },
            data: json!({"name": "Asha", "id": "C-100"})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    struct Harness {
        orchestrator: NotificationOrchestrator,
        config: Arc<StaticConfig>,
        preferences: Arc<StaticPreferences>,
        clock: Arc<FixedClock>,
    }

    fn harness(
        config: StaticConfig,
        preferences: StaticPreferences,
        transport: Option<Arc<RecordingTransport>>,
    ) -> Harness {
        let config = Arc::new(config);
        let preferences = Arc::new(preferences);
        let clock = Arc::new(FixedClock::at(midday()));
        let dispatcher = ChannelDispatcher::direct(
            config.clone(),
            transport.map(|t| t as Arc<dyn crate::channels::transport::ChannelTransport>),
        );
        let deps = OrchestratorDeps {
            config: config.clone(),
            preferences: preferences.clone(),
            rate_limiter: Arc::new(RateLimiter::new()),
            dispatcher: Arc::new(dispatcher),
            clock: clock.clone(),
        };
        Harness {
            orchestrator: NotificationOrchestrator::new(deps, Channel::WhatsApp, 330),
            config,
            preferences,
            clock,
        }
    }

    // ── Scenarios ───────────────────────────────────────────────────

    #[tokio::test]
    async fn direct_send_renders_and_sends() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness(policy(), StaticPreferences::granted(None), Some(transport.clone()));

        let outcome = h.orchestrator.process(event()).await;

        assert_eq!(outcome.status, OutcomeStatus::Sent);
        assert_eq!(outcome.message(), Some("Hello Asha, complaint C-100 received"));
        let details = outcome.details.unwrap();
        assert_eq!(details["messageId"], "msg-1");
        assert_eq!(details["provider"], "recording");
        assert_eq!(
            transport.sent(),
            vec![(
                "+919876543210".to_string(),
                "Hello Asha, complaint C-100 received".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn no_transport_simulates_with_rendered_text() {
        let h = harness(policy(), StaticPreferences::granted(None), None);

        let outcome = h.orchestrator.process(event()).await;

        assert_eq!(outcome.status, OutcomeStatus::Simulated);
        assert_eq!(outcome.message(), Some("Hello Asha, complaint C-100 received"));
        assert_eq!(outcome.details.unwrap()["provider"], "none");
    }

    #[tokio::test]
    async fn third_call_in_window_is_rate_limited() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness(policy(), StaticPreferences::granted(None), Some(transport.clone()));

        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(h.orchestrator.process(event()).await.status);
        }

        assert_eq!(
            statuses,
            vec![OutcomeStatus::Sent, OutcomeStatus::Sent, OutcomeStatus::RateLimited]
        );
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn rate_limit_recovers_after_window() {
        let h = harness(policy(), StaticPreferences::granted(None), None);
        for _ in 0..2 {
            h.orchestrator.process(event()).await;
        }
        assert_eq!(h.orchestrator.process(event()).await.status, OutcomeStatus::RateLimited);

        h.clock.set(midday() + chrono::Duration::minutes(61));
        assert_eq!(h.orchestrator.process(event()).await.status, OutcomeStatus::Simulated);
    }

    // ── Enablement & flags ──────────────────────────────────────────

    #[tokio::test]
    async fn unmapped_event_type_is_skipped() {
        let h = harness(policy(), StaticPreferences::granted(None), None);
        let mut other = event();
        other.event_type = "TL_APPLY".into();

        let outcome = h.orchestrator.process(other).await;

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.reason(), Some("WHATSAPP not enabled for this event"));
        assert_eq!(h.config.requested(), vec!["EVENT_CHANNELS"]);
    }

    #[tokio::test]
    async fn channel_not_listed_is_skipped() {
        let config = policy().with(
            "EVENT_CHANNELS",
            json!({"events": {"PGR_CREATE": {"channels": ["SMS"]}}}),
        );
        let h = harness(config, StaticPreferences::granted(None), None);
        assert_eq!(h.orchestrator.process(event()).await.status, OutcomeStatus::Skipped);
    }

    #[tokio::test]
    async fn channel_lookup_failure_fails_closed() {
        let h = harness(
            policy().failing("EVENT_CHANNELS"),
            StaticPreferences::granted(None),
            None,
        );
        let outcome = h.orchestrator.process(event()).await;
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(h.preferences.calls(), 0);
    }

    #[tokio::test]
    async fn disabled_flag_is_skipped() {
        let config = policy().with("FEATURE_FLAGS", json!({"WHATSAPP_OUTBOUND_ENABLED": false}));
        let h = harness(config, StaticPreferences::granted(None), None);
        let outcome = h.orchestrator.process(event()).await;
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.reason(), Some("WHATSAPP outbound disabled"));
    }

    #[tokio::test]
    async fn flag_lookup_failure_fails_closed() {
        let h = harness(
            policy().failing("FEATURE_FLAGS"),
            StaticPreferences::granted(None),
            None,
        );
        assert_eq!(h.orchestrator.process(event()).await.status, OutcomeStatus::Skipped);
    }

    // ── Quiet hours ─────────────────────────────────────────────────

    #[tokio::test]
    async fn quiet_hours_defer_before_rate_limit_and_consent() {
        let h = harness(policy(), StaticPreferences::missing(), None);
        h.clock.set(night());

        for _ in 0..5 {
            let outcome = h.orchestrator.process(event()).await;
            assert_eq!(outcome.status, OutcomeStatus::Deferred);
        }
        assert_eq!(h.preferences.calls(), 0);
        assert!(h.orchestrator.rate_limiter().is_empty());
    }

    #[tokio::test]
    async fn exempt_event_ignores_quiet_hours() {
        let config = policy().with(
            "EVENT_CHANNELS",
            json!({"events": {"PGR_CREATE": {"channels": ["WHATSAPP"], "exemptFromQuietHours": true}}}),
        );
        let h = harness(config, StaticPreferences::granted(None), None);
        h.clock.set(night());
        assert_eq!(h.orchestrator.process(event()).await.status, OutcomeStatus::Simulated);
    }

    #[tokio::test]
    async fn guardrails_failure_is_error() {
        let h = harness(
            policy().failing("DELIVERY_GUARDRAILS"),
            StaticPreferences::granted(None),
            None,
        );
        let outcome = h.orchestrator.process(event()).await;
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.reason().unwrap().contains("Guardrails"));
    }

    #[tokio::test]
    async fn absent_guardrails_use_default_limit() {
        let config = StaticConfig::default()
            .with("EVENT_CHANNELS", json!({"events": {"PGR_CREATE": {"channels": ["WHATSAPP"]}}}))
            .with("FEATURE_FLAGS", json!({"WHATSAPP_OUTBOUND_ENABLED": true}))
            .with(
                "TEMPLATE_BINDINGS",
                json!({"bindings": [{"eventType": "PGR_CREATE", "channel": "WHATSAPP", "templateCode": "T"}]}),
            )
            .with("T", json!({"templates": {"en_IN": "hi"}}));
        let h = harness(config, StaticPreferences::granted(None), None);
        h.clock.set(night());

        for _ in 0..100 {
            assert_eq!(h.orchestrator.process(event()).await.status, OutcomeStatus::Simulated);
        }
        assert_eq!(h.orchestrator.process(event()).await.status, OutcomeStatus::RateLimited);
    }

    // ── Consent ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_preference_is_skipped_but_spends_budget() {
        let h = harness(policy(), StaticPreferences::missing(), None);

        let outcome = h.orchestrator.process(event()).await;

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.reason(), Some("User has not granted WHATSAPP consent"));
        let key = RateLimitKey::new("pg.citya", "PGR_CREATE", Channel::WhatsApp);
        assert_eq!(h.orchestrator.rate_limiter().entry(&key).unwrap().count, 1);
    }

    #[tokio::test]
    async fn revoked_consent_is_never_sent() {
        let transport = Arc::new(RecordingTransport::default());
        let prefs = StaticPreferences::payload(json!({"consent": {"WHATSAPP": {"status": "REVOKED"}}}));
        let h = harness(policy(), prefs, Some(transport.clone()));

        assert_eq!(h.orchestrator.process(event()).await.status, OutcomeStatus::Skipped);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn preference_failure_is_error_not_consent() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness(policy(), StaticPreferences::failing(), Some(transport.clone()));

        let outcome = h.orchestrator.process(event()).await;

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn recipient_without_identifiers_is_error() {
        let h = harness(policy(), StaticPreferences::granted(None), None);
        let mut anonymous = event();
        anonymous.recipient = Recipient::default();

        let outcome = h.orchestrator.process(anonymous).await;

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.transaction_id.as_str().contains("-unknown-"));
    }

    // ── Language & templates ────────────────────────────────────────

    #[tokio::test]
    async fn user_language_wins() {
        let h = harness(policy(), StaticPreferences::granted(Some("hi_IN")), None);
        let outcome = h.orchestrator.process(event()).await;
        assert_eq!(outcome.message(), Some("Namaste Asha"));
    }

    #[tokio::test]
    async fn unknown_locale_falls_back_to_default_text() {
        let h = harness(policy(), StaticPreferences::granted(Some("ta_IN")), None);
        let outcome = h.orchestrator.process(event()).await;
        assert_eq!(outcome.message(), Some("Hello Asha, complaint C-100 received"));
    }

    #[tokio::test]
    async fn missing_binding_is_error() {
        let config = policy().with("TEMPLATE_BINDINGS", json!({"bindings": []}));
        let h = harness(config, StaticPreferences::granted(None), None);
        let outcome = h.orchestrator.process(event()).await;
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.reason().unwrap().contains("No template binding"));
    }

    #[tokio::test]
    async fn missing_template_text_is_error() {
        let config = policy().with("PGR_CREATE_WA", json!({"templates": {"ta_IN": "x"}}));
        let h = harness(config, StaticPreferences::granted(None), None);
        let outcome = h.orchestrator.process(event()).await;
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.reason().unwrap().contains("Template content not found"));
    }

    #[tokio::test]
    async fn transport_failure_reports_transport_reason() {
        let transport = Arc::new(RecordingTransport::failing("WhatsApp not connected"));
        let h = harness(policy(), StaticPreferences::granted(None), Some(transport));
        let outcome = h.orchestrator.process(event()).await;
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(outcome.reason(), Some("WhatsApp not connected"));
    }

    #[test]
    fn locale_candidates_first_match_wins() {
        assert_eq!(resolve_locale(&[Some("hi_IN"), Some("kn_IN")]), "hi_IN");
        assert_eq!(resolve_locale(&[None, Some("kn_IN")]), "kn_IN");
        assert_eq!(resolve_locale(&[Some(""), None]), FALLBACK_LOCALE);
        assert_eq!(resolve_locale(&[]), FALLBACK_LOCALE);
    }

    // ── Delegated workflow ──────────────────────────────────────────

    fn workflow_harness(engine: Arc<RecordingWorkflow>) -> NotificationOrchestrator {
        let config: Arc<StaticConfig> = Arc::new(policy());
        let dispatcher = ChannelDispatcher::workflow(
            engine,
            crate::config::default_workflow_map(),
            "http://baileys:8203/baileys/novu-webhook",
        );
        let deps = OrchestratorDeps {
            config,
            preferences: Arc::new(StaticPreferences::granted(Some("hi_IN"))),
            rate_limiter: Arc::new(RateLimiter::new()),
            dispatcher: Arc::new(dispatcher),
            clock: Arc::new(FixedClock::at(midday())),
        };
        NotificationOrchestrator::new(deps, Channel::WhatsApp, 330)
    }

    #[tokio::test]
    async fn workflow_trigger_carries_raw_data_and_locale() {
        let engine = Arc::new(RecordingWorkflow::default());
        let orchestrator = workflow_harness(engine.clone());

        let outcome = orchestrator.process(event()).await;

        assert_eq!(outcome.status, OutcomeStatus::Sent);
        let details = outcome.details.clone().unwrap();
        assert_eq!(details["workflow"], "pgr-complaint-created");
        assert_eq!(details["subscriberId"], "phone_919876543210");
        assert_eq!(details["registration"], "registered");

        let triggered = engine.triggered.lock().unwrap();
        let (workflow_id, request) = &triggered[0];
        assert_eq!(workflow_id, "pgr-complaint-created");
        assert_eq!(request.payload["name"], "Asha");
        assert_eq!(request.payload["locale"], "hi_IN");
        assert_eq!(request.payload["phoneNumber"], "+919876543210");
        assert_eq!(request.transaction_id, outcome.transaction_id.as_str());

        let credentials = engine.credentials.lock().unwrap();
        assert_eq!(credentials[0].1, "chat-webhook");
        assert_eq!(
            credentials[0].2["webhookUrl"],
            "http://baileys:8203/baileys/novu-webhook"
        );
    }

    #[tokio::test]
    async fn registration_failure_does_not_block_trigger() {
        let engine = Arc::new(RecordingWorkflow {
            fail_registration: true,
            ..Default::default()
        });
        let orchestrator = workflow_harness(engine.clone());

        let outcome = orchestrator.process(event()).await;

        assert_eq!(outcome.status, OutcomeStatus::Sent);
        assert_eq!(outcome.details.unwrap()["registration"], "failed");
        assert_eq!(engine.triggered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trigger_failure_is_error() {
        let engine = Arc::new(RecordingWorkflow {
            fail_trigger: true,
            ..Default::default()
        });
        let outcome = workflow_harness(engine).process(event()).await;
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.reason().unwrap().contains("trigger failed"));
    }

    #[tokio::test]
    async fn unmapped_workflow_is_error() {
        let engine = Arc::new(RecordingWorkflow::default());
        let config = Arc::new(policy().with(
            "EVENT_CHANNELS",
            json!({"events": {"TL_APPLY": {"channels": ["WHATSAPP"]}}}),
        ));
        let dispatcher = ChannelDispatcher::workflow(
            engine.clone(),
            crate::config::default_workflow_map(),
            "http://x/baileys/novu-webhook",
        );
        let deps = OrchestratorDeps {
            config,
            preferences: Arc::new(StaticPreferences::granted(None)),
            rate_limiter: Arc::new(RateLimiter::new()),
            dispatcher: Arc::new(dispatcher),
            clock: Arc::new(FixedClock::at(midday())),
        };
        let orchestrator = NotificationOrchestrator::new(deps, Channel::WhatsApp, 330);
        let mut tl = event();
        tl.event_type = "TL_APPLY".into();

        let outcome = orchestrator.process(tl).await;

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(outcome.reason(), Some("No workflow mapped for event: TL_APPLY"));
        assert!(engine.triggered.lock().unwrap().is_empty());
    }
}
