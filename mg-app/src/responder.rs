//! Chooses the single outbound action for a completed NLU turn.
//!
//! The sentiment decision is made first, then the route is picked from
//! `ROUTE_RULES` top-down.

use crate::actions::{ActionContext, ActionRegistry};
use crate::config::EscalationConfig;
use crate::error::GatewayError;
use crate::escalation::{Decision, EscalationPolicy};
use crate::render::render_messages;
use crate::sentiment::{SentimentHistory, SentimentSample};
use chrono::Utc;
use mg_messenger::{MessengerTransport, ParticipantId};
use mg_nlu::NluResult;
use std::sync::Arc;

pub const SOFT_CHECK_TEXT: &str =
    "Did I say something wrong? Type help to find out how I can serve you better.";
pub const FALLBACK_TEXT: &str = "I'm not sure what you want. Can you be more specific?";

pub fn escalation_text(operator_name: &str) -> String {
    format!(
        "I sense you are not satisfied with my answers. Let me call {operator_name} for you. \
         They should be here ASAP."
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Escalate,
    SoftCheck,
    Action(String),
    StructuredMessages,
    Fallback,
    FulfillmentText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRule {
    Escalation,
    SoftCheck,
    Action,
    StructuredMessages,
    EmptyFallback,
    FulfillmentText,
}

pub const ROUTE_RULES: [RouteRule; 6] = [
    RouteRule::Escalation,
    RouteRule::SoftCheck,
    RouteRule::Action,
    RouteRule::StructuredMessages,
    RouteRule::EmptyFallback,
    RouteRule::FulfillmentText,
];

impl RouteRule {
    fn select(self, decision: Decision, result: &NluResult) -> Option<Route> {
        match self {
            Self::Escalation => (decision == Decision::Escalate).then_some(Route::Escalate),
            Self::SoftCheck => (decision == Decision::SoftCheck).then_some(Route::SoftCheck),
            Self::Action => result
                .action_name()
                .map(|action| Route::Action(action.to_string())),
            Self::StructuredMessages => {
                (!result.structured_messages.is_empty()).then_some(Route::StructuredMessages)
            }
            Self::EmptyFallback => (result.fulfillment_text.is_empty()
                && result.action_name().is_none())
            .then_some(Route::Fallback),
            Self::FulfillmentText => Some(Route::FulfillmentText),
        }
    }
}

/// Pure route selection.
pub fn select_route(decision: Decision, result: &NluResult) -> Route {
    ROUTE_RULES
        .into_iter()
        .find_map(|rule| rule.select(decision, result))
        .unwrap_or(Route::FulfillmentText)
}

pub struct ResponseRouter {
    transport: Arc<dyn MessengerTransport>,
    history: Arc<SentimentHistory>,
    policy: EscalationPolicy,
    actions: ActionRegistry,
    compare_with_history: bool,
    escalation_text: String,
}

impl ResponseRouter {
    pub fn new(
        transport: Arc<dyn MessengerTransport>,
        history: Arc<SentimentHistory>,
        actions: ActionRegistry,
        cfg: &EscalationConfig,
    ) -> Self {
        Self {
            transport,
            history,
            policy: EscalationPolicy::from_config(cfg),
            actions,
            compare_with_history: cfg.compare_with_history,
            escalation_text: escalation_text(cfg.operator_name.trim()),
        }
    }

    #[cfg(test)]
    pub fn history(&self) -> &Arc<SentimentHistory> {
        &self.history
    }

    #[tracing::instrument(level = "info", skip_all, fields(participant = %participant))]
    pub async fn respond(&self, participant: &ParticipantId, result: NluResult) -> Route {
        self.respond_at(participant, result, Utc::now().timestamp())
            .await
    }

    pub async fn respond_at(
        &self,
        participant: &ParticipantId,
        result: NluResult,
        now_seconds: i64,
    ) -> Route {
        if let Err(e) = self.transport.send_typing_off(participant).await {
            self.log_transport_error(GatewayError::transport("typing_off", participant, e));
        }

        let decision = self.assess(participant, &result, now_seconds);
        let route = select_route(decision, &result);
        tracing::info!(
            decision = ?decision,
            route = ?route,
            action = ?result.action_name(),
            "response route selected"
        );

        match &route {
            Route::Escalate => {
                self.send_text(participant, &self.escalation_text).await;
                if let Err(e) = self.transport.pass_thread_control(participant).await {
                    self.log_transport_error(GatewayError::transport(
                        "pass_thread_control",
                        participant,
                        e,
                    ));
                }
            }
            Route::SoftCheck => self.send_text(participant, SOFT_CHECK_TEXT).await,
            Route::Action(action) => self.run_action(participant, action, &result).await,
            Route::StructuredMessages => self.send_structured(participant, &result).await,
            Route::Fallback => self.send_text(participant, FALLBACK_TEXT).await,
            Route::FulfillmentText => {
                self.send_text(participant, &result.fulfillment_text).await
            }
        }
        route
    }

    /// Record this turn's sample and decide on escalation.
    fn assess(&self, participant: &ParticipantId, result: &NluResult, now_seconds: i64) -> Decision {
        let sample = SentimentSample::from_result(result, now_seconds);
        let has_result = result.sentiment.is_some();
        let previous = self.history.record(participant, sample.clone());
        let previous = if self.compare_with_history {
            previous
        } else {
            None
        };
        let (rule, decision) = self.policy.evaluate(&sample, has_result, previous.as_ref());
        tracing::debug!(
            score = sample.score,
            magnitude = sample.magnitude,
            has_result,
            previous_score = ?previous.as_ref().map(|p| p.score),
            rule = ?rule,
            "sentiment assessed"
        );
        decision
    }

    async fn run_action(&self, participant: &ParticipantId, action: &str, result: &NluResult) {
        let Some(handler) = self.actions.get(action) else {
            // Unhandled action: the agent's own messages are the answer.
            self.send_structured(participant, result).await;
            return;
        };
        let ctx = ActionContext {
            participant,
            result,
            transport: self.transport.as_ref(),
        };
        if let Err(e) = handler.handle(ctx).await {
            tracing::warn!(action = %action, error = %format!("{e:#}"), "action handler failed");
        }
    }

    async fn send_structured(&self, participant: &ParticipantId, result: &NluResult) {
        let messages = render_messages(&result.structured_messages);
        if messages.is_empty() {
            tracing::debug!("no renderable messages for this turn");
            return;
        }
        if let Err(e) = self.transport.send_structured(participant, &messages).await {
            self.log_transport_error(GatewayError::transport("send_structured", participant, e));
        }
    }

    async fn send_text(&self, participant: &ParticipantId, text: &str) {
        if let Err(e) = self.transport.send_text(participant, text).await {
            self.log_transport_error(GatewayError::transport("send_text", participant, e));
        }
    }

    fn log_transport_error(&self, error: GatewayError) {
        tracing::warn!(error = %error, error_kind = error.kind(), "outbound call failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionHandler, HANDOVER_ACTION};
    use crate::test_support::{RecordingTransport, Sent};
    use async_trait::async_trait;
    use mg_messenger::OutboundMessage;
    use mg_nlu::{FulfillmentMessage, SentimentScore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result(text: &str, action: Option<&str>, score: Option<f64>) -> NluResult {
        NluResult {
            query_text: "query".to_string(),
            fulfillment_text: text.to_string(),
            action: action.map(ToOwned::to_owned),
            sentiment: score.map(|score| SentimentScore {
                score,
                magnitude: score.abs(),
            }),
            ..NluResult::default()
        }
    }

    fn text_messages(lines: &[&str]) -> Vec<FulfillmentMessage> {
        vec![FulfillmentMessage::Text {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }]
    }

    struct Harness {
        transport: Arc<RecordingTransport>,
        router: ResponseRouter,
    }

    fn harness(actions: ActionRegistry, cfg: EscalationConfig) -> Harness {
        let transport = Arc::new(RecordingTransport::default());
        let router = ResponseRouter::new(
            transport.clone(),
            Arc::new(SentimentHistory::new(None)),
            actions,
            &cfg,
        );
        Harness { transport, router }
    }

    #[derive(Default)]
    struct CountingAction(AtomicUsize);

    #[async_trait]
    impl ActionHandler for CountingAction {
        async fn handle(&self, _ctx: ActionContext<'_>) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn route_order_is_fixed() {
        assert_eq!(
            ROUTE_RULES,
            [
                RouteRule::Escalation,
                RouteRule::SoftCheck,
                RouteRule::Action,
                RouteRule::StructuredMessages,
                RouteRule::EmptyFallback,
                RouteRule::FulfillmentText,
            ]
        );
    }

    #[test]
    fn action_beats_fulfillment_text() {
        let r = result("Hello there", Some("smalltalk.greet"), None);
        assert_eq!(
            select_route(Decision::None, &r),
            Route::Action("smalltalk.greet".to_string())
        );
    }

    #[test]
    fn sentiment_decisions_suppress_everything_else() {
        let mut r = result("Hello", Some("smalltalk.greet"), Some(-0.9));
        r.structured_messages = text_messages(&["hi"]);
        assert_eq!(select_route(Decision::Escalate, &r), Route::Escalate);
        assert_eq!(select_route(Decision::SoftCheck, &r), Route::SoftCheck);
    }

    #[test]
    fn structured_messages_beat_plain_text() {
        let mut r = result("Hello", None, None);
        r.structured_messages = text_messages(&["hi"]);
        assert_eq!(select_route(Decision::None, &r), Route::StructuredMessages);
    }

    #[test]
    fn blank_action_is_treated_as_absent() {
        assert_eq!(
            select_route(Decision::None, &result("", Some("  "), None)),
            Route::Fallback
        );
        assert_eq!(
            select_route(Decision::None, &result("Sure.", None, None)),
            Route::FulfillmentText
        );
    }

    #[tokio::test]
    async fn empty_text_without_action_sends_fallback_verbatim() {
        let h = harness(ActionRegistry::new(), EscalationConfig::default());
        let alice = ParticipantId::new("alice");
        let route = h.router.respond_at(&alice, result("", None, None), 10).await;
        assert_eq!(route, Route::Fallback);
        assert_eq!(
            h.transport.sent(),
            vec![
                Sent::Typing(alice.clone(), false),
                Sent::Text(alice, FALLBACK_TEXT.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn registered_action_runs_instead_of_text() {
        let counter = Arc::new(CountingAction::default());
        let h = harness(
            ActionRegistry::new().register("order.status", counter.clone()),
            EscalationConfig::default(),
        );
        let alice = ParticipantId::new("alice");
        h.router
            .respond_at(&alice, result("Your order shipped", Some("order.status"), None), 10)
            .await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(h.transport.replies().is_empty());
    }

    #[tokio::test]
    async fn unknown_action_renders_structured_messages() {
        let h = harness(ActionRegistry::with_builtin(), EscalationConfig::default());
        let alice = ParticipantId::new("alice");
        let mut r = result("ignored", Some("weather.lookup"), None);
        r.structured_messages = text_messages(&["Sunny", "Warm"]);
        h.router.respond_at(&alice, r, 10).await;
        assert_eq!(
            h.transport.replies(),
            vec![
                Sent::Text(alice.clone(), "Sunny".to_string()),
                Sent::Text(alice, "Warm".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn negative_turn_escalates_and_passes_thread_control() {
        let h = harness(ActionRegistry::with_builtin(), EscalationConfig::default());
        let alice = ParticipantId::new("alice");
        let route = h
            .router
            .respond_at(&alice, result("Sure.", Some(HANDOVER_ACTION), Some(-0.55)), 10)
            .await;
        assert_eq!(route, Route::Escalate);
        assert_eq!(
            h.transport.replies(),
            vec![
                Sent::Text(alice.clone(), escalation_text("a human operator")),
                Sent::PassThreadControl(alice.clone()),
            ]
        );
        assert_eq!(h.router.history().sample_count(&alice), 1);
    }

    #[tokio::test]
    async fn swing_against_previous_turn_soft_checks() {
        let h = harness(ActionRegistry::new(), EscalationConfig::default());
        let alice = ParticipantId::new("alice");
        h.router
            .respond_at(&alice, result("Great!", None, Some(0.4)), 10)
            .await;
        let route = h
            .router
            .respond_at(&alice, result("Okay.", None, Some(-0.3)), 11)
            .await;
        assert_eq!(route, Route::SoftCheck);
        assert_eq!(
            h.transport.replies().last(),
            Some(&Sent::Text(alice.clone(), SOFT_CHECK_TEXT.to_string()))
        );
        assert_eq!(h.router.history().sample_count(&alice), 2);
    }

    #[tokio::test]
    async fn history_comparison_can_be_disabled() {
        let cfg = EscalationConfig {
            compare_with_history: false,
            ..EscalationConfig::default()
        };
        let h = harness(ActionRegistry::new(), cfg);
        let alice = ParticipantId::new("alice");
        h.router
            .respond_at(&alice, result("Great!", None, Some(0.4)), 10)
            .await;
        let route = h
            .router
            .respond_at(&alice, result("Okay.", None, Some(-0.3)), 11)
            .await;
        assert_eq!(route, Route::FulfillmentText);
    }

    #[tokio::test]
    async fn turns_without_sentiment_are_still_recorded() {
        let h = harness(ActionRegistry::new(), EscalationConfig::default());
        let alice = ParticipantId::new("alice");
        let route = h.router.respond_at(&alice, result("Hi", None, None), 10).await;
        assert_eq!(route, Route::FulfillmentText);
        let samples = h.router.history().samples(&alice);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].score, 0.0);
        assert_eq!(samples[0].source_text, "query");
    }

    #[tokio::test]
    async fn structured_messages_are_rendered() {
        let h = harness(ActionRegistry::new(), EscalationConfig::default());
        let alice = ParticipantId::new("alice");
        let mut r = result("", None, None);
        r.structured_messages = vec![FulfillmentMessage::Image {
            image_uri: "https://example.com/cat.png".to_string(),
        }];
        h.router.respond_at(&alice, r, 10).await;
        assert_eq!(
            h.transport.replies(),
            vec![Sent::Message(
                alice,
                OutboundMessage::Image {
                    url: "https://example.com/cat.png".to_string()
                }
            )]
        );
    }

    #[tokio::test]
    async fn failed_sends_are_logged_not_raised() {
        let transport = Arc::new(RecordingTransport::failing());
        let router = ResponseRouter::new(
            transport.clone(),
            Arc::new(SentimentHistory::new(None)),
            ActionRegistry::new(),
            &EscalationConfig::default(),
        );
        let route = router
            .respond_at(&ParticipantId::new("alice"), result("Hi", None, None), 10)
            .await;
        assert_eq!(route, Route::FulfillmentText);
    }
}
