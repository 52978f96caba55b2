//! Routes one inbound event to its handling path.

use crate::error::GatewayError;
use crate::responder::{FALLBACK_TEXT, ResponseRouter, Route};
use crate::session::SessionRegistry;
use mg_messenger::{InboundEvent, MessengerTransport, ParticipantId, ProfileFetcher};
use mg_nlu::NluBackend;
use std::sync::Arc;

pub const GET_STARTED_PAYLOAD: &str = "GET_STARTED";
/// Query sent for the "Get Started" button; lands on the agent's welcome intent.
const GET_STARTED_QUERY: &str = "hello";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    EchoAcknowledged,
    Answered(Route),
    NluFailed,
    AttachmentsHandled,
    PostbackFallback,
    Observed,
}

pub struct IntentDispatcher {
    sessions: Arc<SessionRegistry>,
    profiles: Arc<dyn ProfileFetcher>,
    nlu: Arc<dyn NluBackend>,
    transport: Arc<dyn MessengerTransport>,
    responder: Arc<ResponseRouter>,
}

impl IntentDispatcher {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        profiles: Arc<dyn ProfileFetcher>,
        nlu: Arc<dyn NluBackend>,
        transport: Arc<dyn MessengerTransport>,
        responder: Arc<ResponseRouter>,
    ) -> Self {
        Self {
            sessions,
            profiles,
            nlu,
            transport,
            responder,
        }
    }

    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(kind = event.kind(), sender_id = %event.sender_id())
    )]
    pub async fn dispatch(&self, event: InboundEvent) -> Outcome {
        let participant = event.sender_id();
        self.sessions.ensure(participant);
        self.sessions
            .ensure_profile(participant, self.profiles.clone());

        match event {
            InboundEvent::Echo {
                message_id,
                app_id,
                metadata,
                ..
            } => {
                if let Err(e) = self
                    .transport
                    .handle_echo(&message_id, app_id.as_deref(), metadata.as_deref())
                    .await
                {
                    tracing::warn!(error = %format!("{e:#}"), "echo handling failed");
                }
                Outcome::EchoAcknowledged
            }
            InboundEvent::QuickReply {
                envelope, payload, ..
            } => {
                // No quick-reply payload has a dedicated handler yet; the
                // payload is the query.
                self.query(&envelope.sender_id, &payload).await
            }
            InboundEvent::TextMessage { envelope, text, .. } => {
                self.query(&envelope.sender_id, &text).await
            }
            InboundEvent::AttachmentMessage {
                envelope,
                attachments,
                ..
            } => {
                if let Err(e) = self
                    .transport
                    .handle_attachments(&envelope.sender_id, &attachments)
                    .await
                {
                    let error = GatewayError::transport("attachments", &envelope.sender_id, e);
                    tracing::warn!(error = %error, error_kind = error.kind(), "attachment handling failed");
                }
                Outcome::AttachmentsHandled
            }
            InboundEvent::Postback {
                envelope, payload, ..
            } => {
                tracing::info!(
                    sender_id = %envelope.sender_id,
                    recipient_id = %envelope.recipient_id,
                    payload = %payload,
                    timestamp = envelope.timestamp,
                    "received postback"
                );
                match payload.as_str() {
                    GET_STARTED_PAYLOAD => self.query(&envelope.sender_id, GET_STARTED_QUERY).await,
                    _ => {
                        if let Err(e) = self
                            .transport
                            .send_text(&envelope.sender_id, FALLBACK_TEXT)
                            .await
                        {
                            let error = GatewayError::transport("send_text", &envelope.sender_id, e);
                            tracing::warn!(error = %error, error_kind = error.kind(), "postback fallback failed");
                        }
                        Outcome::PostbackFallback
                    }
                }
            }
            InboundEvent::PassThreadControl {
                envelope,
                new_owner_app_id,
                metadata,
            } => {
                tracing::info!(
                    sender_id = %envelope.sender_id,
                    new_owner_app_id = ?new_owner_app_id,
                    metadata = ?metadata,
                    "thread control passed to bot"
                );
                Outcome::Observed
            }
            InboundEvent::Unknown { envelope, raw } => {
                let error = GatewayError::UnknownEventShape(raw.to_string());
                tracing::info!(
                    sender_id = %envelope.sender_id,
                    error = %error,
                    "webhook received unknown messaging event"
                );
                Outcome::Observed
            }
        }
    }

    async fn query(&self, participant: &ParticipantId, text: &str) -> Outcome {
        let session = self.sessions.ensure(participant);
        if let Err(e) = self.transport.send_typing(participant, true).await {
            tracing::debug!(error = %format!("{e:#}"), "typing_on failed");
        }

        match self
            .nlu
            .query(&session.session_id.to_string(), text)
            .await
        {
            Ok(result) => Outcome::Answered(self.responder.respond(participant, result).await),
            Err(source) => {
                let error = GatewayError::NluQuery {
                    participant: participant.clone(),
                    source,
                };
                tracing::warn!(error = %error, error_kind = error.kind(), "turn dropped");
                Outcome::NluFailed
            }
        }
    }
}
