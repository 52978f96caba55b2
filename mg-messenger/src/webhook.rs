//! Normalizes batched webhook deliveries into individual `InboundEvent`s.

use crate::types::{Attachment, EventEnvelope, InboundEvent, MessageId, PageId, ParticipantId};
use serde::Deserialize;

const PAGE_OBJECT: &str = "page";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    /// Decoded one entry at a time so a single odd entry cannot void the batch.
    #[serde(default)]
    pub entry: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    /// Present while the bot owns the thread.
    #[serde(default)]
    pub messaging: Option<Vec<serde_json::Value>>,
    /// Present while another app (e.g. the page inbox) owns the thread.
    #[serde(default)]
    pub standby: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    /// Dispatchable events, in delivery order.
    pub events: Vec<InboundEvent>,
    /// Page entries or messaging events whose shape could not be decoded.
    pub skipped: usize,
    /// Standby-channel events observed but not dispatched.
    pub standby: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookIngestor;

impl WebhookIngestor {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn ingest(&self, payload: WebhookPayload) -> IngestReport {
        let mut report = IngestReport::default();
        if payload.object != PAGE_OBJECT {
            tracing::warn!(object = %payload.object, "ignoring webhook for non-page object");
            return report;
        }

        for raw_entry in payload.entry {
            let entry = match serde_json::from_value::<PageEntry>(raw_entry) {
                Ok(entry) => entry,
                Err(error) => {
                    report.skipped += 1;
                    tracing::warn!(error = %error, "skipping page entry with unknown shape");
                    continue;
                }
            };
            if let Some(standby) = entry.standby.as_ref() {
                for event in standby {
                    report.standby += 1;
                    tracing::debug!(
                        page_id = %entry.id,
                        sender_id = ?event.pointer("/sender/id"),
                        "standby event observed"
                    );
                }
            }

            let Some(messaging) = entry.messaging else {
                continue;
            };
            for raw in messaging {
                match classify(raw) {
                    Ok(event) => report.events.push(event),
                    Err(error) => {
                        report.skipped += 1;
                        tracing::warn!(
                            page_id = %entry.id,
                            entry_time = entry.time,
                            error = %error,
                            "skipping messaging event with unknown shape"
                        );
                    }
                }
            }
        }
        report
    }
}

#[derive(Debug, Deserialize)]
struct RawMessagingEvent {
    sender: RawParty,
    recipient: RawParty,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    postback: Option<RawPostback>,
    #[serde(default)]
    pass_thread_control: Option<RawPassThreadControl>,
}

#[derive(Debug, Deserialize)]
struct RawParty {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    mid: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
    #[serde(default)]
    app_id: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<String>,
    #[serde(default)]
    quick_reply: Option<RawQuickReply>,
    #[serde(default)]
    attachments: Option<Vec<RawAttachment>>,
}

#[derive(Debug, Deserialize)]
struct RawQuickReply {
    payload: String,
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawPostback {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    payload: String,
}

#[derive(Debug, Deserialize)]
struct RawPassThreadControl {
    #[serde(default)]
    new_owner_app_id: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<String>,
}

fn classify(raw: serde_json::Value) -> Result<InboundEvent, serde_json::Error> {
    let decoded: RawMessagingEvent = serde_json::from_value(raw.clone())?;
    let envelope = EventEnvelope {
        sender_id: ParticipantId::new(decoded.sender.id),
        recipient_id: PageId::new(decoded.recipient.id),
        timestamp: decoded.timestamp,
    };

    if let Some(message) = decoded.message {
        return Ok(classify_message(envelope, message, raw));
    }
    if let Some(postback) = decoded.postback {
        return Ok(InboundEvent::Postback {
            envelope,
            title: postback.title,
            payload: postback.payload,
        });
    }
    if let Some(control) = decoded.pass_thread_control {
        return Ok(InboundEvent::PassThreadControl {
            envelope,
            new_owner_app_id: control.new_owner_app_id.as_ref().map(json_id_to_string),
            metadata: control.metadata,
        });
    }
    Ok(InboundEvent::Unknown { envelope, raw })
}

// A message carries text or attachments, never both.
fn classify_message(
    envelope: EventEnvelope,
    message: RawMessage,
    raw: serde_json::Value,
) -> InboundEvent {
    let message_id = MessageId::new(message.mid);
    if message.is_echo {
        return InboundEvent::Echo {
            envelope,
            message_id,
            app_id: message.app_id.as_ref().map(json_id_to_string),
            metadata: message.metadata,
        };
    }
    if let Some(quick_reply) = message.quick_reply {
        return InboundEvent::QuickReply {
            envelope,
            message_id,
            payload: quick_reply.payload,
        };
    }
    if let Some(text) = message.text.filter(|t| !t.is_empty()) {
        return InboundEvent::TextMessage {
            envelope,
            message_id,
            text,
        };
    }
    if let Some(attachments) = message.attachments.filter(|a| !a.is_empty()) {
        return InboundEvent::AttachmentMessage {
            envelope,
            message_id,
            attachments: attachments
                .into_iter()
                .map(|a| Attachment {
                    url: a
                        .payload
                        .get("url")
                        .and_then(|u| u.as_str())
                        .map(ToOwned::to_owned),
                    kind: a.kind,
                    payload: a.payload,
                })
                .collect(),
        };
    }
    InboundEvent::Unknown { envelope, raw }
}

// Graph ids arrive as numbers in some events and strings in others.
fn json_id_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
