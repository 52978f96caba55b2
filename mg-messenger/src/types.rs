use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Page-scoped id of an end user.
id_newtype!(ParticipantId);
id_newtype!(PageId);
id_newtype!(MessageId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// `image`, `audio`, `video`, `file`, `location`, `fallback`, ...
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Routing fields shared by every messaging event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sender_id: ParticipantId,
    pub recipient_id: PageId,
    /// Milliseconds since the Unix epoch, as sent by the platform.
    pub timestamp: i64,
}

impl EventEnvelope {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    TextMessage {
        envelope: EventEnvelope,
        message_id: MessageId,
        text: String,
    },
    AttachmentMessage {
        envelope: EventEnvelope,
        message_id: MessageId,
        attachments: Vec<Attachment>,
    },
    QuickReply {
        envelope: EventEnvelope,
        message_id: MessageId,
        payload: String,
    },
    /// Delivery notice for a message the page itself sent.
    Echo {
        envelope: EventEnvelope,
        message_id: MessageId,
        app_id: Option<String>,
        metadata: Option<String>,
    },
    Postback {
        envelope: EventEnvelope,
        title: Option<String>,
        payload: String,
    },
    PassThreadControl {
        envelope: EventEnvelope,
        new_owner_app_id: Option<String>,
        metadata: Option<String>,
    },
    Unknown {
        envelope: EventEnvelope,
        raw: serde_json::Value,
    },
}

impl InboundEvent {
    pub fn envelope(&self) -> &EventEnvelope {
        match self {
            Self::TextMessage { envelope, .. }
            | Self::AttachmentMessage { envelope, .. }
            | Self::QuickReply { envelope, .. }
            | Self::Echo { envelope, .. }
            | Self::Postback { envelope, .. }
            | Self::PassThreadControl { envelope, .. }
            | Self::Unknown { envelope, .. } => envelope,
        }
    }

    pub fn sender_id(&self) -> &ParticipantId {
        &self.envelope().sender_id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextMessage { .. } => "text_message",
            Self::AttachmentMessage { .. } => "attachment_message",
            Self::QuickReply { .. } => "quick_reply",
            Self::Echo { .. } => "echo",
            Self::Postback { .. } => "postback",
            Self::PassThreadControl { .. } => "pass_thread_control",
            Self::Unknown { .. } => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub participant_id: ParticipantId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub raw_profile: Option<serde_json::Value>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickReplyOption {
    pub title: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateButton {
    Postback { title: String, payload: String },
    WebUrl { title: String, url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateElement {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub buttons: Vec<TemplateButton>,
}

/// A message body the Send API understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text {
        text: String,
    },
    QuickReplies {
        text: String,
        replies: Vec<QuickReplyOption>,
    },
    Image {
        url: String,
    },
    GenericTemplate {
        elements: Vec<TemplateElement>,
    },
    /// Already in Send API `message` shape.
    Raw {
        message: serde_json::Value,
    },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The `message` object of a Send API request.
    pub fn to_send_api_message(&self) -> serde_json::Value {
        match self {
            Self::Text { text } => serde_json::json!({ "text": text }),
            Self::QuickReplies { text, replies } => serde_json::json!({
                "text": text,
                "quick_replies": replies
                    .iter()
                    .map(|r| serde_json::json!({
                        "content_type": "text",
                        "title": r.title,
                        "payload": r.payload,
                    }))
                    .collect::<Vec<_>>(),
            }),
            Self::Image { url } => serde_json::json!({
                "attachment": {
                    "type": "image",
                    "payload": { "url": url, "is_reusable": true }
                }
            }),
            Self::GenericTemplate { elements } => serde_json::json!({
                "attachment": {
                    "type": "template",
                    "payload": {
                        "template_type": "generic",
                        "elements": elements.iter().map(template_element_json).collect::<Vec<_>>(),
                    }
                }
            }),
            Self::Raw { message } => message.clone(),
        }
    }
}

fn template_element_json(element: &TemplateElement) -> serde_json::Value {
    let mut out = serde_json::json!({ "title": element.title });
    if let Some(subtitle) = element.subtitle.as_deref().filter(|s| !s.is_empty()) {
        out["subtitle"] = serde_json::json!(subtitle);
    }
    if let Some(image_url) = element.image_url.as_deref().filter(|s| !s.is_empty()) {
        out["image_url"] = serde_json::json!(image_url);
    }
    if !element.buttons.is_empty() {
        out["buttons"] = element
            .buttons
            .iter()
            .map(|button| match button {
                TemplateButton::Postback { title, payload } => serde_json::json!({
                    "type": "postback",
                    "title": title,
                    "payload": payload,
                }),
                TemplateButton::WebUrl { title, url } => serde_json::json!({
                    "type": "web_url",
                    "title": title,
                    "url": url,
                }),
            })
            .collect();
    }
    out
}
