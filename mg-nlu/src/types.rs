use serde::{Deserialize, Serialize};

/// Sentiment of the query text as reported by the backend.
///
/// A score of exactly `0.0` is a legitimate neutral reading. "No sentiment
/// computed" is expressed as `NluResult::sentiment == None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentScore {
    pub score: f64,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardButton {
    pub text: String,
    /// Postback payload or URL, as configured in the agent.
    #[serde(default)]
    pub postback: String,
}

/// One rich response message from the agent's fulfillment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FulfillmentMessage {
    Text {
        lines: Vec<String>,
    },
    QuickReplies {
        title: String,
        replies: Vec<String>,
    },
    Image {
        image_uri: String,
    },
    Card {
        title: String,
        #[serde(default)]
        subtitle: String,
        #[serde(default)]
        image_uri: String,
        #[serde(default)]
        buttons: Vec<CardButton>,
    },
    /// Platform-specific custom payload, forwarded untouched.
    Payload {
        payload: serde_json::Value,
    },
    Unsupported {
        raw: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NluResult {
    pub query_text: String,
    pub fulfillment_text: String,
    #[serde(default)]
    pub structured_messages: Vec<FulfillmentMessage>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub output_contexts: Vec<serde_json::Value>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub sentiment: Option<SentimentScore>,
}

impl NluResult {
    /// The action name, if the agent matched an intent with a non-empty action.
    pub fn action_name(&self) -> Option<&str> {
        self.action
            .as_deref()
            .map(str::trim)
            .filter(|action| !action.is_empty())
    }
}
