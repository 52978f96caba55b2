//! Dialogflow v2 wire format.

use crate::error::{NluError, Result};
use crate::types::{CardButton, FulfillmentMessage, NluResult, SentimentScore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DetectIntentRequest<'a> {
    query_input: QueryInput<'a>,
    query_params: QueryParams,
}

impl<'a> DetectIntentRequest<'a> {
    pub(crate) fn new(text: &'a str, language_code: &'a str, analyze_sentiment: bool) -> Self {
        Self {
            query_input: QueryInput {
                text: TextInput {
                    text,
                    language_code,
                },
            },
            query_params: QueryParams {
                sentiment_analysis_request_config: SentimentAnalysisRequestConfig {
                    analyze_query_text_sentiment: analyze_sentiment,
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryInput<'a> {
    text: TextInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextInput<'a> {
    text: &'a str,
    language_code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParams {
    sentiment_analysis_request_config: SentimentAnalysisRequestConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SentimentAnalysisRequestConfig {
    analyze_query_text_sentiment: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DetectIntentResponse {
    #[serde(default)]
    query_result: Option<QueryResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    #[serde(default)]
    query_text: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    parameters: serde_json::Value,
    #[serde(default)]
    fulfillment_text: String,
    #[serde(default)]
    fulfillment_messages: Vec<serde_json::Value>,
    #[serde(default)]
    output_contexts: Vec<serde_json::Value>,
    #[serde(default)]
    sentiment_analysis_result: Option<SentimentAnalysisResult>,
}

// The backend omits zero-valued fields, so a neutral reading arrives as an
// empty `queryTextSentiment` object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentimentAnalysisResult {
    #[serde(default)]
    query_text_sentiment: Option<Sentiment>,
}

#[derive(Debug, Default, Deserialize)]
struct Sentiment {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    magnitude: f64,
}

impl TryFrom<DetectIntentResponse> for NluResult {
    type Error = NluError;

    fn try_from(resp: DetectIntentResponse) -> Result<Self> {
        let result = resp
            .query_result
            .ok_or_else(|| NluError::ResponseFormat("missing queryResult".to_string()))?;

        let sentiment = result.sentiment_analysis_result.map(|analysis| {
            let sentiment = analysis.query_text_sentiment.unwrap_or_default();
            SentimentScore {
                score: sentiment.score,
                magnitude: sentiment.magnitude,
            }
        });

        Ok(NluResult {
            query_text: result.query_text,
            fulfillment_text: result.fulfillment_text,
            structured_messages: result
                .fulfillment_messages
                .into_iter()
                .map(decode_fulfillment_message)
                .collect(),
            action: result.action,
            output_contexts: result.output_contexts,
            parameters: result.parameters,
            sentiment,
        })
    }
}

fn decode_fulfillment_message(raw: serde_json::Value) -> FulfillmentMessage {
    if let Some(text) = raw.get("text") {
        let lines = string_list(text.get("text"));
        return FulfillmentMessage::Text { lines };
    }
    if let Some(quick) = raw.get("quickReplies") {
        return FulfillmentMessage::QuickReplies {
            title: string_field(quick, "title"),
            replies: string_list(quick.get("quickReplies")),
        };
    }
    if let Some(image) = raw.get("image") {
        return FulfillmentMessage::Image {
            image_uri: string_field(image, "imageUri"),
        };
    }
    if let Some(card) = raw.get("card") {
        let buttons = card
            .get("buttons")
            .and_then(|v| v.as_array())
            .map(|buttons| {
                buttons
                    .iter()
                    .map(|b| CardButton {
                        text: string_field(b, "text"),
                        postback: string_field(b, "postback"),
                    })
                    .collect()
            })
            .unwrap_or_default();
        return FulfillmentMessage::Card {
            title: string_field(card, "title"),
            subtitle: string_field(card, "subtitle"),
            image_uri: string_field(card, "imageUri"),
            buttons,
        };
    }
    if let Some(payload) = raw.get("payload") {
        return FulfillmentMessage::Payload {
            payload: payload.clone(),
        };
    }
    FulfillmentMessage::Unsupported { raw }
}

fn string_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(body: serde_json::Value) -> NluResult {
        let resp: DetectIntentResponse = serde_json::from_value(body).expect("response json");
        resp.try_into().expect("nlu result")
    }

    #[test]
    fn request_enables_query_text_sentiment() {
        let req = DetectIntentRequest::new("hello", "en-US", true);
        let body = serde_json::to_value(&req).expect("request json");
        assert_eq!(body["queryInput"]["text"]["text"], "hello");
        assert_eq!(body["queryInput"]["text"]["languageCode"], "en-US");
        assert_eq!(
            body["queryParams"]["sentimentAnalysisRequestConfig"]["analyzeQueryTextSentiment"],
            true
        );
    }

    #[test]
    fn missing_sentiment_result_is_none() {
        let result = decode(json!({
            "queryResult": { "queryText": "hi", "fulfillmentText": "Hello!" }
        }));
        assert_eq!(result.query_text, "hi");
        assert_eq!(result.fulfillment_text, "Hello!");
        assert!(result.sentiment.is_none());
    }

    #[test]
    fn empty_sentiment_object_is_a_neutral_reading() {
        let result = decode(json!({
            "queryResult": {
                "queryText": "ok",
                "sentimentAnalysisResult": { "queryTextSentiment": {} }
            }
        }));
        assert_eq!(
            result.sentiment,
            Some(SentimentScore {
                score: 0.0,
                magnitude: 0.0
            })
        );
    }

    #[test]
    fn decodes_negative_sentiment_and_action() {
        let result = decode(json!({
            "queryResult": {
                "queryText": "this is useless",
                "action": "input.unknown",
                "parameters": { "color": "red" },
                "sentimentAnalysisResult": {
                    "queryTextSentiment": { "score": -0.7, "magnitude": 0.7 }
                }
            }
        }));
        assert_eq!(result.action_name(), Some("input.unknown"));
        assert_eq!(result.parameters["color"], "red");
        let sentiment = result.sentiment.expect("sentiment");
        assert!((sentiment.score + 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn decodes_rich_fulfillment_messages() {
        let result = decode(json!({
            "queryResult": {
                "fulfillmentMessages": [
                    { "text": { "text": ["one", "two"] } },
                    { "quickReplies": { "title": "Pick", "quickReplies": ["a", "b"] } },
                    { "image": { "imageUri": "https://example.com/a.png" } },
                    { "card": {
                        "title": "Card",
                        "buttons": [{ "text": "Go", "postback": "GO" }]
                    } },
                    { "payload": { "facebook": { "text": "custom" } } },
                    { "platform": "SLACK" }
                ]
            }
        }));
        let messages = &result.structured_messages;
        assert_eq!(messages.len(), 6);
        assert_eq!(
            messages[0],
            FulfillmentMessage::Text {
                lines: vec!["one".to_string(), "two".to_string()]
            }
        );
        assert!(matches!(
            &messages[1],
            FulfillmentMessage::QuickReplies { replies, .. } if replies.len() == 2
        ));
        assert!(matches!(&messages[3], FulfillmentMessage::Card { buttons, .. } if buttons[0].postback == "GO"));
        assert!(matches!(&messages[4], FulfillmentMessage::Payload { .. }));
        assert!(matches!(&messages[5], FulfillmentMessage::Unsupported { .. }));
    }

    #[test]
    fn missing_query_result_is_a_format_error() {
        let resp: DetectIntentResponse =
            serde_json::from_value(json!({ "responseId": "x" })).expect("response json");
        let err = NluResult::try_from(resp).expect_err("should fail");
        assert!(matches!(err, NluError::ResponseFormat(_)));
    }
}
