use crate::dialogflow::{DetectIntentRequest, DetectIntentResponse};
use crate::error::{NluError, Result};
use crate::types::NluResult;
use async_trait::async_trait;

const DIALOGFLOW_API_BASE: &str = "https://dialogflow.googleapis.com/v2";

/// Black-box query/response service the gateway talks to.
#[async_trait]
pub trait NluBackend: Send + Sync {
    /// Run one conversational turn scoped to `session_id`.
    async fn query(&self, session_id: &str, text: &str) -> Result<NluResult>;
}

#[derive(Clone)]
pub struct DialogflowClient {
    http: reqwest::Client,
    project_id: String,
    access_token: String,
    language_code: String,
    api_base: String,
}

impl DialogflowClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(project_id: &str, access_token: &str, language_code: &str) -> Result<Self> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(NluError::InvalidInput(
                "dialogflow project id is required".to_string(),
            ));
        }
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(NluError::InvalidInput(
                "dialogflow access token is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            project_id: project_id.to_string(),
            access_token: access_token.to_string(),
            language_code: language_code.trim().to_string(),
            api_base: DIALOGFLOW_API_BASE.to_string(),
        })
    }

    /// Point the client at a different API root (regional endpoints, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn detect_intent_url(&self, session_id: &str) -> String {
        format!(
            "{}/projects/{}/agent/sessions/{}:detectIntent",
            self.api_base, self.project_id, session_id
        )
    }
}

#[async_trait]
impl NluBackend for DialogflowClient {
    #[tracing::instrument(level = "info", skip_all, fields(session_id = %session_id))]
    async fn query(&self, session_id: &str, text: &str) -> Result<NluResult> {
        if session_id.trim().is_empty() {
            return Err(NluError::InvalidInput("session id is empty".to_string()));
        }
        if text.trim().is_empty() {
            return Err(NluError::InvalidInput("query text is empty".to_string()));
        }

        let req = DetectIntentRequest::new(text, &self.language_code, true);
        let response = self
            .http
            .post(self.detect_intent_url(session_id))
            .bearer_auth(&self.access_token)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(NluError::Http(format!(
                "dialogflow detectIntent status={status} body={body}"
            )));
        }

        let parsed: DetectIntentResponse = serde_json::from_str(&body)?;
        let result: NluResult = parsed.try_into()?;
        tracing::debug!(
            action = ?result.action,
            has_sentiment = result.sentiment.is_some(),
            messages = result.structured_messages.len(),
            "dialogflow query completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_missing_credentials() {
        assert!(matches!(
            DialogflowClient::new(" ", "token", "en-US"),
            Err(NluError::InvalidInput(_))
        ));
        assert!(matches!(
            DialogflowClient::new("project", "", "en-US"),
            Err(NluError::InvalidInput(_))
        ));
    }

    #[test]
    fn detect_intent_url_is_scoped_to_session() {
        let client = DialogflowClient::new("my-agent", "token", "en-US")
            .expect("client")
            .with_api_base("http://localhost:9000/v2/");
        assert_eq!(
            client.detect_intent_url("abc-123"),
            "http://localhost:9000/v2/projects/my-agent/agent/sessions/abc-123:detectIntent"
        );
    }

    #[tokio::test]
    async fn query_rejects_empty_text_before_sending() {
        let client = DialogflowClient::new("my-agent", "token", "en-US").expect("client");
        let err = client.query("abc", "   ").await.expect_err("empty text");
        assert!(matches!(err, NluError::InvalidInput(_)));
    }
}
