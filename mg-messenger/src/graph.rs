use crate::traits::MessengerTransport;
use crate::types::{OutboundMessage, ParticipantId};
use anyhow::{Result, anyhow};
use reqwest::Url;

pub(crate) const GRAPH_API_BASE: &str = "https://graph.facebook.com/v3.2";

/// App id of the Page Inbox, the default secondary receiver for hand-over.
pub const PAGE_INBOX_APP_ID: &str = "263902037430900";

/// Send API client acting on behalf of one page.
#[derive(Clone)]
pub struct GraphMessengerAdapter {
    http: reqwest::Client,
    page_access_token: String,
    api_base: String,
    handover_app_id: String,
}

impl GraphMessengerAdapter {
    pub fn new(page_access_token: &str) -> Result<Self> {
        let page_access_token = page_access_token.trim();
        if page_access_token.is_empty() {
            return Err(anyhow!("page access token is required"));
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            page_access_token: page_access_token.to_string(),
            api_base: GRAPH_API_BASE.to_string(),
            handover_app_id: PAGE_INBOX_APP_ID.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_handover_app_id(mut self, app_id: impl Into<String>) -> Self {
        let app_id = app_id.into();
        if !app_id.trim().is_empty() {
            self.handover_app_id = app_id.trim().to_string();
        }
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}/me/{path}", self.api_base),
            &[("access_token", self.page_access_token.as_str())],
        )
        .map_err(|e| anyhow!("invalid graph API URL: {e}"))
    }

    async fn post(&self, path: &str, payload: serde_json::Value) -> Result<()> {
        let url = self.endpoint(path)?;
        let response = self.http.post(url).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!(
                "graph {path} failed: status={} body={}",
                status,
                body
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessengerTransport for GraphMessengerAdapter {
    #[tracing::instrument(level = "debug", skip_all, fields(recipient = %recipient))]
    async fn send_message(
        &self,
        recipient: &ParticipantId,
        message: &OutboundMessage,
    ) -> Result<()> {
        let to = recipient.trim();
        if to.is_empty() {
            return Err(anyhow!("recipient id is required"));
        }
        if let OutboundMessage::Text { text } = message {
            if text.trim().is_empty() {
                return Err(anyhow!("message text is empty"));
            }
        }
        self.post(
            "messages",
            serde_json::json!({
                "recipient": { "id": to },
                "message": message.to_send_api_message(),
            }),
        )
        .await
    }

    async fn send_typing(&self, recipient: &ParticipantId, active: bool) -> Result<()> {
        let action = if active { "typing_on" } else { "typing_off" };
        self.post(
            "messages",
            serde_json::json!({
                "recipient": { "id": recipient.as_str() },
                "sender_action": action,
            }),
        )
        .await
    }

    #[tracing::instrument(level = "info", skip_all, fields(recipient = %recipient))]
    async fn pass_thread_control(&self, recipient: &ParticipantId) -> Result<()> {
        self.post(
            "pass_thread_control",
            serde_json::json!({
                "recipient": { "id": recipient.as_str() },
                "target_app_id": self.handover_app_id,
                "metadata": "escalated by moodgate: negative sentiment",
            }),
        )
        .await?;
        tracing::info!(target_app_id = %self.handover_app_id, "thread control passed");
        Ok(())
    }
}
