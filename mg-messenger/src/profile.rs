use crate::graph::GRAPH_API_BASE;
use crate::traits::ProfileFetcher;
use crate::types::{ParticipantId, UserProfile};
use anyhow::{Result, anyhow};
use chrono::Utc;
use reqwest::Url;

const PROFILE_FIELDS: &str = "first_name,last_name,profile_pic";

/// User Profile API lookups by page-scoped id.
#[derive(Clone)]
pub struct GraphProfileClient {
    http: reqwest::Client,
    page_access_token: String,
    api_base: String,
}

impl GraphProfileClient {
    pub fn new(page_access_token: &str) -> Result<Self> {
        let page_access_token = page_access_token.trim();
        if page_access_token.is_empty() {
            return Err(anyhow!("page access token is required"));
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            page_access_token: page_access_token.to_string(),
            api_base: GRAPH_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait::async_trait]
impl ProfileFetcher for GraphProfileClient {
    #[tracing::instrument(level = "debug", skip_all, fields(participant = %participant))]
    async fn fetch_profile(&self, participant: &ParticipantId) -> Result<UserProfile> {
        let url = Url::parse_with_params(
            &format!("{}/{}", self.api_base, participant.as_str()),
            &[
                ("fields", PROFILE_FIELDS),
                ("access_token", self.page_access_token.as_str()),
            ],
        )
        .map_err(|e| anyhow!("invalid graph profile URL: {e}"))?;

        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!(
                "graph profile lookup failed: status={} body={}",
                status,
                body
            ));
        }
        let raw: serde_json::Value = serde_json::from_str(&body)?;
        Ok(profile_from_graph(participant.clone(), raw))
    }
}

fn profile_from_graph(participant_id: ParticipantId, raw: serde_json::Value) -> UserProfile {
    let name_part = |key: &str| {
        raw.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
    };
    let display_name = match (name_part("first_name"), name_part("last_name")) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(first), None) => Some(first),
        (None, Some(last)) => Some(last),
        (None, None) => None,
    };
    UserProfile {
        participant_id,
        display_name,
        raw_profile: Some(raw),
        fetched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_name_joins_first_and_last() {
        let profile = profile_from_graph(
            "psid".into(),
            json!({ "first_name": "Ada", "last_name": "Lovelace", "id": "psid" }),
        );
        assert_eq!(profile.display_name.as_deref(), Some("Ada Lovelace"));
        assert!(profile.raw_profile.is_some());
    }

    #[test]
    fn display_name_is_absent_without_name_fields() {
        let profile = profile_from_graph("psid".into(), json!({ "first_name": " " }));
        assert!(profile.display_name.is_none());
    }
}
