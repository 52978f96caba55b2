//! moodgate configuration loader.
//!
//! TOML file first, then environment overrides, then validation.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub messenger: MessengerConfig,
    #[serde(default)]
    pub nlu: NluConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
    #[serde(default)]
    pub gateway: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// The platform drops deliveries that are not acknowledged within 20s.
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_http_timeout_seconds() -> u64 {
    20
}

fn default_http_max_in_flight() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessengerConfig {
    #[serde(default)]
    pub verify_token: String,
    #[serde(default)]
    pub page_access_token: String,
    /// When set, `x-hub-signature-256` is required on every delivery.
    #[serde(default)]
    pub app_secret: Option<String>,
    /// Secondary receiver that takes over escalated threads.
    #[serde(default)]
    pub handover_app_id: Option<String>,
    #[serde(default)]
    pub graph_api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NluConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_language_code() -> String {
    "en-US".to_string()
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            access_token: String::new(),
            language_code: default_language_code(),
            api_base: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_soft_check_delta")]
    pub soft_check_delta: f64,
    #[serde(default = "default_soft_check_floor")]
    pub soft_check_floor: f64,
    #[serde(default = "default_escalate_below")]
    pub escalate_below: f64,
    /// Compare each turn against the participant's previous sample. When
    /// false every turn is judged without a baseline.
    #[serde(default = "default_compare_with_history")]
    pub compare_with_history: bool,
    #[serde(default = "default_operator_name")]
    pub operator_name: String,
}

fn default_soft_check_delta() -> f64 {
    0.5
}

fn default_soft_check_floor() -> f64 {
    -0.6
}

fn default_escalate_below() -> f64 {
    -0.5
}

fn default_compare_with_history() -> bool {
    true
}

fn default_operator_name() -> String {
    "a human operator".to_string()
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            soft_check_delta: default_soft_check_delta(),
            soft_check_floor: default_soft_check_floor(),
            escalate_below: default_escalate_below(),
            compare_with_history: default_compare_with_history(),
            operator_name: default_operator_name(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SentimentConfig {
    /// Oldest samples are evicted past this count. Unbounded when unset.
    #[serde(default)]
    pub max_samples_per_participant: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl GatewayConfig {
    /// Load from `path` (or the default location), apply env overrides, validate.
    ///
    /// A missing file at the default location is not an error: deployments
    /// that configure everything through the environment need no file.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(config_path = %path.display(), "no config file; using defaults");
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("PORT") {
            match v.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring invalid PORT"),
            }
        }
        if let Some(v) = var("FB_VERIFY_TOKEN") {
            self.messenger.verify_token = v;
        }
        if let Some(v) = var("FB_PAGE_TOKEN") {
            self.messenger.page_access_token = v;
        }
        if let Some(v) = var("FB_APP_SECRET") {
            self.messenger.app_secret = Some(v);
        }
        if let Some(v) = var("GOOGLE_PROJECT_ID") {
            self.nlu.project_id = v;
        }
        if let Some(v) = var("GOOGLE_ACCESS_TOKEN") {
            self.nlu.access_token = v;
        }
        if let Some(v) = var("DIALOGFLOW_LANGUAGE_CODE") {
            self.nlu.language_code = v;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server.port must be > 0"));
        }
        if self.server.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("server.http_timeout_seconds must be > 0"));
        }
        if self.messenger.verify_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "messenger.verify_token is required (or FB_VERIFY_TOKEN)"
            ));
        }
        if self.messenger.page_access_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "messenger.page_access_token is required (or FB_PAGE_TOKEN)"
            ));
        }
        if self.nlu.project_id.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "nlu.project_id is required (or GOOGLE_PROJECT_ID)"
            ));
        }
        if self.nlu.access_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "nlu.access_token is required (or GOOGLE_ACCESS_TOKEN)"
            ));
        }
        if self.gateway.queue_capacity == 0 {
            return Err(anyhow::anyhow!("gateway.queue_capacity must be > 0"));
        }
        if self.sentiment.max_samples_per_participant == Some(0) {
            return Err(anyhow::anyhow!(
                "sentiment.max_samples_per_participant must be > 0 when set"
            ));
        }
        let e = &self.escalation;
        if !(0.0..=2.0).contains(&e.soft_check_delta) {
            return Err(anyhow::anyhow!(
                "escalation.soft_check_delta must be within [0, 2]"
            ));
        }
        if !(-1.0..=0.0).contains(&e.soft_check_floor) || !(-1.0..=0.0).contains(&e.escalate_below)
        {
            return Err(anyhow::anyhow!(
                "escalation.soft_check_floor and escalation.escalate_below must be within [-1, 0]"
            ));
        }
        Ok(())
    }

    pub fn app_secret(&self) -> Option<&str> {
        self.messenger
            .app_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MOODGATE_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".moodgate").join("config.toml")
}
