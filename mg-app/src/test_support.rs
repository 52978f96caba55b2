//! In-memory fakes for the transport, NLU and profile seams.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use mg_messenger::{
    Attachment, MessageId, MessengerTransport, OutboundMessage, ParticipantId, ProfileFetcher,
    UserProfile,
};
use mg_nlu::{NluBackend, NluError, NluResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(ParticipantId, String),
    Message(ParticipantId, OutboundMessage),
    Typing(ParticipantId, bool),
    PassThreadControl(ParticipantId),
    Echo(MessageId),
    Attachments(ParticipantId, usize),
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    fail_sends: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail_sends: true,
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Everything except typing indicators.
    pub fn replies(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| !matches!(s, Sent::Typing(..)))
            .collect()
    }

    fn push(&self, sent: Sent) {
        if let Ok(mut log) = self.sent.lock() {
            log.push(sent);
        }
    }
}

#[async_trait]
impl MessengerTransport for RecordingTransport {
    async fn send_message(
        &self,
        recipient: &ParticipantId,
        message: &OutboundMessage,
    ) -> anyhow::Result<()> {
        if self.fail_sends {
            return Err(anyhow!("send refused"));
        }
        match message {
            OutboundMessage::Text { text } => self.push(Sent::Text(recipient.clone(), text.clone())),
            other => self.push(Sent::Message(recipient.clone(), other.clone())),
        }
        Ok(())
    }

    async fn send_typing(&self, recipient: &ParticipantId, active: bool) -> anyhow::Result<()> {
        self.push(Sent::Typing(recipient.clone(), active));
        Ok(())
    }

    async fn pass_thread_control(&self, recipient: &ParticipantId) -> anyhow::Result<()> {
        self.push(Sent::PassThreadControl(recipient.clone()));
        Ok(())
    }

    async fn handle_echo(
        &self,
        message_id: &MessageId,
        _app_id: Option<&str>,
        _metadata: Option<&str>,
    ) -> anyhow::Result<()> {
        self.push(Sent::Echo(message_id.clone()));
        Ok(())
    }

    async fn handle_attachments(
        &self,
        sender: &ParticipantId,
        attachments: &[Attachment],
    ) -> anyhow::Result<()> {
        self.push(Sent::Attachments(sender.clone(), attachments.len()));
        Ok(())
    }
}

pub struct FakeProfiles {
    calls: AtomicUsize,
    fail: bool,
    panic: bool,
    delay: Duration,
}

impl FakeProfiles {
    pub fn succeeding() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
            panic: false,
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::succeeding()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::succeeding()
        }
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileFetcher for FakeProfiles {
    async fn fetch_profile(&self, participant: &ParticipantId) -> anyhow::Result<UserProfile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic {
            panic!("profile lookup blew up");
        }
        if self.fail {
            return Err(anyhow!("profile lookup refused"));
        }
        Ok(UserProfile {
            participant_id: participant.clone(),
            display_name: Some(format!("Test {participant}")),
            raw_profile: None,
            fetched_at: Utc::now(),
        })
    }
}

/// Answers by exact query text, falling back to a plain echo of the query.
#[derive(Default)]
pub struct FakeNlu {
    answers: HashMap<String, NluResult>,
    queries: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl FakeNlu {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn answer(mut self, text: &str, result: NluResult) -> Self {
        self.answers.insert(text.to_string(), result);
        self
    }

    /// `(session_id, text)` pairs in call order.
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NluBackend for FakeNlu {
    async fn query(&self, session_id: &str, text: &str) -> mg_nlu::Result<NluResult> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((session_id.to_string(), text.to_string()));
        }
        if self.fail {
            return Err(NluError::Http("backend unavailable".to_string()));
        }
        Ok(self.answers.get(text).cloned().unwrap_or_else(|| NluResult {
            query_text: text.to_string(),
            fulfillment_text: format!("you said {text}"),
            ..NluResult::default()
        }))
    }
}
