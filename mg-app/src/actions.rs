//! Handlers for agent actions, keyed by action name.

use async_trait::async_trait;
use mg_messenger::{MessengerTransport, ParticipantId};
use mg_nlu::NluResult;
use std::collections::HashMap;
use std::sync::Arc;

pub const HANDOVER_ACTION: &str = "handover.request";
pub const HANDOVER_TEXT: &str = "Sure, I'm connecting you with a person now.";

pub struct ActionContext<'a> {
    pub participant: &'a ParticipantId,
    pub result: &'a NluResult,
    pub transport: &'a dyn MessengerTransport,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, ctx: ActionContext<'_>) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the handlers moodgate ships with.
    pub fn with_builtin() -> Self {
        Self::new().register(HANDOVER_ACTION, Arc::new(HandoverAction))
    }

    pub fn register(mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(action.into(), handler);
        self
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The user explicitly asked for a person.
struct HandoverAction;

#[async_trait]
impl ActionHandler for HandoverAction {
    async fn handle(&self, ctx: ActionContext<'_>) -> anyhow::Result<()> {
        let text = if ctx.result.fulfillment_text.trim().is_empty() {
            HANDOVER_TEXT
        } else {
            ctx.result.fulfillment_text.as_str()
        };
        ctx.transport.send_text(ctx.participant, text).await?;
        ctx.transport.pass_thread_control(ctx.participant).await
    }
}
