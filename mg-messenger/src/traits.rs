use crate::types::{Attachment, MessageId, OutboundMessage, ParticipantId, UserProfile};
use anyhow::Result;
use async_trait::async_trait;

pub const ATTACHMENT_ACK_TEXT: &str = "Attachment received. Thank you.";

#[async_trait]
pub trait MessengerTransport: Send + Sync {
    /// Send one message to a participant.
    async fn send_message(&self, recipient: &ParticipantId, message: &OutboundMessage)
    -> Result<()>;

    /// Toggle the typing indicator.
    async fn send_typing(&self, recipient: &ParticipantId, active: bool) -> Result<()>;

    /// Hand the conversation over to the human operator inbox.
    async fn pass_thread_control(&self, recipient: &ParticipantId) -> Result<()>;

    async fn send_text(&self, recipient: &ParticipantId, text: &str) -> Result<()> {
        self.send_message(recipient, &OutboundMessage::text(text))
            .await
    }

    /// Send messages in order; stops at the first failure.
    async fn send_structured(
        &self,
        recipient: &ParticipantId,
        messages: &[OutboundMessage],
    ) -> Result<()> {
        for message in messages {
            self.send_message(recipient, message).await?;
        }
        Ok(())
    }

    async fn send_typing_off(&self, recipient: &ParticipantId) -> Result<()> {
        self.send_typing(recipient, false).await
    }

    async fn handle_echo(
        &self,
        message_id: &MessageId,
        app_id: Option<&str>,
        metadata: Option<&str>,
    ) -> Result<()> {
        tracing::debug!(
            message_id = %message_id,
            app_id = ?app_id,
            metadata = ?metadata,
            "received echo for own message"
        );
        Ok(())
    }

    async fn handle_attachments(
        &self,
        sender: &ParticipantId,
        attachments: &[Attachment],
    ) -> Result<()> {
        tracing::info!(
            sender_id = %sender,
            attachments = attachments.len(),
            kinds = ?attachments.iter().map(|a| a.kind.as_str()).collect::<Vec<_>>(),
            "attachments received"
        );
        self.send_text(sender, ATTACHMENT_ACK_TEXT).await
    }
}

#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, participant: &ParticipantId) -> Result<UserProfile>;
}
