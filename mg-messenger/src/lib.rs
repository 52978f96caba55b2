//! Messenger Platform adapters for moodgate.
//!
//! Adapters are pure I/O: they turn Graph API webhook deliveries into
//! `InboundEvent`s and `OutboundMessage`s back into Send API calls.

mod graph;
mod profile;
mod signature;
mod traits;
mod types;
mod webhook;

pub use graph::{GraphMessengerAdapter, PAGE_INBOX_APP_ID};
pub use profile::GraphProfileClient;
pub use signature::{SIGNATURE_HEADER, hmac_sha256_hex, verify_signature};
pub use traits::{ATTACHMENT_ACK_TEXT, MessengerTransport, ProfileFetcher};
pub use types::{
    Attachment, EventEnvelope, InboundEvent, MessageId, OutboundMessage, PageId, ParticipantId,
    QuickReplyOption, TemplateButton, TemplateElement, UserProfile,
};
pub use webhook::{IngestReport, PageEntry, WebhookIngestor, WebhookPayload};
