//! NLU backend client for moodgate.
//!
//! Pure HTTP client around Dialogflow v2 `detectIntent`. The gateway only
//! sees the `NluBackend` trait and the decoded `NluResult`.

mod client;
mod dialogflow;
mod error;
mod types;

pub use client::{DialogflowClient, NluBackend};
pub use error::{NluError, Result};
pub use types::{CardButton, FulfillmentMessage, NluResult, SentimentScore};
