use mg_messenger::ParticipantId;
use thiserror::Error;

/// Per-event failures. None of these stop the process; each is logged and
/// only the affected event (or turn) is dropped.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("webhook verification failed: {0}")]
    TransportVerification(String),

    #[error("profile fetch failed for {participant}: {message}")]
    ProfileFetch {
        participant: ParticipantId,
        message: String,
    },

    #[error("nlu query failed for {participant}: {source}")]
    NluQuery {
        participant: ParticipantId,
        #[source]
        source: mg_nlu::NluError,
    },

    #[error("unknown event shape: {0}")]
    UnknownEventShape(String),

    #[error("outbound {operation} to {participant} failed: {message}")]
    Transport {
        operation: &'static str,
        participant: ParticipantId,
        message: String,
    },
}

impl GatewayError {
    pub fn transport(
        operation: &'static str,
        participant: &ParticipantId,
        error: anyhow::Error,
    ) -> Self {
        Self::Transport {
            operation,
            participant: participant.clone(),
            message: format!("{error:#}"),
        }
    }

    /// Short machine-readable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransportVerification(_) => "transport_verification",
            Self::ProfileFetch { .. } => "profile_fetch",
            Self::NluQuery { .. } => "nlu_query",
            Self::UnknownEventShape(_) => "unknown_event_shape",
            Self::Transport { .. } => "transport",
        }
    }
}
