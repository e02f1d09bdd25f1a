use presentment_frontend::SessionOutcome;
use thiserror::Error;

use crate::core::disclosure::ItemId;

/// Errors that can occur while driving a presentation session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transfer channel could not start or advertise the engagement.
    #[error("engagement failed: {0}")]
    Engagement(String),

    /// The verifier's request was malformed or untrusted, reported by the transfer channel.
    #[error("protocol failure: {0}")]
    Protocol(String),

    /// Transforming the request, tracking the selection or interpreting an event failed.
    #[error("processing failed: {0:#}")]
    Processing(#[from] anyhow::Error),

    /// The user cancelled the session.
    #[error("session cancelled by user")]
    Cancelled,

    /// `start` was called before `set_config`.
    #[error("a session configuration is required before engagement")]
    MissingConfig,

    /// `start` was called twice without an intervening stop.
    #[error("engagement already started for this session")]
    AlreadyStarted,

    /// The operation is not available in the current state.
    #[error("`{operation}` is not allowed while the session is {status}")]
    InvalidState {
        operation: &'static str,
        status: String,
    },

    /// The item is not part of the presented disclosure.
    #[error("unknown disclosure item `{0}`")]
    UnknownItem(ItemId),

    /// The transfer event stream can only be subscribed once per session.
    #[error("transfer events already subscribed for this session")]
    AlreadySubscribed,

    /// The link is not a presentation request and should be opened externally.
    #[error("unsupported deep link scheme `{0}`")]
    UnsupportedDeepLink(String),
}

impl SessionError {
    /// The terminal outcome a session reaches when it fails with this error.
    pub fn outcome(&self) -> SessionOutcome {
        match self {
            SessionError::Cancelled => SessionOutcome::Disconnected,
            SessionError::Engagement(message) | SessionError::Protocol(message) => {
                SessionOutcome::Failure {
                    message: message.clone(),
                }
            }
            other => SessionOutcome::Failure {
                message: other.to_string(),
            },
        }
    }
}
