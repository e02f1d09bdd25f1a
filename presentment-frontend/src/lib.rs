//! Presentation session data structures that are needed on the frontend, without the async
//! runtime and the other dependencies of the orchestrator.
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Status of a presentation session.
///
/// A session only ever moves forward through these states, see [Status::stage].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "outcome")]
pub enum Status {
    /// No engagement has been started yet.
    Idle,
    /// Engagement was requested from the transfer channel, waiting for it to advertise.
    Engaging,
    /// The channel is advertising or connected, waiting on the verifier's request.
    AwaitingRequest,
    /// A request was received and the disclosure is waiting for the user's decision.
    PresentingDisclosure,
    /// The user confirmed, waiting on the transfer channel to report the result.
    AwaitingResponse,
    /// The session is over. No further event changes the outcome.
    Terminal(SessionOutcome),
}

impl Status {
    /// Position of the status in the session lifecycle.
    pub fn stage(&self) -> u8 {
        match self {
            Status::Idle => 0,
            Status::Engaging => 1,
            Status::AwaitingRequest => 2,
            Status::PresentingDisclosure => 3,
            Status::AwaitingResponse => 4,
            Status::Terminal(_) => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Terminal(_))
    }

    /// The terminal outcome, if the session has one.
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        match self {
            Status::Terminal(outcome) => Some(outcome),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => f.write_str("idle"),
            Status::Engaging => f.write_str("engaging"),
            Status::AwaitingRequest => f.write_str("awaiting request"),
            Status::PresentingDisclosure => f.write_str("presenting disclosure"),
            Status::AwaitingResponse => f.write_str("awaiting response"),
            Status::Terminal(outcome) => write!(f, "terminal ({outcome})"),
        }
    }
}

/// Terminal outcome of a presentation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SessionOutcome {
    /// The verifier accepted the response.
    Success,
    /// The verifier accepted the response and asked the holder to continue at `uri`.
    Redirect { uri: Url },
    /// The response cannot be sent before the user authenticates.
    AuthenticationRequired,
    /// The session failed. `message` is meant to be shown to the user.
    Failure { message: String },
    /// The channel was closed, either by the verifier or by cancelling the session.
    Disconnected,
    /// The verifier did not request any attribute.
    NoRequestedData,
}

impl SessionOutcome {
    /// Whether the verifier received the disclosure.
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Success | SessionOutcome::Redirect { .. })
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Success => f.write_str("success"),
            SessionOutcome::Redirect { uri } => write!(f, "redirect to {uri}"),
            SessionOutcome::AuthenticationRequired => f.write_str("authentication required"),
            SessionOutcome::Failure { message } => write!(f, "failure: {message}"),
            SessionOutcome::Disconnected => f.write_str("disconnected"),
            SessionOutcome::NoRequestedData => f.write_str("no requested data"),
        }
    }
}

/// How the value of a disclosed attribute should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Plain text.
    #[default]
    Text,
    /// A base64 encoded image, e.g. a portrait.
    Image,
    /// A base64 encoded signature blob.
    Signature,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifecycle_stages_are_ordered() {
        let stages = [
            Status::Idle,
            Status::Engaging,
            Status::AwaitingRequest,
            Status::PresentingDisclosure,
            Status::AwaitingResponse,
            Status::Terminal(SessionOutcome::Success),
        ];
        assert!(stages.windows(2).all(|w| w[0].stage() < w[1].stage()));
    }

    #[test]
    fn outcome_wire_format() {
        let outcome = SessionOutcome::Failure {
            message: "channel closed".into(),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"type": "failure", "message": "channel closed"})
        );

        let status: Status = serde_json::from_value(json!({
            "status": "terminal",
            "outcome": {"type": "redirect", "uri": "https://verifier.example.com/done"}
        }))
        .unwrap();
        assert!(status.outcome().unwrap().is_success());
    }
}
