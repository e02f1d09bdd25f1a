use presentment_frontend::SessionOutcome;

use super::event::TransferEvent;
use crate::error::SessionError;

/// Map a late-stage transfer event to the outcome it ends the session with.
///
/// Events that do not end a session map to `None`. Requests are handled before a response
/// is awaited and never map to an outcome here.
pub fn interpret(event: &TransferEvent) -> Option<SessionOutcome> {
    match event {
        TransferEvent::ResponseSent => Some(SessionOutcome::Success),
        TransferEvent::Redirect { uri } => Some(SessionOutcome::Redirect { uri: uri.clone() }),
        TransferEvent::UserAuthenticationRequired => Some(SessionOutcome::AuthenticationRequired),
        TransferEvent::Error { message } => {
            Some(SessionError::Protocol(message.clone()).outcome())
        }
        TransferEvent::Disconnected => Some(SessionOutcome::Disconnected),
        TransferEvent::EngagementReady { .. }
        | TransferEvent::Connected
        | TransferEvent::RequestReceived { .. } => None,
    }
}
