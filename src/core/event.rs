use serde::{Deserialize, Serialize};
use url::Url;

/// An event produced by the transfer channel.
///
/// Events are consumed exactly once each, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TransferEvent {
    /// The engagement is advertised, e.g. `payload` is the content of the QR code.
    EngagementReady { payload: String },
    /// A verifier connected over the secure channel.
    Connected,
    /// The verifier sent its request.
    RequestReceived {
        requested_documents: Vec<RequestedDocument>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verifier_name: Option<String>,
        #[serde(default)]
        verifier_is_trusted: bool,
    },
    /// The response was sent and accepted by the verifier.
    ResponseSent,
    /// The verifier asks the holder to continue at `uri`.
    Redirect { uri: Url },
    /// The response cannot be sent before the user authenticates.
    UserAuthenticationRequired,
    /// The channel failed. `message` describes the failure.
    Error { message: String },
    /// The channel was closed.
    Disconnected,
}

impl TransferEvent {
    /// A short name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            TransferEvent::EngagementReady { .. } => "engagement_ready",
            TransferEvent::Connected => "connected",
            TransferEvent::RequestReceived { .. } => "request_received",
            TransferEvent::ResponseSent => "response_sent",
            TransferEvent::Redirect { .. } => "redirect",
            TransferEvent::UserAuthenticationRequired => "user_authentication_required",
            TransferEvent::Error { .. } => "error",
            TransferEvent::Disconnected => "disconnected",
        }
    }
}

/// A document requested by the verifier, with the elements requested from it in the order
/// they were received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedDocument {
    pub document_id: String,
    pub doc_type: String,
    #[serde(default)]
    pub elements: Vec<RequestedElement>,
}

impl RequestedDocument {
    pub fn new(document_id: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            doc_type: doc_type.into(),
            elements: Vec::new(),
        }
    }

    /// Append a requested element.
    pub fn with_element(
        mut self,
        namespace: impl Into<String>,
        element_identifier: impl Into<String>,
        required: bool,
    ) -> Self {
        self.elements.push(RequestedElement {
            namespace: namespace.into(),
            element_identifier: element_identifier.into(),
            required,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestedElement {
    pub namespace: String,
    pub element_identifier: String,
    /// Whether the verifier requires the element for the exchange to proceed.
    #[serde(default)]
    pub required: bool,
}

/// Who is asking for the disclosure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierInfo {
    pub name: Option<String>,
    pub is_trusted: bool,
}
