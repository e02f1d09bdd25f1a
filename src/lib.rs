//! This library orchestrates the holder side of a credential presentation session, from
//! engagement with a verifier to the terminal outcome of the exchange.
//!
//! The cryptography and the secure channel are provided by an external transfer engine, and
//! the documents by the wallet's storage. This crate sequences them: it starts the
//! engagement, turns the verifier's request into disclosure items the user can review, sends
//! the user's selection back, and reports exactly one outcome per session.
//!
//! # Usage
//!
//! A [`SessionController`] is built from a [`TransferChannel`] and a [`DocumentStore`]:
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use presentment::config::SessionConfig;
//! use presentment::session::SessionController;
//! use presentment::Status;
//!
//! // Setup the controller.
//! let controller = SessionController::builder()
//!     .with_transfer_channel(Arc::new(transfer_channel))
//!     .with_alternate_engagement(Arc::new(nfc_toggle))
//!     .with_document_store(Arc::new(document_store))
//!     .build()?;
//!
//! // Engage over a QR code.
//! controller.set_config(SessionConfig::proximity_qr()).await?;
//! let outcome = controller.subscribe_outcome();
//! controller.start().await?;
//!
//! // Show the QR code once the channel advertises it.
//! let mut status = controller.subscribe_status();
//! status.wait_for(|status| *status != Status::Engaging).await?;
//! let qr_code = controller.engagement_payload().await;
//!
//! // Review the request, then send the selection.
//! status
//!     .wait_for(|status| *status == Status::PresentingDisclosure || status.is_terminal())
//!     .await?;
//! if let Some(RequestDisclosure::Present(disclosure)) = controller.disclosure_items().await {
//!     for section in disclosure.sections() {
//!         render_section(section);
//!     }
//!     controller.confirm().await?;
//! }
//!
//! // Exactly one outcome is delivered per session.
//! let outcome = outcome.recv().await;
//! ```
//!
//! Remote sessions are started from a deep link with [`SessionConfig::from_deep_link`].
//!
//! [`SessionController`]: crate::session::SessionController
//! [`TransferChannel`]: crate::transfer::TransferChannel
//! [`DocumentStore`]: crate::core::document::DocumentStore
//! [`SessionConfig::from_deep_link`]: crate::config::SessionConfig::from_deep_link
//!
//! # Session Overview
//!
//! 1. *Engagement*: the [`TransferAdapter`] starts the engagement once and opens the event
//!    stream of the session. The session is `Engaging`, then `AwaitingRequest` once the
//!    channel is advertising or connected.
//! 2. *Request*: the verifier's request is transformed by the [`DisclosureTransformer`]
//!    against a snapshot of the document store. Documents the wallet does not hold are
//!    dropped. A request for no data ends the session with `NoRequestedData`.
//! 3. *Review*: the user toggles optional items through the [`SelectionTracker`], required
//!    items always stay selected.
//! 4. *Response*: the confirmed [`DisclosureSelection`] is sent through the adapter and the
//!    session waits on the channel to report the result, mapped by [`interpret`].
//!
//! A cancel, an `Error` or a `Disconnected` event ends the session from any state. Once the
//! session is over the adapter is stopped and no further event changes the outcome.
//!
//! [`TransferAdapter`]: crate::transfer::TransferAdapter
//! [`DisclosureTransformer`]: crate::core::disclosure::DisclosureTransformer
//! [`SelectionTracker`]: crate::core::selection::SelectionTracker
//! [`DisclosureSelection`]: crate::core::selection::DisclosureSelection
//! [`interpret`]: crate::core::outcome::interpret

pub mod cancel;
pub mod config;
pub mod core;
pub mod error;
pub mod session;
pub mod transfer;
pub mod utils;

pub use presentment_frontend::{SessionOutcome, Status, ValueKind};
