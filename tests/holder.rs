use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use presentment::{
    config::SessionConfig,
    core::{
        document::{DocumentStore, MemoryDocumentStore, StoredDocument},
        event::{RequestedDocument, TransferEvent},
    },
    session::SessionController,
    transfer::memory::MemoryTransferChannel,
    Status,
};
use serde_json::json;
use tokio::sync::Notify;

pub const MDL: &str = "org.iso.18013.5.1.mDL";

pub fn documents() -> MemoryDocumentStore {
    MemoryDocumentStore::new([
        StoredDocument::new("d1", "PID")
            .with_name("PID")
            .with_attribute("given_name", json!("ANNA"))
            .with_attribute("family_name", json!("NILSSON"))
            .with_attribute("age_over_18", json!(true))
            .with_attribute("portrait", json!([255, 216, 255])),
        StoredDocument::new("d2", MDL)
            .with_name("Driving Licence")
            .with_attribute("document_number", json!("SE-123456"))
            .with_attribute("signature_usual_mark", json!("iVBORw0KGgo=")),
    ])
}

pub fn request(requested_documents: Vec<RequestedDocument>) -> TransferEvent {
    TransferEvent::RequestReceived {
        requested_documents,
        verifier_name: Some("Example Verifier".into()),
        verifier_is_trusted: true,
    }
}

/// A controller over `channel` and [documents], configured for a QR engagement.
pub fn controller(channel: &MemoryTransferChannel) -> SessionController {
    controller_with(channel, documents())
}

pub fn controller_with(
    channel: &MemoryTransferChannel,
    documents: MemoryDocumentStore,
) -> SessionController {
    controller_with_store(channel, Arc::new(documents))
}

pub fn controller_with_store(
    channel: &MemoryTransferChannel,
    store: Arc<dyn DocumentStore>,
) -> SessionController {
    SessionController::builder()
        .with_transfer_channel(Arc::new(channel.clone()))
        .with_alternate_engagement(Arc::new(channel.clone()))
        .with_document_store(store)
        .with_config(SessionConfig::proximity_qr())
        .build()
        .unwrap()
}

/// Wait until the session reaches `status` or ends.
pub async fn wait_for(controller: &SessionController, status: Status) -> Status {
    controller
        .subscribe_status()
        .wait_for(|current| *current == status || current.is_terminal())
        .await
        .unwrap()
        .clone()
}

/// Start a session and deliver `event` once the channel is connected.
pub async fn presenting(
    channel: &MemoryTransferChannel,
    controller: &SessionController,
    event: TransferEvent,
) {
    controller.start().await.unwrap();
    channel.emit(TransferEvent::Connected);
    assert_eq!(
        wait_for(controller, Status::AwaitingRequest).await,
        Status::AwaitingRequest
    );
    channel.emit(event);
    assert_eq!(
        wait_for(controller, Status::PresentingDisclosure).await,
        Status::PresentingDisclosure
    );
}

/// A store whose snapshot is held back until the test releases it.
#[derive(Debug, Default)]
pub struct GatedStore {
    documents: MemoryDocumentStore,
    /// Notified once a snapshot is requested.
    pub reading: Notify,
    pub release: Notify,
}

impl GatedStore {
    pub fn new(documents: MemoryDocumentStore) -> Self {
        Self {
            documents,
            ..Default::default()
        }
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn all_documents(&self) -> Result<Vec<StoredDocument>> {
        self.reading.notify_one();
        self.release.notified().await;
        self.documents.all_documents().await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredDocument>> {
        self.documents.get_by_id(id).await
    }
}

/// A store that cannot be read.
#[derive(Debug)]
pub struct OfflineStore;

#[async_trait]
impl DocumentStore for OfflineStore {
    async fn all_documents(&self) -> Result<Vec<StoredDocument>> {
        Err(anyhow!("store offline"))
    }

    async fn get_by_id(&self, _id: &str) -> Result<Option<StoredDocument>> {
        Err(anyhow!("store offline"))
    }
}
