use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tokio::sync::RwLock;
use tracing::debug;

use super::details::{document_details, DocumentDetails};

/// A read-only snapshot of a document held by the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub doc_type: String,
    /// Display name of the document, e.g. "National ID".
    #[serde(default)]
    pub name: Option<String>,
    /// Attribute values keyed by element identifier, in stored order.
    #[serde(default)]
    pub attributes: Map<String, Json>,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            name: None,
            attributes: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, element_identifier: impl Into<String>, value: Json) -> Self {
        self.attributes.insert(element_identifier.into(), value);
        self
    }

    pub fn attribute(&self, element_identifier: &str) -> Option<&Json> {
        self.attributes.get(element_identifier)
    }

    /// Whether this is the document a request refers to.
    pub fn matches(&self, document_id: &str, doc_type: &str) -> bool {
        self.id == document_id && self.doc_type == doc_type
    }
}

/// Read access to the wallet's durable document storage.
#[async_trait]
pub trait DocumentStore: Debug + Send + Sync {
    /// Take a snapshot of every stored document.
    async fn all_documents(&self) -> Result<Vec<StoredDocument>>;

    /// Get a single document.
    async fn get_by_id(&self, id: &str) -> Result<Option<StoredDocument>>;

    /// Project a document to its display rows.
    async fn details(&self, id: &str) -> Result<Option<DocumentDetails>> {
        Ok(self.get_by_id(id).await?.as_ref().map(document_details))
    }
}

/// A local in-memory store.
///
/// # Warning
/// Documents are lost when the store is dropped, this should only be used for tests and
/// headless sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<BTreeMap<String, StoredDocument>>>,
}

impl MemoryDocumentStore {
    pub fn new(documents: impl IntoIterator<Item = StoredDocument>) -> Self {
        let documents = documents
            .into_iter()
            .map(|document| (document.id.clone(), document))
            .collect::<BTreeMap<_, _>>();
        debug!(count = documents.len(), "loaded documents");
        Self {
            documents: Arc::new(RwLock::new(documents)),
        }
    }

    /// Parse a JSON array of documents.
    pub fn from_json(json: &str) -> Result<Self> {
        let documents: Vec<StoredDocument> =
            serde_json::from_str(json).context("unable to parse stored documents")?;
        Ok(Self::new(documents))
    }

    /// Store a document, replacing any document with the same id.
    pub fn insert(&self, document: StoredDocument) -> Result<()> {
        self.documents
            .try_write()?
            .insert(document.id.clone(), document);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<Option<StoredDocument>> {
        Ok(self.documents.try_write()?.remove(id))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn all_documents(&self) -> Result<Vec<StoredDocument>> {
        Ok(self.documents.try_read()?.values().cloned().collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredDocument>> {
        Ok(self.documents.try_read()?.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn snapshot_is_detached_from_store() {
        let store = MemoryDocumentStore::new([
            StoredDocument::new("d1", "PID").with_attribute("given_name", json!("ANNA"))
        ]);
        let snapshot = store.all_documents().await.unwrap();

        store
            .insert(StoredDocument::new("d2", "mDL").with_name("Driving Licence"))
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.all_documents().await.unwrap().len(), 2);
        assert!(store.get_by_id("d2").await.unwrap().is_some());
        assert!(store.remove("d2").unwrap().is_some());
        assert!(store.get_by_id("d2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn attributes_keep_stored_order() {
        let store = MemoryDocumentStore::from_json(
            r#"[{"id": "d1", "doc_type": "PID", "attributes": {"z_last": 1, "a_first": 2}}]"#,
        )
        .unwrap();
        let document = store.get_by_id("d1").await.unwrap().unwrap();
        let keys: Vec<_> = document.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z_last", "a_first"]);
        assert!(document.matches("d1", "PID"));
        assert!(!document.matches("d1", "mDL"));
    }
}
