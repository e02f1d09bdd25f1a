use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use presentment::{
    config::SessionConfig,
    core::{document::MemoryDocumentStore, document::StoredDocument, event::TransferEvent},
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::engine::HeadlessConfig;

/// Everything needed to run one headless session.
#[derive(Debug, Clone)]
pub struct HolderConfig {
    pub documents: PathBuf,
    pub script: PathBuf,
    pub session: SessionConfig,
    pub engine: HeadlessConfig,
}

/// The events a scripted verifier sends, before and after the holder's selection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierScript {
    #[serde(default)]
    pub before_selection: Vec<TransferEvent>,
    #[serde(default)]
    pub after_selection: Vec<TransferEvent>,
}

pub async fn load_documents(path: &Path) -> Result<MemoryDocumentStore> {
    let documents: Vec<StoredDocument> = load_json(path).await?;
    Ok(MemoryDocumentStore::new(documents))
}

pub async fn load_script(path: &Path) -> Result<VerifierScript> {
    load_json(path).await
}

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_json(&json).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    let deserializer = &mut serde_json::Deserializer::from_str(json);
    Ok(serde_path_to_error::deserialize(deserializer)?)
}
