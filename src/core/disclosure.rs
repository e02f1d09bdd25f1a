use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use presentment_frontend::ValueKind;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, warn};

use super::{
    document::{DocumentStore, StoredDocument},
    event::{RequestedDocument, VerifierInfo},
};
use crate::{config::DisclosureLabels, utils::to_human_readable_string};

/// Element identifier of the holder's portrait.
pub const PORTRAIT: &str = "portrait";
/// Element identifier of the holder's portrait taken at enrolment.
pub const ENROLMENT_PORTRAIT_IMAGE: &str = "enrolment_portrait_image";
/// Element identifier of the holder's usual signature or mark.
pub const SIGNATURE_USUAL_MARK: &str = "signature_usual_mark";

/// Well-known element identifiers that do not render as text.
const VALUE_KINDS: &[(&str, ValueKind)] = &[
    (PORTRAIT, ValueKind::Image),
    (ENROLMENT_PORTRAIT_IMAGE, ValueKind::Image),
    (SIGNATURE_USUAL_MARK, ValueKind::Signature),
];

/// How an element renders. Identifiers missing from the table render as text.
pub fn value_kind(element_identifier: &str) -> ValueKind {
    VALUE_KINDS
        .iter()
        .find(|(identifier, _)| *identifier == element_identifier)
        .map(|(_, kind)| *kind)
        .unwrap_or_default()
}

/// Identifies a [DisclosureItem] within one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId {
    document_id: String,
    namespace: String,
    element_identifier: String,
}

impl ItemId {
    pub fn new(document_id: &str, namespace: &str, element_identifier: &str) -> Self {
        Self {
            document_id: document_id.to_owned(),
            namespace: namespace.to_owned(),
            element_identifier: element_identifier.to_owned(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn element_identifier(&self) -> &str {
        &self.element_identifier
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.document_id, self.namespace, self.element_identifier
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureGroup {
    Required,
    Optional,
}

/// A requested element as the user reviews it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureItem {
    pub id: ItemId,
    pub document_id: String,
    pub doc_type: String,
    pub document_name: Option<String>,
    pub namespace: String,
    pub element_identifier: String,
    pub label: String,
    /// The rendered value. Base64 for images and signatures.
    pub value: String,
    pub kind: ValueKind,
    pub required: bool,
    pub(super) selected: bool,
}

impl DisclosureItem {
    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn group(&self) -> DisclosureGroup {
        if self.required {
            DisclosureGroup::Required
        } else {
            DisclosureGroup::Optional
        }
    }

    /// The label in words, e.g. `Given Name` for `given_name`.
    pub fn display_label(&self) -> String {
        to_human_readable_string(self.label.as_str())
    }
}

/// The elements of a request that can be disclosed, in the order they were requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disclosure {
    pub verifier: VerifierInfo,
    labels: DisclosureLabels,
    documents: Vec<String>,
    pub(super) items: Vec<DisclosureItem>,
}

impl Disclosure {
    pub fn items(&self) -> &[DisclosureItem] {
        &self.items
    }

    pub fn item(&self, id: &ItemId) -> Option<&DisclosureItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Number of requested documents that were found in the store.
    ///
    /// A request whose documents are all missing yields an empty item list, which is not the
    /// same as a request for no data.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The items grouped for review: for every document, the required items under the
    /// required header, then the optional items under the optional header.
    pub fn sections(&self) -> Vec<DisclosureSection<'_>> {
        let mut sections = Vec::new();
        for document_id in &self.documents {
            for group in [DisclosureGroup::Required, DisclosureGroup::Optional] {
                let items: Vec<_> = self
                    .items
                    .iter()
                    .filter(|item| &item.document_id == document_id && item.group() == group)
                    .collect();
                if items.is_empty() {
                    continue;
                }
                let header = match group {
                    DisclosureGroup::Required => &self.labels.required_fields_title,
                    DisclosureGroup::Optional => &self.labels.optional_fields_title,
                };
                sections.push(DisclosureSection {
                    document_id,
                    document_name: items[0].document_name.as_deref(),
                    header,
                    group,
                    items,
                });
            }
        }
        sections
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisclosureSection<'a> {
    pub document_id: &'a str,
    pub document_name: Option<&'a str>,
    pub header: &'a str,
    pub group: DisclosureGroup,
    pub items: Vec<&'a DisclosureItem>,
}

/// The result of transforming a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDisclosure {
    /// Items the user can review. May be empty when no requested document is stored.
    Present(Disclosure),
    /// The verifier did not request any element.
    NoData { verifier: VerifierInfo },
}

impl RequestDisclosure {
    pub fn verifier(&self) -> &VerifierInfo {
        match self {
            RequestDisclosure::Present(disclosure) => &disclosure.verifier,
            RequestDisclosure::NoData { verifier } => verifier,
        }
    }
}

/// Converts a verifier's request into disclosure items, consulting the document store.
#[derive(Debug, Clone)]
pub struct DisclosureTransformer {
    store: Arc<dyn DocumentStore>,
    labels: DisclosureLabels,
}

impl DisclosureTransformer {
    pub fn new(store: Arc<dyn DocumentStore>, labels: DisclosureLabels) -> Self {
        Self { store, labels }
    }

    /// Transform a request against a fresh snapshot of the store.
    pub async fn transform(
        &self,
        requested_documents: &[RequestedDocument],
        verifier: VerifierInfo,
    ) -> Result<RequestDisclosure> {
        if requested_documents
            .iter()
            .all(|document| document.elements.is_empty())
        {
            return Ok(RequestDisclosure::NoData { verifier });
        }

        let snapshot = self
            .store
            .all_documents()
            .await
            .context("failed to read stored documents")?;

        Ok(RequestDisclosure::Present(build_disclosure(
            requested_documents,
            verifier,
            &snapshot,
            &self.labels,
        )))
    }
}

/// Build the disclosure of a request that asks for at least one element.
///
/// Requested documents missing from `snapshot` are dropped. Elements keep the order in
/// which they were first requested, and an element requested more than once is required if
/// any of its requests requires it.
pub fn build_disclosure(
    requested_documents: &[RequestedDocument],
    verifier: VerifierInfo,
    snapshot: &[StoredDocument],
    labels: &DisclosureLabels,
) -> Disclosure {
    let mut documents = Vec::new();
    let mut items: Vec<DisclosureItem> = Vec::new();
    let mut positions: HashMap<ItemId, usize> = HashMap::new();

    for requested in requested_documents {
        let Some(stored) = snapshot
            .iter()
            .find(|stored| stored.matches(&requested.document_id, &requested.doc_type))
        else {
            debug!(
                document_id = %requested.document_id,
                doc_type = %requested.doc_type,
                "requested document is not stored, dropping it"
            );
            continue;
        };

        if !documents.contains(&stored.id) {
            documents.push(stored.id.clone());
        }

        for element in &requested.elements {
            let id = ItemId::new(&stored.id, &element.namespace, &element.element_identifier);
            if let Some(&position) = positions.get(&id) {
                warn!(%id, "element requested twice, merging the requests");
                items[position].required |= element.required;
                continue;
            }
            positions.insert(id.clone(), items.len());

            let kind = value_kind(&element.element_identifier);
            items.push(DisclosureItem {
                id,
                document_id: stored.id.clone(),
                doc_type: stored.doc_type.clone(),
                document_name: stored.name.clone(),
                namespace: element.namespace.clone(),
                element_identifier: element.element_identifier.clone(),
                label: element.element_identifier.clone(),
                value: render_value(kind, stored.attribute(&element.element_identifier)),
                kind,
                required: element.required,
                selected: true,
            });
        }
    }

    Disclosure {
        verifier,
        labels: labels.clone(),
        documents,
        items,
    }
}

/// Render a stored value for display. Missing or unrenderable values render as empty.
pub(crate) fn render_value(kind: ValueKind, value: Option<&Json>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match kind {
        ValueKind::Text => render_text(value),
        ValueKind::Image | ValueKind::Signature => match value {
            Json::String(encoded) => encoded.clone(),
            Json::Array(bytes) => bytes
                .iter()
                .map(|byte| byte.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(|bytes| STANDARD.encode(bytes))
                .unwrap_or_default(),
            _ => String::new(),
        },
    }
}

fn render_text(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        Json::Bool(_) | Json::Number(_) => value.to_string(),
        Json::Array(values) => values
            .iter()
            .map(render_text)
            .collect::<Vec<_>>()
            .join(", "),
        Json::Object(entries) => entries
            .iter()
            .map(|(key, value)| format!("{key}: {}", render_text(value)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{document::MemoryDocumentStore, selection::SelectionTracker};
    use serde_json::json;

    fn pid() -> StoredDocument {
        StoredDocument::new("d1", "PID")
            .with_name("PID")
            .with_attribute("given_name", json!("ANNA"))
            .with_attribute("family_name", json!("NILSSON"))
            .with_attribute("age_over_18", json!(true))
            .with_attribute("portrait", json!([255, 216, 255]))
            .with_attribute("nationalities", json!(["SE", "FI"]))
    }

    fn transformer(documents: Vec<StoredDocument>) -> DisclosureTransformer {
        DisclosureTransformer::new(
            Arc::new(MemoryDocumentStore::new(documents)),
            DisclosureLabels::default(),
        )
    }

    fn trusted() -> VerifierInfo {
        VerifierInfo {
            name: Some("Verifier".into()),
            is_trusted: true,
        }
    }

    #[tokio::test]
    async fn single_required_element() {
        let request =
            vec![RequestedDocument::new("d1", "PID").with_element("ns", "given_name", true)];

        let RequestDisclosure::Present(disclosure) = transformer(vec![pid()])
            .transform(&request, trusted())
            .await
            .unwrap()
        else {
            panic!("expected a disclosure")
        };

        assert_eq!(disclosure.items().len(), 1);
        let item = &disclosure.items()[0];
        assert_eq!(item.label, "given_name");
        assert_eq!(item.value, "ANNA");
        assert_eq!(item.kind, ValueKind::Text);
        assert_eq!(item.group(), DisclosureGroup::Required);
        assert!(item.selected());
        assert_eq!(item.display_label(), "Given Name");
        assert!(disclosure.verifier.is_trusted);
    }

    #[tokio::test]
    async fn missing_document_is_dropped_without_no_data() {
        let request =
            vec![RequestedDocument::new("d1", "PID").with_element("ns", "given_name", true)];

        let result = transformer(vec![])
            .transform(&request, trusted())
            .await
            .unwrap();

        let RequestDisclosure::Present(disclosure) = result else {
            panic!("expected a disclosure")
        };
        assert!(disclosure.is_empty());
        assert_eq!(disclosure.document_count(), 0);
        assert_eq!(disclosure.verifier.name.as_deref(), Some("Verifier"));
    }

    #[tokio::test]
    async fn empty_element_lists_yield_no_data() {
        let request = vec![
            RequestedDocument::new("d1", "PID"),
            RequestedDocument::new("d2", "mDL"),
        ];

        let result = transformer(vec![pid()])
            .transform(&request, trusted())
            .await
            .unwrap();

        assert_eq!(result, RequestDisclosure::NoData { verifier: trusted() });
    }

    #[tokio::test]
    async fn order_follows_request_and_sections_group_it() {
        let request = vec![
            RequestedDocument::new("unknown", "mDL").with_element("ns", "document_number", true),
            RequestedDocument::new("d1", "PID")
                .with_element("ns", "age_over_18", false)
                .with_element("ns", "family_name", true)
                .with_element("ns", "portrait", false)
                .with_element("ns", "given_name", true),
        ];

        let RequestDisclosure::Present(disclosure) = transformer(vec![pid()])
            .transform(&request, trusted())
            .await
            .unwrap()
        else {
            panic!("expected a disclosure")
        };

        let labels: Vec<_> = disclosure.items().iter().map(|i| i.label.as_str()).collect();
        assert_eq!(
            labels,
            ["age_over_18", "family_name", "portrait", "given_name"]
        );

        let sections = disclosure.sections();
        assert_eq!(sections.len(), 2);
        assert_eq!(
            sections[0].header,
            DisclosureLabels::default().required_fields_title
        );
        let required: Vec<_> = sections[0].items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(required, ["family_name", "given_name"]);
        let optional: Vec<_> = sections[1].items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(optional, ["age_over_18", "portrait"]);
    }

    #[tokio::test]
    async fn values_render_by_kind() {
        let request = vec![RequestedDocument::new("d1", "PID")
            .with_element("ns", "portrait", false)
            .with_element("ns", "age_over_18", false)
            .with_element("ns", "nationalities", false)
            .with_element("ns", "not_stored", false)];

        let RequestDisclosure::Present(disclosure) = transformer(vec![pid()])
            .transform(&request, trusted())
            .await
            .unwrap()
        else {
            panic!("expected a disclosure")
        };
        let items = disclosure.items();

        assert_eq!(items[0].kind, ValueKind::Image);
        assert_eq!(items[0].value, "/9j/");
        assert_eq!(items[1].value, "true");
        assert_eq!(items[2].value, "SE, FI");
        assert_eq!(items[3].kind, ValueKind::Text);
        assert_eq!(items[3].value, "");
    }

    #[test]
    fn duplicate_elements_are_merged_and_stay_required() {
        let request = vec![RequestedDocument::new("d1", "PID")
            .with_element("ns", "given_name", false)
            .with_element("ns", "family_name", false)
            .with_element("ns", "given_name", true)
            .with_element("ns", "family_name", false)];
        let headers = DisclosureLabels::default();

        let disclosure = build_disclosure(&request, trusted(), &[pid()], &headers);

        let labels: Vec<_> = disclosure.items().iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["given_name", "family_name"]);
        assert!(disclosure.items()[0].required);
        assert!(!disclosure.items()[1].required);

        let mut tracker = SelectionTracker::new(disclosure);
        let given_name = ItemId::new("d1", "ns", "given_name");
        assert!(tracker.toggle(&given_name).unwrap());
        assert!(tracker.current_selection().contains("d1", "ns", "given_name"));
    }

    #[test]
    fn item_ids_keep_their_parts_apart() {
        let left = ItemId::new("a:b", "c", "e");
        let right = ItemId::new("a", "b:c", "e");

        assert_ne!(left, right);
        assert_eq!(left.document_id(), "a:b");
        assert_eq!(right.namespace(), "b:c");
        assert_eq!(left.to_string(), "a:b/c/e");
    }

    #[test]
    fn signature_identifier_renders_as_signature() {
        assert_eq!(value_kind(SIGNATURE_USUAL_MARK), ValueKind::Signature);
        assert_eq!(value_kind("family_name"), ValueKind::Text);
        assert_eq!(
            render_value(ValueKind::Signature, Some(&json!({"not": "bytes"}))),
            ""
        );
        assert_eq!(
            render_value(ValueKind::Text, Some(&json!({"country": "SE", "city": "Lund"}))),
            "country: SE, city: Lund"
        );
    }
}
