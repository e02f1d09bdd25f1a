use serde::{Deserialize, Serialize};

use super::disclosure::{Disclosure, DisclosureItem, ItemId};
use crate::error::SessionError;

/// An element the user agreed to disclose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SelectedElement {
    pub namespace: String,
    pub element_identifier: String,
}

/// The elements disclosed from one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosedDocument {
    pub document_id: String,
    pub doc_type: String,
    pub elements: Vec<SelectedElement>,
}

/// The confirmed disclosure, grouped by document in request order.
///
/// Every `(document_id, namespace, element_identifier)` appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureSelection {
    documents: Vec<DisclosedDocument>,
}

impl DisclosureSelection {
    pub fn documents(&self) -> &[DisclosedDocument] {
        &self.documents
    }

    /// Iterate over `(document_id, namespace, element_identifier)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.documents.iter().flat_map(|document| {
            document.elements.iter().map(move |element| {
                (
                    document.document_id.as_str(),
                    element.namespace.as_str(),
                    element.element_identifier.as_str(),
                )
            })
        })
    }

    pub fn contains(&self, document_id: &str, namespace: &str, element_identifier: &str) -> bool {
        self.iter()
            .any(|entry| entry == (document_id, namespace, element_identifier))
    }

    pub fn len(&self) -> usize {
        self.documents.iter().map(|d| d.elements.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, item: &DisclosureItem) {
        let element = SelectedElement {
            namespace: item.namespace.clone(),
            element_identifier: item.element_identifier.clone(),
        };
        match self
            .documents
            .iter_mut()
            .find(|document| document.document_id == item.document_id)
        {
            Some(document) => document.elements.push(element),
            None => self.documents.push(DisclosedDocument {
                document_id: item.document_id.clone(),
                doc_type: item.doc_type.clone(),
                elements: vec![element],
            }),
        }
    }
}

/// Tracks the user's selection over a [Disclosure].
///
/// Required items are always selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTracker {
    disclosure: Disclosure,
}

impl SelectionTracker {
    pub fn new(mut disclosure: Disclosure) -> Self {
        for item in disclosure.items.iter_mut().filter(|item| item.required) {
            item.selected = true;
        }
        Self { disclosure }
    }

    pub fn disclosure(&self) -> &Disclosure {
        &self.disclosure
    }

    /// Flip the selection of an item and return whether it is now selected.
    ///
    /// Toggling a required item leaves it selected.
    pub fn toggle(&mut self, id: &ItemId) -> Result<bool, SessionError> {
        let item = self
            .disclosure
            .items
            .iter_mut()
            .find(|item| &item.id == id)
            .ok_or_else(|| SessionError::UnknownItem(id.clone()))?;

        if !item.required {
            item.selected = !item.selected;
        }
        Ok(item.selected)
    }

    /// The selected items, in request order.
    pub fn current_selection(&self) -> DisclosureSelection {
        let mut selection = DisclosureSelection::default();
        for item in self.disclosure.items().iter().filter(|item| item.selected) {
            selection.push(item);
        }
        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DisclosureLabels,
        core::{
            disclosure::build_disclosure,
            document::StoredDocument,
            event::{RequestedDocument, VerifierInfo},
        },
    };
    use serde_json::json;

    fn tracker() -> SelectionTracker {
        let stored = [
            StoredDocument::new("d1", "PID")
                .with_attribute("given_name", json!("ANNA"))
                .with_attribute("birth_date", json!("1990-01-01")),
            StoredDocument::new("d2", "mDL").with_attribute("document_number", json!("X1")),
        ];
        let request = [
            RequestedDocument::new("d1", "PID")
                .with_element("ns", "given_name", true)
                .with_element("ns", "birth_date", false),
            RequestedDocument::new("d2", "mDL").with_element("ns", "document_number", false),
        ];
        SelectionTracker::new(build_disclosure(
            &request,
            VerifierInfo::default(),
            &stored,
            &DisclosureLabels::default(),
        ))
    }

    #[test]
    fn required_items_stay_selected() {
        let mut tracker = tracker();
        let id = ItemId::new("d1", "ns", "given_name");

        for _ in 0..5 {
            assert!(tracker.toggle(&id).unwrap());
        }
        assert!(tracker.disclosure().item(&id).unwrap().selected());
        assert!(tracker.current_selection().contains("d1", "ns", "given_name"));
    }

    #[test]
    fn optional_items_toggle() {
        let mut tracker = tracker();
        let id = ItemId::new("d1", "ns", "birth_date");

        assert!(!tracker.toggle(&id).unwrap());
        assert!(!tracker.current_selection().contains("d1", "ns", "birth_date"));
        assert!(tracker.toggle(&id).unwrap());
        assert!(tracker.current_selection().contains("d1", "ns", "birth_date"));
    }

    #[test]
    fn selection_is_grouped_by_document() {
        let mut tracker = tracker();
        tracker
            .toggle(&ItemId::new("d2", "ns", "document_number"))
            .unwrap();

        let selection = tracker.current_selection();

        assert_eq!(selection.len(), 2);
        assert_eq!(selection.documents().len(), 1);
        let entries: Vec<_> = selection.iter().collect();
        assert_eq!(
            entries,
            [("d1", "ns", "given_name"), ("d1", "ns", "birth_date")]
        );
    }

    #[test]
    fn unknown_items_are_rejected() {
        let mut tracker = tracker();
        let id = ItemId::new("d9", "ns", "given_name");
        assert!(matches!(
            tracker.toggle(&id),
            Err(SessionError::UnknownItem(unknown)) if unknown == id
        ));
    }
}
