use presentment_frontend::ValueKind;
use serde::{Deserialize, Serialize};

use super::{
    disclosure::{render_value, value_kind, PORTRAIT},
    document::StoredDocument,
};
use crate::utils::to_human_readable_string;

/// Element identifier of the document's expiry date.
pub const EXPIRY_DATE: &str = "expiry_date";

/// Shown in place of the portrait in the detail rows.
pub const PORTRAIT_READABLE_IDENTIFIER: &str = "Shown above";

/// A stored document as the user browses it outside of a presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDetails {
    pub document_id: String,
    pub doc_type: String,
    pub document_name: Option<String>,
    pub expiry_date: Option<String>,
    /// Base64 encoded portrait, if the document has one.
    pub portrait: Option<String>,
    pub rows: Vec<DetailRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRow {
    pub element_identifier: String,
    pub title: String,
    pub value: String,
    pub kind: ValueKind,
}

/// Project a document to display rows, in stored attribute order.
pub fn document_details(document: &StoredDocument) -> DocumentDetails {
    let rows = document
        .attributes
        .iter()
        .map(|(identifier, value)| {
            let title = to_human_readable_string(identifier.as_str());
            // The portrait is shown in the header, not inline.
            if identifier == PORTRAIT {
                return DetailRow {
                    element_identifier: identifier.clone(),
                    title,
                    value: PORTRAIT_READABLE_IDENTIFIER.to_owned(),
                    kind: ValueKind::Text,
                };
            }
            let kind = value_kind(identifier);
            DetailRow {
                element_identifier: identifier.clone(),
                title,
                value: render_value(kind, Some(value)),
                kind,
            }
        })
        .collect();

    let non_empty = |identifier: &str, kind: ValueKind| {
        Some(render_value(kind, document.attribute(identifier))).filter(|v| !v.is_empty())
    };

    DocumentDetails {
        document_id: document.id.clone(),
        doc_type: document.doc_type.clone(),
        document_name: document.name.clone(),
        expiry_date: non_empty(EXPIRY_DATE, ValueKind::Text),
        portrait: non_empty(PORTRAIT, ValueKind::Image),
        rows,
    }
}
