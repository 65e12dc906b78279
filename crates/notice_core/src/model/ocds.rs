//! Thin serde envelope over an OCDS release document.
//!
//! Only the fields needed to route and key a release are typed; everything
//! else round-trips untouched through `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OCDS release document as stored in `json_data`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// ISO-8601 release date as published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tender: Option<RecordTender>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Tender section of a release.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordTender {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "statusDetails", skip_serializing_if = "Option::is_none")]
    pub status_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lots: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecordDocument {
    /// Parses a stored document and normalizes empty tender collections.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut document: Self = serde_json::from_str(json)?;
        document.normalize();
        Ok(document)
    }

    /// Serializes the document for storage.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Drops empty `items`, `lots` and `documents` arrays so an empty list and
    /// a missing list are stored the same way.
    pub fn normalize(&mut self) {
        if let Some(tender) = self.tender.as_mut() {
            drop_if_empty(&mut tender.items);
            drop_if_empty(&mut tender.lots);
            drop_if_empty(&mut tender.documents);
        }
    }

    /// Tender status used for the `status` column.
    pub fn tender_status(&self) -> Option<&str> {
        self.tender
            .as_ref()
            .and_then(|tender| tender.status.as_deref())
    }
}

fn drop_if_empty(values: &mut Option<Vec<Value>>) {
    if values.as_ref().is_some_and(Vec::is_empty) {
        *values = None;
    }
}
