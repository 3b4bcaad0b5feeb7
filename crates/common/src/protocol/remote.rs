// Row shapes of the hosted `documents` and `document_section_locks` tables.
//
// `data` is a JSON blob holding the form payload together with the
// document's own `export_format`, and for templates the `boxes`/`fields`
// layout. Cancellation status travels inside `data` as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    Document, DocumentId, DocumentKind, ExportFormat, Payload, SectionLockPreference,
    TemplateLayout,
};

pub const DATA_EXPORT_FORMAT_KEY: &str = "export_format";
pub const DATA_BOXES_KEY: &str = "boxes";
pub const DATA_FIELDS_KEY: &str = "fields";
pub const DATA_CANCELLED_KEY: &str = "cancelled";
pub const DATA_CANCELLATION_REASON_KEY: &str = "cancellation_reason";

/// Keys of `data` that are document metadata rather than form values.
const RESERVED_DATA_KEYS: &[&str] = &[
    DATA_EXPORT_FORMAT_KEY,
    DATA_BOXES_KEY,
    DATA_FIELDS_KEY,
    DATA_CANCELLED_KEY,
    DATA_CANCELLATION_REASON_KEY,
];

/// A row of the remote `documents` table as returned by a list query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteDocumentRecord {
    pub id: DocumentId,
    #[serde(rename = "type")]
    pub document_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data: Payload,
    /// Per-document override, takes precedence over `data.export_format`.
    #[serde(default)]
    pub export_format: Option<String>,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Embedded rows of `document_section_locks`.
    #[serde(default)]
    pub section_locks: Vec<SectionLockRow>,
}

impl RemoteDocumentRecord {
    /// `export_format` stored inside the data blob, if parseable.
    pub fn embedded_export_format(&self) -> Option<ExportFormat> {
        self.data.get(DATA_EXPORT_FORMAT_KEY).and_then(Value::as_str).and_then(|s| s.parse().ok())
    }

    /// Explicit per-document override column, if parseable.
    pub fn override_export_format(&self) -> Option<ExportFormat> {
        self.export_format.as_deref().and_then(|s| s.parse().ok())
    }

    /// Layout embedded in the data blob, when it carries one.
    pub fn layout(&self) -> Option<TemplateLayout> {
        if !self.data.contains_key(DATA_BOXES_KEY) && !self.data.contains_key(DATA_FIELDS_KEY) {
            return None;
        }
        let boxes = self.data.get(DATA_BOXES_KEY).cloned().unwrap_or(Value::Array(Vec::new()));
        let fields = self.data.get(DATA_FIELDS_KEY).cloned().unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(serde_json::json!({ "boxes": boxes, "fields": fields })).ok()
    }

    /// Form values with the metadata keys removed.
    pub fn form_values(&self) -> Payload {
        self.data
            .iter()
            .filter(|(key, _)| !RESERVED_DATA_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn cancelled(&self) -> bool {
        self.data.get(DATA_CANCELLED_KEY).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn cancellation_reason(&self) -> Option<String> {
        self.data.get(DATA_CANCELLATION_REASON_KEY).and_then(Value::as_str).map(str::to_string)
    }
}

/// Insert/update body for the `documents` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteDocumentDraft {
    #[serde(rename = "type")]
    pub document_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub data: Payload,
    pub is_template: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl RemoteDocumentDraft {
    pub fn from_document(document: &Document) -> Self {
        let mut data = document.payload.clone();
        if let Some(format) = document.export_format {
            data.insert(DATA_EXPORT_FORMAT_KEY.into(), Value::String(format.as_str().into()));
        }
        if let Some(layout) = &document.layout {
            data.insert(
                DATA_BOXES_KEY.into(),
                serde_json::to_value(&layout.sections).unwrap_or(Value::Array(Vec::new())),
            );
            data.insert(
                DATA_FIELDS_KEY.into(),
                serde_json::to_value(&layout.fields).unwrap_or(Value::Array(Vec::new())),
            );
        }
        if document.cancelled {
            data.insert(DATA_CANCELLED_KEY.into(), Value::Bool(true));
            if let Some(reason) = &document.cancellation_reason {
                data.insert(DATA_CANCELLATION_REASON_KEY.into(), Value::String(reason.clone()));
            }
        }

        let description = document
            .payload
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            document_type: document.document_type.clone(),
            title: document.title.clone(),
            description,
            data,
            is_template: document.kind == DocumentKind::Template,
            created_by: None,
        }
    }
}

/// A row of `document_section_locks`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionLockRow {
    pub document_id: DocumentId,
    pub section_id: String,
    pub lock_when_signed: bool,
}

impl SectionLockRow {
    pub fn from_preferences(
        document_id: &DocumentId,
        preferences: &[SectionLockPreference],
    ) -> Vec<Self> {
        preferences
            .iter()
            .map(|p| Self {
                document_id: document_id.clone(),
                section_id: p.section_id.clone(),
                lock_when_signed: p.locks(),
            })
            .collect()
    }

    pub fn to_preference(&self) -> SectionLockPreference {
        SectionLockPreference {
            section_id: self.section_id.clone(),
            lock_when_signed: Some(self.lock_when_signed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, FieldType, Section};
    use serde_json::json;

    fn record(data: Value) -> RemoteDocumentRecord {
        serde_json::from_value(json!({
            "id": "r1",
            "type": "custom",
            "title": "Permit",
            "data": data,
            "is_template": false,
            "is_deleted": false,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-02T00:00:00Z"
        }))
        .expect("record should parse")
    }

    #[test]
    fn record_parses_with_optional_columns_missing() {
        let rec = record(json!({ "f1": "yes" }));
        assert_eq!(rec.id, DocumentId::from("r1"));
        assert!(rec.description.is_none());
        assert!(rec.section_locks.is_empty());
        assert!(rec.layout().is_none());
    }

    #[test]
    fn form_values_exclude_metadata_keys() {
        let rec = record(json!({
            "f1": "yes",
            "export_format": "WORD",
            "cancelled": true,
            "cancellation_reason": "weather"
        }));
        let values = rec.form_values();
        assert_eq!(values.len(), 1);
        assert_eq!(rec.embedded_export_format(), Some(ExportFormat::Word));
        assert!(rec.cancelled());
        assert_eq!(rec.cancellation_reason().as_deref(), Some("weather"));
    }

    #[test]
    fn draft_embeds_layout_and_format() {
        let layout = TemplateLayout {
            sections: vec![Section::new("s1", "Crew", 1)],
            fields: vec![Field::new("f1", "s1", FieldType::Signature, 1)],
        };
        let mut doc = Document::template("custom", "Hot work", layout.clone());
        doc.export_format = Some(ExportFormat::Excel);

        let draft = RemoteDocumentDraft::from_document(&doc);
        assert!(draft.is_template);
        assert_eq!(draft.data[DATA_EXPORT_FORMAT_KEY], "EXCEL");

        let rec = record(Value::Object(draft.data));
        assert_eq!(rec.layout(), Some(layout));
    }

    #[test]
    fn lock_rows_round_trip_preferences() {
        let prefs = vec![
            SectionLockPreference { section_id: "s1".into(), lock_when_signed: None },
            SectionLockPreference { section_id: "s2".into(), lock_when_signed: Some(false) },
        ];
        let rows = SectionLockRow::from_preferences(&DocumentId::from(9_i64), &prefs);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].lock_when_signed);
        assert!(!rows[1].lock_when_signed);
        assert_eq!(rows[1].to_preference().lock_when_signed, Some(false));
    }
}
