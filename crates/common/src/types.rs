// Core domain types shared across all permitvault crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::section::dedup::{repair, RepairedLayout};

/// Field-id → value map captured by a form.
pub type Payload = Map<String, Value>;

/// Legacy payloads nest their values one level down under this key.
pub const DOCUMENT_VALUES_KEY: &str = "document_values";

/// Document type under which form-builder templates are registered.
pub const FORM_BUILDER_TYPE: &str = "form-builder";

/// Identifier of a document: legacy records use integers, newer ones strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum DocumentId {
    Number(i64),
    Text(String),
}

impl DocumentId {
    /// Fresh random identifier for a document created on this device.
    pub fn generate() -> Self {
        Self::Text(Uuid::new_v4().to_string())
    }

    /// Identity comparison across representations (`7` matches `"7"`).
    pub fn matches(&self, other: &DocumentId) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for DocumentId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

/// Whether a document is a reusable layout or a filled-in form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Template,
    #[default]
    Instance,
}

/// Output format used when the document is exported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    #[serde(rename = "PDF")]
    Pdf,
    #[serde(rename = "WORD")]
    Word,
    #[serde(rename = "EXCEL")]
    Excel,
}

impl ExportFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Word => "WORD",
            Self::Excel => "EXCEL",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = UnknownExportFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "word" | "docx" | "doc" => Ok(Self::Word),
            "excel" | "xlsx" | "xls" => Ok(Self::Excel),
            _ => Err(UnknownExportFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown export format: {0}")]
pub struct UnknownExportFormat(pub String);

/// A named grouping of fields ("box") inside a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    /// Display order; need not be contiguous.
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_true")]
    pub lock_when_signed: bool,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>, order: i64) -> Self {
        Self { id: id.into(), title: title.into(), order, lock_when_signed: true }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    ShortText,
    LongText,
    Checkbox,
    SingleChoiceFlag,
    FlagText,
    Date,
    Time,
    Signature,
    Image,
}

/// An input definition owned by exactly one section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub box_id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub label: String,
}

impl Field {
    pub fn new(
        id: impl Into<String>,
        box_id: impl Into<String>,
        field_type: FieldType,
        order: i64,
    ) -> Self {
        Self {
            id: id.into(),
            box_id: box_id.into(),
            field_type,
            order,
            label: String::new(),
        }
    }
}

/// Sections and fields of a form, as embedded in templates and the
/// instances created from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TemplateLayout {
    #[serde(rename = "boxes", alias = "sections", default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl TemplateLayout {
    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn field(&self, field_id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == field_id)
    }

    pub fn signature_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.field_type == FieldType::Signature)
    }

    /// Fields of one section in display order.
    pub fn fields_in(&self, section_id: &str) -> Vec<&Field> {
        let mut fields: Vec<&Field> =
            self.fields.iter().filter(|f| f.box_id == section_id).collect();
        fields.sort_by_key(|f| f.order);
        fields
    }
}

/// Per-section override of the lock-on-signature behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SectionLockPreference {
    pub section_id: String,
    #[serde(default)]
    pub lock_when_signed: Option<bool>,
}

impl SectionLockPreference {
    /// Only an explicit `false` unlocks.
    pub fn locks(&self) -> bool {
        self.lock_when_signed != Some(false)
    }
}

/// Derived lock decision for one section of one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SectionLock {
    pub document_id: DocumentId,
    pub section_id: String,
    pub locked: bool,
}

/// A saved unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub document_type: String,
    pub title: String,
    /// Mirror of `title` kept for lookups by older screens.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: DocumentKind,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<TemplateLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_locks: Option<Vec<SectionLockPreference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_format: Option<ExportFormat>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<DocumentId>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Document {
    pub fn new(
        document_type: impl Into<String>,
        title: impl Into<String>,
        kind: DocumentKind,
        payload: Payload,
    ) -> Self {
        let title = title.into();
        let now = Utc::now();
        Self {
            id: DocumentId::generate(),
            document_type: document_type.into(),
            name: title.clone(),
            title,
            kind,
            payload,
            layout: None,
            section_locks: None,
            export_format: None,
            created_at: now,
            updated_at: now,
            cancelled: false,
            cancellation_reason: None,
            remote_id: None,
            is_deleted: false,
        }
    }

    pub fn instance(
        document_type: impl Into<String>,
        title: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self::new(document_type, title, DocumentKind::Instance, payload)
    }

    pub fn template(
        document_type: impl Into<String>,
        title: impl Into<String>,
        layout: TemplateLayout,
    ) -> Self {
        let mut doc = Self::new(document_type, title, DocumentKind::Template, Payload::new());
        doc.layout = Some(layout);
        doc
    }

    pub fn with_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_layout(mut self, layout: TemplateLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_section_locks(mut self, locks: Vec<SectionLockPreference>) -> Self {
        self.section_locks = Some(locks);
        self
    }

    pub fn is_template(&self) -> bool {
        self.kind == DocumentKind::Template
    }

    /// Value of a field, looking at the top level first and then at the
    /// legacy `document_values` map.
    pub fn field_value(&self, field_id: &str) -> Option<&Value> {
        self.payload.get(field_id).or_else(|| {
            self.payload
                .get(DOCUMENT_VALUES_KEY)
                .and_then(Value::as_object)
                .and_then(|values| values.get(field_id))
        })
    }

    /// Every `(key, value)` pair a signature scan should look at: top level
    /// entries plus the nested `document_values` map.
    pub fn payload_entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        let nested = self
            .payload
            .get(DOCUMENT_VALUES_KEY)
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|values| values.iter());
        self.payload.iter().chain(nested)
    }

    /// Identity, label, type and cancellation status only. Used as the last
    /// representation that still fits when storage is exhausted.
    pub fn minimal(&self) -> Self {
        Self {
            id: self.id.clone(),
            document_type: self.document_type.clone(),
            title: self.title.clone(),
            name: self.name.clone(),
            kind: self.kind,
            payload: Payload::new(),
            layout: None,
            section_locks: None,
            export_format: None,
            created_at: self.created_at,
            updated_at: self.updated_at,
            cancelled: self.cancelled,
            cancellation_reason: self.cancellation_reason.clone(),
            remote_id: self.remote_id.clone(),
            is_deleted: self.is_deleted,
        }
    }

    /// Matches either this document's own id or the remote id it was synced under.
    pub fn is_same_identity(&self, id: &DocumentId) -> bool {
        self.id.matches(id) || self.remote_id.as_ref().is_some_and(|remote| remote.matches(id))
    }
}

/// Form-builder layout persisted by the template config store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfig {
    pub id: DocumentId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub layout: TemplateLayout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_format: Option<ExportFormat>,
    pub updated_at: DateTime<Utc>,
}

impl TemplateConfig {
    pub fn new(title: impl Into<String>, layout: TemplateLayout) -> Self {
        Self {
            id: DocumentId::generate(),
            title: title.into(),
            description: String::new(),
            layout,
            export_format: None,
            updated_at: Utc::now(),
        }
    }

    /// Template document for generic listings under `form-builder`.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::template(FORM_BUILDER_TYPE, self.title.clone(), self.layout.clone())
            .with_id(self.id.clone());
        doc.export_format = self.export_format;
        doc.updated_at = self.updated_at;
        if !self.description.is_empty() {
            doc.payload.insert("description".to_string(), Value::String(self.description.clone()));
        }
        doc
    }

    /// Create a fresh editable instance of this template. Section and field
    /// ids are repaired first so a corrupted copy cannot leak into the form.
    pub fn instantiate(
        &self,
        document_type: impl Into<String>,
        title: impl Into<String>,
    ) -> (Document, RepairedLayout) {
        let repaired = repair(self.layout.sections.clone(), self.layout.fields.clone());
        let layout = TemplateLayout {
            sections: repaired.sections.clone(),
            fields: repaired.fields.clone(),
        };
        let locks = layout
            .sections
            .iter()
            .map(|s| SectionLockPreference {
                section_id: s.id.clone(),
                lock_when_signed: Some(s.lock_when_signed),
            })
            .collect();

        let mut doc = Document::instance(document_type, title, Payload::new())
            .with_layout(layout)
            .with_section_locks(locks);
        doc.export_format = self.export_format;
        (doc, repaired)
    }
}

fn default_true() -> bool {
    true
}
