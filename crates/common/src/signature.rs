// Signature presence detection over arbitrary document payloads.
//
// Two paths, in order:
//   1. Schema: when the document's layout declares fields of type
//      `signature`, only those fields are consulted.
//   2. Key heuristic: for records without such a schema (legacy payloads),
//      any key containing "signature"/"assinatura" that holds a string
//      longer than the minimum counts. A long text answer stored under a
//      signature-named key is misclassified; this is a known limitation.
//
// A placeholder left by the storage sanitizer still counts as captured so
// that locking survives degraded saves. Under a declared signature field any
// placeholder counts; under a heuristic key only a signature placeholder does.

use serde_json::Value;

use crate::payload::{is_signature_key, parse_placeholder, OmittedKind};
use crate::types::Document;

/// Strings at or below this length cannot plausibly be an encoded image or
/// stroke trace.
pub const MIN_SIGNATURE_CHARS: usize = 100;

/// Where a signature was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureSource {
    /// A field declared with type `signature`.
    SchemaField(String),
    /// A payload key whose name looks like a signature.
    KeyHeuristic(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureDetector {
    pub min_chars: usize,
}

impl Default for SignatureDetector {
    fn default() -> Self {
        Self { min_chars: MIN_SIGNATURE_CHARS }
    }
}

impl SignatureDetector {
    pub fn has_signature(&self, document: &Document) -> bool {
        self.detect(document).is_some()
    }

    /// First captured signature found, if any.
    pub fn detect(&self, document: &Document) -> Option<SignatureSource> {
        let schema_fields: Vec<&str> = document
            .layout
            .iter()
            .flat_map(|layout| layout.signature_fields())
            .map(|field| field.id.as_str())
            .collect();

        if !schema_fields.is_empty() {
            return schema_fields
                .into_iter()
                .find(|id| document.field_value(id).is_some_and(|v| self.is_captured(v, true)))
                .map(|id| SignatureSource::SchemaField(id.to_string()));
        }

        document
            .payload_entries()
            .find(|(key, value)| is_signature_key(key) && self.is_captured(value, false))
            .map(|(key, _)| SignatureSource::KeyHeuristic(key.clone()))
    }

    fn is_captured(&self, value: &Value, declared: bool) -> bool {
        let Value::String(s) = value else {
            return false;
        };
        if s.chars().count() > self.min_chars {
            return true;
        }
        match parse_placeholder(s) {
            Some(OmittedKind::Signature) => true,
            Some(OmittedKind::Image) => declared,
            None => false,
        }
    }
}

/// `has_signature` with the default minimum length.
pub fn has_signature(document: &Document) -> bool {
    SignatureDetector::default().has_signature(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::placeholder;
    use crate::types::{Field, FieldType, Payload, Section, TemplateLayout, DOCUMENT_VALUES_KEY};
    use serde_json::json;

    fn signature_image() -> String {
        format!("data:image/png;base64,{}", "A".repeat(300))
    }

    fn signed_layout() -> TemplateLayout {
        TemplateLayout {
            sections: vec![Section::new("s1", "Crew", 1)],
            fields: vec![
                Field::new("f1", "s1", FieldType::Signature, 1),
                Field::new("f2", "s1", FieldType::LongText, 2),
            ],
        }
    }

    #[test]
    fn schema_signature_field_with_image_is_detected() {
        let mut payload = Payload::new();
        payload.insert("f1".into(), json!(signature_image()));
        let doc = Document::instance("custom", "Permit", payload).with_layout(signed_layout());

        assert_eq!(
            SignatureDetector::default().detect(&doc),
            Some(SignatureSource::SchemaField("f1".into()))
        );
    }

    #[test]
    fn schema_path_ignores_long_text_under_signature_like_key() {
        let mut payload = Payload::new();
        payload.insert("signature_notes".into(), json!("x".repeat(400)));
        let doc = Document::instance("custom", "Permit", payload).with_layout(signed_layout());

        assert!(!has_signature(&doc));
    }

    #[test]
    fn heuristic_detects_legacy_keys() {
        let mut payload = Payload::new();
        payload.insert("assinatura_responsavel".into(), json!(signature_image()));
        let doc = Document::instance("risk-analysis", "APR", payload);

        assert_eq!(
            SignatureDetector::default().detect(&doc),
            Some(SignatureSource::KeyHeuristic("assinatura_responsavel".into()))
        );
    }

    #[test]
    fn heuristic_scans_document_values() {
        let mut payload = Payload::new();
        payload.insert(DOCUMENT_VALUES_KEY.into(), json!({ "signature": signature_image() }));
        let doc = Document::instance("risk-analysis", "APR", payload);

        assert!(has_signature(&doc));
    }

    #[test]
    fn short_values_are_not_signatures() {
        let mut payload = Payload::new();
        payload.insert("signature".into(), json!("x".repeat(MIN_SIGNATURE_CHARS)));
        payload.insert("other".into(), json!(signature_image()));
        let doc = Document::instance("risk-analysis", "APR", payload);

        assert!(!has_signature(&doc));
    }

    #[test]
    fn non_string_values_are_not_signatures() {
        let mut payload = Payload::new();
        payload.insert("signature".into(), json!({ "strokes": [1, 2, 3] }));
        payload.insert("signature_done".into(), json!(true));
        let doc = Document::instance("risk-analysis", "APR", payload);

        assert!(!has_signature(&doc));
    }

    #[test]
    fn sanitized_signature_placeholder_still_counts() {
        let mut payload = Payload::new();
        payload.insert("f1".into(), json!(placeholder(OmittedKind::Signature, 52_000)));
        let doc = Document::instance("custom", "Permit", payload).with_layout(signed_layout());

        assert!(has_signature(&doc));
    }

    #[test]
    fn any_placeholder_under_declared_signature_field_counts() {
        let mut payload = Payload::new();
        payload.insert("f1".into(), json!(placeholder(OmittedKind::Image, 8_000)));
        let doc = Document::instance("custom", "Permit", payload).with_layout(signed_layout());

        assert!(has_signature(&doc));
    }

    #[test]
    fn image_placeholder_under_heuristic_key_is_not_a_signature() {
        let mut payload = Payload::new();
        payload.insert("signature".into(), json!(placeholder(OmittedKind::Image, 52_000)));
        let doc = Document::instance("custom", "Permit", payload);

        assert!(!has_signature(&doc));
    }
}
