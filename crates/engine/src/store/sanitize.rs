// Strips oversized media from documents before they are persisted.
//
// A string is replaced by a placeholder when it is longer than the
// threshold AND either is an embedded `data:image/...;base64,` URI or sits
// under a key naming a signature or photo. Nested maps and arrays are walked
// so legacy `document_values` payloads are covered too.

use serde_json::Value;

use permitvault_common::payload::{
    is_embedded_image, is_media_key, is_placeholder, is_signature_key, placeholder, OmittedKind,
};
use permitvault_common::types::{Document, Payload};

/// Returns the number of values replaced.
pub fn sanitize_document(document: &mut Document, threshold_chars: usize) -> usize {
    sanitize_map(&mut document.payload, threshold_chars)
}

pub fn sanitize_map(map: &mut Payload, threshold_chars: usize) -> usize {
    let mut replaced = 0;
    for (key, value) in map.iter_mut() {
        replaced += sanitize_value(Some(key.as_str()), value, threshold_chars);
    }
    replaced
}

fn sanitize_value(key: Option<&str>, value: &mut Value, threshold_chars: usize) -> usize {
    match value {
        Value::String(s) => {
            let Some(kind) = omit_kind(key, s, threshold_chars) else {
                return 0;
            };
            let original_bytes = s.len();
            *value = Value::String(placeholder(kind, original_bytes));
            1
        }
        Value::Object(map) => sanitize_map(map, threshold_chars),
        Value::Array(items) => items
            .iter_mut()
            .map(|item| sanitize_value(key, item, threshold_chars))
            .sum(),
        _ => 0,
    }
}

fn omit_kind(key: Option<&str>, s: &str, threshold_chars: usize) -> Option<OmittedKind> {
    if s.chars().count() <= threshold_chars || is_placeholder(s) {
        return None;
    }
    let signature_key = key.is_some_and(is_signature_key);
    if signature_key {
        return Some(OmittedKind::Signature);
    }
    if is_embedded_image(s) || key.is_some_and(is_media_key) {
        return Some(OmittedKind::Image);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use permitvault_common::payload::parse_placeholder;
    use permitvault_common::types::DOCUMENT_VALUES_KEY;
    use serde_json::json;

    const THRESHOLD: usize = 1_000;

    fn image(len: usize) -> String {
        format!("data:image/jpeg;base64,{}", "B".repeat(len))
    }

    #[test]
    fn large_embedded_image_is_replaced_whatever_the_key() {
        let mut payload = Payload::new();
        payload.insert("f7".into(), json!(image(5_000)));
        let mut doc = Document::instance("custom", "Permit", payload);

        assert_eq!(sanitize_document(&mut doc, THRESHOLD), 1);
        let stored = doc.payload["f7"].as_str().unwrap();
        assert_eq!(parse_placeholder(stored), Some(OmittedKind::Image));
    }

    #[test]
    fn signature_keys_keep_their_kind() {
        let mut payload = Payload::new();
        payload.insert("assinatura".into(), json!(image(5_000)));
        let mut doc = Document::instance("custom", "Permit", payload);

        sanitize_document(&mut doc, THRESHOLD);
        let stored = doc.payload["assinatura"].as_str().unwrap();
        assert_eq!(parse_placeholder(stored), Some(OmittedKind::Signature));
    }

    #[test]
    fn long_plain_text_is_kept() {
        let text = "lorem ipsum ".repeat(500);
        let mut payload = Payload::new();
        payload.insert("observations".into(), json!(text.clone()));
        let mut doc = Document::instance("custom", "Permit", payload);

        assert_eq!(sanitize_document(&mut doc, THRESHOLD), 0);
        assert_eq!(doc.payload["observations"], json!(text));
    }

    #[test]
    fn small_images_are_kept() {
        let small = image(100);
        let mut payload = Payload::new();
        payload.insert("photo".into(), json!(small.clone()));
        let mut doc = Document::instance("custom", "Permit", payload);

        assert_eq!(sanitize_document(&mut doc, THRESHOLD), 0);
        assert_eq!(doc.payload["photo"], json!(small));
    }

    #[test]
    fn threshold_counts_characters_not_bytes() {
        let accented = "é".repeat(600);
        let mut payload = Payload::new();
        payload.insert("photo_caption".into(), json!(accented.clone()));
        payload.insert("photo_notes".into(), json!("é".repeat(1_001)));
        let mut doc = Document::instance("custom", "Permit", payload);

        assert_eq!(sanitize_document(&mut doc, THRESHOLD), 1);
        assert_eq!(doc.payload["photo_caption"], json!(accented));
        assert_eq!(
            doc.payload["photo_notes"].as_str().and_then(parse_placeholder),
            Some(OmittedKind::Image)
        );
    }

    #[test]
    fn nested_values_and_arrays_are_walked() {
        let mut payload = Payload::new();
        payload.insert(
            DOCUMENT_VALUES_KEY.into(),
            json!({ "signature": image(2_000), "photos": [image(2_000), "caption"] }),
        );
        let mut doc = Document::instance("custom", "Permit", payload);

        assert_eq!(sanitize_document(&mut doc, THRESHOLD), 2);
        let nested = &doc.payload[DOCUMENT_VALUES_KEY];
        assert!(is_placeholder(nested["signature"].as_str().unwrap()));
        assert!(is_placeholder(nested["photos"][0].as_str().unwrap()));
        assert_eq!(nested["photos"][1], "caption");
    }

    #[test]
    fn sanitizing_twice_changes_nothing_more() {
        let mut payload = Payload::new();
        payload.insert("f1".into(), json!(image(5_000)));
        let mut doc = Document::instance("custom", "Permit", payload);

        sanitize_document(&mut doc, THRESHOLD);
        let once = doc.clone();
        assert_eq!(sanitize_document(&mut doc, THRESHOLD), 0);
        assert_eq!(doc, once);
    }
}
