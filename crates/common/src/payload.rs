// Payload value classification: signature/photo keys, embedded images,
// and the placeholder that replaces oversized media.

use std::sync::OnceLock;

use regex::Regex;

/// Key fragments naming a captured signature (English and Portuguese).
pub const SIGNATURE_KEY_MARKERS: &[&str] = &["signature", "assinatura"];

/// Key fragments naming a photo or other captured image.
pub const MEDIA_KEY_MARKERS: &[&str] = &["photo", "foto", "image", "imagem", "picture"];

const PLACEHOLDER_PREFIX: &str = "[omitted:";

/// What a placeholder stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OmittedKind {
    Signature,
    Image,
}

impl OmittedKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::Image => "image",
        }
    }
}

pub fn is_signature_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SIGNATURE_KEY_MARKERS.iter().any(|marker| key.contains(marker))
}

pub fn is_media_key(key: &str) -> bool {
    let key = key.to_lowercase();
    MEDIA_KEY_MARKERS.iter().any(|marker| key.contains(marker))
}

/// `data:image/<subtype>;base64,` URI as produced by canvas and camera capture.
pub fn is_embedded_image(value: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^data:image/[A-Za-z0-9.+-]+;base64,")
                .expect("embedded image pattern should compile")
        })
        .is_match(value)
}

/// Marker written in place of a stripped value, e.g. `[omitted:signature:48213]`.
pub fn placeholder(kind: OmittedKind, original_bytes: usize) -> String {
    format!("{PLACEHOLDER_PREFIX}{}:{original_bytes}]", kind.as_str())
}

/// Parses a placeholder back into its kind.
pub fn parse_placeholder(value: &str) -> Option<OmittedKind> {
    let rest = value.strip_prefix(PLACEHOLDER_PREFIX)?.strip_suffix(']')?;
    let (kind, bytes) = rest.split_once(':')?;
    bytes.parse::<usize>().ok()?;
    match kind {
        "signature" => Some(OmittedKind::Signature),
        "image" => Some(OmittedKind::Image),
        _ => None,
    }
}

pub fn is_placeholder(value: &str) -> bool {
    parse_placeholder(value).is_some()
}
