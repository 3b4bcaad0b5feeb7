// Section lock resolution for signed documents.
//
// Sources are consulted in a fixed order and the first that knows about the
// section wins:
//   1. no captured signature      -> never locked
//   2. explicit lock preference   -> its `lockWhenSigned` (absent = true)
//   3. section embedded in layout -> its `lockWhenSigned`
//   4. anything else              -> locked

use crate::signature::SignatureDetector;
use crate::types::{Document, SectionLock};

/// Which source produced a lock decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    Unsigned,
    ExplicitPreference(bool),
    EmbeddedSection(bool),
    ConservativeDefault,
}

impl LockDecision {
    pub fn locked(self) -> bool {
        match self {
            Self::Unsigned => false,
            Self::ExplicitPreference(locked) | Self::EmbeddedSection(locked) => locked,
            Self::ConservativeDefault => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SectionLockResolver {
    detector: SignatureDetector,
}

impl SectionLockResolver {
    pub fn new(detector: SignatureDetector) -> Self {
        Self { detector }
    }

    pub fn is_locked(&self, document: &Document, section_id: &str) -> bool {
        self.decide(document, section_id).locked()
    }

    pub fn decide(&self, document: &Document, section_id: &str) -> LockDecision {
        if !self.detector.has_signature(document) {
            return LockDecision::Unsigned;
        }
        decide_signed(document, section_id)
    }

    /// Lock projection for every section the document knows about, through
    /// either its layout or its lock preferences.
    pub fn locked_sections(&self, document: &Document) -> Vec<SectionLock> {
        let signed = self.detector.has_signature(document);

        let mut section_ids: Vec<&str> = Vec::new();
        let layout_ids = document.layout.iter().flat_map(|l| l.sections.iter().map(|s| s.id.as_str()));
        let pref_ids =
            document.section_locks.iter().flatten().map(|p| p.section_id.as_str());
        for id in layout_ids.chain(pref_ids) {
            if !section_ids.contains(&id) {
                section_ids.push(id);
            }
        }

        section_ids
            .into_iter()
            .map(|section_id| SectionLock {
                document_id: document.id.clone(),
                section_id: section_id.to_string(),
                locked: signed && decide_signed(document, section_id).locked(),
            })
            .collect()
    }

    /// Whether a single field may still be edited. A field the layout does
    /// not know is treated like an unknown section.
    pub fn can_edit_field(&self, document: &Document, field_id: &str) -> bool {
        if !self.detector.has_signature(document) {
            return true;
        }
        let owner = document
            .layout
            .as_ref()
            .and_then(|layout| layout.field(field_id))
            .map(|field| field.box_id.as_str());
        match owner {
            Some(section_id) => !decide_signed(document, section_id).locked(),
            None => false,
        }
    }
}

/// `is_locked` with the default signature detector.
pub fn is_locked(document: &Document, section_id: &str) -> bool {
    SectionLockResolver::default().is_locked(document, section_id)
}

fn decide_signed(document: &Document, section_id: &str) -> LockDecision {
    if let Some(preference) = document
        .section_locks
        .iter()
        .flatten()
        .find(|p| p.section_id == section_id)
    {
        return LockDecision::ExplicitPreference(preference.locks());
    }

    if let Some(section) = document.layout.as_ref().and_then(|l| l.section(section_id)) {
        return LockDecision::EmbeddedSection(section.lock_when_signed);
    }

    LockDecision::ConservativeDefault
}
