// Checks a document must pass before it reaches any store.

use thiserror::Error;

use crate::types::Document;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("document title is empty")]
    MissingTitle,

    #[error("document type is empty")]
    MissingDocumentType,

    #[error("document {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("cancellation reason is empty")]
    MissingCancellationReason,
}

pub fn validate_for_save(document: &Document) -> Result<(), ValidationError> {
    if document.document_type.trim().is_empty() {
        return Err(ValidationError::MissingDocumentType);
    }
    if document.title.trim().is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    Ok(())
}

/// Cancellation is one-way: a cancelled document cannot be cancelled again
/// and a reason is mandatory.
pub fn validate_cancellation(document: &Document, reason: &str) -> Result<(), ValidationError> {
    if document.cancelled {
        return Err(ValidationError::AlreadyCancelled(document.id.to_string()));
    }
    if reason.trim().is_empty() {
        return Err(ValidationError::MissingCancellationReason);
    }
    Ok(())
}
