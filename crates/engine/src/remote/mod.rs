// Hosted document store.
//
// `RemoteMirror` is the seam between the engine and the source of truth.
// `HttpMirror` talks to a PostgREST-style endpoint; `InMemoryMirror` is the
// in-process double used by tests and offline sessions.

pub mod http;
pub mod memory;

use std::future::Future;

use thiserror::Error;

use permitvault_common::protocol::remote::{
    RemoteDocumentDraft, RemoteDocumentRecord, SectionLockRow,
};
use permitvault_common::types::DocumentId;

pub use http::HttpMirror;
pub use memory::InMemoryMirror;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid remote URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("API key is not a valid header value")]
    InvalidApiKey,

    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("document not found: {0}")]
    NotFound(String),
}

/// Operations the engine needs from the hosted store.
pub trait RemoteMirror: Send + Sync {
    /// Non-deleted records of one type, optionally filtered on
    /// `is_template`, with their section lock rows embedded.
    fn list(
        &self,
        document_type: &str,
        templates_only: Option<bool>,
    ) -> impl Future<Output = Result<Vec<RemoteDocumentRecord>, MirrorError>> + Send;

    fn create(
        &self,
        draft: &RemoteDocumentDraft,
    ) -> impl Future<Output = Result<RemoteDocumentRecord, MirrorError>> + Send;

    fn update(
        &self,
        id: &DocumentId,
        draft: &RemoteDocumentDraft,
    ) -> impl Future<Output = Result<RemoteDocumentRecord, MirrorError>> + Send;

    /// Mark a record deleted; it stays in the table.
    fn soft_delete(&self, id: &DocumentId) -> impl Future<Output = Result<(), MirrorError>> + Send;

    /// Replace every lock row of `id` with `rows` (delete, then insert).
    fn replace_section_locks(
        &self,
        id: &DocumentId,
        rows: &[SectionLockRow],
    ) -> impl Future<Output = Result<(), MirrorError>> + Send;
}
