// permitvault-engine: storage, remote mirroring, and reconciliation of
// form documents.

pub mod config;
pub mod reconcile;
pub mod remote;
pub mod repository;
pub mod store;

pub use config::EngineConfig;
pub use reconcile::DocumentReconciler;
pub use remote::{HttpMirror, InMemoryMirror, MirrorError, RemoteMirror};
pub use repository::{DeleteOutcome, DocumentRepository, RepositoryError, SaveOutcome};
