// Local persistence: storage port, backends, and the stores built on them.

pub mod documents_local;
pub mod ladder;
pub mod port;
pub mod sanitize;
pub mod sqlite;
pub mod template_config;

pub use documents_local::{collection_key, LocalDocumentStore, SaveError, SaveReport};
pub use ladder::DegradationLevel;
pub use port::{MemoryStore, StorageError, StoragePort};
pub use sqlite::SqliteStore;
pub use template_config::{ConfigSaveReport, TemplateConfigStore};
