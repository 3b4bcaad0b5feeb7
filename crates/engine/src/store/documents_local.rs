// Per-type document collections in the local store.
//
// Each document type owns one key, `saved_forms_<type>`, holding a JSON array
// of documents. Writes go through sanitize -> count cap -> degradation ladder.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use permitvault_common::types::{Document, DocumentId, Payload};

use super::ladder::{self, DegradationLevel, LadderError};
use super::port::{StorageError, StoragePort};
use super::sanitize::sanitize_document;
use crate::config::StorageConfig;

pub const COLLECTION_KEY_PREFIX: &str = "saved_forms_";

pub fn collection_key(document_type: &str) -> String {
    format!("{COLLECTION_KEY_PREFIX}{document_type}")
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("could not store `{key}` at any degradation level")]
    Exhausted {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("storage backend failed while saving `{key}`")]
    Backend {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    /// The document as stored (timestamps stamped, media sanitized).
    pub document: Document,
    pub level: DegradationLevel,
    pub sanitized_values: usize,
    /// Documents dropped by the count cap.
    pub evicted: Vec<DocumentId>,
    /// Entries in the committed collection.
    pub stored_count: usize,
}

#[derive(Clone)]
pub struct LocalDocumentStore {
    port: Arc<dyn StoragePort>,
    config: StorageConfig,
}

impl LocalDocumentStore {
    pub fn new(port: Arc<dyn StoragePort>, config: StorageConfig) -> Self {
        Self { port, config }
    }

    pub fn port(&self) -> &Arc<dyn StoragePort> {
        &self.port
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Save, reporting only whether the document reached storage at some
    /// degradation level.
    pub fn save(&self, document: &Document) -> bool {
        match self.save_with_report(document.clone(), Utc::now()) {
            Ok(_) => true,
            Err(error) => {
                warn!(
                    document_type = %document.document_type,
                    document_id = %document.id,
                    %error,
                    "local save failed"
                );
                false
            }
        }
    }

    /// Convenience for callers holding a bare payload.
    pub fn save_payload(
        &self,
        document_type: &str,
        title: &str,
        payload: Payload,
    ) -> Result<SaveReport, SaveError> {
        self.save_with_report(Document::instance(document_type, title, payload), Utc::now())
    }

    pub fn save_with_report(
        &self,
        mut document: Document,
        now: DateTime<Utc>,
    ) -> Result<SaveReport, SaveError> {
        let key = collection_key(&document.document_type);
        let mut collection = self
            .try_list(&document.document_type)
            .map_err(|source| SaveError::Backend { key: key.clone(), source })?;

        let threshold = self.config.sanitize_threshold_chars;
        document.updated_at = now;
        let mut sanitized_values = sanitize_document(&mut document, threshold);
        for existing in &mut collection {
            sanitized_values += sanitize_document(existing, threshold);
        }

        let mut evicted = Vec::new();
        match collection.iter().position(|d| shares_identity(d, &document)) {
            Some(index) => {
                document.created_at = collection[index].created_at;
                collection[index] = document.clone();
                // One entry per identity: a local copy and its remote twin collapse.
                let mut position = 0;
                collection.retain(|d| {
                    let keep = position == index || !shares_identity(d, &document);
                    position += 1;
                    keep
                });
            }
            None => {
                let cap = self.config.max_documents.max(1);
                while collection.len() >= cap {
                    let Some(oldest) = oldest_index(&collection) else {
                        break;
                    };
                    evicted.push(collection.remove(oldest).id);
                }
                collection.push(document.clone());
            }
        }

        if !evicted.is_empty() {
            debug!(key = key.as_str(), evicted = evicted.len(), "count cap evicted documents");
        }

        let committed = ladder::commit(self.port.as_ref(), &key, &self.config, &collection, &document)
            .map_err(|error| match error {
                LadderError::Exhausted(source) => SaveError::Exhausted { key: key.clone(), source },
                LadderError::Backend { source, .. } => SaveError::Backend { key: key.clone(), source },
            })?;

        let stored = committed
            .documents
            .iter()
            .find(|d| d.id.matches(&document.id))
            .cloned()
            .unwrap_or(document);

        Ok(SaveReport {
            document: stored,
            level: committed.level,
            sanitized_values,
            evicted,
            stored_count: committed.documents.len(),
        })
    }

    /// Documents of one type. Backend failures are logged and yield an
    /// empty list.
    pub fn list(&self, document_type: &str) -> Vec<Document> {
        self.try_list(document_type).unwrap_or_else(|error| {
            warn!(document_type, %error, "failed to read local collection");
            Vec::new()
        })
    }

    /// Like [`list`](Self::list) but surfaces backend failures. A collection
    /// that does not parse is treated as empty.
    pub fn try_list(&self, document_type: &str) -> Result<Vec<Document>, StorageError> {
        let key = collection_key(document_type);
        let Some(raw) = self.port.get(&key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<Document>>(&raw) {
            Ok(documents) => Ok(documents),
            Err(error) => {
                warn!(key = key.as_str(), %error, "discarding unreadable local collection");
                Ok(Vec::new())
            }
        }
    }

    /// Look up by local id or by the remote id recorded on the entry.
    pub fn get_by_id(&self, document_type: &str, id: &DocumentId) -> Option<Document> {
        self.list(document_type).into_iter().find(|d| d.is_same_identity(id))
    }

    /// Physically remove a document from its local collection. Returns
    /// whether anything was removed.
    pub fn delete(&self, document_type: &str, id: &DocumentId) -> bool {
        let key = collection_key(document_type);
        let mut collection = self.list(document_type);
        let before = collection.len();
        collection.retain(|d| !d.is_same_identity(id));
        if collection.len() == before {
            return false;
        }

        let json = match serde_json::to_string(&collection) {
            Ok(json) => json,
            Err(error) => {
                warn!(key = key.as_str(), %error, "failed to serialize collection for delete");
                return false;
            }
        };
        match self.port.set(&key, &json) {
            Ok(()) => {
                debug!(key = key.as_str(), document_id = %id, "document removed locally");
                true
            }
            Err(error) => {
                warn!(key = key.as_str(), document_id = %id, %error, "local delete failed");
                false
            }
        }
    }
}

/// Whether `entry` stands for the same document as `document`, by local id
/// or by the remote id either side carries.
fn shares_identity(entry: &Document, document: &Document) -> bool {
    entry.is_same_identity(&document.id)
        || document.remote_id.as_ref().is_some_and(|remote| entry.is_same_identity(remote))
}

fn oldest_index(collection: &[Document]) -> Option<usize> {
    collection
        .iter()
        .enumerate()
        .min_by_key(|(_, d)| d.updated_at)
        .map(|(index, _)| index)
}
