// Document repository: the entry point screens talk to.
//
// Writes go to the remote first and then to the local cache, so a document
// is never lost while offline. Reads go through the reconciler. Lock checks
// are answered from document content alone.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use permitvault_common::protocol::remote::{RemoteDocumentDraft, SectionLockRow};
use permitvault_common::section::lock::SectionLockResolver;
use permitvault_common::types::{
    Document, DocumentId, SectionLock, SectionLockPreference, TemplateConfig,
};
use permitvault_common::validation::{validate_cancellation, validate_for_save, ValidationError};

use crate::config::EngineConfig;
use crate::reconcile::DocumentReconciler;
use crate::remote::RemoteMirror;
use crate::store::{DegradationLevel, LocalDocumentStore, SaveError, StoragePort};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("document {document_id} was stored neither remotely nor locally")]
    NotPersisted {
        document_id: String,
        #[source]
        source: SaveError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// The document as persisted, `remote_id` set when the remote accepted it.
    pub document: Document,
    /// The remote accepted the document and its lock rows.
    pub synced: bool,
    /// Level the local cache committed at; `None` if the local write failed.
    pub local_level: Option<DegradationLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub remote_deleted: bool,
    pub local_removed: bool,
}

pub struct DocumentRepository<M> {
    reconciler: DocumentReconciler<M>,
    resolver: SectionLockResolver,
}

impl<M: RemoteMirror> DocumentRepository<M> {
    pub fn new(reconciler: DocumentReconciler<M>) -> Self {
        Self { reconciler, resolver: SectionLockResolver::default() }
    }

    pub fn from_config(mirror: M, port: Arc<dyn StoragePort>, config: &EngineConfig) -> Self {
        let local = LocalDocumentStore::new(port, config.storage.clone());
        Self::new(DocumentReconciler::new(mirror, local, config.remote.default_export_format))
    }

    pub fn mirror(&self) -> &M {
        self.reconciler.mirror()
    }

    pub fn local(&self) -> &LocalDocumentStore {
        self.reconciler.local()
    }

    pub async fn save(&self, mut document: Document) -> Result<SaveOutcome, RepositoryError> {
        validate_for_save(&document)?;

        let synced = self.push_remote(&mut document).await;

        match self.local().save_with_report(document.clone(), Utc::now()) {
            Ok(report) => {
                debug!(
                    document_id = %report.document.id,
                    synced,
                    level = report.level.as_str(),
                    "document saved"
                );
                Ok(SaveOutcome { document: report.document, synced, local_level: Some(report.level) })
            }
            Err(error) if synced => {
                warn!(document_id = %document.id, %error, "document synced remotely but not cached");
                Ok(SaveOutcome { document, synced, local_level: None })
            }
            Err(source) => Err(RepositoryError::NotPersisted {
                document_id: document.id.to_string(),
                source,
            }),
        }
    }

    /// Create or update the remote record, then replace its lock rows.
    /// Returns whether both landed.
    async fn push_remote(&self, document: &mut Document) -> bool {
        let draft = RemoteDocumentDraft::from_document(document);
        let written = match &document.remote_id {
            Some(remote_id) => self.mirror().update(remote_id, &draft).await,
            None => self.mirror().create(&draft).await,
        };
        let record = match written {
            Ok(record) => record,
            Err(error) => {
                warn!(document_id = %document.id, %error, "remote save failed, keeping local copy only");
                return false;
            }
        };
        document.remote_id = Some(record.id.clone());

        let preferences = lock_preferences(document);
        if preferences.is_empty() {
            return true;
        }
        let rows = SectionLockRow::from_preferences(&record.id, &preferences);
        match self.mirror().replace_section_locks(&record.id, &rows).await {
            Ok(()) => true,
            Err(error) => {
                warn!(remote_id = %record.id, %error, "failed to replace section lock rows");
                false
            }
        }
    }

    pub async fn load(&self, document_type: &str, templates_only: Option<bool>) -> Vec<Document> {
        self.reconciler.load(document_type, templates_only).await
    }

    pub async fn delete(&self, document: &Document) -> DeleteOutcome {
        let remote_deleted = match &document.remote_id {
            Some(remote_id) => match self.mirror().soft_delete(remote_id).await {
                Ok(()) => true,
                Err(error) => {
                    warn!(remote_id = %remote_id, %error, "remote soft delete failed");
                    false
                }
            },
            None => false,
        };
        let local_removed = self.local().delete(&document.document_type, &document.id);
        DeleteOutcome { remote_deleted, local_removed }
    }

    /// One-way: a cancelled document keeps its reason and cannot be
    /// cancelled again.
    pub async fn cancel(
        &self,
        mut document: Document,
        reason: &str,
    ) -> Result<SaveOutcome, RepositoryError> {
        validate_cancellation(&document, reason)?;
        document.cancelled = true;
        document.cancellation_reason = Some(reason.trim().to_string());
        info!(document_id = %document.id, "cancelling document");
        self.save(document).await
    }

    /// Fresh instance of a stored template with its layout repaired.
    pub fn instantiate(&self, config: &TemplateConfig, document_type: &str, title: &str) -> Document {
        let (document, repaired) = config.instantiate(document_type, title);
        if !repaired.is_clean() {
            warn!(
                template_id = %config.id,
                rewritten_sections = repaired.rewritten_sections,
                rewritten_fields = repaired.rewritten_fields,
                rehomed_fields = repaired.rehomed_fields,
                "template layout repaired before use"
            );
        }
        document
    }

    pub fn get_by_id(&self, document_type: &str, id: &DocumentId) -> Option<Document> {
        self.local().get_by_id(document_type, id)
    }

    pub fn is_section_locked(&self, document: &Document, section_id: &str) -> bool {
        self.resolver.is_locked(document, section_id)
    }

    pub fn can_edit_field(&self, document: &Document, field_id: &str) -> bool {
        self.resolver.can_edit_field(document, field_id)
    }

    pub fn locked_sections(&self, document: &Document) -> Vec<SectionLock> {
        self.resolver.locked_sections(document)
    }
}

/// Explicit preferences, else one per embedded layout section.
fn lock_preferences(document: &Document) -> Vec<SectionLockPreference> {
    if let Some(preferences) = document.section_locks.as_ref().filter(|p| !p.is_empty()) {
        return preferences.clone();
    }
    document
        .layout
        .iter()
        .flat_map(|layout| layout.sections.iter())
        .map(|section| SectionLockPreference {
            section_id: section.id.clone(),
            lock_when_signed: Some(section.lock_when_signed),
        })
        .collect()
}
