// Merge of remote records with the local cache.
//
// The remote is the source of truth: when it answers with at least one
// record, those come first and local entries that mirror one of them are
// dropped, as are local entries of the wrong kind for a templates query. When
// it fails or answers empty, the local collection is returned as stored.

use tracing::{debug, warn};

use permitvault_common::protocol::remote::RemoteDocumentRecord;
use permitvault_common::types::{Document, DocumentKind, ExportFormat};

use crate::remote::RemoteMirror;
use crate::store::LocalDocumentStore;

pub struct DocumentReconciler<M> {
    mirror: M,
    local: LocalDocumentStore,
    default_format: ExportFormat,
}

impl<M: RemoteMirror> DocumentReconciler<M> {
    pub fn new(mirror: M, local: LocalDocumentStore, default_format: ExportFormat) -> Self {
        Self { mirror, local, default_format }
    }

    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    pub fn local(&self) -> &LocalDocumentStore {
        &self.local
    }

    pub async fn load(&self, document_type: &str, templates_only: Option<bool>) -> Vec<Document> {
        let records = match self.mirror.list(document_type, templates_only).await {
            Ok(records) => records,
            Err(error) => {
                warn!(document_type, %error, "remote list failed, serving local collection");
                return self.local.list(document_type);
            }
        };
        if records.is_empty() {
            debug!(document_type, "remote returned no records, serving local collection");
            return self.local.list(document_type);
        }

        let remote: Vec<Document> =
            records.iter().map(|record| normalize(record, self.default_format)).collect();
        let local_only: Vec<Document> = self
            .local
            .list(document_type)
            .into_iter()
            .filter(|entry| templates_only.map_or(true, |t| entry.is_template() == t))
            .filter(|entry| !remote.iter().any(|r| entry.is_same_identity(&r.id)))
            .collect();

        debug!(
            document_type,
            remote = remote.len(),
            local_only = local_only.len(),
            "reconciled document list"
        );
        remote.into_iter().chain(local_only).collect()
    }
}

/// Convert a remote row into a document. The export format comes from the
/// override column, then the data blob, then `default_format`.
pub fn normalize(record: &RemoteDocumentRecord, default_format: ExportFormat) -> Document {
    let export_format = record
        .override_export_format()
        .or_else(|| record.embedded_export_format())
        .unwrap_or(default_format);
    let kind = if record.is_template { DocumentKind::Template } else { DocumentKind::Instance };

    let mut payload = record.form_values();
    if let Some(description) = record.description.as_ref().filter(|d| !d.is_empty()) {
        payload
            .entry("description".to_string())
            .or_insert_with(|| serde_json::Value::String(description.clone()));
    }

    let section_locks = (!record.section_locks.is_empty())
        .then(|| record.section_locks.iter().map(|row| row.to_preference()).collect());

    Document {
        id: record.id.clone(),
        document_type: record.document_type.clone(),
        title: record.title.clone(),
        name: record.title.clone(),
        kind,
        payload,
        layout: record.layout(),
        section_locks,
        export_format: Some(export_format),
        created_at: record.created_at,
        updated_at: record.updated_at,
        cancelled: record.cancelled(),
        cancellation_reason: record.cancellation_reason(),
        remote_id: Some(record.id.clone()),
        is_deleted: record.is_deleted,
    }
}
