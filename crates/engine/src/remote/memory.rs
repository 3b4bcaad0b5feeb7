use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use permitvault_common::protocol::remote::{
    RemoteDocumentDraft, RemoteDocumentRecord, SectionLockRow,
};
use permitvault_common::types::DocumentId;

use super::{MirrorError, RemoteMirror};

#[derive(Debug, Default)]
struct MirrorState {
    records: Vec<RemoteDocumentRecord>,
    locks: Vec<SectionLockRow>,
    next_id: i64,
    offline: bool,
}

/// Remote store held in memory. Ids are assigned as increasing integers.
/// While offline every call fails with [`MirrorError::Unavailable`].
#[derive(Debug, Default)]
pub struct InMemoryMirror {
    state: Mutex<MirrorState>,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.offline = offline;
        }
    }

    /// Seed a record as if another device had created it.
    pub fn insert(&self, record: RemoteDocumentRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.records.push(record);
        }
    }

    /// Every record, deleted ones included.
    pub fn records(&self) -> Vec<RemoteDocumentRecord> {
        self.state.lock().map(|s| s.records.clone()).unwrap_or_default()
    }

    pub fn lock_rows(&self, id: &DocumentId) -> Vec<SectionLockRow> {
        self.state
            .lock()
            .map(|s| s.locks.iter().filter(|r| r.document_id.matches(id)).cloned().collect())
            .unwrap_or_default()
    }

    fn online(&self) -> Result<MutexGuard<'_, MirrorState>, MirrorError> {
        let state = self
            .state
            .lock()
            .map_err(|_| MirrorError::Unavailable("mirror state poisoned".into()))?;
        if state.offline {
            return Err(MirrorError::Unavailable("offline".into()));
        }
        Ok(state)
    }
}

fn apply_draft(record: &mut RemoteDocumentRecord, draft: &RemoteDocumentDraft) {
    record.document_type = draft.document_type.clone();
    record.title = draft.title.clone();
    record.description = draft.description.clone();
    record.data = draft.data.clone();
    record.is_template = draft.is_template;
    record.updated_at = Utc::now();
}

impl RemoteMirror for InMemoryMirror {
    async fn list(
        &self,
        document_type: &str,
        templates_only: Option<bool>,
    ) -> Result<Vec<RemoteDocumentRecord>, MirrorError> {
        let state = self.online()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.document_type == document_type && !r.is_deleted)
            .filter(|r| templates_only.map_or(true, |t| r.is_template == t))
            .map(|r| {
                let mut record = r.clone();
                record.section_locks =
                    state.locks.iter().filter(|l| l.document_id.matches(&r.id)).cloned().collect();
                record
            })
            .collect())
    }

    async fn create(&self, draft: &RemoteDocumentDraft) -> Result<RemoteDocumentRecord, MirrorError> {
        let mut state = self.online()?;
        state.next_id += 1;
        let now = Utc::now();
        let record = RemoteDocumentRecord {
            id: DocumentId::Number(state.next_id),
            document_type: draft.document_type.clone(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            data: draft.data.clone(),
            export_format: None,
            is_template: draft.is_template,
            is_deleted: false,
            created_by: draft.created_by.clone(),
            created_at: now,
            updated_at: now,
            section_locks: Vec::new(),
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: &DocumentId,
        draft: &RemoteDocumentDraft,
    ) -> Result<RemoteDocumentRecord, MirrorError> {
        let mut state = self.online()?;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id.matches(id))
            .ok_or_else(|| MirrorError::NotFound(id.to_string()))?;
        apply_draft(record, draft);
        Ok(record.clone())
    }

    async fn soft_delete(&self, id: &DocumentId) -> Result<(), MirrorError> {
        let mut state = self.online()?;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id.matches(id))
            .ok_or_else(|| MirrorError::NotFound(id.to_string()))?;
        record.is_deleted = true;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_section_locks(
        &self,
        id: &DocumentId,
        rows: &[SectionLockRow],
    ) -> Result<(), MirrorError> {
        let mut state = self.online()?;
        state.locks.retain(|row| !row.document_id.matches(id));
        state.locks.extend(rows.iter().cloned());
        Ok(())
    }
}
