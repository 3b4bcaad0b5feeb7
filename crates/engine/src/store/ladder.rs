// Degradation ladder for collection writes.
//
// Stages run in order until one commits:
//
//   Direct          collection as-is, if it fits under the high-water mark
//   Trimmed         most recent `trim_keep` documents
//   EmergencyPurge  unrelated keys purged, most recent `emergency_keep`
//   Minimal         the saved document alone, stripped to identity fields
//
// Each stage is a pure function of (collection, saved entry). The driver
// serializes the candidate and writes it; a capacity failure (high-water check or
// backend quota) moves to the next stage, any other backend failure stops.
// The saved entry is present in every candidate.

use std::collections::HashSet;

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

use permitvault_common::types::Document;

use super::port::{StorageError, StoragePort};
use crate::config::{PurgePolicy, StorageConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DegradationLevel {
    Direct,
    Trimmed,
    EmergencyPurge,
    Minimal,
}

impl DegradationLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Trimmed => "trimmed",
            Self::EmergencyPurge => "emergency_purge",
            Self::Minimal => "minimal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("collection of {bytes} bytes exceeds the high-water mark of {limit} bytes")]
pub struct CapacityError {
    pub bytes: usize,
    pub limit: usize,
}

pub type Strategy =
    fn(&StorageConfig, &[Document], &Document) -> Result<Vec<Document>, CapacityError>;

pub struct Stage {
    pub level: DegradationLevel,
    pub strategy: Strategy,
    /// Purge unrelated keys before this stage writes.
    pub purge_first: bool,
}

pub const LADDER: &[Stage] = &[
    Stage { level: DegradationLevel::Direct, strategy: direct, purge_first: false },
    Stage { level: DegradationLevel::Trimmed, strategy: trimmed, purge_first: false },
    Stage { level: DegradationLevel::EmergencyPurge, strategy: emergency, purge_first: true },
    Stage { level: DegradationLevel::Minimal, strategy: minimal, purge_first: false },
];

/// What the driver committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub level: DegradationLevel,
    pub documents: Vec<Document>,
    pub bytes: usize,
    pub purged_keys: usize,
}

#[derive(Debug, Error)]
pub enum LadderError {
    #[error("every degradation stage failed")]
    Exhausted(#[source] StorageError),

    #[error("storage backend failed at stage {}", .level.as_str())]
    Backend {
        level: DegradationLevel,
        #[source]
        source: StorageError,
    },
}

// ── Strategies ─────────────────────────────────────────────────────

pub fn direct(
    config: &StorageConfig,
    collection: &[Document],
    _entry: &Document,
) -> Result<Vec<Document>, CapacityError> {
    let bytes = serialized_len(collection);
    let limit = config.high_water_bytes();
    if bytes > limit {
        return Err(CapacityError { bytes, limit });
    }
    Ok(collection.to_vec())
}

pub fn trimmed(
    config: &StorageConfig,
    collection: &[Document],
    entry: &Document,
) -> Result<Vec<Document>, CapacityError> {
    Ok(keep_most_recent(collection, entry, config.trim_keep))
}

pub fn emergency(
    config: &StorageConfig,
    collection: &[Document],
    entry: &Document,
) -> Result<Vec<Document>, CapacityError> {
    Ok(keep_most_recent(collection, entry, config.emergency_keep))
}

pub fn minimal(
    _config: &StorageConfig,
    _collection: &[Document],
    entry: &Document,
) -> Result<Vec<Document>, CapacityError> {
    Ok(vec![entry.minimal()])
}

/// `entry` plus the `keep - 1` most recently updated other documents, in
/// their original order.
pub fn keep_most_recent(collection: &[Document], entry: &Document, keep: usize) -> Vec<Document> {
    let keep = keep.max(1);
    let mut by_recency: Vec<&Document> =
        collection.iter().filter(|d| !d.id.matches(&entry.id)).collect();
    by_recency.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    by_recency.truncate(keep - 1);

    let retained: HashSet<String> = by_recency.iter().map(|d| d.id.to_string()).collect();
    let mut kept = Vec::with_capacity(keep);
    let mut placed = false;
    for doc in collection {
        if doc.id.matches(&entry.id) {
            if !placed {
                kept.push(entry.clone());
                placed = true;
            }
        } else if retained.contains(&doc.id.to_string()) {
            kept.push(doc.clone());
        }
    }
    if !placed {
        kept.push(entry.clone());
    }
    kept
}

fn serialized_len(collection: &[Document]) -> usize {
    serde_json::to_vec(collection).map(|bytes| bytes.len()).unwrap_or(usize::MAX)
}

// ── Driver ─────────────────────────────────────────────────────────

pub fn commit(
    port: &dyn StoragePort,
    key: &str,
    config: &StorageConfig,
    collection: &[Document],
    entry: &Document,
) -> Result<Committed, LadderError> {
    let mut purged_keys = 0;
    let mut last_error = None;

    for stage in LADDER {
        if stage.purge_first {
            purged_keys += purge_unrelated(port, key, config.purge_policy);
        }

        let candidate = match (stage.strategy)(config, collection, entry) {
            Ok(candidate) => candidate,
            Err(capacity) => {
                debug!(key, level = stage.level.as_str(), %capacity, "stage rejected by capacity check");
                last_error = Some(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested: capacity.bytes,
                    available: capacity.limit,
                });
                continue;
            }
        };

        let json = serde_json::to_string(&candidate)
            .context("failed to serialize document collection")
            .map_err(|source| LadderError::Backend {
                level: stage.level,
                source: source.into(),
            })?;

        match port.set(key, &json) {
            Ok(()) => {
                log_commit(key, stage.level, candidate.len(), json.len());
                return Ok(Committed {
                    level: stage.level,
                    documents: candidate,
                    bytes: json.len(),
                    purged_keys,
                });
            }
            Err(error) if error.is_capacity() => {
                info!(key, level = stage.level.as_str(), %error, "stage hit storage capacity");
                last_error = Some(error);
            }
            Err(source) => return Err(LadderError::Backend { level: stage.level, source }),
        }
    }

    Err(LadderError::Exhausted(last_error.unwrap_or_else(|| StorageError::QuotaExceeded {
        key: key.to_string(),
        requested: 0,
        available: 0,
    })))
}

fn log_commit(key: &str, level: DegradationLevel, documents: usize, bytes: usize) {
    match level {
        DegradationLevel::Direct => {
            debug!(key, level = level.as_str(), documents, bytes, "collection committed")
        }
        DegradationLevel::Trimmed => {
            info!(key, level = level.as_str(), documents, bytes, "collection committed after trim")
        }
        DegradationLevel::EmergencyPurge | DegradationLevel::Minimal => {
            warn!(key, level = level.as_str(), documents, bytes, "collection committed degraded")
        }
    }
}

/// Remove keys other than `active_key` according to `policy`. Best effort:
/// failures are logged and skipped. Returns the number of keys removed.
pub fn purge_unrelated(port: &dyn StoragePort, active_key: &str, policy: PurgePolicy) -> usize {
    let keys = match port.keys() {
        Ok(keys) => keys,
        Err(error) => {
            warn!(%error, "could not list keys for emergency purge");
            return 0;
        }
    };

    let mut removed = 0;
    for key in keys.iter().filter(|k| k.as_str() != active_key) {
        if !purgeable(key, policy) {
            continue;
        }
        match port.remove(key) {
            Ok(()) => removed += 1,
            Err(error) => warn!(key = key.as_str(), %error, "failed to purge key"),
        }
    }
    warn!(active_key, removed, policy = ?policy, "emergency purge finished");
    removed
}

fn purgeable(key: &str, policy: PurgePolicy) -> bool {
    match policy {
        PurgePolicy::Blanket => true,
        PurgePolicy::Conservative => {
            key.starts_with(super::documents_local::COLLECTION_KEY_PREFIX)
                || super::template_config::is_named_snapshot_key(key)
        }
    }
}
