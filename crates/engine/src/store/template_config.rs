// Form-builder template configuration.
//
// Keys:
//   document_type_config           current layout (singleton)
//   document_type_config_<title>   named snapshot per template title
//   document_type_config_minimal   id/title/timestamp written when the
//                                  singleton does not fit
//
// Every saved config is also registered as a `form-builder` template document
// in the local collections so generic listings pick it up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use permitvault_common::types::{DocumentId, TemplateConfig, TemplateLayout};

use super::documents_local::LocalDocumentStore;

pub const CURRENT_CONFIG_KEY: &str = "document_type_config";
pub const MINIMAL_CONFIG_KEY: &str = "document_type_config_minimal";

pub fn named_config_key(title: &str) -> String {
    format!("{CURRENT_CONFIG_KEY}_{title}")
}

/// Named snapshots are disposable under storage pressure; the singleton and
/// its minimal fallback are not.
pub fn is_named_snapshot_key(key: &str) -> bool {
    key.strip_prefix(CURRENT_CONFIG_KEY)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|_| key != MINIMAL_CONFIG_KEY)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct MinimalConfigRecord {
    id: DocumentId,
    title: String,
    updated_at: DateTime<Utc>,
}

impl MinimalConfigRecord {
    fn into_config(self) -> TemplateConfig {
        TemplateConfig {
            id: self.id,
            title: self.title,
            description: String::new(),
            layout: TemplateLayout::default(),
            export_format: None,
            updated_at: self.updated_at,
        }
    }
}

/// Which writes of a config save landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigSaveReport {
    pub singleton_saved: bool,
    pub minimal_fallback: bool,
    pub snapshot_saved: bool,
    pub registered: bool,
}

#[derive(Clone)]
pub struct TemplateConfigStore {
    documents: LocalDocumentStore,
}

impl TemplateConfigStore {
    pub fn new(documents: LocalDocumentStore) -> Self {
        Self { documents }
    }

    pub fn documents(&self) -> &LocalDocumentStore {
        &self.documents
    }

    /// Persist `config`. Never fails: each write that does not land is
    /// logged and reported.
    pub fn save_config(&self, config: &TemplateConfig) -> ConfigSaveReport {
        let port = self.documents.port();
        let mut report = ConfigSaveReport::default();

        let singleton = serde_json::to_string(config)
            .map_err(anyhow::Error::from)
            .and_then(|json| port.set(CURRENT_CONFIG_KEY, &json).map_err(anyhow::Error::from));
        match singleton {
            Ok(()) => {
                report.singleton_saved = true;
                debug!(template_id = %config.id, title = %config.title, "template config saved");
            }
            Err(error) => {
                warn!(template_id = %config.id, %error, "template config did not fit, writing minimal record");
                // A stale singleton would shadow the fallback on load.
                if let Err(error) = port.remove(CURRENT_CONFIG_KEY) {
                    warn!(%error, "failed to drop stale template config");
                }
                report.minimal_fallback = self.save_minimal(config);
            }
        }

        if !config.title.is_empty() {
            let key = named_config_key(&config.title);
            let snapshot = serde_json::to_string(config)
                .map_err(anyhow::Error::from)
                .and_then(|json| port.set(&key, &json).map_err(anyhow::Error::from));
            match snapshot {
                Ok(()) => report.snapshot_saved = true,
                Err(error) => warn!(key = key.as_str(), %error, "named template snapshot not saved"),
            }
        }

        report.registered = self.documents.save(&config.to_document());
        report
    }

    fn save_minimal(&self, config: &TemplateConfig) -> bool {
        let record = MinimalConfigRecord {
            id: config.id.clone(),
            title: config.title.clone(),
            updated_at: config.updated_at,
        };
        let written = serde_json::to_string(&record)
            .map_err(anyhow::Error::from)
            .and_then(|json| {
                self.documents.port().set(MINIMAL_CONFIG_KEY, &json).map_err(anyhow::Error::from)
            });
        match written {
            Ok(()) => true,
            Err(error) => {
                warn!(template_id = %config.id, %error, "minimal template record not saved");
                false
            }
        }
    }

    /// The current config, else the minimal record with an empty layout.
    pub fn load_current_config(&self) -> Option<TemplateConfig> {
        if let Some(config) = self.read_json::<TemplateConfig>(CURRENT_CONFIG_KEY) {
            return Some(config);
        }
        self.read_json::<MinimalConfigRecord>(MINIMAL_CONFIG_KEY)
            .map(MinimalConfigRecord::into_config)
    }

    pub fn load_named_config(&self, title: &str) -> Option<TemplateConfig> {
        self.read_json(&named_config_key(title))
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.documents.port().get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                warn!(key, %error, "failed to read template config");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(key, %error, "discarding unreadable template config");
                None
            }
        }
    }
}
