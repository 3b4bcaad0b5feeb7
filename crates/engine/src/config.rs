// Engine configuration file.
//
// Global config: `~/.permitvault/config.toml`
//
// Every section is optional; missing keys fall back to the defaults the
// local collections were sized for (browser-class 5 MiB storage ceiling).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use permitvault_common::types::ExportFormat;

/// Root directory for permitvault state: `~/.permitvault/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".permitvault"))
}

/// Path to the global config file: `~/.permitvault/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Local collection limits and degradation thresholds.
    pub storage: StorageConfig,
    /// Hosted document store.
    pub remote: RemoteConfig,
    /// Durable key/value backend.
    pub sqlite: SqliteConfig,
}

impl EngineConfig {
    /// Load from `~/.permitvault/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// SQLite file location: explicit path, else `~/.permitvault/store.db`.
    pub fn store_path(&self) -> Option<PathBuf> {
        self.sqlite.path.clone().or_else(|| global_dir().map(|d| d.join("store.db")))
    }
}

// ── Storage ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Hard cap on documents per document-type collection.
    pub max_documents: usize,
    /// Capacity of the underlying store in bytes.
    pub storage_ceiling_bytes: usize,
    /// Fraction of the ceiling a collection may occupy before trimming.
    pub high_water_ratio: f64,
    /// Documents kept when a collection is trimmed.
    pub trim_keep: usize,
    /// Documents kept after an emergency purge.
    pub emergency_keep: usize,
    /// Media strings longer than this are replaced by placeholders.
    pub sanitize_threshold_chars: usize,
    /// Which keys an emergency purge may remove.
    pub purge_policy: PurgePolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_documents: 20,
            storage_ceiling_bytes: 5 * 1024 * 1024,
            high_water_ratio: 0.8,
            trim_keep: 10,
            emergency_keep: 5,
            sanitize_threshold_chars: 1_000,
            purge_policy: PurgePolicy::Conservative,
        }
    }
}

impl StorageConfig {
    pub fn high_water_bytes(&self) -> usize {
        let ratio = if self.high_water_ratio.is_finite() {
            self.high_water_ratio.clamp(0.0, 1.0)
        } else {
            Self::default().high_water_ratio
        };
        (self.storage_ceiling_bytes as f64 * ratio) as usize
    }
}

/// Scope of the emergency purge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PurgePolicy {
    /// Only other document collections and named template snapshots.
    #[default]
    Conservative,
    /// Every key except the collection being saved.
    Blanket,
}

// ── Remote ─────────────────────────────────────────────────────────

/// Hosted store settings. The API key is supplied by the caller at runtime
/// and is never read from this file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// Base URL of the hosted store (e.g. `https://project.example.co`).
    pub base_url: Option<String>,
    pub request_timeout_ms: u64,
    /// Used when neither the document nor its data names a format.
    pub default_export_format: ExportFormat,
    pub documents_table: String,
    pub section_locks_table: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_ms: 10_000,
            default_export_format: ExportFormat::Pdf,
            documents_table: "documents".into(),
            section_locks_table: "document_section_locks".into(),
        }
    }
}

// ── SQLite ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SqliteConfig {
    pub path: Option<PathBuf>,
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_reference_limits() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.storage.max_documents, 20);
        assert_eq!(cfg.storage.emergency_keep, 5);
        assert_eq!(cfg.storage.purge_policy, PurgePolicy::Conservative);
        assert_eq!(cfg.remote.default_export_format, ExportFormat::Pdf);
        assert!(cfg.remote.base_url.is_none());
    }

    #[test]
    fn high_water_is_a_fraction_of_the_ceiling() {
        let storage = StorageConfig {
            storage_ceiling_bytes: 1_000,
            high_water_ratio: 0.75,
            ..StorageConfig::default()
        };
        assert_eq!(storage.high_water_bytes(), 750);

        let clamped = StorageConfig { high_water_ratio: 3.0, ..storage };
        assert_eq!(clamped.high_water_bytes(), 1_000);
    }

    #[test]
    fn non_finite_ratio_uses_the_default() {
        for ratio in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let storage = StorageConfig {
                storage_ceiling_bytes: 1_000,
                high_water_ratio: ratio,
                ..StorageConfig::default()
            };
            assert_eq!(storage.high_water_bytes(), 800);
        }
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("config.toml");

        let mut cfg = EngineConfig::default();
        cfg.storage.max_documents = 50;
        cfg.storage.purge_policy = PurgePolicy::Blanket;
        cfg.remote.base_url = Some("https://forms.example.com".into());
        cfg.sqlite.path = Some(PathBuf::from("/var/lib/permitvault/store.db"));
        cfg.save_to(&path).unwrap();

        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
[storage]
max_documents = 30
purge_policy = "blanket"

[remote]
default_export_format = "WORD"
"#;
        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.storage.max_documents, 30);
        assert_eq!(cfg.storage.trim_keep, 10);
        assert_eq!(cfg.storage.purge_policy, PurgePolicy::Blanket);
        assert_eq!(cfg.remote.default_export_format, ExportFormat::Word);
        assert_eq!(cfg.remote.documents_table, "documents");
    }

    #[test]
    fn remote_section_rejects_plaintext_api_key() {
        let toml_str = r#"
[remote]
api_key = "service-role-secret"
"#;
        let error = toml::from_str::<EngineConfig>(toml_str).expect_err("parse should fail");
        assert!(error.to_string().contains("unknown field `api_key`"));
    }

    #[test]
    fn empty_file_is_default() {
        let cfg: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(EngineConfig::load_from(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn store_path_prefers_explicit_setting() {
        let mut cfg = EngineConfig::default();
        cfg.sqlite.path = Some(PathBuf::from("/tmp/forms.db"));
        assert_eq!(cfg.store_path(), Some(PathBuf::from("/tmp/forms.db")));
    }

    #[test]
    fn global_dir_is_under_home() {
        let dir = global_dir().expect("home directory should resolve");
        assert!(dir.ends_with(".permitvault"));
    }
}
