use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use permitvault_common::types::{Document, DocumentId, Payload};
use permitvault_engine::config::{PurgePolicy, StorageConfig};
use permitvault_engine::store::template_config::{TemplateConfigStore, CURRENT_CONFIG_KEY};
use permitvault_engine::store::{
    collection_key, DegradationLevel, LocalDocumentStore, MemoryStore, SaveError, SqliteStore,
    StoragePort,
};
use permitvault_common::payload::is_placeholder;
use permitvault_engine::store::sanitize::sanitize_document;
use serde_json::{json, Value};
use tempfile::tempdir;

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 11, 7, 30, 0).unwrap() + Duration::minutes(minutes)
}

fn permit(id: &str, notes_len: usize) -> Document {
    let mut payload = Payload::new();
    payload.insert("observations".into(), json!("o".repeat(notes_len)));
    Document::instance("risk-analysis", format!("Permit {id}"), payload).with_id(id)
}

#[test]
fn twenty_first_save_evicts_the_oldest() {
    let store = LocalDocumentStore::new(Arc::new(MemoryStore::new()), StorageConfig::default());
    for i in 0..21 {
        let report = store
            .save_with_report(permit(&format!("p{i}"), 10), at(i))
            .expect("save should succeed");
        assert_eq!(report.level, DegradationLevel::Direct);
    }

    let stored = store.list("risk-analysis");
    assert_eq!(stored.len(), 20);
    assert!(stored.iter().all(|d| d.id != DocumentId::from("p0")));
    assert!(stored.iter().any(|d| d.id == DocumentId::from("p20")));
}

#[test]
fn oversized_collection_is_trimmed_below_high_water() {
    let config = StorageConfig { storage_ceiling_bytes: 10_000, ..StorageConfig::default() };
    let store = LocalDocumentStore::new(Arc::new(MemoryStore::new()), config);

    let mut last = None;
    for i in 0..12 {
        last = Some(store.save_with_report(permit(&format!("p{i}"), 600), at(i)).unwrap());
    }
    let last = last.unwrap();

    assert_eq!(last.level, DegradationLevel::Trimmed);
    assert_eq!(last.stored_count, 10);
    let stored = store.list("risk-analysis");
    assert!(stored.iter().any(|d| d.id == DocumentId::from("p11")));
    assert!(stored.iter().all(|d| d.id != DocumentId::from("p0")));
}

/// Seeds a file-backed store without a quota, then reopens it with one.
fn quota_store(dir: &std::path::Path, quota: usize, seed: usize) -> LocalDocumentStore {
    let path = dir.join("store.db");
    {
        let unbounded = LocalDocumentStore::new(
            Arc::new(SqliteStore::open(&path).expect("store should open")),
            StorageConfig::default(),
        );
        for i in 0..seed {
            unbounded.save_with_report(permit(&format!("p{i}"), 2_000), at(i as i64)).unwrap();
        }
        unbounded.port().set("saved_forms_inspection", &"x".repeat(3_000)).unwrap();
        unbounded.port().set("document_type_config", "{}").unwrap();
    }
    let bounded = SqliteStore::open(&path).expect("store should reopen").with_quota(quota);
    LocalDocumentStore::new(Arc::new(bounded), StorageConfig::default())
}

#[test]
fn quota_pressure_triggers_emergency_purge() {
    let dir = tempdir().expect("tempdir should be created");
    let store = quota_store(dir.path(), 16_000, 11);

    let report = store.save_with_report(permit("p11", 2_000), at(20)).expect("save should land");
    assert_eq!(report.level, DegradationLevel::EmergencyPurge);
    assert_eq!(report.stored_count, 5);

    let keys = store.port().keys().unwrap();
    assert!(!keys.contains(&"saved_forms_inspection".to_string()));
    assert!(keys.contains(&CURRENT_CONFIG_KEY.to_string()));
    assert!(store.list("risk-analysis").iter().any(|d| d.id == DocumentId::from("p11")));
}

#[test]
fn tight_quota_falls_back_to_minimal_record() {
    let dir = tempdir().expect("tempdir should be created");
    let store = quota_store(dir.path(), 3_000, 6);

    let report = store.save_with_report(permit("p6", 2_000), at(20)).expect("save should land");
    assert_eq!(report.level, DegradationLevel::Minimal);

    let stored = store.list("risk-analysis");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, DocumentId::from("p6"));
    assert!(stored[0].payload.is_empty());
    assert_eq!(stored[0].title, "Permit p6");
}

fn photographed_permit(id: &str) -> Document {
    let mut payload = Payload::new();
    payload.insert("observations".into(), json!("o".repeat(300)));
    payload.insert("foto_area".into(), json!(format!("data:image/jpeg;base64,{}", "F".repeat(20_000))));
    payload.insert(
        "assinatura_supervisor".into(),
        json!(format!("data:image/png;base64,{}", "S".repeat(8_000))),
    );
    Document::instance("risk-analysis", format!("Permit {id}"), payload).with_id(id)
}

fn assert_media_placeholdered(value: &Value, threshold: usize) {
    match value {
        Value::String(s) => assert!(
            is_placeholder(s) || s.chars().count() <= threshold,
            "oversized value reached storage: {} chars",
            s.chars().count()
        ),
        Value::Array(items) => items.iter().for_each(|v| assert_media_placeholdered(v, threshold)),
        Value::Object(map) => map.values().for_each(|v| assert_media_placeholdered(v, threshold)),
        _ => {}
    }
}

#[test]
fn images_never_reach_storage_under_quota_pressure() {
    let port = Arc::new(MemoryStore::with_quota(6_000));
    port.set("saved_forms_inspection", &"x".repeat(3_000)).unwrap();
    let config = StorageConfig::default();
    let threshold = config.sanitize_threshold_chars;
    let store = LocalDocumentStore::new(port.clone(), config);
    let key = collection_key("risk-analysis");

    let mut saved = Vec::new();
    let mut deepest = DegradationLevel::Direct;
    for i in 0..8 {
        let document = photographed_permit(&format!("p{i}"));
        saved.push(document.clone());
        let report = store.save_with_report(document, at(i)).expect("save should land");
        assert!(report.sanitized_values >= 2);
        deepest = deepest.max(report.level);

        let raw = port.get(&key).unwrap().expect("collection should be stored");
        assert!(!raw.contains("base64,"));
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_media_placeholdered(&stored, threshold);

        let sanitized: Vec<Document> = saved
            .iter()
            .cloned()
            .map(|mut d| {
                sanitize_document(&mut d, threshold);
                d
            })
            .collect();
        assert!(raw.len() <= serde_json::to_string(&sanitized).unwrap().len());
    }

    assert!(deepest >= DegradationLevel::EmergencyPurge);
    assert!(port.get("saved_forms_inspection").unwrap().is_none());
}

#[test]
fn exhausted_ladder_reports_failure() {
    let store = LocalDocumentStore::new(Arc::new(MemoryStore::with_quota(50)), StorageConfig::default());
    let error = store.save_with_report(permit("p0", 10), at(0)).expect_err("nothing fits");
    assert!(matches!(error, SaveError::Exhausted { .. }));
    assert!(!store.save(&permit("p0", 10)));
    assert!(store.list("risk-analysis").is_empty());
}

#[test]
fn blanket_purge_clears_template_singleton_too() {
    let port = Arc::new(MemoryStore::with_quota(9_000));
    port.set("document_type_config", &"c".repeat(3_000)).unwrap();
    port.set("ui_prefs", &"u".repeat(3_000)).unwrap();
    let config = StorageConfig { purge_policy: PurgePolicy::Blanket, ..StorageConfig::default() };
    let store = LocalDocumentStore::new(port.clone(), config);

    let report = store.save_with_report(permit("p0", 4_000), at(0)).expect("save should land");
    assert_eq!(report.level, DegradationLevel::EmergencyPurge);
    assert_eq!(port.keys().unwrap(), vec![collection_key("risk-analysis")]);
}

#[test]
fn collections_survive_reopen_of_sqlite_store() {
    let dir = tempdir().expect("tempdir should be created");
    let path = dir.path().join("forms").join("store.db");
    {
        let store = LocalDocumentStore::new(
            Arc::new(SqliteStore::open(&path).unwrap()),
            StorageConfig::default(),
        );
        assert!(store.save(&permit("a", 10)));
        assert!(store.save(&permit("b", 10)));
        assert!(store.delete("risk-analysis", &DocumentId::from("a")));
    }

    let reopened = LocalDocumentStore::new(
        Arc::new(SqliteStore::open(&path).unwrap()),
        StorageConfig::default(),
    );
    let stored = reopened.list("risk-analysis");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, DocumentId::from("b"));
}

#[test]
fn template_config_registers_form_builder_document() {
    use permitvault_common::types::{
        Field, FieldType, Section, TemplateConfig, TemplateLayout, FORM_BUILDER_TYPE,
    };

    let documents = LocalDocumentStore::new(Arc::new(MemoryStore::new()), StorageConfig::default());
    let configs = TemplateConfigStore::new(documents.clone());
    let layout = TemplateLayout {
        sections: vec![Section::new("s1", "Work area", 0), Section::new("s2", "Approval", 1)],
        fields: vec![
            Field::new("f1", "s1", FieldType::ShortText, 0),
            Field::new("f2", "s2", FieldType::Signature, 0),
        ],
    };
    let config = TemplateConfig::new("Work at height", layout);

    let report = configs.save_config(&config);
    assert!(report.singleton_saved);
    assert!(report.registered);

    let listed = documents.list(FORM_BUILDER_TYPE);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].layout.as_ref().map(|l| l.fields.len()), Some(2));
    assert_eq!(configs.load_current_config().map(|c| c.title), Some("Work at height".into()));
}
