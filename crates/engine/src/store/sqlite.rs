// Durable key/value backend on SQLite.
//
// A single `kv_entries` table, versioned through `schema_migrations` so the
// layout can grow without breaking existing device databases. An optional
// byte quota mirrors the browser storage ceiling the collections were sized
// for.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::port::{entry_bytes, StorageError, StoragePort};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE kv_entries (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    quota_bytes: Option<usize>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store parent directory `{}`", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at `{}`", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("failed to configure sqlite pragmas for store")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite store")?;
        Self::from_connection(conn)
    }

    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn), quota_bytes: None })
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.conn.lock().map_err(|_| anyhow!("sqlite store lock poisoned"))?;
        current_schema_version(&conn)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| anyhow!("sqlite store lock poisoned").into())
    }
}

impl StoragePort for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.connection()?;
        let value = conn
            .query_row("SELECT value FROM kv_entries WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .with_context(|| format!("failed to read `{key}`"))?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.connection()?;
        if let Some(quota) = self.quota_bytes {
            let (used, replaced): (i64, i64) = conn
                .query_row(
                    "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0), \
                            COALESCE(SUM(CASE WHEN key = ?1 \
                                THEN LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB)) \
                                ELSE 0 END), 0) \
                     FROM kv_entries",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .context("failed to measure store usage")?;
            let in_use = usize::try_from(used - replaced).unwrap_or(0);
            let available = quota.saturating_sub(in_use);
            let requested = entry_bytes(key, value);
            if requested > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    available,
                });
            }
        }

        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, datetime('now')) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )
        .with_context(|| format!("failed to write `{key}`"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .with_context(|| format!("failed to remove `{key}`"))?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT key FROM kv_entries ORDER BY key ASC")
            .context("failed to prepare key listing")?;
        let rows = stmt.query_map([], |row| row.get(0)).context("failed to list keys")?;
        let keys = rows
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to collect keys")?;
        Ok(keys)
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply store migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_schema_and_is_idempotent() {
        let dir = tempdir().expect("tempdir should be created");
        let path = dir.path().join("nested").join("store.db");
        {
            let store = SqliteStore::open(&path).expect("store should open");
            assert_eq!(store.schema_version().expect("version should be readable"), 1);
        }
        let reopened = SqliteStore::open(&path).expect("store should reopen");
        assert_eq!(reopened.schema_version().expect("version should be readable"), 1);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().expect("tempdir should be created");
        let path = dir.path().join("store.db");
        {
            let store = SqliteStore::open(&path).expect("store should open");
            store.set("saved_forms_custom", "[]").expect("write should succeed");
            store.set("saved_forms_custom", "[1]").expect("overwrite should succeed");
        }
        let store = SqliteStore::open(&path).expect("store should reopen");
        assert_eq!(store.get("saved_forms_custom").unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.keys().unwrap(), vec!["saved_forms_custom".to_string()]);
    }

    #[test]
    fn remove_deletes_key() {
        let store = SqliteStore::open_in_memory().expect("store should open");
        store.set("a", "1").unwrap();
        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn quota_is_enforced_per_write() {
        let store = SqliteStore::open_in_memory().expect("store should open").with_quota(16);
        store.set("a", "1234567").expect("8 bytes should fit");
        store.set("a", "123456789012345").expect("overwrite up to quota should fit");

        let error = store.set("b", "1").expect_err("quota should be exhausted");
        assert!(error.is_capacity());
        assert!(store.get("b").unwrap().is_none());
    }
}
