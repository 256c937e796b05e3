use crate::infrastructure::error::InfraError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const STORAGE_PREFIX: &str = "pomodoro-rounds-v1";

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

pub fn timer_state_key() -> String {
    format!("{STORAGE_PREFIX}:timer-state")
}

pub fn timer_settings_key() -> String {
    format!("{STORAGE_PREFIX}:timer-settings")
}

pub fn rounds_key() -> String {
    format!("{STORAGE_PREFIX}:rounds")
}

pub fn day_key_prefix() -> String {
    format!("{STORAGE_PREFIX}:day:")
}

pub fn day_key(date: &str) -> String {
    format!("{}{date}", day_key_prefix())
}

/// Every key the application owns; per-day records are enumerated by prefix.
pub fn persisted_keys(store: &dyn KeyValueStore) -> Result<Vec<String>, InfraError> {
    let mut keys = vec![timer_state_key(), timer_settings_key(), rounds_key()];
    keys.extend(store.keys_with_prefix(&day_key_prefix())?);
    Ok(keys)
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set(&self, key: &str, value: &str) -> Result<(), InfraError>;
    fn remove(&self, key: &str) -> Result<(), InfraError>;
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, InfraError>;
}

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db_path: PathBuf,
}

impl SqliteKeyValueStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value = connection
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kv_store (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, InfraError> {
        let connection = self.connect()?;
        let mut statement =
            connection.prepare("SELECT key FROM kv_store WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
        let keys = statement
            .query_map(params![prefix, prefix.chars().count() as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryKeyValueStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::Storage(format!("in-memory store lock poisoned: {error}")))
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, InfraError> {
        Ok(self
            .lock()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Store whose every call fails, as when the database file is locked or gone.
    #[derive(Debug, Default)]
    pub(crate) struct UnavailableStore;

    impl UnavailableStore {
        fn unavailable() -> InfraError {
            InfraError::Storage("store unavailable".to_string())
        }
    }

    impl KeyValueStore for UnavailableStore {
        fn get(&self, _key: &str) -> Result<Option<String>, InfraError> {
            Err(Self::unavailable())
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), InfraError> {
            Err(Self::unavailable())
        }

        fn remove(&self, _key: &str) -> Result<(), InfraError> {
            Err(Self::unavailable())
        }

        fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>, InfraError> {
            Err(Self::unavailable())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        dir: PathBuf,
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "pomodoro-rounds-storage-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("kv.sqlite");
            initialize_database(&path).expect("initialize database");
            Self { dir, path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn sqlite_store_overwrites_and_removes_values() {
        let database = TempDatabase::new();
        let store = SqliteKeyValueStore::new(&database.path);

        assert_eq!(store.get("missing").expect("get"), None);
        store.set("alpha", "1").expect("set");
        store.set("alpha", "2").expect("overwrite");
        assert_eq!(store.get("alpha").expect("get"), Some("2".to_string()));

        store.remove("alpha").expect("remove");
        assert_eq!(store.get("alpha").expect("get"), None);
    }

    #[test]
    fn sqlite_store_lists_keys_by_prefix() {
        let database = TempDatabase::new();
        let store = SqliteKeyValueStore::new(&database.path);
        store.set(&day_key("2026-02-16"), "{}").expect("set day");
        store.set(&day_key("2026-02-17"), "{}").expect("set day");
        store.set(&rounds_key(), "{}").expect("set rounds");

        let keys = store.keys_with_prefix(&day_key_prefix()).expect("keys");
        assert_eq!(
            keys,
            vec![day_key("2026-02-16"), day_key("2026-02-17")]
        );
    }

    #[test]
    fn persisted_keys_include_fixed_and_day_keys() {
        let store = InMemoryKeyValueStore::default();
        store.set(&day_key("2026-02-16"), "{}").expect("set day");
        store.set("unrelated", "x").expect("set unrelated");

        let keys = persisted_keys(&store).expect("persisted keys");
        assert!(keys.contains(&timer_state_key()));
        assert!(keys.contains(&timer_settings_key()));
        assert!(keys.contains(&rounds_key()));
        assert!(keys.contains(&day_key("2026-02-16")));
        assert!(!keys.contains(&"unrelated".to_string()));
    }
}
