//! SQLite key-value cache for contract ABIs and announcement history.
//!
//! Uses WAL mode so a `history` query from the CLI can read while the
//! monitor writes. Entries are namespaced; a missing key reads as absent.

use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::sync::Mutex;

/// Key space inside the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Raw JSON ABI per contract address.
    ContractAbi,
    /// Single blob listing announced contract addresses.
    History,
}

impl Namespace {
    /// Stable name used as the namespace column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::ContractAbi => "contract-abi",
            Namespace::History => "history",
        }
    }
}

/// Read-through/write-through cache capability injected into the resolver
/// and the history component.
pub trait CacheStore: Send + Sync {
    /// Value stored under `key`, or `Ok(None)` if absent.
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>>;

    /// Insert or replace the value stored under `key`.
    fn put(&self, namespace: Namespace, key: &str, value: &str) -> Result<()>;
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Creates or opens a SQLite database with WAL mode enabled.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrations fail.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .wrap_err_with(|| format!("failed to open cache database {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| eyre::eyre!("cache connection mutex poisoned"))
    }

    fn run_migrations(&self) -> Result<()> {
        self.connection()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );
            ",
        )?;
        Ok(())
    }

    /// Number of entries stored in a namespace.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn count(&self, namespace: Namespace) -> Result<u64> {
        let count: i64 = self.connection()?.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?",
            [namespace.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl CacheStore for Store {
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        let value = self
            .connection()?
            .query_row(
                "SELECT value FROM cache_entries WHERE namespace = ? AND key = ?",
                rusqlite::params![namespace.as_str(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .wrap_err_with(|| format!("failed to read {}/{}", namespace.as_str(), key))?;
        Ok(value)
    }

    fn put(&self, namespace: Namespace, key: &str, value: &str) -> Result<()> {
        self.connection()?
            .execute(
                "
                INSERT INTO cache_entries (namespace, key, value, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(namespace, key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                ",
                rusqlite::params![
                    namespace.as_str(),
                    key,
                    value,
                    chrono::Utc::now().timestamp()
                ],
            )
            .wrap_err_with(|| format!("failed to write {}/{}", namespace.as_str(), key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::new(":memory:").expect("in-memory store should always open")
    }

    #[test]
    fn missing_key_reads_as_none() {
        let store = test_store();
        assert_eq!(store.get(Namespace::ContractAbi, "0xabc").unwrap(), None);
    }

    #[test]
    fn put_then_get_returns_value() {
        let store = test_store();
        store.put(Namespace::ContractAbi, "0xabc", "[]").unwrap();
        assert_eq!(
            store.get(Namespace::ContractAbi, "0xabc").unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn put_overwrites_existing_value() {
        let store = test_store();
        store.put(Namespace::History, "contract-history", "[]").unwrap();
        store
            .put(Namespace::History, "contract-history", r#"["0x01"]"#)
            .unwrap();
        assert_eq!(
            store
                .get(Namespace::History, "contract-history")
                .unwrap()
                .as_deref(),
            Some(r#"["0x01"]"#)
        );
        assert_eq!(store.count(Namespace::History).unwrap(), 1);
    }

    #[test]
    fn namespaces_are_isolated() {
        let store = test_store();
        store.put(Namespace::ContractAbi, "k", "abi").unwrap();
        assert_eq!(store.get(Namespace::History, "k").unwrap(), None);
        assert_eq!(store.count(Namespace::ContractAbi).unwrap(), 1);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        let path = path.to_str().unwrap();

        {
            let store = Store::new(path).unwrap();
            store.put(Namespace::ContractAbi, "0xabc", "[]").unwrap();
        }

        let reopened = Store::new(path).unwrap();
        assert_eq!(
            reopened
                .get(Namespace::ContractAbi, "0xabc")
                .unwrap()
                .as_deref(),
            Some("[]")
        );
    }
}
