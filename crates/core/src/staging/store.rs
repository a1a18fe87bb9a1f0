//! Disk-backed key-value store for one staging partition.

use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::StagingError;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS entries (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
) WITHOUT ROWID";

const SELECT_VALUE: &str = "SELECT value FROM entries WHERE key = ?1";

const UPSERT: &str = "INSERT INTO entries (key, value) VALUES (?1, ?2)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value";

/// Single-file key-value store holding JSON-encoded values of type `V`.
///
/// Every operation is blocking; async callers go through
/// `tokio::task::spawn_blocking`. Keys iterate in byte order.
#[derive(Debug)]
pub struct StagingStore<V> {
    name: String,
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> StagingStore<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Opens (creating if needed) the partition `name` inside `dir`.
    pub fn open(dir: &Path, name: &str) -> Result<Self, StagingError> {
        let path = dir.join(format!("{name}.sqlite"));
        let open_err = |source: rusqlite::Error| StagingError::Open {
            partition: name.to_string(),
            source,
        };

        let conn = Connection::open(&path).map_err(open_err)?;
        // Scratch data: no rollback journal, no fsync.
        conn.pragma_update_and_check(None, "journal_mode", "OFF", |row| {
            row.get::<_, String>(0)
        })
        .map_err(open_err)?;
        conn.pragma_update(None, "synchronous", "OFF")
            .map_err(open_err)?;
        conn.execute_batch(CREATE_TABLE).map_err(open_err)?;

        debug!(partition = name, path = %path.display(), "Staging store opened");

        Ok(Self {
            name: name.to_string(),
            path,
            conn: Mutex::new(Some(conn)),
            _value: PhantomData,
        })
    }

    /// Partition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StagingError::NotFound` if the key is absent.
    pub fn get(&self, key: &str) -> Result<V, StagingError> {
        self.find(key)?.ok_or_else(|| StagingError::NotFound {
            partition: self.name.clone(),
            key: key.to_string(),
        })
    }

    /// Returns the value stored under `key`, or `None` if absent.
    pub fn find(&self, key: &str) -> Result<Option<V>, StagingError> {
        let raw = self.with_conn(|conn| {
            conn.query_row(SELECT_VALUE, params![key], |row| row.get::<_, String>(0))
                .optional()
                .map_err(|e| self.read_err(e))
        })?;
        raw.map(|raw| self.decode(&raw)).transpose()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: &V) -> Result<(), StagingError> {
        let encoded = self.encode(value)?;
        self.with_conn(|conn| {
            conn.execute(UPSERT, params![key, encoded])
                .map_err(|e| self.write_err(e))?;
            Ok(())
        })
    }

    /// Writes a batch of entries in one transaction.
    ///
    /// When a key already holds a value, `merge(existing, incoming)` decides
    /// what is stored. Returns the number of entries written.
    pub fn upsert_batch<F>(&self, entries: Vec<(String, V)>, merge: F) -> Result<usize, StagingError>
    where
        F: Fn(V, V) -> V,
    {
        if entries.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(|e| self.write_err(e))?;
            let written = entries.len();
            {
                let mut select = tx
                    .prepare_cached(SELECT_VALUE)
                    .map_err(|e| self.read_err(e))?;
                let mut upsert = tx.prepare_cached(UPSERT).map_err(|e| self.write_err(e))?;

                for (key, incoming) in entries {
                    let existing = select
                        .query_row(params![key], |row| row.get::<_, String>(0))
                        .optional()
                        .map_err(|e| self.read_err(e))?;
                    let value = match existing {
                        Some(raw) => merge(self.decode(&raw)?, incoming),
                        None => incoming,
                    };
                    upsert
                        .execute(params![key, self.encode(&value)?])
                        .map_err(|e| self.write_err(e))?;
                }
            }
            tx.commit().map_err(|e| self.write_err(e))?;
            Ok(written)
        })
    }

    /// Visits every entry in key order.
    ///
    /// The store stays locked for the whole visit, so the callback must not
    /// call back into this store. The first callback error stops the visit
    /// and is returned.
    pub fn for_each<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        E: From<StagingError>,
        F: FnMut(&str, V) -> Result<(), E>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| StagingError::Poisoned(self.name.clone()))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| StagingError::Closed(self.name.clone()))?;

        let mut stmt = conn
            .prepare("SELECT key, value FROM entries ORDER BY key")
            .map_err(|e| self.read_err(e))?;
        let mut rows = stmt.query([]).map_err(|e| self.read_err(e))?;

        while let Some(row) = rows.next().map_err(|e| self.read_err(e))? {
            let key: String = row.get(0).map_err(|e| self.read_err(e))?;
            let raw: String = row.get(1).map_err(|e| self.read_err(e))?;
            visit(&key, self.decode(&raw)?)?;
        }
        Ok(())
    }

    /// Returns up to `limit` entries whose key sorts after `after`.
    ///
    /// Keyset pagination: pass the last key of the previous page to continue.
    pub fn page_after(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, V)>, StagingError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let raw_rows = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT key, value FROM entries WHERE ?1 IS NULL OR key > ?1 ORDER BY key LIMIT ?2",
                )
                .map_err(|e| self.read_err(e))?;
            let rows = stmt
                .query_map(params![after, limit], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| self.read_err(e))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| self.read_err(e))
        })?;

        raw_rows
            .into_iter()
            .map(|(key, raw)| Ok((key, self.decode(&raw)?)))
            .collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<u64, StagingError> {
        let count = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get::<_, i64>(0))
                .map_err(|e| self.read_err(e))
        })?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> Result<bool, StagingError> {
        Ok(self.len()? == 0)
    }
}

impl<V> StagingStore<V> {
    /// Closes the connection. Returns `false` if it was already closed.
    pub fn close(&self) -> Result<bool, StagingError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StagingError::Poisoned(self.name.clone()))?;

        match guard.take() {
            Some(conn) => {
                conn.close().map_err(|(_, source)| StagingError::Write {
                    partition: self.name.clone(),
                    source,
                })?;
                debug!(partition = %self.name, "Staging store closed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes the store and deletes its backing file.
    ///
    /// Returns `true` if this call performed the close.
    pub fn clean(&self) -> Result<bool, StagingError> {
        let closed = self.close();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        closed
    }

    /// Returns true once the store has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.lock().map_or(true, |guard| guard.is_none())
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, StagingError>,
    ) -> Result<T, StagingError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StagingError::Poisoned(self.name.clone()))?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| StagingError::Closed(self.name.clone()))?;
        op(conn)
    }

    fn read_err(&self, source: rusqlite::Error) -> StagingError {
        StagingError::Read {
            partition: self.name.clone(),
            source,
        }
    }

    fn write_err(&self, source: rusqlite::Error) -> StagingError {
        StagingError::Write {
            partition: self.name.clone(),
            source,
        }
    }

    fn codec_err(&self, source: serde_json::Error) -> StagingError {
        StagingError::Codec {
            partition: self.name.clone(),
            source,
        }
    }
}

impl<V> StagingStore<V>
where
    V: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &V) -> Result<String, StagingError> {
        serde_json::to_string(value).map_err(|e| self.codec_err(e))
    }

    fn decode(&self, raw: &str) -> Result<V, StagingError> {
        serde_json::from_str(raw).map_err(|e| self.codec_err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::MovementRecord;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn movement(account: &str, debit: Decimal, credit: Decimal) -> MovementRecord {
        MovementRecord {
            account_number: account.to_string(),
            debit,
            credit,
        }
    }

    fn open_store(dir: &Path) -> StagingStore<MovementRecord> {
        StagingStore::open(dir, "movements").unwrap()
    }

    #[test]
    fn test_get_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let err = store.get("1001").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.find("1001").unwrap(), None);
    }

    #[test]
    fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store
            .set("1001", &movement("1001", dec!(20.50), dec!(5)))
            .unwrap();
        store
            .set("1001", &movement("1001", dec!(1), dec!(2)))
            .unwrap();

        let value = store.get("1001").unwrap();
        assert_eq!(value.debit, dec!(1));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_upsert_batch_merges_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let sum = |existing: MovementRecord, incoming: MovementRecord| existing.merge(&incoming);

        let written = store
            .upsert_batch(
                vec![
                    ("1001".to_string(), movement("1001", dec!(10), dec!(0))),
                    ("1001".to_string(), movement("1001", dec!(5), dec!(1))),
                    ("1002".to_string(), movement("1002", dec!(0), dec!(3))),
                ],
                sum,
            )
            .unwrap();
        assert_eq!(written, 3);

        store
            .upsert_batch(
                vec![("1001".to_string(), movement("1001", dec!(0.25), dec!(0)))],
                sum,
            )
            .unwrap();

        let merged = store.get("1001").unwrap();
        assert_eq!(merged.debit, dec!(15.25));
        assert_eq!(merged.credit, dec!(1));
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.upsert_batch(Vec::new(), sum).unwrap(), 0);
    }

    #[test]
    fn test_for_each_visits_in_key_order_and_stops_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        for account in ["3000", "1000", "2000"] {
            store
                .set(account, &movement(account, dec!(1), dec!(0)))
                .unwrap();
        }

        let mut seen = Vec::new();
        store
            .for_each(|key, value: MovementRecord| {
                assert_eq!(key, value.account_number);
                seen.push(key.to_string());
                Ok::<_, StagingError>(())
            })
            .unwrap();
        assert_eq!(seen, vec!["1000", "2000", "3000"]);

        let mut visited = 0;
        let result = store.for_each(|key, _| {
            visited += 1;
            if key == "2000" {
                return Err(StagingError::Closed("stop".to_string()));
            }
            Ok(())
        });
        assert!(matches!(result, Err(StagingError::Closed(_))));
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_page_after_walks_all_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        for n in 0..7 {
            let account = format!("{n:04}");
            store
                .set(&account, &movement(&account, dec!(1), dec!(0)))
                .unwrap();
        }

        let mut keys = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = store.page_after(after.as_deref(), 3).unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 3);
            after = page.last().map(|(key, _)| key.clone());
            keys.extend(page.into_iter().map(|(key, _)| key));
        }

        assert_eq!(keys.len(), 7);
        assert_eq!(keys.first().map(String::as_str), Some("0000"));
        assert_eq!(keys.last().map(String::as_str), Some("0006"));
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_access() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        assert!(!store.is_closed());
        assert!(store.close().unwrap());
        assert!(!store.close().unwrap());
        assert!(store.is_closed());
        assert!(matches!(store.get("1001"), Err(StagingError::Closed(_))));
    }

    #[test]
    fn test_clean_removes_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .set("1001", &movement("1001", dec!(1), dec!(0)))
            .unwrap();
        assert!(store.path().exists());

        assert!(store.clean().unwrap());
        assert!(!store.path().exists());
        assert!(!store.clean().unwrap());
    }
}
