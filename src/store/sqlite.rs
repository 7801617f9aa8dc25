use super::Store;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Durable store backed by a single SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    const GET_SCALAR: &'static str = "SELECT value FROM kv WHERE key = ?1";

    const SET_SCALAR: &'static str = "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value";

    const ADVANCE_COUNTER: &'static str = "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value
         WHERE CAST(kv.value AS INTEGER) < CAST(excluded.value AS INTEGER)";

    const SET_FIELD: &'static str = "INSERT INTO hashes (key, field, value) VALUES (?1, ?2, ?3)
         ON CONFLICT(key, field) DO UPDATE SET value = excluded.value";

    const SET_FIELD_IF_ABSENT: &'static str =
        "INSERT OR IGNORE INTO hashes (key, field, value) VALUES (?1, ?2, ?3)";

    const GET_FIELD: &'static str = "SELECT value FROM hashes WHERE key = ?1 AND field = ?2";

    const GET_ALL_FIELDS: &'static str = "SELECT field, value FROM hashes WHERE key = ?1";

    const COUNT_FIELDS: &'static str = "SELECT COUNT(*) FROM hashes WHERE key = ?1";

    const EXISTS: &'static str = "SELECT EXISTS(SELECT 1 FROM kv WHERE key = ?1)
         OR EXISTS(SELECT 1 FROM hashes WHERE key = ?1)";

    const KEYS_WITH_PREFIX: &'static str = "SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1
         UNION
         SELECT DISTINCT key FROM hashes WHERE substr(key, 1, length(?1)) = ?1
         ORDER BY key";

    pub fn open(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::create_tables(&conn)?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS hashes (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            )",
            [],
        )?;

        Ok(())
    }

    /// Runs `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("sqlite connection mutex poisoned"))?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let exists: bool = conn.query_row(Self::EXISTS, params![key], |row| row.get(0))?;
            Ok(exists)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row(Self::GET_SCALAR, params![key], |row| row.get(0))
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_conn(move |conn| {
            conn.execute(Self::SET_SCALAR, params![key, value])?;
            Ok(())
        })
        .await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let (key, field, value) = (key.to_string(), field.to_string(), value.to_string());
        self.with_conn(move |conn| {
            conn.execute(Self::SET_FIELD, params![key, field, value])?;
            Ok(())
        })
        .await
    }

    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let (key, field, value) = (key.to_string(), field.to_string(), value.to_string());
        self.with_conn(move |conn| {
            let inserted = conn.execute(Self::SET_FIELD_IF_ABSENT, params![key, field, value])?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let (key, field) = (key.to_string(), field.to_string());
        self.with_conn(move |conn| {
            let value = conn
                .query_row(Self::GET_FIELD, params![key, field], |row| row.get(0))
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(Self::GET_ALL_FIELDS)?;
            let fields = stmt
                .query_map(params![key], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<HashMap<_, _>, _>>()?;
            Ok(fields)
        })
        .await
    }

    async fn hash_len(&self, key: &str) -> Result<usize> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(Self::COUNT_FIELDS, params![key], |row| row.get(0))?;
            Ok(usize::try_from(count)?)
        })
        .await
    }

    async fn advance_counter(&self, key: &str, value: u64) -> Result<bool> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_conn(move |conn| {
            let changed = conn.execute(Self::ADVANCE_COUNTER, params![key, value])?;
            Ok(changed > 0)
        })
        .await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(Self::KEYS_WITH_PREFIX)?;
            let keys = stmt
                .query_map(params![prefix], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }
}
