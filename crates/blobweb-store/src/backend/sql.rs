use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::StoreResult;
use crate::traits::Backend;

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS datastore (\"key\" VARCHAR(255) PRIMARY KEY, content BLOB)";

/// Where a relational store lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SqlTarget {
    /// Private in-memory database, cleared when the process exits.
    Memory,
    /// Database file on disk.
    File(PathBuf),
}

/// Relational backend: a single `datastore` table of `(key, content)` rows.
///
/// Each operation is one statement in its own implicit transaction. The
/// connection is serialized behind a mutex so the backend can be shared by
/// all request workers.
pub struct SqlBackend {
    target: SqlTarget,
    conn: Mutex<Connection>,
}

impl SqlBackend {
    pub fn open(target: SqlTarget) -> StoreResult<Self> {
        let conn = match &target {
            SqlTarget::Memory => Connection::open_in_memory()?,
            SqlTarget::File(path) => Connection::open(path)?,
        };
        conn.execute(CREATE_TABLE, [])?;
        debug!(?target, "opened SQL backend");
        Ok(Self {
            target,
            conn: Mutex::new(conn),
        })
    }

    pub fn open_memory() -> StoreResult<Self> {
        Self::open(SqlTarget::Memory)
    }

    pub fn open_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(SqlTarget::File(path.as_ref().to_path_buf()))
    }

    pub fn target(&self) -> &SqlTarget {
        &self.target
    }
}

impl Backend for SqlBackend {
    fn describe(&self) -> String {
        match &self.target {
            SqlTarget::Memory => "sqlite in-memory table".to_string(),
            SqlTarget::File(path) => format!("sqlite table in {}", path.display()),
        }
    }

    fn set(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "INSERT INTO datastore (\"key\", content) VALUES (?1, ?2) \
             ON CONFLICT(\"key\") DO UPDATE SET content = excluded.content",
            params![key, data],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let content = conn
            .query_row(
                "SELECT content FROM datastore WHERE \"key\" = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(content)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute("DELETE FROM datastore WHERE \"key\" = ?1", params![key])?;
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute("DROP TABLE IF EXISTS datastore", [])?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare("SELECT \"key\" FROM datastore")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let found = conn
            .query_row(
                "SELECT 1 FROM datastore WHERE \"key\" = ?1",
                params![key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl std::fmt::Debug for SqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlBackend")
            .field("target", &self.target)
            .finish()
    }
}
