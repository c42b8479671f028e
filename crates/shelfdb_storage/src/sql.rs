//! Relational storage engine backed by SQLite.
//!
//! Each collection owns one table named after its directory, plus a
//! companion `_v_<table>` table holding version snapshots:
//!
//! ```sql
//! CREATE TABLE books (_key VARCHAR(255) PRIMARY KEY, src JSON,
//!                     created DATETIME, updated DATETIME);
//! CREATE TABLE _v_books (_key VARCHAR(255), version VARCHAR(255), src JSON,
//!                        created DATETIME, PRIMARY KEY (_key, version));
//! ```
//!
//! Concurrency between processes is whatever SQLite provides.

use crate::backend::{StorageEngine, StorageType};
use crate::dsn::Dsn;
use crate::error::{StorageError, StorageResult};
use crate::version::{sort_versions, Version, VersioningPolicy};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// The only DSN scheme this engine accepts.
pub const SQLITE_SCHEME: &str = "sqlite";

/// Timestamp layout used in the `created`/`updated` columns.
///
/// Fixed width, so lexical order matches chronological order.
pub const SQL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Formats a timestamp for storage in a SQL column.
#[must_use]
pub fn sql_timestamp(time: DateTime<Utc>) -> String {
    time.format(SQL_TIME_FORMAT).to_string()
}

/// Derives the table name for a collection directory.
///
/// The lowercased directory name without a trailing `.ds`, with every
/// character outside `[a-z0-9_]` replaced by `_`.
#[must_use]
pub fn table_name(collection_dir: &Path) -> String {
    let base = collection_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let base = base.strip_suffix(".ds").unwrap_or(&base);
    let name: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "collection".to_string()
    } else {
        name
    }
}

/// Storage engine keeping one row per object in a SQLite table.
#[derive(Debug)]
pub struct SqlEngine {
    conn: Connection,
    /// Quoted object table name.
    table: String,
    /// Quoted version table name.
    versions_table: String,
    db_path: Option<PathBuf>,
    policy: VersioningPolicy,
}

impl SqlEngine {
    /// Opens (creating tables if needed) the database a DSN points to.
    ///
    /// Relative file targets resolve inside the collection directory.
    ///
    /// # Errors
    ///
    /// Returns a malformed input error for schemes other than `sqlite`,
    /// or a database error if the connection or schema setup fails.
    pub fn open(collection_dir: &Path, dsn: &Dsn) -> StorageResult<Self> {
        let (conn, db_path) = Self::connect(collection_dir, dsn, OpenFlags::default())?;
        let engine = Self::with_connection(conn, collection_dir, db_path);
        engine.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                _key VARCHAR(255) PRIMARY KEY,
                src JSON,
                created DATETIME NOT NULL,
                updated DATETIME NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {versions} (
                _key VARCHAR(255) NOT NULL,
                version VARCHAR(255) NOT NULL,
                src JSON,
                created DATETIME NOT NULL,
                PRIMARY KEY (_key, version)
            );",
            table = engine.table,
            versions = engine.versions_table,
        ))?;
        debug!(table = %engine.table, "opened relational store");
        Ok(engine)
    }

    /// Opens an existing database without creating or altering anything.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the object table does not exist, a malformed
    /// input error for unsupported schemes, or a database error.
    pub fn open_read_only(collection_dir: &Path, dsn: &Dsn) -> StorageResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let (conn, db_path) = Self::connect(collection_dir, dsn, flags)?;
        let engine = Self::with_connection(conn, collection_dir, db_path);
        let bare = engine.table.trim_matches('"').to_string();
        let found: Option<String> = engine
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![bare],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(StorageError::corrupted(format!("table {bare} does not exist")));
        }
        Ok(engine)
    }

    fn connect(
        collection_dir: &Path,
        dsn: &Dsn,
        flags: OpenFlags,
    ) -> StorageResult<(Connection, Option<PathBuf>)> {
        if dsn.scheme() != SQLITE_SCHEME {
            return Err(StorageError::malformed(format!(
                "unsupported DSN scheme {:?}",
                dsn.scheme()
            )));
        }
        let (conn, db_path) = if dsn.is_memory() {
            (Connection::open_in_memory()?, None)
        } else {
            let path = dsn.resolve_file(collection_dir);
            (Connection::open_with_flags(&path, flags)?, Some(path))
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok((conn, db_path))
    }

    fn with_connection(conn: Connection, collection_dir: &Path, db_path: Option<PathBuf>) -> Self {
        let name = table_name(collection_dir);
        Self {
            conn,
            table: format!("\"{name}\""),
            versions_table: format!("\"_v_{name}\""),
            db_path,
            policy: VersioningPolicy::None,
        }
    }

    /// Returns the database file, or `None` for an in-memory database.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Returns the unquoted object table name.
    #[must_use]
    pub fn table(&self) -> &str {
        self.table.trim_matches('"')
    }

    fn read_src(&self, key: &str) -> StorageResult<Option<String>> {
        let sql = format!("SELECT src FROM {} WHERE _key = ?1", self.table);
        Ok(self
            .conn
            .query_row(&sql, params![key], |row| row.get(0))
            .optional()?)
    }

    fn stored_versions(&self, key: &str) -> StorageResult<Vec<Version>> {
        let sql = format!("SELECT version FROM {} WHERE _key = ?1", self.versions_table);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let ids = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sort_versions(&ids))
    }
}

impl StorageEngine for SqlEngine {
    fn storage_type(&self) -> StorageType {
        StorageType::Relational
    }

    fn create(&mut self, key: &str, src: &[u8]) -> StorageResult<()> {
        if self.has_key(key)? {
            return Err(StorageError::key_exists(key));
        }
        let src = std::str::from_utf8(src)
            .map_err(|e| StorageError::malformed(format!("object {key} is not UTF-8: {e}")))?;
        let now = sql_timestamp(Utc::now());
        let sql = format!(
            "INSERT INTO {} (_key, src, created, updated) VALUES (?1, ?2, ?3, ?3)",
            self.table
        );
        self.conn.execute(&sql, params![key, src, now])?;
        Ok(())
    }

    fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.read_src(key)?
            .map(String::into_bytes)
            .ok_or_else(|| StorageError::key_not_found(key))
    }

    fn update(&mut self, key: &str, src: &[u8]) -> StorageResult<()> {
        let previous = self
            .read_src(key)?
            .ok_or_else(|| StorageError::key_not_found(key))?;
        let src = std::str::from_utf8(src)
            .map_err(|e| StorageError::malformed(format!("object {key} is not UTF-8: {e}")))?;
        let latest = self.stored_versions(key)?.pop();
        let next = self.policy.next(latest.as_ref());
        let now = sql_timestamp(Utc::now());

        let tx = self.conn.transaction()?;
        if let Some(next) = &next {
            tx.execute(
                &format!(
                    "INSERT INTO {} (_key, version, src, created) VALUES (?1, ?2, ?3, ?4)",
                    self.versions_table
                ),
                params![key, next.to_string(), previous, now],
            )?;
            debug!(key, version = %next, "recorded version");
        }
        tx.execute(
            &format!("UPDATE {} SET src = ?1, updated = ?2 WHERE _key = ?3", self.table),
            params![src, now, key],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            &format!("DELETE FROM {} WHERE _key = ?1", self.table),
            params![key],
        )?;
        if removed == 0 {
            return Err(StorageError::key_not_found(key));
        }
        tx.execute(
            &format!("DELETE FROM {} WHERE _key = ?1", self.versions_table),
            params![key],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let sql = format!("SELECT _key FROM {} ORDER BY _key", self.table);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn has_key(&self, key: &str) -> StorageResult<bool> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE _key = ?1", self.table);
        let count: i64 = self.conn.query_row(&sql, params![key], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn len(&self) -> StorageResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        row_count(count, &self.table)
    }

    fn versioning(&self) -> VersioningPolicy {
        self.policy
    }

    fn set_versioning(&mut self, policy: VersioningPolicy) {
        self.policy = policy;
    }

    fn versions(&self, key: &str) -> StorageResult<Vec<Version>> {
        if !self.has_key(key)? {
            return Err(StorageError::key_not_found(key));
        }
        self.stored_versions(key)
    }

    fn read_version(&self, key: &str, version: &Version) -> StorageResult<Vec<u8>> {
        if !self.policy.is_enabled() {
            return Err(StorageError::versioning_disabled(format!(
                "cannot read version {version} of {key}"
            )));
        }
        if !self.has_key(key)? {
            return Err(StorageError::key_not_found(key));
        }
        let sql = format!(
            "SELECT src FROM {} WHERE _key = ?1 AND version = ?2",
            self.versions_table
        );
        let src: Option<String> = self
            .conn
            .query_row(&sql, params![key, version.to_string()], |row| row.get(0))
            .optional()?;
        src.map(String::into_bytes)
            .ok_or_else(|| StorageError::version_not_found(key, version.to_string()))
    }

    fn updated_keys(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<String>> {
        let sql = format!(
            "SELECT _key FROM {} WHERE updated BETWEEN ?1 AND ?2 ORDER BY updated, _key",
            self.table
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let keys = stmt
            .query_map(params![sql_timestamp(start), sql_timestamp(end)], |row| {
                row.get(0)
            })?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

fn row_count(count: i64, table: &str) -> StorageResult<u64> {
    u64::try_from(count)
        .map_err(|_| StorageError::corrupted(format!("{table} reported {count} rows")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    fn engine() -> (tempfile::TempDir, SqlEngine) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Books.ds");
        std::fs::create_dir_all(&path).unwrap();
        let dsn = Dsn::parse("sqlite://collection.sqlite").unwrap();
        let engine = SqlEngine::open(&path, &dsn).unwrap();
        (dir, engine)
    }

    #[test]
    fn negative_row_count_is_corruption() {
        assert_eq!(row_count(3, "books").unwrap(), 3);
        let err = row_count(-1, "books").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
    }

    #[test]
    fn table_names() {
        assert_eq!(table_name(Path::new("/tmp/Books.ds")), "books");
        assert_eq!(table_name(Path::new("my-data.ds")), "my_data");
        assert_eq!(table_name(Path::new("/")), "collection");
    }

    #[test]
    fn sql_create_read_update_delete() {
        let (_dir, mut engine) = engine();
        assert_eq!(engine.table(), "books");
        assert!(engine.db_path().unwrap().ends_with("Books.ds/collection.sqlite"));

        engine.create("1", br#"{"one":1}"#).unwrap();
        assert_eq!(engine.read("1").unwrap(), br#"{"one":1}"#);
        assert_eq!(
            engine.create("1", b"{}").unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );

        engine.update("1", br#"{"one":2}"#).unwrap();
        assert_eq!(engine.read("1").unwrap(), br#"{"one":2}"#);

        engine.delete("1").unwrap();
        assert!(!engine.has_key("1").unwrap());
        assert_eq!(engine.read("1").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(engine.delete("1").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(engine.update("1", b"{}").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn sql_keys_ordered() {
        let (_dir, mut engine) = engine();
        for key in ["b", "a", "c"] {
            engine.create(key, b"{}").unwrap();
        }
        assert_eq!(engine.keys().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(engine.len().unwrap(), 3);
        assert!(!engine.is_empty().unwrap());
    }

    #[test]
    fn sql_versions_snapshot_before_update() {
        let (_dir, mut engine) = engine();
        engine.set_versioning(VersioningPolicy::Major);
        engine.create("k", br#"{"v":1}"#).unwrap();
        engine.update("k", br#"{"v":2}"#).unwrap();
        engine.update("k", br#"{"v":3}"#).unwrap();

        let versions = engine.versions("k").unwrap();
        assert_eq!(versions, vec![Version::new(1, 0, 0), Version::new(2, 0, 0)]);
        assert_eq!(engine.read_version("k", &versions[0]).unwrap(), br#"{"v":1}"#);
        assert_eq!(engine.read_version("k", &versions[1]).unwrap(), br#"{"v":2}"#);

        engine.delete("k").unwrap();
        engine.create("k", b"{}").unwrap();
        assert!(engine.versions("k").unwrap().is_empty());
    }

    #[test]
    fn sql_read_version_without_policy() {
        let (_dir, mut engine) = engine();
        engine.create("k", b"{}").unwrap();
        let err = engine.read_version("k", &Version::new(0, 0, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PolicyViolation);
    }

    #[test]
    fn sql_updated_keys() {
        let (_dir, mut engine) = engine();
        let start = Utc::now() - ChronoDuration::seconds(1);
        engine.create("x", b"{}").unwrap();
        engine.create("y", b"{}").unwrap();
        let end = Utc::now() + ChronoDuration::seconds(1);

        assert_eq!(engine.updated_keys(start, end).unwrap(), vec!["x", "y"]);
        assert!(engine
            .updated_keys(end, end + ChronoDuration::seconds(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn sql_rejects_other_schemes() {
        let dir = tempdir().unwrap();
        let dsn = Dsn::parse("postgres://localhost/books").unwrap();
        let err = SqlEngine::open(dir.path(), &dsn).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn sql_memory_database() {
        let dir = tempdir().unwrap();
        let dsn = Dsn::parse("sqlite://:memory:").unwrap();
        let mut engine = SqlEngine::open(dir.path(), &dsn).unwrap();
        assert!(engine.db_path().is_none());
        engine.create("m", b"[]").unwrap();
        assert_eq!(engine.keys().unwrap(), vec!["m"]);
    }

    #[test]
    fn sql_read_only_requires_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.ds");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("other.sqlite"), b"").unwrap();
        let dsn = Dsn::parse("sqlite://other.sqlite").unwrap();
        let err = SqlEngine::open_read_only(&path, &dsn).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
    }
}
