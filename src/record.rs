//! Relational identity table: trait + SQLite implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{SecretDigest, UserId};

const SCHEMA_VERSION: u32 = 1;
const BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordStoreError {
    #[error("user id {id} already exists")]
    DuplicateIdentifier { id: UserId },
    #[error("username `{username}` is already taken")]
    UsernameTaken { username: String },
    #[error("identity schema version mismatch: expected {expected}, got {got}")]
    SchemaVersionMismatch { expected: u32, got: u32 },
    #[error("missing meta key: {key}")]
    MetaMissing { key: &'static str },
    #[error("path is a symlink: {path:?}")]
    Symlink { path: PathBuf },
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("user row decode failed: {0}")]
    RowDecode(String),
}

/// Whether a record participates in namespace reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    /// Anything other than `active` reads as inactive, so an unknown status
    /// never keeps a namespace entry alive.
    fn parse(s: &str) -> Self {
        if s == "active" {
            UserStatus::Active
        } else {
            UserStatus::Inactive
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub contact: String,
    pub secret: SecretDigest,
    pub status: UserStatus,
    pub created_at_ms: u64,
}

impl UserRecord {
    pub fn new(
        id: UserId,
        username: impl Into<String>,
        contact: impl Into<String>,
        secret: SecretDigest,
        status: UserStatus,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            contact: contact.into(),
            secret,
            status,
            created_at_ms: now_ms(),
        }
    }

    pub fn active(
        id: UserId,
        username: impl Into<String>,
        contact: impl Into<String>,
        secret: SecretDigest,
    ) -> Self {
        Self::new(id, username, contact, secret, UserStatus::Active)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub trait RecordStore: Send + Sync {
    /// Advisory existence check; the insert constraint is the source of truth.
    fn exists(&self, id: &UserId) -> Result<bool, RecordStoreError>;

    /// Atomic insert. The store's uniqueness constraints, not application
    /// logic, report `DuplicateIdentifier` and `UsernameTaken`.
    fn insert(&self, record: &UserRecord) -> Result<(), RecordStoreError>;

    fn get(&self, id: &UserId) -> Result<Option<UserRecord>, RecordStoreError>;

    fn list_active(&self) -> Result<BTreeSet<UserId>, RecordStoreError>;
}

/// SQLite-backed identity table.
///
/// Holds only the db path; every operation opens its own connection, so a
/// single store value is safe to share across threads without locking.
#[derive(Debug)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
}

impl SqliteRecordStore {
    pub fn open(db_path: &Path) -> Result<Self, RecordStoreError> {
        reject_symlink(db_path)?;
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| RecordStoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = open_connection(db_path, true)?;
        let is_new = !table_exists(&conn, "meta")?;
        if is_new {
            initialize_schema(&conn)?;
        } else {
            validate_schema_version(&conn)?;
        }
        drop(conn);

        Ok(Self {
            db_path: db_path.to_path_buf(),
        })
    }

    fn conn(&self) -> Result<Connection, RecordStoreError> {
        open_connection(&self.db_path, false)
    }
}

impl RecordStore for SqliteRecordStore {
    fn exists(&self, id: &UserId) -> Result<bool, RecordStoreError> {
        let conn = self.conn()?;
        let row: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    fn insert(&self, record: &UserRecord) -> Result<(), RecordStoreError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO users (id, username, contact, secret_sha256, status, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id.to_string(),
                record.username,
                record.contact,
                record.secret.as_bytes().to_vec(),
                record.status.as_str(),
                record.created_at_ms as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) => Err(map_insert_conflict(err, record)),
        }
    }

    fn get(&self, id: &UserId) -> Result<Option<UserRecord>, RecordStoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT username, contact, secret_sha256, status, created_at_ms \
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((username, contact, secret_blob, status, created_at_ms)) = row else {
            return Ok(None);
        };
        let secret: [u8; 32] = secret_blob
            .try_into()
            .map_err(|_| RecordStoreError::RowDecode("secret blob wrong length".to_string()))?;
        let created_at_ms = u64::try_from(created_at_ms)
            .map_err(|_| RecordStoreError::RowDecode("created_at_ms out of range".to_string()))?;

        Ok(Some(UserRecord {
            id: *id,
            username,
            contact,
            secret: SecretDigest::from_bytes(secret),
            status: UserStatus::parse(&status),
            created_at_ms,
        }))
    }

    fn list_active(&self) -> Result<BTreeSet<UserId>, RecordStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM users WHERE status = 'active' ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let id = UserId::parse_str(&raw)
                .map_err(|e| RecordStoreError::RowDecode(e.to_string()))?;
            ids.insert(id);
        }
        Ok(ids)
    }
}

fn map_insert_conflict(err: rusqlite::Error, record: &UserRecord) -> RecordStoreError {
    if let rusqlite::Error::SqliteFailure(code, Some(msg)) = &err
        && code.code == ErrorCode::ConstraintViolation
    {
        if msg.contains("users.id") {
            return RecordStoreError::DuplicateIdentifier { id: record.id };
        }
        if msg.contains("users.username") {
            return RecordStoreError::UsernameTaken {
                username: record.username.clone(),
            };
        }
    }
    RecordStoreError::Sqlite(err)
}

fn reject_symlink(path: &Path) -> Result<(), RecordStoreError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(RecordStoreError::Symlink {
            path: path.to_path_buf(),
        }),
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(RecordStoreError::Io {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

fn open_connection(path: &Path, create: bool) -> Result<Connection, RecordStoreError> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
    if create {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    let conn = Connection::open_with_flags(path, flags)?;
    apply_pragmas(&conn)?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection) -> Result<(), RecordStoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, RecordStoreError> {
    let row: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row.is_some())
}

fn initialize_schema(conn: &Connection) -> Result<(), RecordStoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
           id TEXT PRIMARY KEY,
           username TEXT NOT NULL UNIQUE,
           contact TEXT NOT NULL,
           secret_sha256 BLOB NOT NULL,
           status TEXT NOT NULL,
           created_at_ms INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS users_by_status ON users (status, id);
         CREATE TABLE IF NOT EXISTS meta (
           key TEXT PRIMARY KEY,
           value TEXT NOT NULL
         );",
    )?;
    set_meta(conn, "schema_version", SCHEMA_VERSION.to_string())?;
    Ok(())
}

fn validate_schema_version(conn: &Connection) -> Result<(), RecordStoreError> {
    let raw = get_meta(conn, "schema_version")?
        .ok_or(RecordStoreError::MetaMissing {
            key: "schema_version",
        })?;
    let got: u32 = raw
        .parse()
        .map_err(|_| RecordStoreError::RowDecode(format!("schema_version `{raw}` not a number")))?;
    if got != SCHEMA_VERSION {
        return Err(RecordStoreError::SchemaVersionMismatch {
            expected: SCHEMA_VERSION,
            got,
        });
    }
    Ok(())
}

fn set_meta(conn: &Connection, key: &str, value: String) -> Result<(), RecordStoreError> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, RecordStoreError> {
    let row = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::identity::SecretDigest;

    use super::*;

    fn temp_store() -> (TempDir, SqliteRecordStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteRecordStore::open(&temp.path().join("identity.sqlite")).unwrap();
        (temp, store)
    }

    fn record(username: &str, status: UserStatus) -> UserRecord {
        UserRecord::new(
            UserId::generate(),
            username,
            format!("{username}@example.com"),
            SecretDigest::from_secret("secret1"),
            status,
        )
    }

    #[test]
    fn open_initializes_schema_and_meta() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("identity.sqlite");
        SqliteRecordStore::open(&db_path).unwrap();

        let conn = open_connection(&db_path, false).unwrap();
        for table in ["users", "meta"] {
            assert!(table_exists(&conn, table).unwrap());
        }
        assert_eq!(
            get_meta(&conn, "schema_version").unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn open_rejects_schema_version_mismatch() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("identity.sqlite");
        SqliteRecordStore::open(&db_path).unwrap();

        let conn = open_connection(&db_path, false).unwrap();
        set_meta(&conn, "schema_version", "999".to_string()).unwrap();
        drop(conn);

        let result = SqliteRecordStore::open(&db_path);
        assert!(matches!(
            result,
            Err(RecordStoreError::SchemaVersionMismatch { expected: 1, got: 999 })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn open_rejects_symlinked_db_path() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target.sqlite");
        std::fs::write(&target, b"").unwrap();
        let db_path = temp.path().join("identity.sqlite");
        symlink(&target, &db_path).unwrap();

        let err = SqliteRecordStore::open(&db_path).unwrap_err();
        assert!(matches!(err, RecordStoreError::Symlink { .. }));
    }

    #[test]
    fn insert_then_get_round_trips() {
        let (_temp, store) = temp_store();
        let record = record("alice", UserStatus::Active);
        store.insert(&record).unwrap();

        assert!(store.exists(&record.id).unwrap());
        let loaded = store.get(&record.id).unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn insert_duplicate_id_maps_to_duplicate_identifier() {
        let (_temp, store) = temp_store();
        let first = record("alice", UserStatus::Active);
        store.insert(&first).unwrap();

        let mut second = record("bob", UserStatus::Active);
        second.id = first.id;
        let err = store.insert(&second).unwrap_err();
        assert!(matches!(
            err,
            RecordStoreError::DuplicateIdentifier { id } if id == first.id
        ));
    }

    #[test]
    fn insert_duplicate_username_maps_to_username_taken() {
        let (_temp, store) = temp_store();
        store.insert(&record("alice", UserStatus::Active)).unwrap();

        let err = store.insert(&record("alice", UserStatus::Active)).unwrap_err();
        assert!(matches!(
            err,
            RecordStoreError::UsernameTaken { username } if username == "alice"
        ));
    }

    #[test]
    fn list_active_filters_by_status() {
        let (_temp, store) = temp_store();
        let active = record("alice", UserStatus::Active);
        let inactive = record("bob", UserStatus::Inactive);
        store.insert(&active).unwrap();
        store.insert(&inactive).unwrap();

        let ids = store.list_active().unwrap();
        assert!(ids.contains(&active.id));
        assert!(!ids.contains(&inactive.id));
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn unknown_status_reads_as_inactive() {
        let (_temp, store) = temp_store();
        let record = record("alice", UserStatus::Active);
        store.insert(&record).unwrap();

        let conn = store.conn().unwrap();
        conn.execute(
            "UPDATE users SET status = 'suspended' WHERE id = ?1",
            params![record.id.to_string()],
        )
        .unwrap();
        drop(conn);

        let loaded = store.get(&record.id).unwrap().unwrap();
        assert_eq!(loaded.status, UserStatus::Inactive);
        assert!(store.list_active().unwrap().is_empty());
    }

    #[test]
    fn reopen_preserves_rows() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("identity.sqlite");
        let record = record("alice", UserStatus::Active);
        {
            let store = SqliteRecordStore::open(&db_path).unwrap();
            store.insert(&record).unwrap();
        }

        let store = SqliteRecordStore::open(&db_path).unwrap();
        assert!(store.exists(&record.id).unwrap());
    }
}
