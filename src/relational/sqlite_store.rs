//! SQLite implementation of the relational store
//!
//! A single connection behind a mutex, with an explicit transaction handle
//! the lifecycle services drive: `begin` opens `BEGIN IMMEDIATE`, `commit`
//! must be called explicitly, and dropping an uncommitted handle rolls the
//! transaction back. Uniqueness constraints on case names and on
//! (case, evidence name) are the serialization points for racing creates.

use std::cell::Cell;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::relational::{Case, CaseType, Court, Evidence, EvidenceType, User};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS courts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    short_name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS case_types (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS evidence_types (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS cases (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    case_type_id TEXT NOT NULL REFERENCES case_types(id),
    court_id TEXT NOT NULL REFERENCES courts(id),
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS case_members (
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id),
    PRIMARY KEY (case_id, user_id)
);
CREATE TABLE IF NOT EXISTS evidence (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    evidence_type_id TEXT REFERENCES evidence_types(id),
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (case_id, name)
);
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id TEXT NOT NULL,
    action TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    at TEXT NOT NULL
);
";

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        Some(text) => Uuid::parse_str(&text)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn tags_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn case_from_row(row: &Row<'_>) -> rusqlite::Result<Case> {
    Ok(Case {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        case_type_id: uuid_col(row, 2)?,
        court_id: uuid_col(row, 3)?,
        tags: tags_col(row, 4)?,
        created_at: time_col(row, 5)?,
    })
}

fn evidence_from_row(row: &Row<'_>) -> rusqlite::Result<Evidence> {
    Ok(Evidence {
        id: uuid_col(row, 0)?,
        case_id: uuid_col(row, 1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        evidence_type_id: opt_uuid_col(row, 4)?,
        content_hash: row.get(5)?,
        created_at: time_col(row, 6)?,
    })
}

/// Translate a uniqueness-constraint violation into `AlreadyExists`; any
/// other driver error stays a database error.
fn map_insert_error(e: rusqlite::Error, what: String) -> VaultError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &e {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            return VaultError::AlreadyExists(what);
        }
    }
    VaultError::Database(e)
}

/// SQLite-backed relational store.
pub struct RelationalStore {
    conn: Mutex<Connection>,
}

impl RelationalStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an isolated in-memory database. Each call yields a fresh
    /// schema, which is what test fixtures rely on.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Direct access to the underlying connection, for tests that need to
    /// install triggers or inspect state outside the query surface.
    #[cfg(test)]
    pub fn with_raw_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.conn.lock().unwrap())
    }

    /// Begin a transaction. The handle must be explicitly committed;
    /// dropping it uncommitted rolls back.
    pub fn begin(&self) -> Result<StoreTx<'_>> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(StoreTx {
            conn,
            committed: false,
            actor: Cell::new(None),
        })
    }
}

/// An open transaction against the relational store.
pub struct StoreTx<'a> {
    conn: MutexGuard<'a, Connection>,
    committed: bool,
    actor: Cell<Option<Uuid>>,
}

impl StoreTx<'_> {
    /// Commit the transaction. Consumes the handle; after a failed commit
    /// the drop-rollback is a no-op on the server side.
    pub fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT;")?;
        self.committed = true;
        Ok(())
    }

    /// Record the acting user for audit-trail attribution. Inserts made
    /// through this handle write audit rows on the actor's behalf.
    pub fn set_actor(&self, user_id: Uuid) {
        self.actor.set(Some(user_id));
    }

    fn audit(&self, action: &str, entity_id: Uuid) -> Result<()> {
        if let Some(actor) = self.actor.get() {
            self.conn.execute(
                "INSERT INTO audit_log (actor_id, action, entity_id, at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    actor.to_string(),
                    action,
                    entity_id.to_string(),
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }

    // --- lookup entities ---

    pub fn get_court(&self, id: Uuid) -> Result<Court> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, short_name FROM courts WHERE id = ?1")?;
        stmt.query_row(params![id.to_string()], |row| {
            Ok(Court {
                id: uuid_col(row, 0)?,
                name: row.get(1)?,
                short_name: row.get(2)?,
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => VaultError::NotFound(format!("court {}", id)),
            other => VaultError::Database(other),
        })
    }

    pub fn get_case_type(&self, id: Uuid) -> Result<CaseType> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM case_types WHERE id = ?1")?;
        stmt.query_row(params![id.to_string()], |row| {
            Ok(CaseType {
                id: uuid_col(row, 0)?,
                name: row.get(1)?,
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                VaultError::NotFound(format!("case type {}", id))
            }
            other => VaultError::Database(other),
        })
    }

    pub fn get_evidence_type(&self, id: Uuid) -> Result<EvidenceType> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM evidence_types WHERE id = ?1")?;
        stmt.query_row(params![id.to_string()], |row| {
            Ok(EvidenceType {
                id: uuid_col(row, 0)?,
                name: row.get(1)?,
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                VaultError::NotFound(format!("evidence type {}", id))
            }
            other => VaultError::Database(other),
        })
    }

    // --- seeding (driven by the external admin surface and by fixtures) ---

    pub fn create_court(&self, name: &str, short_name: &str) -> Result<Court> {
        let court = Court {
            id: Uuid::new_v4(),
            name: name.to_string(),
            short_name: short_name.to_string(),
        };
        self.conn
            .execute(
                "INSERT INTO courts (id, name, short_name) VALUES (?1, ?2, ?3)",
                params![court.id.to_string(), court.name, court.short_name],
            )
            .map_err(|e| map_insert_error(e, format!("court {}", short_name)))?;
        Ok(court)
    }

    pub fn create_case_type(&self, name: &str) -> Result<CaseType> {
        let case_type = CaseType {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.conn
            .execute(
                "INSERT INTO case_types (id, name) VALUES (?1, ?2)",
                params![case_type.id.to_string(), case_type.name],
            )
            .map_err(|e| map_insert_error(e, format!("case type {}", name)))?;
        Ok(case_type)
    }

    pub fn create_evidence_type(&self, name: &str) -> Result<EvidenceType> {
        let evidence_type = EvidenceType {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.conn
            .execute(
                "INSERT INTO evidence_types (id, name) VALUES (?1, ?2)",
                params![evidence_type.id.to_string(), evidence_type.name],
            )
            .map_err(|e| map_insert_error(e, format!("evidence type {}", name)))?;
        Ok(evidence_type)
    }

    pub fn create_user(&self, username: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
        };
        self.conn
            .execute(
                "INSERT INTO users (id, username) VALUES (?1, ?2)",
                params![user.id.to_string(), user.username],
            )
            .map_err(|e| map_insert_error(e, format!("user {}", username)))?;
        Ok(user)
    }

    // --- cases ---

    pub fn case_exists_by_name(&self, name: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM cases WHERE name = ?1")?;
        let count: i64 = stmt.query_row(params![name], |row| row.get(0))?;
        Ok(count > 0)
    }

    pub fn create_case(
        &self,
        name: &str,
        case_type_id: Uuid,
        court_id: Uuid,
        tags: &[String],
    ) -> Result<Case> {
        let case = Case {
            id: Uuid::new_v4(),
            name: name.to_string(),
            case_type_id,
            court_id,
            tags: tags.to_vec(),
            created_at: Utc::now(),
        };
        let tags_json = serde_json::to_string(&case.tags)
            .map_err(|e| VaultError::InvalidRequest(format!("unserializable tags: {}", e)))?;
        self.conn
            .execute(
                "INSERT INTO cases (id, name, case_type_id, court_id, tags, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    case.id.to_string(),
                    case.name,
                    case.case_type_id.to_string(),
                    case.court_id.to_string(),
                    tags_json,
                    case.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| map_insert_error(e, format!("case {}", name)))?;
        self.audit("case.create", case.id)?;
        Ok(case)
    }

    pub fn create_case_member(&self, case_id: Uuid, user_id: Uuid) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO case_members (case_id, user_id) VALUES (?1, ?2)",
                params![case_id.to_string(), user_id.to_string()],
            )
            .map_err(|e| map_insert_error(e, format!("membership {}/{}", case_id, user_id)))?;
        Ok(())
    }

    pub fn case_member_exists(&self, case_id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM case_members WHERE case_id = ?1 AND user_id = ?2")?;
        let count: i64 = stmt.query_row(
            params![case_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_case(&self, id: Uuid) -> Result<Case> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, case_type_id, court_id, tags, created_at FROM cases WHERE id = ?1",
        )?;
        stmt.query_row(params![id.to_string()], case_from_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    VaultError::NotFound(format!("case {}", id))
                }
                other => VaultError::Database(other),
            })
    }

    pub fn list_cases(&self) -> Result<Vec<Case>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, case_type_id, court_id, tags, created_at FROM cases ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], case_from_row)?;
        let mut cases = Vec::new();
        for row in rows {
            cases.push(row?);
        }
        Ok(cases)
    }

    pub fn delete_case(&self, id: Uuid) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM cases WHERE id = ?1", params![id.to_string()])?;
        if affected == 0 {
            return Err(VaultError::NotFound(format!("case {}", id)));
        }
        self.audit("case.delete", id)?;
        Ok(())
    }

    // --- evidence ---

    pub fn evidence_exists(&self, case_id: Uuid, name: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM evidence WHERE case_id = ?1 AND name = ?2")?;
        let count: i64 =
            stmt.query_row(params![case_id.to_string(), name], |row| row.get(0))?;
        Ok(count > 0)
    }

    pub fn create_evidence(
        &self,
        case_id: Uuid,
        name: &str,
        description: Option<&str>,
        evidence_type_id: Option<Uuid>,
        content_hash: &str,
    ) -> Result<Evidence> {
        let evidence = Evidence {
            id: Uuid::new_v4(),
            case_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            evidence_type_id,
            content_hash: content_hash.to_string(),
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO evidence
                     (id, case_id, name, description, evidence_type_id, content_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    evidence.id.to_string(),
                    evidence.case_id.to_string(),
                    evidence.name,
                    evidence.description,
                    evidence.evidence_type_id.map(|id| id.to_string()),
                    evidence.content_hash,
                    evidence.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| map_insert_error(e, format!("evidence {}", name)))?;
        self.audit("evidence.create", evidence.id)?;
        Ok(evidence)
    }

    pub fn get_evidence(&self, id: Uuid) -> Result<Evidence> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, name, description, evidence_type_id, content_hash, created_at
             FROM evidence WHERE id = ?1",
        )?;
        stmt.query_row(params![id.to_string()], evidence_from_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    VaultError::NotFound(format!("evidence {}", id))
                }
                other => VaultError::Database(other),
            })
    }

    pub fn list_evidence(&self, case_id: Uuid) -> Result<Vec<Evidence>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, name, description, evidence_type_id, content_hash, created_at
             FROM evidence WHERE case_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![case_id.to_string()], evidence_from_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Number of audit rows recorded for an entity. Used by tests and the
    /// external audit surface.
    pub fn audit_count(&self, entity_id: Uuid) -> Result<i64> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM audit_log WHERE entity_id = ?1")?;
        let count: i64 = stmt.query_row(params![entity_id.to_string()], |row| row.get(0))?;
        Ok(count)
    }
}

impl Drop for StoreTx<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.conn.execute_batch("ROLLBACK;") {
                warn!("Failed to roll back transaction: {}", e);
            }
        }
    }
}
