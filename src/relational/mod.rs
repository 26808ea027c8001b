//! Relational Metadata Layer
//!
//! This module provides the transactional query layer over the relational
//! database: case rows, evidence rows, lookup entities and existence
//! checks. The lifecycle services control the transaction handle; nothing
//! here reaches into the object vault.

pub mod sqlite_store;

pub use sqlite_store::{RelationalStore, StoreTx};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A legal case. The vault container name is derived from `name` and never
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    /// Human-readable name, e.g. "OSPG KM 2/23". Unique.
    pub name: String,
    pub case_type_id: Uuid,
    pub court_id: Uuid,
    /// Free-form tags, stored as a JSON array column.
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// An evidence artifact within a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub case_id: Uuid,
    /// Uploader-supplied filename; unique within the case, no `/` or space.
    pub name: String,
    pub description: Option<String>,
    pub evidence_type_id: Option<Uuid>,
    /// Lowercase hex SHA-256 of the uploaded bytes, computed once at
    /// creation. A content fingerprint, not re-verified on read.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Court lookup entity (owned elsewhere; read here for name resolution).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Court {
    pub id: Uuid,
    pub name: String,
    pub short_name: String,
}

/// Case type lookup entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseType {
    pub id: Uuid,
    pub name: String,
}

/// Evidence type lookup entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceType {
    pub id: Uuid,
    pub name: String,
}

/// User row, referenced by case membership and audit attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
}
