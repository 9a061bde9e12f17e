//! Represents an account that owns folders and files.
//!
//! Authentication happens upstream; the core only ever sees a verified
//! owner id and role. The usage counters are a cached projection over the
//! file table, refreshed by an explicit resync rather than maintained
//! inline with every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role attached to an owner by the identity gate.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OwnerRole {
    User,
    Admin,
}

impl OwnerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerRole::User => "user",
            OwnerRole::Admin => "admin",
        }
    }
}

/// An account row, referenced by every folder and file.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Owner {
    /// Stable identifier supplied by the identity gate.
    pub id: Uuid,

    /// `user` or `admin`.
    pub role: OwnerRole,

    /// Inactive owners keep their data but cannot act.
    pub is_active: bool,

    /// Cached count of live files. Derivable from the file table; kept
    /// consistent via explicit resync, not a live join.
    pub total_files_uploaded: i64,

    /// Cached sum of live file sizes in bytes.
    pub total_storage_used: i64,

    /// When this account was created.
    pub created_at: DateTime<Utc>,
}
