//! Represents a file record bound to a remotely-stored blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A file in an owner's drive.
///
/// The record stores metadata only; the payload lives in the remote blob
/// backend and is reachable exclusively through `blob_handle`. A non-null
/// `deleted_at` marks the file soft-deleted: hidden from default listings,
/// storage totals and duplicate-name checks, but restorable until purged.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredFile {
    /// Unique identifier for this file record.
    pub id: Uuid,

    /// Display name including extension.
    pub name: String,

    /// Payload size in bytes. Always the raw byte count; human-readable
    /// formatting is a presentation concern (see [`format_size`]).
    pub size: i64,

    /// Declared content type (`type/subtype`).
    pub mime_type: String,

    /// Opaque handle returned by the remote blob backend. Globally unique:
    /// one file row per remote object.
    pub blob_handle: String,

    /// MD5 of the uploaded payload, computed at upload time.
    pub checksum: Option<String>,

    /// ID of the account that owns this file.
    pub owner_id: Uuid,

    /// Containing folder, or `None` for the root level.
    pub folder_id: Option<Uuid>,

    /// Soft-deletion marker. `None` means the file is live.
    pub deleted_at: Option<DateTime<Utc>>,

    /// When this record was created.
    pub created_at: DateTime<Utc>,
}

impl StoredFile {
    /// Whether the file is live (not soft-deleted).
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Aggregate storage usage for one owner, over live files only.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageUsage {
    /// Sum of `size` across live files.
    pub used_bytes: i64,

    /// Number of live files.
    pub file_count: i64,
}

/// Format a raw byte count for display using base-1024 units.
///
/// Two decimal places, e.g. `1530000` -> `"1.46 MB"`. Stored values are
/// always raw bytes; this is presentation only.
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes.max(0))
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
