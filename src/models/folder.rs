//! Represents a folder — a node in an owner's hierarchical namespace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A folder in an owner's drive.
///
/// Folders form a tree via `parent_id`; a `None` parent means the folder
/// sits at the root of the owner's namespace. Sibling names are unique
/// (case-sensitive) per owner, and parent chains are guaranteed cycle-free
/// at write time.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Folder {
    /// Unique identifier for this folder.
    pub id: Uuid,

    /// Display name, 1-100 characters, no path or control characters.
    pub name: String,

    /// ID of the account that owns this folder.
    pub owner_id: Uuid,

    /// Parent folder, or `None` for a root-level folder.
    pub parent_id: Option<Uuid>,

    /// When this folder was created.
    pub created_at: DateTime<Utc>,
}

/// Scope selector for listings that filter by containing folder.
///
/// The distinction between "parameter omitted" and "explicitly null" is
/// load-bearing: tree-building callers want every folder in one query,
/// while per-level callers want only direct children of the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FolderScope {
    /// No folder filter at all ("All Files" view, whole-tree listings).
    Any,
    /// Root level only (`parent_id IS NULL` / `folder_id IS NULL`).
    Root,
    /// Contents of one specific folder.
    In(Uuid),
}

/// Recursive content statistics for a folder subtree.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderContents {
    /// Descendant folders (the folder itself is not counted).
    pub total_folders: i64,

    /// Live files across the whole subtree.
    pub total_files: i64,
}

/// Outcome of a recursive folder deletion.
///
/// The cascade is best-effort: failures deleting one subtree's files are
/// recorded here and do not abort deletion of siblings or the parent.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CascadeStats {
    /// Folder rows removed, including the root of the cascade.
    pub folders_deleted: i64,

    /// File rows removed (live and soft-deleted alike).
    pub files_deleted: i64,

    /// Human-readable descriptions of per-subtree failures.
    pub errors: Vec<String>,
}

impl CascadeStats {
    /// Fold another cascade result into this one (bulk admin deletion).
    pub fn absorb(&mut self, other: CascadeStats) {
        self.folders_deleted += other.folders_deleted;
        self.files_deleted += other.files_deleted;
        self.errors.extend(other.errors);
    }
}
