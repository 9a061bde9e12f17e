//! src/services/folder_service.rs
//!
//! FolderService — the per-owner folder hierarchy and its safe structural
//! mutation: create/rename/move with sibling uniqueness and cycle
//! prevention, recursive statistics, and the best-effort recursive delete
//! cascade. Metadata lives in SQLite; permanently deleted files have their
//! remote blobs released through the relay.

use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    errors::{DriveError, DriveResult, is_unique_violation},
    models::folder::{CascadeStats, Folder, FolderContents, FolderScope},
    services::blob_relay::BlobRelay,
};

/// Characters that can never appear in a folder or file name.
pub(crate) const FORBIDDEN_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const FOLDER_NAME_MAX_LEN: usize = 100;

/// Defensive cap on parent-chain walks. A chain this deep means corrupted
/// data, not a legitimate tree.
pub(crate) const MAX_TREE_DEPTH: usize = 1000;

/// FolderService provides the folder half of the metadata engine:
/// - Create / rename / move with uniqueness and acyclicity enforced at
///   write time
/// - Listing with the three-state folder scope
/// - Recursive statistics over live files
/// - Best-effort recursive deletion (never all-or-nothing)
#[derive(Clone)]
pub struct FolderService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    relay: BlobRelay,
}

impl FolderService {
    pub fn new(db: Arc<SqlitePool>, relay: BlobRelay) -> Self {
        Self { db, relay }
    }

    /// Validate and normalize a folder name.
    ///
    /// Names are trimmed, 1-100 characters, and may not contain control
    /// characters or any of `< > : " / \ | ? *`. Unlike file names, an
    /// invalid folder name is rejected rather than rewritten.
    fn validate_name(name: &str) -> DriveResult<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DriveError::InvalidArgument("folder name is required".into()));
        }
        if trimmed.chars().count() > FOLDER_NAME_MAX_LEN {
            return Err(DriveError::InvalidArgument(format!(
                "folder name longer than {FOLDER_NAME_MAX_LEN} characters"
            )));
        }
        if trimmed
            .chars()
            .any(|c| c.is_control() || FORBIDDEN_NAME_CHARS.contains(&c))
        {
            return Err(DriveError::InvalidArgument(
                "folder name contains forbidden characters".into(),
            ));
        }
        Ok(trimmed.to_string())
    }

    /// Fetch a folder by id regardless of owner. Admin paths use this.
    pub async fn get(&self, folder_id: Uuid) -> DriveResult<Folder> {
        sqlx::query_as::<_, Folder>(
            "SELECT id, name, owner_id, parent_id, created_at FROM folders WHERE id = ?",
        )
        .bind(folder_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => DriveError::NotFound("folder".into()),
            other => other.into(),
        })
    }

    /// Fetch a folder and verify ownership in one query.
    ///
    /// "Not yours" and "doesn't exist" both come back as `NotFound` so the
    /// existence of other owners' folders never leaks.
    pub async fn get_owned(&self, owner_id: Uuid, folder_id: Uuid) -> DriveResult<Folder> {
        sqlx::query_as::<_, Folder>(
            "SELECT id, name, owner_id, parent_id, created_at
             FROM folders WHERE id = ? AND owner_id = ?",
        )
        .bind(folder_id)
        .bind(owner_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => DriveError::NotFound("folder".into()),
            other => other.into(),
        })
    }

    /// True if a sibling with this exact name (case-sensitive) already
    /// exists under `parent_id` for this owner.
    async fn sibling_name_taken(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        name: &str,
        exclude: Option<Uuid>,
    ) -> DriveResult<bool> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT EXISTS(SELECT 1 FROM folders WHERE owner_id = ",
        );
        builder.push_bind(owner_id);
        builder.push(" AND name = ");
        builder.push_bind(name);
        match parent_id {
            Some(parent) => {
                builder.push(" AND parent_id = ");
                builder.push_bind(parent);
            }
            None => {
                builder.push(" AND parent_id IS NULL");
            }
        }
        if let Some(id) = exclude {
            builder.push(" AND id != ");
            builder.push_bind(id);
        }
        builder.push(")");

        let taken: bool = builder.build_query_scalar().fetch_one(&*self.db).await?;
        Ok(taken)
    }

    /// Create a folder, optionally under a parent owned by the same owner.
    pub async fn create(
        &self,
        owner_id: Uuid,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> DriveResult<Folder> {
        let name = Self::validate_name(name)?;

        if let Some(parent) = parent_id {
            // NotFound also covers "owned by someone else".
            self.get_owned(owner_id, parent)
                .await
                .map_err(|err| match err {
                    DriveError::NotFound(_) => DriveError::NotFound("parent folder".into()),
                    other => other,
                })?;
        }

        if self
            .sibling_name_taken(owner_id, parent_id, &name, None)
            .await?
        {
            return Err(DriveError::Conflict(format!(
                "a folder named `{name}` already exists here"
            )));
        }

        let folder = Folder {
            id: Uuid::new_v4(),
            name,
            owner_id,
            parent_id,
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO folders (id, name, owner_id, parent_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(folder.id)
        .bind(&folder.name)
        .bind(folder.owner_id)
        .bind(folder.parent_id)
        .bind(folder.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(folder),
            // Two concurrent creates can both pass the check above; the
            // unique index is the final arbiter.
            Err(err) if is_unique_violation(&err) => Err(DriveError::Conflict(format!(
                "a folder named `{}` already exists here",
                folder.name
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Rename a folder in place, re-checking sibling uniqueness under the
    /// same parent.
    pub async fn rename(
        &self,
        owner_id: Uuid,
        folder_id: Uuid,
        new_name: &str,
    ) -> DriveResult<Folder> {
        let folder = self.get_owned(owner_id, folder_id).await?;
        let name = Self::validate_name(new_name)?;

        if self
            .sibling_name_taken(owner_id, folder.parent_id, &name, Some(folder_id))
            .await?
        {
            return Err(DriveError::Conflict(format!(
                "a folder named `{name}` already exists here"
            )));
        }

        match sqlx::query_as::<_, Folder>(
            "UPDATE folders SET name = ? WHERE id = ?
             RETURNING id, name, owner_id, parent_id, created_at",
        )
        .bind(&name)
        .bind(folder_id)
        .fetch_one(&*self.db)
        .await
        {
            Ok(updated) => Ok(updated),
            Err(err) if is_unique_violation(&err) => Err(DriveError::Conflict(format!(
                "a folder named `{name}` already exists here"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Re-parent a folder, validating ownership of the new parent, sibling
    /// uniqueness under it, and acyclicity of the resulting chain.
    pub async fn move_to(
        &self,
        owner_id: Uuid,
        folder_id: Uuid,
        new_parent: Option<Uuid>,
    ) -> DriveResult<Folder> {
        let folder = self.get_owned(owner_id, folder_id).await?;

        if let Some(parent) = new_parent {
            self.get_owned(owner_id, parent)
                .await
                .map_err(|err| match err {
                    DriveError::NotFound(_) => DriveError::NotFound("parent folder".into()),
                    other => other,
                })?;
            self.ensure_acyclic(folder_id, parent).await?;
        }

        if self
            .sibling_name_taken(owner_id, new_parent, &folder.name, Some(folder_id))
            .await?
        {
            return Err(DriveError::Conflict(format!(
                "a folder named `{}` already exists in the target folder",
                folder.name
            )));
        }

        match sqlx::query_as::<_, Folder>(
            "UPDATE folders SET parent_id = ? WHERE id = ?
             RETURNING id, name, owner_id, parent_id, created_at",
        )
        .bind(new_parent)
        .bind(folder_id)
        .fetch_one(&*self.db)
        .await
        {
            Ok(updated) => Ok(updated),
            Err(err) if is_unique_violation(&err) => Err(DriveError::Conflict(format!(
                "a folder named `{}` already exists in the target folder",
                folder.name
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Reject a parent assignment that would close a cycle.
    ///
    /// Walks upward from the proposed parent via `parent_id`, keeping a
    /// visited set seeded with the mutated folder and the proposed parent.
    /// Revisiting any id, or reaching the mutated folder itself, is a
    /// rejection. The walk is iterative with a hard depth cap: exceeding it
    /// means corrupted data and surfaces as `Internal`.
    pub async fn ensure_acyclic(&self, folder_id: Uuid, proposed_parent: Uuid) -> DriveResult<()> {
        if folder_id == proposed_parent {
            return Err(DriveError::InvalidArgument("circular reference".into()));
        }

        let mut visited: HashSet<Uuid> = HashSet::from([folder_id, proposed_parent]);
        let mut current = proposed_parent;
        for _ in 0..MAX_TREE_DEPTH {
            let next = sqlx::query_scalar::<_, Option<Uuid>>(
                "SELECT parent_id FROM folders WHERE id = ?",
            )
            .bind(current)
            .fetch_optional(&*self.db)
            .await?;

            match next {
                // Chain ended: either the root, or a dangling link that the
                // parent-existence validation catches separately.
                None | Some(None) => return Ok(()),
                Some(Some(parent)) => {
                    if parent == folder_id || !visited.insert(parent) {
                        return Err(DriveError::InvalidArgument("circular reference".into()));
                    }
                    current = parent;
                }
            }
        }

        Err(DriveError::Internal(format!(
            "parent chain exceeded {MAX_TREE_DEPTH} levels"
        )))
    }

    /// List folders for an owner, sorted by name ascending (case-sensitive).
    ///
    /// `FolderScope::Any` returns every folder the owner has, for
    /// caller-side tree assembly; `Root` returns root-level folders only;
    /// `In(id)` the direct children of one folder.
    pub async fn list_children(
        &self,
        owner_id: Uuid,
        scope: FolderScope,
    ) -> DriveResult<Vec<Folder>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, owner_id, parent_id, created_at FROM folders WHERE owner_id = ",
        );
        builder.push_bind(owner_id);
        match scope {
            FolderScope::Any => {}
            FolderScope::Root => {
                builder.push(" AND parent_id IS NULL");
            }
            FolderScope::In(parent) => {
                builder.push(" AND parent_id = ");
                builder.push_bind(parent);
            }
        }
        builder.push(" ORDER BY name ASC");

        Ok(builder.build_query_as().fetch_all(&*self.db).await?)
    }

    /// Reconstruct the `/`-joined path of a folder by walking to the root.
    pub async fn path(&self, folder_id: Uuid) -> DriveResult<String> {
        let mut segments: Vec<String> = Vec::new();
        let mut current = Some(folder_id);

        for _ in 0..=MAX_TREE_DEPTH {
            let Some(id) = current else {
                segments.reverse();
                return Ok(format!("/{}", segments.join("/")));
            };
            let row: Option<(String, Option<Uuid>)> =
                sqlx::query_as("SELECT name, parent_id FROM folders WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&*self.db)
                    .await?;
            match row {
                None if segments.is_empty() => return Err(DriveError::NotFound("folder".into())),
                // Dangling parent link: treat the last reachable folder as
                // a root rather than failing the whole request.
                None => {
                    segments.reverse();
                    return Ok(format!("/{}", segments.join("/")));
                }
                Some((name, parent)) => {
                    segments.push(name);
                    current = parent;
                }
            }
        }

        Err(DriveError::Internal(format!(
            "parent chain exceeded {MAX_TREE_DEPTH} levels"
        )))
    }

    /// Collect the ids of a folder and all its descendants, breadth-first.
    /// The returned order puts parents before their children.
    async fn collect_subtree(&self, root: Uuid) -> DriveResult<Vec<Uuid>> {
        let mut order = vec![root];
        let mut seen: HashSet<Uuid> = HashSet::from([root]);
        let mut queue: VecDeque<Uuid> = VecDeque::from([root]);

        while let Some(id) = queue.pop_front() {
            let children: Vec<Uuid> =
                sqlx::query_scalar("SELECT id FROM folders WHERE parent_id = ?")
                    .bind(id)
                    .fetch_all(&*self.db)
                    .await?;
            for child in children {
                if seen.insert(child) {
                    order.push(child);
                    queue.push_back(child);
                }
            }
        }

        Ok(order)
    }

    /// Recursive content statistics for a folder: descendant folders plus
    /// live files across the whole subtree. Display only, never used for
    /// enforcement.
    pub async fn count_contents(&self, folder_id: Uuid) -> DriveResult<FolderContents> {
        self.get(folder_id).await?;
        let subtree = self.collect_subtree(folder_id).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM files WHERE deleted_at IS NULL AND folder_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in &subtree {
            separated.push_bind(*id);
        }
        builder.push(")");
        let total_files: i64 = builder.build_query_scalar().fetch_one(&*self.db).await?;

        Ok(FolderContents {
            total_folders: subtree.len() as i64 - 1,
            total_files,
        })
    }

    /// Count direct live files and direct subfolders, for "must be empty"
    /// checks on non-recursive admin deletion.
    pub async fn direct_counts(&self, folder_id: Uuid) -> DriveResult<(i64, i64)> {
        let files: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM files WHERE folder_id = ? AND deleted_at IS NULL",
        )
        .bind(folder_id)
        .fetch_one(&*self.db)
        .await?;
        let folders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM folders WHERE parent_id = ?")
            .bind(folder_id)
            .fetch_one(&*self.db)
            .await?;
        Ok((files, folders))
    }

    /// Delete a folder and everything beneath it, depth-first.
    ///
    /// Children are processed before their parents. Every file directly in
    /// a processed folder is permanently deleted, live and soft-deleted
    /// alike, and its remote blob released best-effort. A failure in one
    /// subtree is recorded in the result and does not abort deletion of
    /// siblings or the parent: a large deletion should not be lost because
    /// one file's blob cleanup failed. Re-running against a partially
    /// deleted tree is safe because every step checks existence first.
    pub async fn delete_recursive(&self, folder_id: Uuid) -> DriveResult<CascadeStats> {
        self.get(folder_id).await?;
        let subtree = self.collect_subtree(folder_id).await?;

        let mut stats = CascadeStats::default();
        for &id in subtree.iter().rev() {
            match self.purge_folder_files(id).await {
                Ok((count, mut blob_errors)) => {
                    stats.files_deleted += count;
                    stats.errors.append(&mut blob_errors);
                }
                Err(err) => {
                    // Leave the folder row in place so a re-run can retry
                    // this subtree; keep going with its siblings.
                    stats
                        .errors
                        .push(format!("deleting files in folder {id}: {err}"));
                    continue;
                }
            }

            match sqlx::query("DELETE FROM folders WHERE id = ?")
                .bind(id)
                .execute(&*self.db)
                .await
            {
                Ok(result) => stats.folders_deleted += result.rows_affected() as i64,
                Err(err) => stats.errors.push(format!("deleting folder {id}: {err}")),
            }
        }

        Ok(stats)
    }

    /// Permanently delete every file directly inside one folder.
    ///
    /// Returns the number of rows removed plus messages for blob releases
    /// that failed; a failed release never blocks the metadata delete.
    async fn purge_folder_files(&self, folder_id: Uuid) -> DriveResult<(i64, Vec<String>)> {
        let rows: Vec<(Uuid, String, String)> =
            sqlx::query_as("SELECT id, name, blob_handle FROM files WHERE folder_id = ?")
                .bind(folder_id)
                .fetch_all(&*self.db)
                .await?;

        let mut errors = Vec::new();
        for (id, name, handle) in &rows {
            if let Err(err) = self.relay.delete(handle).await {
                warn!(file_id = %id, handle = %handle, error = %err, "blob release failed");
                errors.push(format!("releasing blob for `{name}`: {err}"));
            }
        }

        let result = sqlx::query("DELETE FROM files WHERE folder_id = ?")
            .bind(folder_id)
            .execute(&*self.db)
            .await?;

        Ok((result.rows_affected() as i64, errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::blob_relay::test_backend;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_db() -> Arc<SqlitePool> {
        let db = Arc::new(
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .unwrap(),
        );
        let sql = include_str!("../../migrations/0001_init.sql");
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&*db).await.unwrap();
        }
        db
    }

    fn offline_relay() -> BlobRelay {
        // Points at a closed port; fine for tests that never move bytes.
        BlobRelay::new("http://127.0.0.1:9", "unused").unwrap()
    }

    async fn setup() -> (FolderService, Uuid) {
        let db = setup_db().await;
        (FolderService::new(db, offline_relay()), Uuid::new_v4())
    }

    async fn insert_file(
        service: &FolderService,
        owner: Uuid,
        folder: Option<Uuid>,
        name: &str,
        handle: &str,
        deleted: bool,
    ) {
        let deleted_at = deleted.then(Utc::now);
        sqlx::query(
            "INSERT INTO files (id, name, size, mime_type, blob_handle, checksum, owner_id,
                                folder_id, deleted_at, created_at)
             VALUES (?, ?, 10, 'text/plain', ?, NULL, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(handle)
        .bind(owner)
        .bind(folder)
        .bind(deleted_at)
        .bind(Utc::now())
        .execute(&*service.db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn create_and_fetch_root_folder() {
        let (service, owner) = setup().await;
        let folder = service.create(owner, "Docs", None).await.unwrap();
        assert_eq!(folder.name, "Docs");
        assert_eq!(folder.parent_id, None);

        let fetched = service.get_owned(owner, folder.id).await.unwrap();
        assert_eq!(fetched.id, folder.id);
    }

    #[tokio::test]
    async fn sibling_names_conflict_case_sensitively() {
        let (service, owner) = setup().await;
        service.create(owner, "Docs", None).await.unwrap();

        let err = service.create(owner, "Docs", None).await.unwrap_err();
        assert!(matches!(err, DriveError::Conflict(_)));

        // Different case is a different name.
        service.create(owner, "docs", None).await.unwrap();
    }

    #[tokio::test]
    async fn same_name_allowed_under_different_parents() {
        let (service, owner) = setup().await;
        let a = service.create(owner, "A", None).await.unwrap();
        let b = service.create(owner, "B", None).await.unwrap();
        service.create(owner, "Shared", Some(a.id)).await.unwrap();
        service.create(owner, "Shared", Some(b.id)).await.unwrap();
    }

    #[tokio::test]
    async fn create_rejects_bad_names() {
        let (service, owner) = setup().await;
        for bad in ["", "   ", "a/b", "a\\b", "a?b", "a*b", "a:b", "a\u{7}b"] {
            let err = service.create(owner, bad, None).await.unwrap_err();
            assert!(matches!(err, DriveError::InvalidArgument(_)), "{bad:?}");
        }
        let err = service
            .create(owner, &"x".repeat(101), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::InvalidArgument(_)));
        // Exactly at the limit is fine.
        service.create(owner, &"x".repeat(100), None).await.unwrap();
    }

    #[tokio::test]
    async fn create_requires_owned_parent() {
        let (service, owner) = setup().await;
        let stranger = Uuid::new_v4();
        let foreign = service.create(stranger, "Theirs", None).await.unwrap();

        let err = service
            .create(owner, "Sub", Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));

        let err = service
            .create(owner, "Sub", Some(foreign.id))
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));
    }

    #[tokio::test]
    async fn rename_checks_uniqueness_under_same_parent() {
        let (service, owner) = setup().await;
        let a = service.create(owner, "A", None).await.unwrap();
        service.create(owner, "B", None).await.unwrap();

        let err = service.rename(owner, a.id, "B").await.unwrap_err();
        assert!(matches!(err, DriveError::Conflict(_)));

        let renamed = service.rename(owner, a.id, "C").await.unwrap();
        assert_eq!(renamed.name, "C");

        // Renaming to its own current name is not a conflict with itself.
        service.rename(owner, a.id, "C").await.unwrap();
    }

    #[tokio::test]
    async fn move_rejects_cycles() {
        let (service, owner) = setup().await;
        let a = service.create(owner, "A", None).await.unwrap();
        let b = service.create(owner, "B", Some(a.id)).await.unwrap();
        let c = service.create(owner, "C", Some(b.id)).await.unwrap();

        // Into itself.
        let err = service.move_to(owner, a.id, Some(a.id)).await.unwrap_err();
        assert!(matches!(err, DriveError::InvalidArgument(_)));

        // Under its own child and grandchild.
        for target in [b.id, c.id] {
            let err = service
                .move_to(owner, a.id, Some(target))
                .await
                .unwrap_err();
            assert!(
                matches!(&err, DriveError::InvalidArgument(msg) if msg == "circular reference"),
                "{err:?}"
            );
        }

        // A legitimate move still works: C to the root.
        let moved = service.move_to(owner, c.id, None).await.unwrap();
        assert_eq!(moved.parent_id, None);
    }

    #[tokio::test]
    async fn list_children_scopes() {
        let (service, owner) = setup().await;
        let a = service.create(owner, "b-root", None).await.unwrap();
        service.create(owner, "a-root", None).await.unwrap();
        service.create(owner, "Zchild", Some(a.id)).await.unwrap();

        let all = service.list_children(owner, FolderScope::Any).await.unwrap();
        assert_eq!(all.len(), 3);
        // Name ascending, case-sensitive: uppercase sorts before lowercase.
        let names: Vec<_> = all.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Zchild", "a-root", "b-root"]);

        let roots = service
            .list_children(owner, FolderScope::Root)
            .await
            .unwrap();
        assert_eq!(roots.len(), 2);

        let children = service
            .list_children(owner, FolderScope::In(a.id))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "Zchild");
    }

    #[tokio::test]
    async fn path_reconstruction_walks_to_root() {
        let (service, owner) = setup().await;
        let docs = service.create(owner, "Docs", None).await.unwrap();
        let year = service.create(owner, "2024", Some(docs.id)).await.unwrap();

        assert_eq!(service.path(docs.id).await.unwrap(), "/Docs");
        assert_eq!(service.path(year.id).await.unwrap(), "/Docs/2024");

        let err = service.path(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));
    }

    #[tokio::test]
    async fn count_contents_covers_subtree_live_files_only() {
        let (service, owner) = setup().await;
        let docs = service.create(owner, "Docs", None).await.unwrap();
        let year = service.create(owner, "2024", Some(docs.id)).await.unwrap();

        insert_file(&service, owner, Some(docs.id), "a.txt", "h-a", false).await;
        insert_file(&service, owner, Some(year.id), "b.txt", "h-b", false).await;
        insert_file(&service, owner, Some(year.id), "c.txt", "h-c", true).await;

        let contents = service.count_contents(docs.id).await.unwrap();
        assert_eq!(
            contents,
            FolderContents {
                total_folders: 1,
                total_files: 2
            }
        );

        let leaf = service.count_contents(year.id).await.unwrap();
        assert_eq!(leaf.total_folders, 0);
        assert_eq!(leaf.total_files, 1);
    }

    #[tokio::test]
    async fn delete_recursive_removes_nested_tree() {
        let backend = test_backend::spawn().await;
        let db = setup_db().await;
        let relay = BlobRelay::new(&backend.base_url, "token").unwrap();
        let service = FolderService::new(db, relay);
        let owner = Uuid::new_v4();

        let docs = service.create(owner, "Docs", None).await.unwrap();
        let year = service.create(owner, "2024", Some(docs.id)).await.unwrap();
        backend.insert("h-a", b"0123456789");
        insert_file(&service, owner, Some(year.id), "a.txt", "h-a", false).await;

        let stats = service.delete_recursive(docs.id).await.unwrap();
        assert_eq!(stats.folders_deleted, 2);
        assert_eq!(stats.files_deleted, 1);
        assert!(stats.errors.is_empty());

        assert!(matches!(
            service.get(docs.id).await.unwrap_err(),
            DriveError::NotFound(_)
        ));
        assert!(matches!(
            service.get(year.id).await.unwrap_err(),
            DriveError::NotFound(_)
        ));
        // Remote blob released too.
        assert!(!backend.contains("h-a"));
    }

    #[tokio::test]
    async fn delete_recursive_counts_soft_deleted_files() {
        let backend = test_backend::spawn().await;
        let db = setup_db().await;
        let relay = BlobRelay::new(&backend.base_url, "token").unwrap();
        let service = FolderService::new(db, relay);
        let owner = Uuid::new_v4();

        let folder = service.create(owner, "Mixed", None).await.unwrap();
        backend.insert("h-live", b"live");
        backend.insert("h-dead", b"dead");
        insert_file(&service, owner, Some(folder.id), "live.txt", "h-live", false).await;
        insert_file(&service, owner, Some(folder.id), "dead.txt", "h-dead", true).await;

        let stats = service.delete_recursive(folder.id).await.unwrap();
        assert_eq!(stats.folders_deleted, 1);
        assert_eq!(stats.files_deleted, 2);
    }

    #[tokio::test]
    async fn delete_recursive_records_blob_failures_and_continues() {
        // Relay pointed at a dead port: every blob release fails, but the
        // metadata cascade still completes.
        let (service, owner) = setup().await;
        let folder = service.create(owner, "Docs", None).await.unwrap();
        insert_file(&service, owner, Some(folder.id), "a.txt", "h-a", false).await;

        let stats = service.delete_recursive(folder.id).await.unwrap();
        assert_eq!(stats.folders_deleted, 1);
        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("a.txt"));
    }

    #[tokio::test]
    async fn delete_recursive_missing_folder_is_not_found() {
        let (service, _) = setup().await;
        let err = service.delete_recursive(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));
    }
}
