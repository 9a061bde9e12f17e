//! src/services/admin_service.rs
//!
//! AdminService — cross-owner, bulk-scale operations built strictly on top
//! of the folder and file stores. Bulk mutations are best-effort and report
//! counts plus per-item errors; the account-deletion cascade is the one
//! deliberate exception and runs atomically inside a single transaction.
//! Role enforcement happens at the identity gate, never here.

use chrono::Utc;
use serde::Deserialize;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    errors::{DriveError, DriveResult, is_unique_violation},
    models::{
        file::StoredFile,
        folder::{CascadeStats, Folder},
        owner::{Owner, OwnerRole},
        page::{Page, Pagination},
        verification::VerificationCode,
    },
    services::{
        blob_relay::BlobRelay, file_service::FileService, file_service::MAX_PAGE_SIZE,
        folder_service::FolderService,
    },
};

/// Sortable columns for the admin file listing. A closed set: client input
/// deserializes into this enum or the request fails, so arbitrary filter
/// keys never reach the query layer.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileSortField {
    Name,
    Size,
    #[default]
    CreatedAt,
}

impl FileSortField {
    fn column(self) -> &'static str {
        match self {
            FileSortField::Name => "f.name",
            FileSortField::Size => "f.size",
            FileSortField::CreatedAt => "f.created_at",
        }
    }
}

/// Sortable columns for the admin folder listing.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FolderSortField {
    Name,
    #[default]
    CreatedAt,
}

impl FolderSortField {
    fn column(self) -> &'static str {
        match self {
            FolderSortField::Name => "f.name",
            FolderSortField::CreatedAt => "f.created_at",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Listing parameters shared by both admin listings.
#[derive(Clone, Debug)]
pub struct AdminListQuery<S> {
    pub page: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub sort_by: S,
    pub sort_order: SortOrder,
    pub include_deleted: bool,
}

/// Admin file row: the file plus its owner's role and active flag.
#[derive(sqlx::FromRow, serde::Serialize, Clone, Debug)]
pub struct AdminFileRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub file: StoredFile,
    pub owner_role: Option<OwnerRole>,
    pub owner_active: Option<bool>,
}

/// Admin folder row: the folder plus its owner's role and active flag.
#[derive(sqlx::FromRow, serde::Serialize, Clone, Debug)]
pub struct AdminFolderRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub folder: Folder,
    pub owner_role: Option<OwnerRole>,
    pub owner_active: Option<bool>,
}

/// Count-plus-errors result of a bulk file mutation.
#[derive(serde::Serialize, Clone, Debug, Default)]
pub struct BulkFileResult {
    pub modified: i64,
    pub errors: Vec<String>,
}

/// Result of the atomic account-deletion cascade.
#[derive(serde::Serialize, Clone, Debug)]
pub struct AccountDeletionResult {
    pub files_deleted: i64,
    pub folders_deleted: i64,
}

/// Per-MIME-type usage over live files.
#[derive(sqlx::FromRow, serde::Serialize, Clone, Debug)]
pub struct TypeUsage {
    pub mime_type: String,
    pub file_count: i64,
    pub total_bytes: i64,
}

#[derive(Clone)]
pub struct AdminService {
    pub db: Arc<SqlitePool>,
    folders: FolderService,
    files: FileService,
    relay: BlobRelay,
}

impl AdminService {
    pub fn new(
        db: Arc<SqlitePool>,
        folders: FolderService,
        files: FileService,
        relay: BlobRelay,
    ) -> Self {
        Self {
            db,
            folders,
            files,
            relay,
        }
    }

    /// Soft-delete (or, with `permanent`, hard-delete) a batch of files.
    ///
    /// Soft deletion only touches live rows. Permanent deletion removes
    /// rows in any state and releases their blobs best-effort; a failed
    /// release is recorded but never blocks the metadata delete.
    pub async fn bulk_delete_files(
        &self,
        file_ids: &[Uuid],
        permanent: bool,
    ) -> DriveResult<BulkFileResult> {
        if file_ids.is_empty() {
            return Ok(BulkFileResult::default());
        }

        if !permanent {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE files SET deleted_at = ");
            builder.push_bind(Utc::now());
            builder.push(" WHERE deleted_at IS NULL AND id IN (");
            let mut separated = builder.separated(", ");
            for id in file_ids {
                separated.push_bind(*id);
            }
            builder.push(")");
            let result = builder.build().execute(&*self.db).await?;
            return Ok(BulkFileResult {
                modified: result.rows_affected() as i64,
                errors: Vec::new(),
            });
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, size, mime_type, blob_handle, checksum, owner_id, folder_id,
                    deleted_at, created_at
             FROM files WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in file_ids {
            separated.push_bind(*id);
        }
        builder.push(")");
        let rows: Vec<StoredFile> = builder.build_query_as().fetch_all(&*self.db).await?;
        if rows.is_empty() {
            return Ok(BulkFileResult::default());
        }

        let mut errors = Vec::new();
        for file in &rows {
            if let Err(err) = self.relay.delete(&file.blob_handle).await {
                warn!(file_id = %file.id, handle = %file.blob_handle, error = %err, "blob release failed");
                errors.push(format!("releasing blob for `{}`: {err}", file.name));
            }
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM files WHERE id IN (");
        let mut separated = builder.separated(", ");
        for file in &rows {
            separated.push_bind(file.id);
        }
        builder.push(")");
        let result = builder.build().execute(&*self.db).await?;

        Ok(BulkFileResult {
            modified: result.rows_affected() as i64,
            errors,
        })
    }

    /// Restore a batch of soft-deleted files. Live ids are silently
    /// skipped; a restore blocked by a live name squatting the slot is
    /// recorded as an error and the rest of the batch continues.
    pub async fn bulk_restore_files(&self, file_ids: &[Uuid]) -> DriveResult<BulkFileResult> {
        let mut outcome = BulkFileResult::default();
        for &id in file_ids {
            match sqlx::query(
                "UPDATE files SET deleted_at = NULL WHERE id = ? AND deleted_at IS NOT NULL",
            )
            .bind(id)
            .execute(&*self.db)
            .await
            {
                Ok(result) => outcome.modified += result.rows_affected() as i64,
                Err(err) if is_unique_violation(&err) => {
                    outcome
                        .errors
                        .push(format!("restoring file {id}: name already in use"));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(outcome)
    }

    /// Delete a batch of folders.
    ///
    /// With `recursive`, each folder goes through the best-effort cascade
    /// and the stats are summed across the batch. Without it, only empty
    /// folders (no live files, no subfolders) are deleted; the rest are
    /// skipped with a recorded error, never force-deleted.
    pub async fn bulk_delete_folders(
        &self,
        folder_ids: &[Uuid],
        recursive: bool,
    ) -> DriveResult<CascadeStats> {
        let mut stats = CascadeStats::default();
        for &id in folder_ids {
            if recursive {
                match self.folders.delete_recursive(id).await {
                    Ok(result) => stats.absorb(result),
                    Err(err) => stats.errors.push(format!("folder {id}: {err}")),
                }
                continue;
            }

            match self.folders.direct_counts(id).await {
                Ok((0, 0)) => {
                    let result = sqlx::query("DELETE FROM folders WHERE id = ?")
                        .bind(id)
                        .execute(&*self.db)
                        .await?;
                    if result.rows_affected() == 0 {
                        stats.errors.push(format!("folder {id}: folder not found"));
                    } else {
                        stats.folders_deleted += 1;
                    }
                }
                Ok((files, folders)) => {
                    stats.errors.push(format!(
                        "folder {id}: not empty ({files} files, {folders} subfolders)"
                    ));
                }
                Err(err) => stats.errors.push(format!("folder {id}: {err}")),
            }
        }
        Ok(stats)
    }

    /// Close an account: delete its files, folders and the owner row in one
    /// transaction, gated by a valid verification code that is consumed in
    /// the same transaction.
    ///
    /// Unlike the folder cascade this is all-or-nothing: account closure
    /// must not half-complete. Remote blob handles are released only after
    /// the commit, best-effort, since the backend cannot participate in
    /// the transaction.
    pub async fn account_deletion_cascade(
        &self,
        owner_id: Uuid,
        email: &str,
        code: &str,
    ) -> DriveResult<AccountDeletionResult> {
        let mut tx = self.db.begin().await?;

        let row: Option<VerificationCode> = sqlx::query_as(
            "SELECT id, email, code, kind, expires_at, used
             FROM verification_codes
             WHERE email = ? AND code = ? AND kind = 'account_deletion'
             ORDER BY expires_at DESC LIMIT 1",
        )
        .bind(email)
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;

        let verification = match row {
            Some(v) if v.is_valid(Utc::now()) => v,
            _ => {
                return Err(DriveError::InvalidArgument(
                    "invalid or expired verification code".into(),
                ));
            }
        };

        sqlx::query("UPDATE verification_codes SET used = 1 WHERE id = ?")
            .bind(verification.id)
            .execute(&mut *tx)
            .await?;

        let handles: Vec<String> =
            sqlx::query_scalar("SELECT blob_handle FROM files WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_all(&mut *tx)
                .await?;

        let files = sqlx::query("DELETE FROM files WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        let folders = sqlx::query("DELETE FROM folders WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        let owner = sqlx::query("DELETE FROM owners WHERE id = ?")
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if owner.rows_affected() == 0 {
            // Dropping the transaction rolls everything back.
            return Err(DriveError::NotFound("owner".into()));
        }

        tx.commit().await?;

        for handle in &handles {
            if let Err(err) = self.relay.delete(handle).await {
                warn!(handle = %handle, error = %err, "blob release failed after account deletion");
            }
        }

        Ok(AccountDeletionResult {
            files_deleted: files.rows_affected() as i64,
            folders_deleted: folders.rows_affected() as i64,
        })
    }

    /// Paginated admin listing of files with their owner joined in.
    pub async fn list_files(
        &self,
        query: AdminListQuery<FileSortField>,
    ) -> DriveResult<Page<AdminFileRow>> {
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

        let push_filter = |builder: &mut QueryBuilder<'_, Sqlite>| {
            builder.push(" WHERE 1 = 1");
            if !query.include_deleted {
                builder.push(" AND f.deleted_at IS NULL");
            }
            if let Some(search) = &query.search {
                builder.push(" AND LOWER(f.name) LIKE ");
                builder.push_bind(format!("%{}%", search.to_lowercase()));
            }
        };

        let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM files f");
        push_filter(&mut count_builder);
        let total_items: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&*self.db)
            .await?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT f.id, f.name, f.size, f.mime_type, f.blob_handle, f.checksum, f.owner_id,
                    f.folder_id, f.deleted_at, f.created_at,
                    o.role AS owner_role, o.is_active AS owner_active
             FROM files f LEFT JOIN owners o ON o.id = f.owner_id",
        );
        push_filter(&mut builder);
        builder.push(format!(
            " ORDER BY {} {} LIMIT ",
            query.sort_by.column(),
            query.sort_order.keyword()
        ));
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind((page - 1) * limit);

        let items: Vec<AdminFileRow> = builder.build_query_as().fetch_all(&*self.db).await?;

        Ok(Page {
            items,
            pagination: Pagination::new(page, limit, total_items),
        })
    }

    /// Paginated admin listing of folders, same shape as the file listing.
    pub async fn list_folders(
        &self,
        query: AdminListQuery<FolderSortField>,
    ) -> DriveResult<Page<AdminFolderRow>> {
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

        let push_filter = |builder: &mut QueryBuilder<'_, Sqlite>| {
            builder.push(" WHERE 1 = 1");
            if let Some(search) = &query.search {
                builder.push(" AND LOWER(f.name) LIKE ");
                builder.push_bind(format!("%{}%", search.to_lowercase()));
            }
        };

        let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM folders f");
        push_filter(&mut count_builder);
        let total_items: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&*self.db)
            .await?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT f.id, f.name, f.owner_id, f.parent_id, f.created_at,
                    o.role AS owner_role, o.is_active AS owner_active
             FROM folders f LEFT JOIN owners o ON o.id = f.owner_id",
        );
        push_filter(&mut builder);
        builder.push(format!(
            " ORDER BY {} {} LIMIT ",
            query.sort_by.column(),
            query.sort_order.keyword()
        ));
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind((page - 1) * limit);

        let items: Vec<AdminFolderRow> = builder.build_query_as().fetch_all(&*self.db).await?;

        Ok(Page {
            items,
            pagination: Pagination::new(page, limit, total_items),
        })
    }

    /// Fetch one owner row, cached counters included.
    pub async fn get_owner(&self, owner_id: Uuid) -> DriveResult<Owner> {
        sqlx::query_as::<_, Owner>(
            "SELECT id, role, is_active, total_files_uploaded, total_storage_used, created_at
             FROM owners WHERE id = ?",
        )
        .bind(owner_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => DriveError::NotFound("owner".into()),
            other => other.into(),
        })
    }

    /// Per-MIME-type storage distribution over live files, largest first.
    pub async fn storage_analytics(&self) -> DriveResult<Vec<TypeUsage>> {
        sqlx::query_as::<_, TypeUsage>(
            "SELECT mime_type, COUNT(*) AS file_count, COALESCE(SUM(size), 0) AS total_bytes
             FROM files WHERE deleted_at IS NULL
             GROUP BY mime_type ORDER BY total_bytes DESC",
        )
        .fetch_all(&*self.db)
        .await
        .map_err(Into::into)
    }

    /// Recompute one owner's cached usage counters.
    pub async fn resync_owner_stats(
        &self,
        owner_id: Uuid,
    ) -> DriveResult<crate::models::file::StorageUsage> {
        self.files.resync_owner_stats(owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::folder::FolderScope;
    use crate::services::{
        blob_relay::test_backend,
        file_service::CreateFileInput,
    };
    use bytes::Bytes;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    struct Fixture {
        backend: test_backend::StubBackend,
        folders: FolderService,
        files: FileService,
        admin: AdminService,
    }

    async fn setup() -> Fixture {
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

        let backend = test_backend::spawn().await;
        let relay = BlobRelay::new(&backend.base_url, "token").unwrap();
        let folders = FolderService::new(db.clone(), relay.clone());
        let files = FileService::new(db.clone(), relay.clone());
        let admin = AdminService::new(db, folders.clone(), files.clone(), relay);
        Fixture {
            backend,
            folders,
            files,
            admin,
        }
    }

    async fn insert_owner(admin: &AdminService, role: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO owners (id, role, is_active, total_files_uploaded, total_storage_used, created_at)
             VALUES (?, ?, 1, 0, 0, ?)",
        )
        .bind(id)
        .bind(role)
        .bind(Utc::now())
        .execute(&*admin.db)
        .await
        .unwrap();
        id
    }

    async fn upload(fx: &Fixture, owner: Uuid, name: &str, bytes: &[u8]) -> StoredFile {
        fx.files
            .create(
                owner,
                CreateFileInput {
                    folder_id: None,
                    name: name.into(),
                    mime_type: "text/plain".into(),
                    bytes: Bytes::copy_from_slice(bytes),
                },
            )
            .await
            .unwrap()
    }

    async fn insert_code(admin: &AdminService, email: &str, code: &str, expires_in: Duration, used: bool) {
        sqlx::query(
            "INSERT INTO verification_codes (id, email, code, kind, expires_at, used)
             VALUES (?, ?, ?, 'account_deletion', ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(code)
        .bind(Utc::now() + expires_in)
        .bind(used)
        .execute(&*admin.db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn bulk_soft_delete_touches_live_rows_only() {
        let fx = setup().await;
        let owner = Uuid::new_v4();
        let a = upload(&fx, owner, "a.txt", b"1").await;
        let b = upload(&fx, owner, "b.txt", b"2").await;
        fx.files.soft_delete(owner, b.id).await.unwrap();

        let result = fx
            .admin
            .bulk_delete_files(&[a.id, b.id], false)
            .await
            .unwrap();
        assert_eq!(result.modified, 1);
        assert!(result.errors.is_empty());

        // Re-running finds nothing live.
        let result = fx
            .admin
            .bulk_delete_files(&[a.id, b.id], false)
            .await
            .unwrap();
        assert_eq!(result.modified, 0);
    }

    #[tokio::test]
    async fn bulk_permanent_delete_removes_rows_and_blobs() {
        let fx = setup().await;
        let owner = Uuid::new_v4();
        let a = upload(&fx, owner, "a.txt", b"1").await;
        let b = upload(&fx, owner, "b.txt", b"2").await;
        fx.files.soft_delete(owner, b.id).await.unwrap();

        let result = fx
            .admin
            .bulk_delete_files(&[a.id, b.id], true)
            .await
            .unwrap();
        assert_eq!(result.modified, 2);
        assert!(result.errors.is_empty());
        assert!(!fx.backend.contains(&a.blob_handle));
        assert!(!fx.backend.contains(&b.blob_handle));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&*fx.admin.db)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn bulk_restore_skips_live_rows() {
        let fx = setup().await;
        let owner = Uuid::new_v4();
        let a = upload(&fx, owner, "a.txt", b"1").await;
        let b = upload(&fx, owner, "b.txt", b"2").await;
        fx.files.soft_delete(owner, b.id).await.unwrap();

        let result = fx.admin.bulk_restore_files(&[a.id, b.id]).await.unwrap();
        assert_eq!(result.modified, 1);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn bulk_restore_records_name_conflicts() {
        let fx = setup().await;
        let owner = Uuid::new_v4();
        let old = upload(&fx, owner, "report.txt", b"old").await;
        fx.files.soft_delete(owner, old.id).await.unwrap();
        // Same name re-uploaded while the old one is deleted.
        upload(&fx, owner, "report.txt", b"new").await;

        let result = fx.admin.bulk_restore_files(&[old.id]).await.unwrap();
        assert_eq!(result.modified, 0);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn bulk_folder_delete_non_recursive_skips_non_empty() {
        let fx = setup().await;
        let owner = Uuid::new_v4();
        let empty = fx.folders.create(owner, "Empty", None).await.unwrap();
        let full = fx.folders.create(owner, "Full", None).await.unwrap();
        fx.folders.create(owner, "Sub", Some(full.id)).await.unwrap();

        let stats = fx
            .admin
            .bulk_delete_folders(&[empty.id, full.id], false)
            .await
            .unwrap();
        assert_eq!(stats.folders_deleted, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("not empty"));

        // The non-empty folder survived.
        fx.folders.get(full.id).await.unwrap();
    }

    #[tokio::test]
    async fn bulk_folder_delete_recursive_sums_stats() {
        let fx = setup().await;
        let owner = Uuid::new_v4();
        let a = fx.folders.create(owner, "A", None).await.unwrap();
        fx.folders.create(owner, "A1", Some(a.id)).await.unwrap();
        let b = fx.folders.create(owner, "B", None).await.unwrap();

        let stats = fx
            .admin
            .bulk_delete_folders(&[a.id, b.id, Uuid::new_v4()], true)
            .await
            .unwrap();
        assert_eq!(stats.folders_deleted, 3);
        // The unknown id is recorded, not fatal.
        assert_eq!(stats.errors.len(), 1);
    }

    #[tokio::test]
    async fn account_cascade_deletes_everything_atomically() {
        let fx = setup().await;
        let owner = insert_owner(&fx.admin, "user").await;
        let folder = fx.folders.create(owner, "Docs", None).await.unwrap();
        let file = upload(&fx, owner, "a.txt", b"bytes").await;
        insert_code(&fx.admin, "o@example.com", "123456", Duration::minutes(10), false).await;

        let result = fx
            .admin
            .account_deletion_cascade(owner, "o@example.com", "123456")
            .await
            .unwrap();
        assert_eq!(result.files_deleted, 1);
        assert_eq!(result.folders_deleted, 1);

        let owners: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM owners WHERE id = ?")
            .bind(owner)
            .fetch_one(&*fx.admin.db)
            .await
            .unwrap();
        assert_eq!(owners, 0);
        assert!(matches!(
            fx.folders.get(folder.id).await.unwrap_err(),
            DriveError::NotFound(_)
        ));
        assert!(!fx.backend.contains(&file.blob_handle));

        // The code is spent: a second run is rejected.
        let err = fx
            .admin
            .account_deletion_cascade(owner, "o@example.com", "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn account_cascade_rejects_bad_codes_without_side_effects() {
        let fx = setup().await;
        let owner = insert_owner(&fx.admin, "user").await;
        upload(&fx, owner, "a.txt", b"bytes").await;
        insert_code(&fx.admin, "o@example.com", "expired", Duration::minutes(-5), false).await;
        insert_code(&fx.admin, "o@example.com", "spent", Duration::minutes(10), true).await;

        for code in ["wrong", "expired", "spent"] {
            let err = fx
                .admin
                .account_deletion_cascade(owner, "o@example.com", code)
                .await
                .unwrap_err();
            assert!(matches!(err, DriveError::InvalidArgument(_)), "{code}");
        }

        let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&*fx.admin.db)
            .await
            .unwrap();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn account_cascade_rolls_back_when_owner_row_is_missing() {
        let fx = setup().await;
        // Files exist but no owner row: the cascade must abort whole.
        let owner = Uuid::new_v4();
        upload(&fx, owner, "a.txt", b"bytes").await;
        insert_code(&fx.admin, "o@example.com", "123456", Duration::minutes(10), false).await;

        let err = fx
            .admin
            .account_deletion_cascade(owner, "o@example.com", "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));

        // Rolled back: the file row is still there and the code unspent.
        let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&*fx.admin.db)
            .await
            .unwrap();
        assert_eq!(files, 1);
        let used: bool = sqlx::query_scalar("SELECT used FROM verification_codes LIMIT 1")
            .fetch_one(&*fx.admin.db)
            .await
            .unwrap();
        assert!(!used);
    }

    #[tokio::test]
    async fn admin_file_listing_joins_owner_and_paginates() {
        let fx = setup().await;
        let owner = insert_owner(&fx.admin, "admin").await;
        let a = upload(&fx, owner, "a.txt", b"aa").await;
        let b = upload(&fx, owner, "b.txt", b"b").await;
        fx.files.soft_delete(owner, b.id).await.unwrap();

        let query = AdminListQuery {
            page: 1,
            limit: 10,
            search: None,
            sort_by: FileSortField::Name,
            sort_order: SortOrder::Asc,
            include_deleted: false,
        };
        let page = fx.admin.list_files(query.clone()).await.unwrap();
        assert_eq!(page.pagination.total_items, 1);
        assert_eq!(page.items[0].file.id, a.id);
        assert_eq!(page.items[0].owner_role, Some(OwnerRole::Admin));
        assert_eq!(page.items[0].owner_active, Some(true));

        let all = fx
            .admin
            .list_files(AdminListQuery {
                include_deleted: true,
                ..query
            })
            .await
            .unwrap();
        assert_eq!(all.pagination.total_items, 2);

        // Size descending puts the two-byte file first.
        let by_size = fx
            .admin
            .list_files(AdminListQuery {
                page: 1,
                limit: 10,
                search: None,
                sort_by: FileSortField::Size,
                sort_order: SortOrder::Desc,
                include_deleted: true,
            })
            .await
            .unwrap();
        assert_eq!(by_size.items[0].file.id, a.id);
    }

    #[tokio::test]
    async fn admin_folder_listing_searches_case_insensitively() {
        let fx = setup().await;
        let owner = insert_owner(&fx.admin, "user").await;
        fx.folders.create(owner, "Projects", None).await.unwrap();
        fx.folders.create(owner, "Archive", None).await.unwrap();

        let page = fx
            .admin
            .list_folders(AdminListQuery {
                page: 1,
                limit: 10,
                search: Some("PROJ".into()),
                sort_by: FolderSortField::Name,
                sort_order: SortOrder::Asc,
                include_deleted: false,
            })
            .await
            .unwrap();
        assert_eq!(page.pagination.total_items, 1);
        assert_eq!(page.items[0].folder.name, "Projects");
    }

    #[tokio::test]
    async fn get_owner_decodes_role_and_counters() {
        let fx = setup().await;
        let owner = insert_owner(&fx.admin, "admin").await;
        upload(&fx, owner, "a.txt", b"12345").await;
        fx.admin.resync_owner_stats(owner).await.unwrap();

        let row = fx.admin.get_owner(owner).await.unwrap();
        assert_eq!(row.role, OwnerRole::Admin);
        assert!(row.is_active);
        assert_eq!(row.total_files_uploaded, 1);
        assert_eq!(row.total_storage_used, 5);

        let err = fx.admin.get_owner(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));
    }

    #[tokio::test]
    async fn storage_analytics_groups_by_mime_type() {
        let fx = setup().await;
        let owner = Uuid::new_v4();
        upload(&fx, owner, "a.txt", b"12345").await;
        upload(&fx, owner, "b.txt", b"123").await;
        let pdf = fx
            .files
            .create(
                owner,
                CreateFileInput {
                    folder_id: None,
                    name: "c.pdf".into(),
                    mime_type: "application/pdf".into(),
                    bytes: Bytes::from_static(b"x"),
                },
            )
            .await
            .unwrap();
        fx.files.soft_delete(owner, pdf.id).await.unwrap();

        let usage = fx.admin.storage_analytics().await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].mime_type, "text/plain");
        assert_eq!(usage[0].file_count, 2);
        assert_eq!(usage[0].total_bytes, 8);
    }

    #[tokio::test]
    async fn listings_share_the_folder_scope_behavior() {
        // Sanity check that the admin layer composes with the user-facing
        // stores rather than reimplementing their filters.
        let fx = setup().await;
        let owner = Uuid::new_v4();
        let folder = fx.folders.create(owner, "Docs", None).await.unwrap();
        fx.files
            .create(
                owner,
                CreateFileInput {
                    folder_id: Some(folder.id),
                    name: "a.txt".into(),
                    mime_type: "text/plain".into(),
                    bytes: Bytes::from_static(b"x"),
                },
            )
            .await
            .unwrap();

        let in_folder = fx
            .files
            .find_by_owner(
                owner,
                crate::services::file_service::FileQuery {
                    scope: FolderScope::In(folder.id),
                    search: None,
                    page: 1,
                    limit: 10,
                },
            )
            .await
            .unwrap();
        assert_eq!(in_folder.pagination.total_items, 1);
    }
}
