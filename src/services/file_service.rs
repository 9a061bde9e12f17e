//! src/services/file_service.rs
//!
//! FileService — file metadata lifecycle bound to the remote blob backend.
//! A row is only ever inserted after its payload has been confirmed by the
//! relay, so there is no such thing as a metadata record without bytes
//! behind it. Listings paginate with exact totals; storage accounting is a
//! single aggregate pass over live files.

use bytes::Bytes;
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tokio::io::DuplexStream;
use tracing::warn;
use uuid::Uuid;

use crate::{
    errors::{DriveError, DriveResult, is_unique_violation},
    models::{
        file::{StorageUsage, StoredFile},
        folder::FolderScope,
        page::{Page, Pagination},
    },
    services::{
        blob_relay::{ArchiveEntry, BlobDownload, BlobRelay, MAX_ARCHIVE_ENTRIES},
        folder_service::FORBIDDEN_NAME_CHARS,
    },
};

/// Per-file size ceiling, matching the remote store's own per-object limit.
pub const MAX_FILE_SIZE: i64 = 50 * 1024 * 1024;

const FILE_NAME_MAX_LEN: usize = 255;

/// Page size ceiling shared with the admin listings.
pub const MAX_PAGE_SIZE: i64 = 100;

/// MIME prefixes accepted without listing every subtype.
const ALLOWED_MIME_PREFIXES: [&str; 4] = ["image/", "video/", "audio/", "text/"];

/// Application subtypes accepted in addition to the prefixes above.
const ALLOWED_MIME_TYPES: [&str; 12] = [
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/x-tar",
    "application/json",
    "application/xml",
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/octet-stream",
];

/// Extensions accepted on upload. Executables and scripts are blocked by
/// not appearing here.
const ALLOWED_EXTENSIONS: [&str; 39] = [
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "ico", "heic", "mp4", "mov", "avi", "mkv", "webm",
    "mp3", "wav", "ogg", "flac", "m4a", "pdf", "txt", "md", "rtf", "csv", "log", "doc", "docx",
    "xls", "xlsx", "ppt", "pptx", "odt", "ods", "zip", "tar", "gz", "bin", "json", "xml", "yaml",
];

/// Input for creating a new file.
pub struct CreateFileInput {
    pub folder_id: Option<Uuid>,
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Listing parameters for [`FileService::find_by_owner`].
#[derive(Clone, Debug)]
pub struct FileQuery {
    /// `Any` = "All Files" view, `Root` = root-level only, `In(id)` = one
    /// folder. Mirrors the folder listing scope.
    pub scope: FolderScope,
    /// Case-insensitive substring match on the file name.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: i64,
    pub limit: i64,
}

/// FileService provides the file half of the metadata engine:
/// - Create bound to a confirmed blob upload
/// - Soft delete / restore
/// - Rename/move with the same duplicate-name resolution as upload
/// - Paginated, searchable listing with exact totals
/// - Storage accounting and the owner-counter resync
#[derive(Clone)]
pub struct FileService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    relay: BlobRelay,
}

impl FileService {
    pub fn new(db: Arc<SqlitePool>, relay: BlobRelay) -> Self {
        Self { db, relay }
    }

    /// Fetch a file and verify ownership in one query. Soft-deleted rows
    /// are returned too; callers that only want live files check
    /// [`StoredFile::is_live`].
    pub async fn get_owned(&self, owner_id: Uuid, file_id: Uuid) -> DriveResult<StoredFile> {
        sqlx::query_as::<_, StoredFile>(
            "SELECT id, name, size, mime_type, blob_handle, checksum, owner_id, folder_id,
                    deleted_at, created_at
             FROM files WHERE id = ? AND owner_id = ?",
        )
        .bind(file_id)
        .bind(owner_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => DriveError::NotFound("file".into()),
            other => other.into(),
        })
    }

    /// True if a live file with this exact name exists at the location.
    async fn live_name_taken(
        &self,
        owner_id: Uuid,
        folder_id: Option<Uuid>,
        name: &str,
        exclude: Option<Uuid>,
    ) -> DriveResult<bool> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT EXISTS(SELECT 1 FROM files WHERE deleted_at IS NULL AND owner_id = ",
        );
        builder.push_bind(owner_id);
        builder.push(" AND name = ");
        builder.push_bind(name);
        match folder_id {
            Some(folder) => {
                builder.push(" AND folder_id = ");
                builder.push_bind(folder);
            }
            None => {
                builder.push(" AND folder_id IS NULL");
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

    async fn ensure_owned_folder(&self, owner_id: Uuid, folder_id: Uuid) -> DriveResult<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM folders WHERE id = ? AND owner_id = ?)",
        )
        .bind(folder_id)
        .bind(owner_id)
        .fetch_one(&*self.db)
        .await?;
        if exists {
            Ok(())
        } else {
            Err(DriveError::NotFound("folder".into()))
        }
    }

    /// Upload a file: validate, resolve name collisions, push bytes through
    /// the relay, then insert the metadata row.
    ///
    /// Steps run strictly in order; a relay failure aborts with no row
    /// created. A name collision with a live file never fails the upload;
    /// the name is deterministically rewritten instead. Two racing uploads
    /// can both pass the collision check; the partial unique index is the
    /// final arbiter and the loser surfaces as `Conflict`.
    pub async fn create(&self, owner_id: Uuid, input: CreateFileInput) -> DriveResult<StoredFile> {
        if let Some(folder) = input.folder_id {
            self.ensure_owned_folder(owner_id, folder).await?;
        }

        let size = input.bytes.len() as i64;
        if size == 0 {
            return Err(DriveError::InvalidArgument("file is empty".into()));
        }
        if size > MAX_FILE_SIZE {
            return Err(DriveError::PayloadTooLarge {
                size,
                limit: MAX_FILE_SIZE,
            });
        }

        let mut name = sanitize_file_name(&input.name);
        validate_mime_syntax(&input.mime_type)?;
        ensure_allowed_type(&name, &input.mime_type)?;

        if self
            .live_name_taken(owner_id, input.folder_id, &name, None)
            .await?
        {
            name = dedup_name(&name, Utc::now().timestamp_millis());
        }

        let checksum = format!("{:x}", md5::compute(&input.bytes));
        let blob_handle = self
            .relay
            .store(input.bytes, &name, &input.mime_type)
            .await?;

        let file = StoredFile {
            id: Uuid::new_v4(),
            name,
            size,
            mime_type: input.mime_type,
            blob_handle,
            checksum: Some(checksum),
            owner_id,
            folder_id: input.folder_id,
            deleted_at: None,
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO files (id, name, size, mime_type, blob_handle, checksum, owner_id,
                                folder_id, deleted_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)",
        )
        .bind(file.id)
        .bind(&file.name)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(&file.blob_handle)
        .bind(&file.checksum)
        .bind(file.owner_id)
        .bind(file.folder_id)
        .bind(file.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(file),
            Err(err) if is_unique_violation(&err) => {
                // Lost the race after the bytes were already stored; release
                // the orphaned blob before reporting the conflict.
                if let Err(release) = self.relay.delete(&file.blob_handle).await {
                    warn!(handle = %file.blob_handle, error = %release, "orphaned blob release failed");
                }
                Err(DriveError::Conflict(format!(
                    "a file named `{}` already exists here",
                    file.name
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Mark a file soft-deleted. Idempotent: deleting an already-deleted
    /// file returns it unchanged rather than erroring.
    pub async fn soft_delete(&self, owner_id: Uuid, file_id: Uuid) -> DriveResult<StoredFile> {
        let file = self.get_owned(owner_id, file_id).await?;
        if file.deleted_at.is_some() {
            return Ok(file);
        }

        sqlx::query_as::<_, StoredFile>(
            "UPDATE files SET deleted_at = ? WHERE id = ?
             RETURNING id, name, size, mime_type, blob_handle, checksum, owner_id, folder_id,
                       deleted_at, created_at",
        )
        .bind(Utc::now())
        .bind(file_id)
        .fetch_one(&*self.db)
        .await
        .map_err(Into::into)
    }

    /// Bring a soft-deleted file back. The row must currently be deleted;
    /// if its name was reused by a live file in the meantime, the unique
    /// index rejects the restore as a conflict.
    pub async fn restore(&self, owner_id: Uuid, file_id: Uuid) -> DriveResult<StoredFile> {
        let file = self.get_owned(owner_id, file_id).await?;
        if file.deleted_at.is_none() {
            return Err(DriveError::InvalidArgument("file is not deleted".into()));
        }

        match sqlx::query_as::<_, StoredFile>(
            "UPDATE files SET deleted_at = NULL WHERE id = ?
             RETURNING id, name, size, mime_type, blob_handle, checksum, owner_id, folder_id,
                       deleted_at, created_at",
        )
        .bind(file_id)
        .fetch_one(&*self.db)
        .await
        {
            Ok(restored) => Ok(restored),
            Err(err) if is_unique_violation(&err) => Err(DriveError::Conflict(format!(
                "a live file named `{}` now occupies this name",
                file.name
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Rename a file and/or move it to another folder.
    ///
    /// `new_folder` uses the double-option convention: `None` leaves the
    /// folder untouched, `Some(None)` moves to the root, `Some(Some(id))`
    /// into a folder. Live-name collisions at the target are resolved the
    /// same way as on upload.
    pub async fn update(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        new_name: Option<String>,
        new_folder: Option<Option<Uuid>>,
    ) -> DriveResult<StoredFile> {
        let file = self.get_owned(owner_id, file_id).await?;

        if let Some(Some(folder)) = new_folder {
            self.ensure_owned_folder(owner_id, folder).await?;
        }

        let target_folder = new_folder.unwrap_or(file.folder_id);
        let mut target_name = match new_name {
            Some(raw) => sanitize_file_name(&raw),
            None => file.name.clone(),
        };
        ensure_allowed_type(&target_name, &file.mime_type)?;

        if file.is_live()
            && self
                .live_name_taken(owner_id, target_folder, &target_name, Some(file_id))
                .await?
        {
            target_name = dedup_name(&target_name, Utc::now().timestamp_millis());
        }

        match sqlx::query_as::<_, StoredFile>(
            "UPDATE files SET name = ?, folder_id = ? WHERE id = ?
             RETURNING id, name, size, mime_type, blob_handle, checksum, owner_id, folder_id,
                       deleted_at, created_at",
        )
        .bind(&target_name)
        .bind(target_folder)
        .bind(file_id)
        .fetch_one(&*self.db)
        .await
        {
            Ok(updated) => Ok(updated),
            Err(err) if is_unique_violation(&err) => Err(DriveError::Conflict(format!(
                "a file named `{target_name}` already exists here"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Append the shared WHERE clause for a listing filter.
    fn push_filter(
        builder: &mut QueryBuilder<'_, Sqlite>,
        owner_id: Uuid,
        query: &FileQuery,
    ) {
        builder.push(" WHERE deleted_at IS NULL AND owner_id = ");
        builder.push_bind(owner_id);
        match query.scope {
            FolderScope::Any => {}
            FolderScope::Root => {
                builder.push(" AND folder_id IS NULL");
            }
            FolderScope::In(folder) => {
                builder.push(" AND folder_id = ");
                builder.push_bind(folder);
            }
        }
        if let Some(search) = &query.search {
            builder.push(" AND LOWER(name) LIKE ");
            builder.push_bind(format!("%{}%", escape_like(&search.to_lowercase())));
            builder.push(" ESCAPE '\\'");
        }
    }

    /// Paginated, searchable listing of an owner's live files, newest
    /// first.
    ///
    /// Runs two queries over the identical filter, one page slice and one
    /// count, so the pagination metadata is exact rather than estimated.
    pub async fn find_by_owner(
        &self,
        owner_id: Uuid,
        query: FileQuery,
    ) -> DriveResult<Page<StoredFile>> {
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

        let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM files");
        Self::push_filter(&mut count_builder, owner_id, &query);
        let total_items: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&*self.db)
            .await?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, size, mime_type, blob_handle, checksum, owner_id, folder_id,
                    deleted_at, created_at
             FROM files",
        );
        Self::push_filter(&mut builder, owner_id, &query);
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind((page - 1) * limit);

        let items: Vec<StoredFile> = builder.build_query_as().fetch_all(&*self.db).await?;

        Ok(Page {
            items,
            pagination: Pagination::new(page, limit, total_items),
        })
    }

    /// Aggregate usage over live files in a single pass.
    pub async fn storage_usage(&self, owner_id: Uuid) -> DriveResult<StorageUsage> {
        let (file_count, used_bytes): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(size), 0)
             FROM files WHERE owner_id = ? AND deleted_at IS NULL",
        )
        .bind(owner_id)
        .fetch_one(&*self.db)
        .await?;
        Ok(StorageUsage {
            used_bytes,
            file_count,
        })
    }

    /// Recompute the owner row's cached usage counters from the file table.
    ///
    /// Idempotent; any caller suspicious of the cached values may invoke
    /// it. This is the only way the counters move; nothing maintains them
    /// inline with uploads or deletes.
    pub async fn resync_owner_stats(&self, owner_id: Uuid) -> DriveResult<StorageUsage> {
        let usage = self.storage_usage(owner_id).await?;
        let result = sqlx::query(
            "UPDATE owners SET total_files_uploaded = ?, total_storage_used = ? WHERE id = ?",
        )
        .bind(usage.file_count)
        .bind(usage.used_bytes)
        .bind(owner_id)
        .execute(&*self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DriveError::NotFound("owner".into()));
        }
        Ok(usage)
    }

    /// Open a download stream for a live file the caller owns.
    ///
    /// `range` is `(start, end?)` inclusive; an open end resolves to the
    /// last byte of the file. Remote unavailability surfaces as
    /// `ServiceUnavailable`, distinct from `NotFound`, so clients know a
    /// retry can help.
    pub async fn download(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        range: Option<(u64, Option<u64>)>,
    ) -> DriveResult<(StoredFile, BlobDownload)> {
        let file = self.get_owned(owner_id, file_id).await?;
        if !file.is_live() {
            return Err(DriveError::NotFound("file".into()));
        }

        let resolved = match range {
            None => None,
            Some((start, end)) => {
                let last = file.size.max(1) as u64 - 1;
                if start > last {
                    return Err(DriveError::InvalidArgument(
                        "requested range not satisfiable".into(),
                    ));
                }
                Some((start, end.unwrap_or(last)))
            }
        };

        let download = self.relay.fetch_stream(&file.blob_handle, resolved).await?;
        Ok((file, download))
    }

    /// Bundle several of the caller's live files into a zip stream.
    ///
    /// Ids are resolved to handles up front: an unknown or foreign id
    /// fails the whole request before any byte moves. Per-entry fetch
    /// failures during streaming are tolerated by the relay instead.
    pub async fn archive(&self, owner_id: Uuid, file_ids: &[Uuid]) -> DriveResult<DuplexStream> {
        if file_ids.len() > MAX_ARCHIVE_ENTRIES {
            return Err(DriveError::InvalidArgument(format!(
                "archive limited to {MAX_ARCHIVE_ENTRIES} entries, got {}",
                file_ids.len()
            )));
        }

        let mut entries = Vec::with_capacity(file_ids.len());
        for &id in file_ids {
            let file = self.get_owned(owner_id, id).await?;
            if !file.is_live() {
                return Err(DriveError::NotFound("file".into()));
            }
            entries.push(ArchiveEntry {
                handle: file.blob_handle,
                display_name: file.name,
            });
        }

        self.relay.build_archive(entries)
    }
}

/// Deterministically rewrite a raw file name into a safe one.
///
/// Forbidden and control characters become underscores; the result is
/// trimmed, capped at 255 characters and never empty. Rewriting instead of
/// rejecting keeps uploads flowing while stripping anything path-like.
pub(crate) fn sanitize_file_name(raw: &str) -> String {
    let name: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || FORBIDDEN_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .take(FILE_NAME_MAX_LEN)
        .collect();
    if name.is_empty() { "file".into() } else { name }
}

/// Append `_{millis}` before the extension: `report.pdf` ->
/// `report_1700000000000.pdf`.
fn dedup_name(name: &str, millis: i64) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{stem}_{millis}.{ext}")
        }
        _ => format!("{name}_{millis}"),
    }
}

fn extension_of(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

/// Syntactic `type/subtype` check, before the allow-list is consulted.
fn validate_mime_syntax(mime: &str) -> DriveResult<()> {
    let is_token = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&^_.+-".contains(c))
    };
    match mime.split_once('/') {
        Some((ty, sub)) if is_token(ty) && is_token(sub) => Ok(()),
        _ => Err(DriveError::InvalidArgument(format!(
            "`{mime}` is not a valid content type"
        ))),
    }
}

/// Allow-list check over both the declared MIME type and the filename
/// extension. Extension comparison is case-insensitive.
fn ensure_allowed_type(name: &str, mime: &str) -> DriveResult<()> {
    let mime_lc = mime.to_ascii_lowercase();
    let mime_ok = ALLOWED_MIME_PREFIXES
        .iter()
        .any(|prefix| mime_lc.starts_with(prefix))
        || ALLOWED_MIME_TYPES.contains(&mime_lc.as_str());
    if !mime_ok {
        return Err(DriveError::UnsupportedMediaType(mime.to_string()));
    }

    if let Some(ext) = extension_of(name) {
        if !ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return Err(DriveError::UnsupportedMediaType(ext.to_string()));
        }
    }

    Ok(())
}

/// Escape LIKE wildcards in a user-supplied search term.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
