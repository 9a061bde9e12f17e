//! HTTP handlers for file upload, download, listing and lifecycle.
//! Download and archive responses stream; nothing buffers a whole payload
//! beyond the upload path, which is bounded by the per-file size ceiling.

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    errors::{AppError, DriveError},
    handlers::{double_option, identity::Identity, parse_scope},
    models::file::{StorageUsage, StoredFile, format_size},
    services::{AppState, file_service::CreateFileInput, file_service::FileQuery},
};

/// A file as returned to clients: the record plus a display-ready size.
#[derive(Debug, Serialize)]
pub struct FileResponse {
    #[serde(flatten)]
    pub file: StoredFile,
    pub size_display: String,
}

impl From<StoredFile> for FileResponse {
    fn from(file: StoredFile) -> Self {
        let size_display = format_size(file.size);
        Self { file, size_display }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    /// Absent = all folders ("All Files"), `root` = root level only,
    /// otherwise a folder id.
    pub folder_id: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFileReq {
    pub name: Option<String>,
    /// Absent = leave in place, `null` = move to root, id = move there.
    #[serde(default, deserialize_with = "double_option")]
    pub folder_id: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveReq {
    pub file_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    #[serde(flatten)]
    pub usage: StorageUsage,
    pub used_display: String,
}

/// `POST /files` — multipart upload: an optional `folder_id` text field
/// plus the `file` part carrying name, content type and bytes.
pub async fn upload_file(
    State(state): State<AppState>,
    identity: Identity,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut folder_id = None;
    let mut payload: Option<(String, String, bytes::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?
    {
        match field.name() {
            Some("folder_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
                if !text.is_empty() {
                    let id = Uuid::parse_str(&text).map_err(|_| {
                        AppError::from(DriveError::InvalidArgument(format!(
                            "`{text}` is not a folder id"
                        )))
                    })?;
                    folder_id = Some(id);
                }
            }
            Some("file") => {
                let name = field.file_name().unwrap_or("file").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string()))?;
                payload = Some((name, mime_type, bytes));
            }
            _ => {}
        }
    }

    let (name, mime_type, bytes) = payload
        .ok_or_else(|| AppError::from(DriveError::InvalidArgument("missing file field".into())))?;

    let file = state
        .files
        .create(
            identity.owner_id,
            CreateFileInput {
                folder_id,
                name,
                mime_type,
                bytes,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(FileResponse::from(file))))
}

/// `GET /files` — paginated, searchable listing.
pub async fn list_files(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ListFilesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let scope = parse_scope(query.folder_id.as_deref())?;
    let page = state
        .files
        .find_by_owner(
            identity.owner_id,
            FileQuery {
                scope,
                search: query.search,
                page: query.page.unwrap_or(1),
                limit: query.limit.unwrap_or(20),
            },
        )
        .await?;

    let items: Vec<FileResponse> = page.items.into_iter().map(FileResponse::from).collect();
    Ok(Json(serde_json::json!({
        "items": items,
        "pagination": page.pagination,
    })))
}

/// `GET /files/usage` — live storage usage for the caller.
pub async fn storage_usage(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<UsageResponse>, AppError> {
    let usage = state.files.storage_usage(identity.owner_id).await?;
    let used_display = format_size(usage.used_bytes);
    Ok(Json(UsageResponse {
        usage,
        used_display,
    }))
}

/// `GET /files/{id}` — metadata only.
pub async fn get_file(
    State(state): State<AppState>,
    identity: Identity,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileResponse>, AppError> {
    let file = state.files.get_owned(identity.owner_id, file_id).await?;
    Ok(Json(FileResponse::from(file)))
}

/// `GET /files/{id}/content` — stream the payload, honoring a single
/// `Range: bytes=start-end` request with a 206 and `Content-Range`.
pub async fn download_file(
    State(state): State<AppState>,
    identity: Identity,
    Path(file_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_range_header);

    let (file, download) = state
        .files
        .download(identity.owner_id, file_id, range)
        .await?;

    let mut response = Response::new(Body::from_stream(download.stream));
    let total = download.total_size;
    match download.range {
        Some((start, end)) => {
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            insert_header(
                response.headers_mut(),
                header::CONTENT_RANGE,
                &format!("bytes {start}-{end}/{total}"),
            );
            insert_header(
                response.headers_mut(),
                header::CONTENT_LENGTH,
                &(end - start + 1).to_string(),
            );
        }
        None => {
            *response.status_mut() = StatusCode::OK;
            insert_header(
                response.headers_mut(),
                header::CONTENT_LENGTH,
                &total.to_string(),
            );
        }
    }
    insert_header(response.headers_mut(), header::CONTENT_TYPE, &file.mime_type);
    insert_header(response.headers_mut(), header::ACCEPT_RANGES, "bytes");
    insert_header(
        response.headers_mut(),
        header::CONTENT_DISPOSITION,
        &format!("attachment; filename=\"{}\"", file.name.replace('"', "")),
    );

    Ok(response)
}

/// `POST /files/archive` — bundle the given files into a streamed zip.
pub async fn download_archive(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<ArchiveReq>,
) -> Result<Response, AppError> {
    let reader = state.files.archive(identity.owner_id, &req.file_ids).await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
    insert_header(
        response.headers_mut(),
        header::CONTENT_TYPE,
        "application/zip",
    );
    insert_header(
        response.headers_mut(),
        header::CONTENT_DISPOSITION,
        "attachment; filename=\"files.zip\"",
    );
    Ok(response)
}

/// `PATCH /files/{id}` — rename and/or move.
pub async fn update_file(
    State(state): State<AppState>,
    identity: Identity,
    Path(file_id): Path<Uuid>,
    Json(req): Json<UpdateFileReq>,
) -> Result<Json<FileResponse>, AppError> {
    let file = state
        .files
        .update(identity.owner_id, file_id, req.name, req.folder_id)
        .await?;
    Ok(Json(FileResponse::from(file)))
}

/// `DELETE /files/{id}` — soft delete. Idempotent: deleting an
/// already-deleted file answers 200 with the unchanged record.
pub async fn delete_file(
    State(state): State<AppState>,
    identity: Identity,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileResponse>, AppError> {
    let file = state.files.soft_delete(identity.owner_id, file_id).await?;
    Ok(Json(FileResponse::from(file)))
}

/// `POST /files/{id}/restore`
pub async fn restore_file(
    State(state): State<AppState>,
    identity: Identity,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileResponse>, AppError> {
    let file = state.files.restore(identity.owner_id, file_id).await?;
    Ok(Json(FileResponse::from(file)))
}

fn insert_header(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Parse a single `bytes=start-end` / `bytes=start-` range. Anything the
/// parser does not understand falls back to serving the whole file.
fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = end.trim();
    if end.is_empty() {
        Some((start, None))
    } else {
        Some((start, Some(end.parse().ok()?)))
    }
}
