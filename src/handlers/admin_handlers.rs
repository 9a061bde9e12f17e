//! HTTP handlers for admin bulk operations, listings and analytics.
//! Every route here checks the admin role off the identity gate before
//! touching a service; none of them re-derives identity.

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    errors::AppError,
    handlers::identity::Identity,
    services::{
        AppState,
        admin_service::{AdminListQuery, FileSortField, FolderSortField, SortOrder},
    },
};

#[derive(Debug, Deserialize)]
pub struct BulkFilesReq {
    pub file_ids: Vec<Uuid>,
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkRestoreReq {
    pub file_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BulkFoldersReq {
    pub folder_ids: Vec<Uuid>,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Deserialize)]
pub struct AccountDeletionReq {
    pub email: String,
    pub code: String,
}

/// Shared query-string shape for both admin listings. `sort_by`
/// deserializes into the closed sort-field enum, so unknown fields are a
/// 400, never a query fragment.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "S: Deserialize<'de> + Default"))]
pub struct AdminListParams<S> {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: S,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub include_deleted: bool,
}

impl<S> AdminListParams<S> {
    fn into_query(self) -> AdminListQuery<S> {
        AdminListQuery {
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(20),
            search: self.search,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
            include_deleted: self.include_deleted,
        }
    }
}

/// `POST /admin/files/bulk-delete`
pub async fn bulk_delete_files(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<BulkFilesReq>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;
    let result = state
        .admin
        .bulk_delete_files(&req.file_ids, req.permanent)
        .await?;
    Ok(Json(result))
}

/// `POST /admin/files/bulk-restore`
pub async fn bulk_restore_files(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<BulkRestoreReq>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;
    let result = state.admin.bulk_restore_files(&req.file_ids).await?;
    Ok(Json(result))
}

/// `POST /admin/folders/bulk-delete`
pub async fn bulk_delete_folders(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<BulkFoldersReq>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;
    let stats = state
        .admin
        .bulk_delete_folders(&req.folder_ids, req.recursive)
        .await?;
    Ok(Json(stats))
}

/// `GET /admin/files`
pub async fn list_files(
    State(state): State<AppState>,
    identity: Identity,
    Query(params): Query<AdminListParams<FileSortField>>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;
    let page = state.admin.list_files(params.into_query()).await?;
    Ok(Json(page))
}

/// `GET /admin/folders`
pub async fn list_folders(
    State(state): State<AppState>,
    identity: Identity,
    Query(params): Query<AdminListParams<FolderSortField>>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;
    let page = state.admin.list_folders(params.into_query()).await?;
    Ok(Json(page))
}

/// `GET /admin/analytics/storage`
pub async fn storage_analytics(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;
    let usage = state.admin.storage_analytics().await?;
    Ok(Json(usage))
}

/// `GET /admin/owners/{id}` — owner row with its cached counters.
pub async fn get_owner(
    State(state): State<AppState>,
    identity: Identity,
    Path(owner_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;
    let owner = state.admin.get_owner(owner_id).await?;
    Ok(Json(owner))
}

/// `POST /admin/owners/{id}/resync` — recompute cached usage counters.
pub async fn resync_owner(
    State(state): State<AppState>,
    identity: Identity,
    Path(owner_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;
    let usage = state.admin.resync_owner_stats(owner_id).await?;
    Ok(Json(usage))
}

/// `DELETE /admin/owners/{id}` — the atomic account-deletion cascade,
/// gated by a verification code issued out of band.
pub async fn delete_account(
    State(state): State<AppState>,
    identity: Identity,
    Path(owner_id): Path<Uuid>,
    Json(req): Json<AccountDeletionReq>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_admin()?;
    let result = state
        .admin
        .account_deletion_cascade(owner_id, &req.email, &req.code)
        .await?;
    Ok(Json(result))
}
