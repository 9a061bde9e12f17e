//! HTTP handlers for folder operations.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    errors::AppError,
    handlers::{double_option, identity::Identity, parse_scope},
    models::folder::Folder,
    services::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateFolderReq {
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFolderReq {
    pub name: Option<String>,
    /// Absent = leave in place, `null` = move to root, id = move there.
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct ListFoldersQuery {
    /// Absent = every folder (tree assembly), `root` = root level only,
    /// otherwise a parent folder id.
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FolderDetail {
    #[serde(flatten)]
    pub folder: Folder,
    pub path: String,
}

/// `POST /folders`
pub async fn create_folder(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CreateFolderReq>,
) -> Result<impl IntoResponse, AppError> {
    let folder = state
        .folders
        .create(identity.owner_id, &req.name, req.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

/// `GET /folders` — list with the three-state parent scope.
pub async fn list_folders(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ListFoldersQuery>,
) -> Result<Json<Vec<Folder>>, AppError> {
    let scope = parse_scope(query.parent_id.as_deref())?;
    let folders = state.folders.list_children(identity.owner_id, scope).await?;
    Ok(Json(folders))
}

/// `GET /folders/{id}` — folder plus its reconstructed path.
pub async fn get_folder(
    State(state): State<AppState>,
    identity: Identity,
    Path(folder_id): Path<Uuid>,
) -> Result<Json<FolderDetail>, AppError> {
    let folder = state.folders.get_owned(identity.owner_id, folder_id).await?;
    let path = state.folders.path(folder_id).await?;
    Ok(Json(FolderDetail { folder, path }))
}

/// `PATCH /folders/{id}` — rename and/or move.
pub async fn update_folder(
    State(state): State<AppState>,
    identity: Identity,
    Path(folder_id): Path<Uuid>,
    Json(req): Json<UpdateFolderReq>,
) -> Result<Json<Folder>, AppError> {
    let mut folder = state.folders.get_owned(identity.owner_id, folder_id).await?;
    if let Some(parent) = req.parent_id {
        folder = state
            .folders
            .move_to(identity.owner_id, folder_id, parent)
            .await?;
    }
    if let Some(name) = req.name {
        folder = state
            .folders
            .rename(identity.owner_id, folder_id, &name)
            .await?;
    }
    Ok(Json(folder))
}

/// `DELETE /folders/{id}` — best-effort recursive cascade.
pub async fn delete_folder(
    State(state): State<AppState>,
    identity: Identity,
    Path(folder_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.folders.get_owned(identity.owner_id, folder_id).await?;
    let stats = state.folders.delete_recursive(folder_id).await?;
    Ok(Json(stats))
}

/// `GET /folders/{id}/stats` — recursive contents badge.
pub async fn folder_stats(
    State(state): State<AppState>,
    identity: Identity,
    Path(folder_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.folders.get_owned(identity.owner_id, folder_id).await?;
    let contents = state.folders.count_contents(folder_id).await?;
    Ok(Json(contents))
}
