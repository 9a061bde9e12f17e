//! Defines routes for all drive operations.
//!
//! ## Structure
//! - **Folder endpoints**
//!   - `POST   /folders` — create folder
//!   - `GET    /folders` — list (absent `parent_id` = all, `root` = root level)
//!   - `GET    /folders/{id}` — folder with reconstructed path
//!   - `PATCH  /folders/{id}` — rename / move
//!   - `DELETE /folders/{id}` — recursive best-effort cascade
//!   - `GET    /folders/{id}/stats` — recursive content counts
//!
//! - **File endpoints**
//!   - `POST   /files` — multipart upload
//!   - `GET    /files` — paginated listing with search
//!   - `GET    /files/usage` — storage usage
//!   - `POST   /files/archive` — streamed zip bundle
//!   - `GET    /files/{id}` / `PATCH` / `DELETE` — metadata, update, soft delete
//!   - `GET    /files/{id}/content` — streamed download with range support
//!   - `POST   /files/{id}/restore` — undo a soft delete
//!
//! - **Admin endpoints** (admin role required)
//!   - bulk delete/restore, listings, analytics, owner resync, account deletion
//!
//! Every route except the health probes goes through the identity gate
//! extractor.

use crate::{
    handlers::{
        admin_handlers,
        file_handlers::{
            delete_file, download_archive, download_file, get_file, list_files, restore_file,
            storage_usage, update_file, upload_file,
        },
        folder_handlers::{
            create_folder, delete_folder, folder_stats, get_folder, list_folders, update_folder,
        },
        health_handlers::{healthz, readyz},
    },
    services::AppState,
    services::file_service::MAX_FILE_SIZE,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Slack on top of the file size ceiling for multipart framing overhead.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Build and return the router for all drive routes.
///
/// The router carries shared state (`AppState`) to all handlers. The body
/// limit is sized so a maximal file upload still fits through multipart.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Folder routes
        .route("/folders", post(create_folder).get(list_folders))
        .route(
            "/folders/{id}",
            get(get_folder).patch(update_folder).delete(delete_folder),
        )
        .route("/folders/{id}/stats", get(folder_stats))
        // File routes
        .route("/files", post(upload_file).get(list_files))
        .route("/files/usage", get(storage_usage))
        .route("/files/archive", post(download_archive))
        .route(
            "/files/{id}",
            get(get_file).patch(update_file).delete(delete_file),
        )
        .route("/files/{id}/content", get(download_file))
        .route("/files/{id}/restore", post(restore_file))
        // Admin routes
        .route("/admin/files", get(admin_handlers::list_files))
        .route(
            "/admin/files/bulk-delete",
            post(admin_handlers::bulk_delete_files),
        )
        .route(
            "/admin/files/bulk-restore",
            post(admin_handlers::bulk_restore_files),
        )
        .route("/admin/folders", get(admin_handlers::list_folders))
        .route(
            "/admin/folders/bulk-delete",
            post(admin_handlers::bulk_delete_folders),
        )
        .route(
            "/admin/analytics/storage",
            get(admin_handlers::storage_analytics),
        )
        .route(
            "/admin/owners/{id}/resync",
            post(admin_handlers::resync_owner),
        )
        .route(
            "/admin/owners/{id}",
            get(admin_handlers::get_owner).delete(admin_handlers::delete_account),
        )
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE as usize + BODY_LIMIT_SLACK))
}
