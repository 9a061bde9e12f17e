//! Core services: folder hierarchy, file lifecycle, blob relay and admin
//! aggregation. Each service is a cheap-to-clone handle around the shared
//! SQLite pool (and, where byte transfer is involved, the blob relay).

pub mod admin_service;
pub mod blob_relay;
pub mod file_service;
pub mod folder_service;

use std::sync::Arc;

use sqlx::SqlitePool;

use self::{
    admin_service::AdminService, blob_relay::BlobRelay, file_service::FileService,
    folder_service::FolderService,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub folders: FolderService,
    pub files: FileService,
    pub admin: AdminService,
    pub relay: BlobRelay,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, relay: BlobRelay) -> Self {
        let folders = FolderService::new(db.clone(), relay.clone());
        let files = FileService::new(db.clone(), relay.clone());
        let admin = AdminService::new(db, folders.clone(), files.clone(), relay.clone());
        Self {
            folders,
            files,
            admin,
            relay,
        }
    }
}
