//! Core data models for the cloud-drive metadata store.
//!
//! These entities represent the logical structure of the per-owner drive:
//! folders, file records bound to remote blob handles, and the owner rows
//! they hang off. They map cleanly to database tables via `sqlx::FromRow`
//! and serialize naturally as JSON via `serde`.

pub mod file;
pub mod folder;
pub mod owner;
pub mod page;
pub mod verification;
