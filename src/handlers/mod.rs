//! HTTP handlers. Thin glue: parse the request, call the service, shape
//! the response. All policy lives in the services.

pub mod admin_handlers;
pub mod file_handlers;
pub mod folder_handlers;
pub mod health_handlers;
pub mod identity;

use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::{errors::DriveError, models::folder::FolderScope};

/// Parse an optional folder/parent query parameter into a scope.
///
/// Absent means "everything" (tree assembly / All Files), the literal
/// `root` means the root level only, anything else must be a folder id.
/// The omitted-vs-root distinction is intentional and load-bearing.
pub(crate) fn parse_scope(param: Option<&str>) -> Result<FolderScope, DriveError> {
    match param {
        None => Ok(FolderScope::Any),
        Some("root") => Ok(FolderScope::Root),
        Some(raw) => Uuid::parse_str(raw)
            .map(FolderScope::In)
            .map_err(|_| DriveError::InvalidArgument(format!("`{raw}` is not a folder id"))),
    }
}

/// Deserialize a field where "absent", "null" and "value" are three
/// different things: `None` = leave unchanged, `Some(None)` = clear,
/// `Some(Some(v))` = set. Pair with `#[serde(default)]`.
pub(crate) fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}
