//! Identity gate boundary.
//!
//! Authentication happens in an upstream proxy; by the time a request
//! reaches this service it carries a verified owner id and role in trusted
//! headers. The core never re-derives identity, it only reads what the
//! gate attached. Absent or garbled headers are `Unauthenticated`; admin
//! routes additionally require the admin role.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{
    errors::{AppError, DriveError},
    models::owner::OwnerRole,
};

/// Header carrying the verified owner id.
pub const OWNER_ID_HEADER: &str = "x-owner-id";

/// Header carrying the verified role (`user` or `admin`).
pub const OWNER_ROLE_HEADER: &str = "x-owner-role";

/// The authenticated caller, as vouched for by the identity gate.
#[derive(Clone, Copy, Debug)]
pub struct Identity {
    pub owner_id: Uuid,
    pub role: OwnerRole,
}

impl Identity {
    /// Gate for admin-only routes.
    pub fn require_admin(&self) -> Result<(), AppError> {
        match self.role {
            OwnerRole::Admin => Ok(()),
            OwnerRole::User => Err(DriveError::Unauthorized.into()),
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner_id = parts
            .headers
            .get(OWNER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or(AppError::from(DriveError::Unauthenticated))?;

        let role = match parts
            .headers
            .get(OWNER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            Some(value) if value == OwnerRole::Admin.as_str() => OwnerRole::Admin,
            Some(value) if value == OwnerRole::User.as_str() => OwnerRole::User,
            _ => return Err(DriveError::Unauthenticated.into()),
        };

        Ok(Identity { owner_id, role })
    }
}
