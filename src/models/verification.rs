//! One-shot verification codes gating destructive account operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single-use code mailed to an owner before account deletion.
///
/// A code is valid iff it has not been used and has not expired. Codes are
/// consumed inside the same transaction as the cascade they authorize.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct VerificationCode {
    pub id: Uuid,

    /// Address the code was sent to.
    pub email: String,

    /// The code itself, compared verbatim.
    pub code: String,

    /// What the code authorizes, e.g. `account_deletion`.
    pub kind: String,

    pub expires_at: DateTime<Utc>,

    pub used: bool,
}

impl VerificationCode {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}
