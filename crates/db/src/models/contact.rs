//! Contact directory models.
//!
//! Maps to `email_contacts`, `email_groups` and `email_group_members`.
//! The dispatch engine only ever reads these.

use clinic_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `email_contacts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Contact {
    pub id: DbId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub subscribed: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `email_groups` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ContactGroup {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
