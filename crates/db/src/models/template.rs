//! Stored email template model.

use clinic_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `email_templates` table. Unique per `(slug, locale)`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmailTemplate {
    pub id: DbId,
    pub slug: String,
    pub locale: String,
    pub subject: String,
    pub html_body: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
