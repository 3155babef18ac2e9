//! Repository for the `email_templates` table.

use sqlx::PgPool;

use crate::models::template::EmailTemplate;

/// Column list for `email_templates` queries.
const COLUMNS: &str = "id, slug, locale, subject, html_body, created_at, updated_at";

/// Provides template lookups.
pub struct TemplateRepo;

impl TemplateRepo {
    /// Find the template for an exact `(slug, locale)` pair.
    pub async fn find(
        pool: &PgPool,
        slug: &str,
        locale: &str,
    ) -> Result<Option<EmailTemplate>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM email_templates WHERE slug = $1 AND locale = $2");
        sqlx::query_as::<_, EmailTemplate>(&query)
            .bind(slug)
            .bind(locale)
            .fetch_optional(pool)
            .await
    }

    /// Find any locale variant of a slug, oldest first.
    pub async fn find_any_locale(
        pool: &PgPool,
        slug: &str,
    ) -> Result<Option<EmailTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM email_templates WHERE slug = $1 ORDER BY id LIMIT 1"
        );
        sqlx::query_as::<_, EmailTemplate>(&query)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }
}
