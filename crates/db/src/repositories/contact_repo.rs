//! Read-only queries over the contact directory.

use clinic_core::types::DbId;
use sqlx::PgPool;

use crate::models::contact::Contact;

/// Column list for `email_contacts` queries.
const COLUMNS: &str = "id, email, first_name, last_name, subscribed, created_at, updated_at";

/// Provides lookups over contacts and groups.
pub struct ContactRepo;

impl ContactRepo {
    /// Every subscribed contact, ordered by id.
    pub async fn list_subscribed(pool: &PgPool) -> Result<Vec<Contact>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM email_contacts WHERE subscribed ORDER BY id");
        sqlx::query_as::<_, Contact>(&query).fetch_all(pool).await
    }

    /// Whether a group with this id exists.
    pub async fn group_exists(pool: &PgPool, group_id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM email_groups WHERE id = $1)")
            .bind(group_id)
            .fetch_one(pool)
            .await
    }

    /// Subscribed members of one group, ordered by contact id.
    pub async fn list_subscribed_group_members(
        pool: &PgPool,
        group_id: DbId,
    ) -> Result<Vec<Contact>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM email_contacts \
             WHERE subscribed \
               AND id IN (SELECT contact_id FROM email_group_members WHERE group_id = $1) \
             ORDER BY id"
        );
        sqlx::query_as::<_, Contact>(&query)
            .bind(group_id)
            .fetch_all(pool)
            .await
    }

    /// Contacts for a set of ids. Missing ids are simply absent from the result.
    pub async fn find_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<Contact>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let query = format!("SELECT {COLUMNS} FROM email_contacts WHERE id = ANY($1) ORDER BY id");
        sqlx::query_as::<_, Contact>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}
