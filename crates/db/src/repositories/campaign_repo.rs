//! Repository for the `email_campaigns` table.
//!
//! Uses `CampaignStatus` from `models::status` for every status literal.
//! Status changes are conditional updates (`WHERE status_id = ANY(...)`) so a
//! concurrent operator action can never be silently overwritten.

use chrono::Utc;
use clinic_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::campaign::{Campaign, CampaignSettings};
use crate::models::status::{CampaignStatus, RecipientStatus, StatusId};

/// Column list for `email_campaigns` queries.
const COLUMNS: &str = "\
    id, name, subject, template_slug, html_body, locale, \
    from_name, from_email, reply_to, group_id, send_to_all, \
    batch_size, batch_interval_ms, status_id, \
    total_recipients, sent_count, failed_count, \
    last_batch_at, started_at, completed_at, created_at, updated_at";

/// Provides persistence operations for campaigns.
pub struct CampaignRepo;

impl CampaignRepo {
    /// Insert a new campaign in `draft` status, returning the created row.
    pub async fn create(pool: &PgPool, settings: &CampaignSettings) -> Result<Campaign, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_campaigns \
                (name, subject, template_slug, html_body, locale, from_name, from_email, \
                 reply_to, group_id, send_to_all, batch_size, batch_interval_ms, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(&settings.name)
            .bind(&settings.subject)
            .bind(&settings.template_slug)
            .bind(&settings.html_body)
            .bind(&settings.locale)
            .bind(&settings.from_name)
            .bind(&settings.from_email)
            .bind(&settings.reply_to)
            .bind(settings.group_id)
            .bind(settings.send_to_all)
            .bind(settings.batch_size)
            .bind(settings.batch_interval_ms)
            .bind(CampaignStatus::Draft.id())
            .fetch_one(pool)
            .await
    }

    /// Find a single campaign by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM email_campaigns WHERE id = $1");
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Lock a campaign row for the remainder of the transaction.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM email_campaigns WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// List campaigns, newest first, optionally filtered by status.
    pub async fn list(
        pool: &PgPool,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM email_campaigns \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1) \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(status.map(CampaignStatus::id))
            .fetch_all(pool)
            .await
    }

    /// Overwrite the editable settings if the campaign is in one of `allowed`.
    ///
    /// Returns `None` when the campaign is missing or its status moved on.
    pub async fn update_settings(
        pool: &PgPool,
        id: DbId,
        settings: &CampaignSettings,
        allowed: &[CampaignStatus],
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!(
            "UPDATE email_campaigns SET \
                name = $2, subject = $3, template_slug = $4, html_body = $5, locale = $6, \
                from_name = $7, from_email = $8, reply_to = $9, group_id = $10, \
                send_to_all = $11, batch_size = $12, batch_interval_ms = $13, \
                updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($14) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(&settings.name)
            .bind(&settings.subject)
            .bind(&settings.template_slug)
            .bind(&settings.html_body)
            .bind(&settings.locale)
            .bind(&settings.from_name)
            .bind(&settings.from_email)
            .bind(&settings.reply_to)
            .bind(settings.group_id)
            .bind(settings.send_to_all)
            .bind(settings.batch_size)
            .bind(settings.batch_interval_ms)
            .bind(status_ids(allowed))
            .fetch_optional(pool)
            .await
    }

    /// Move a campaign to `to` if its current status is one of `from`.
    ///
    /// Sets `completed_at` when moving to `completed`. Returns `None` when
    /// the campaign is missing or the guard did not match.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let query = format!(
            "UPDATE email_campaigns \
             SET status_id = $2, \
                 completed_at = CASE WHEN $2 = $4 THEN NOW() ELSE completed_at END, \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(to.id())
            .bind(status_ids(from))
            .bind(CampaignStatus::Completed.id())
            .fetch_optional(pool)
            .await
    }

    /// Flip a `draft` campaign to `sending` and record its recipient total.
    ///
    /// Runs inside the enrollment transaction. Returns `false` if the campaign
    /// was no longer a draft.
    pub async fn mark_enrolled(
        conn: &mut PgConnection,
        id: DbId,
        total_recipients: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE email_campaigns \
             SET status_id = $2, total_recipients = $3, \
                 started_at = COALESCE(started_at, NOW()), updated_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(CampaignStatus::Sending.id())
        .bind(total_recipients)
        .bind(CampaignStatus::Draft.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bump `sent_count` or `failed_count` by one for a recorded outcome.
    pub async fn increment_counter(
        conn: &mut PgConnection,
        id: DbId,
        outcome: RecipientStatus,
    ) -> Result<(), sqlx::Error> {
        let (sent, failed) = match outcome {
            RecipientStatus::Sent => (1, 0),
            RecipientStatus::Failed => (0, 1),
            RecipientStatus::Pending => return Ok(()),
        };
        sqlx::query(
            "UPDATE email_campaigns \
             SET sent_count = sent_count + $2, failed_count = failed_count + $3, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(sent)
        .bind(failed)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Record when the latest batch started (drives the throttle after restarts).
    pub async fn mark_batch_started(
        pool: &PgPool,
        id: DbId,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE email_campaigns SET last_batch_at = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(at)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a campaign (and, by cascade, its recipients and activity) if its
    /// status is one of `allowed`.
    pub async fn delete(
        pool: &PgPool,
        id: DbId,
        allowed: &[CampaignStatus],
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM email_campaigns WHERE id = $1 AND status_id = ANY($2)")
                .bind(id)
                .bind(status_ids(allowed))
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn status_ids(statuses: &[CampaignStatus]) -> Vec<StatusId> {
    statuses.iter().map(|s| s.id()).collect()
}
