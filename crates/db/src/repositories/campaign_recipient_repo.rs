//! Repository for the `campaign_recipients` table.
//!
//! Rows are inserted once per campaign at enrollment and afterwards only ever
//! move `pending -> sent | failed`. Every outcome write is conditional on the
//! row still being pending, which is what makes a re-run batch safe.

use clinic_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::campaign_recipient::{
    CampaignRecipient, RecipientOutcome, RecipientSeed, RecipientStats,
};
use crate::models::status::{RecipientStatus, StatusId};

/// Column list for `campaign_recipients` queries.
const COLUMNS: &str = "\
    id, campaign_id, contact_id, batch_number, status_id, \
    error, attempted_at, created_at";

/// Default page size for recipient listings.
pub const DEFAULT_RECIPIENT_LIMIT: i64 = 100;

/// Maximum page size for recipient listings.
pub const MAX_RECIPIENT_LIMIT: i64 = 1000;

/// Provides persistence operations for campaign recipients.
pub struct CampaignRecipientRepo;

impl CampaignRecipientRepo {
    // -----------------------------------------------------------------------
    // Enrollment
    // -----------------------------------------------------------------------

    /// Number of recipient rows already enrolled for a campaign.
    pub async fn count_for_campaign(
        conn: &mut PgConnection,
        campaign_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_one(conn)
        .await
    }

    /// Highest batch number enrolled for a campaign, if any rows exist.
    pub async fn max_batch_number(
        conn: &mut PgConnection,
        campaign_id: DbId,
    ) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(batch_number) FROM campaign_recipients WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_one(conn)
        .await
    }

    /// Bulk-insert pending recipient rows.
    ///
    /// Duplicate `(campaign_id, contact_id)` pairs are skipped. Returns the
    /// number of rows actually inserted.
    pub async fn insert_many(
        conn: &mut PgConnection,
        campaign_id: DbId,
        seeds: &[RecipientSeed],
    ) -> Result<u64, sqlx::Error> {
        if seeds.is_empty() {
            return Ok(0);
        }

        let contact_ids: Vec<DbId> = seeds.iter().map(|s| s.contact_id).collect();
        let batch_numbers: Vec<i32> = seeds.iter().map(|s| s.batch_number).collect();

        let result = sqlx::query(
            "INSERT INTO campaign_recipients (campaign_id, contact_id, batch_number, status_id) \
             SELECT $1, contact_id, batch_number, $4 \
             FROM UNNEST($2::bigint[], $3::int[]) AS t(contact_id, batch_number) \
             ON CONFLICT ON CONSTRAINT uq_campaign_recipients_campaign_contact DO NOTHING",
        )
        .bind(campaign_id)
        .bind(&contact_ids)
        .bind(&batch_numbers)
        .bind(RecipientStatus::Pending.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Lowest batch number that still has pending rows.
    pub async fn next_pending_batch(
        pool: &PgPool,
        campaign_id: DbId,
    ) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MIN(batch_number) FROM campaign_recipients \
             WHERE campaign_id = $1 AND status_id = $2",
        )
        .bind(campaign_id)
        .bind(RecipientStatus::Pending.id())
        .fetch_one(pool)
        .await
    }

    /// Pending rows of one batch, in enrollment order.
    pub async fn list_pending_in_batch(
        pool: &PgPool,
        campaign_id: DbId,
        batch_number: i32,
    ) -> Result<Vec<CampaignRecipient>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM campaign_recipients \
             WHERE campaign_id = $1 AND batch_number = $2 AND status_id = $3 \
             ORDER BY id"
        );
        sqlx::query_as::<_, CampaignRecipient>(&query)
            .bind(campaign_id)
            .bind(batch_number)
            .bind(RecipientStatus::Pending.id())
            .fetch_all(pool)
            .await
    }

    /// Write the outcome of one delivery attempt.
    ///
    /// Only a pending row is updated. Returns the owning campaign id when the
    /// row changed, `None` if it had already been resolved.
    pub async fn record_outcome(
        conn: &mut PgConnection,
        id: DbId,
        outcome: &RecipientOutcome,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE campaign_recipients \
             SET status_id = $2, error = $3, attempted_at = NOW() \
             WHERE id = $1 AND status_id = $4 \
             RETURNING campaign_id",
        )
        .bind(id)
        .bind(outcome.status().id())
        .bind(outcome.error())
        .bind(RecipientStatus::Pending.id())
        .fetch_optional(conn)
        .await
    }

    /// Pending rows across the whole campaign.
    pub async fn count_pending(pool: &PgPool, campaign_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id = $1 AND status_id = $2",
        )
        .bind(campaign_id)
        .bind(RecipientStatus::Pending.id())
        .fetch_one(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    /// Recipient counts grouped by status.
    pub async fn stats(pool: &PgPool, campaign_id: DbId) -> Result<RecipientStats, sqlx::Error> {
        let rows = sqlx::query_as::<_, (StatusId, i64)>(
            "SELECT status_id, COUNT(*) FROM campaign_recipients \
             WHERE campaign_id = $1 GROUP BY status_id",
        )
        .bind(campaign_id)
        .fetch_all(pool)
        .await?;

        let mut stats = RecipientStats::default();
        for (status_id, count) in rows {
            match RecipientStatus::from_id(status_id) {
                Some(RecipientStatus::Pending) => stats.pending = count,
                Some(RecipientStatus::Sent) => stats.sent = count,
                Some(RecipientStatus::Failed) => stats.failed = count,
                None => {
                    tracing::warn!(campaign_id, status_id, "Unknown recipient status id");
                }
            }
        }
        Ok(stats)
    }

    /// Page through a campaign's recipients, optionally filtered.
    pub async fn list(
        pool: &PgPool,
        campaign_id: DbId,
        status: Option<RecipientStatus>,
        batch_number: Option<i32>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CampaignRecipient>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM campaign_recipients \
             WHERE campaign_id = $1 \
               AND ($2::SMALLINT IS NULL OR status_id = $2) \
               AND ($3::INTEGER IS NULL OR batch_number = $3) \
             ORDER BY batch_number, id \
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, CampaignRecipient>(&query)
            .bind(campaign_id)
            .bind(status.map(RecipientStatus::id))
            .bind(batch_number)
            .bind(limit.clamp(1, MAX_RECIPIENT_LIMIT))
            .bind(offset.max(0))
            .fetch_all(pool)
            .await
    }
}
