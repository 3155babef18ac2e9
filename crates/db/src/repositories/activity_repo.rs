//! Repository for the append-only `campaign_activity` table.

use clinic_core::types::DbId;
use sqlx::PgPool;

use crate::models::activity::{CampaignActivity, MAX_ACTIVITY_LIMIT};

/// Column list for `campaign_activity` queries.
const COLUMNS: &str = "id, campaign_id, event_type, payload, created_at";

/// Provides persistence operations for campaign activity entries.
pub struct ActivityRepo;

impl ActivityRepo {
    /// Append one event.
    pub async fn create(
        pool: &PgPool,
        campaign_id: DbId,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<CampaignActivity, sqlx::Error> {
        let query = format!(
            "INSERT INTO campaign_activity (campaign_id, event_type, payload) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CampaignActivity>(&query)
            .bind(campaign_id)
            .bind(event_type)
            .bind(payload)
            .fetch_one(pool)
            .await
    }

    /// Most recent events for a campaign, newest first.
    pub async fn list_for_campaign(
        pool: &PgPool,
        campaign_id: DbId,
        limit: i64,
    ) -> Result<Vec<CampaignActivity>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM campaign_activity \
             WHERE campaign_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, CampaignActivity>(&query)
            .bind(campaign_id)
            .bind(limit.clamp(1, MAX_ACTIVITY_LIMIT))
            .fetch_all(pool)
            .await
    }
}
