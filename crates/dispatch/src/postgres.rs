//! Postgres-backed store and directory built on the `clinic-db` repositories.

use async_trait::async_trait;
use clinic_core::types::{DbId, Timestamp};
use clinic_db::models::activity::CampaignActivity;
use clinic_db::models::campaign::{Campaign, CampaignSettings};
use clinic_db::models::campaign_recipient::{
    CampaignRecipient, RecipientOutcome, RecipientSeed, RecipientStats,
};
use clinic_db::models::contact::Contact;
use clinic_db::models::status::CampaignStatus;
use clinic_db::repositories::{
    ActivityRepo, CampaignRecipientRepo, CampaignRepo, ContactRepo,
};
use clinic_db::DbPool;

use crate::partitioner::plan_from_existing;
use crate::store::{
    status_of, BatchPlan, CampaignStore, ContactDirectory, EnrollOutcome, RecipientFilter,
    StoreError,
};

// ---------------------------------------------------------------------------
// PgCampaignStore
// ---------------------------------------------------------------------------

/// Campaign store on the shared connection pool.
#[derive(Clone)]
pub struct PgCampaignStore {
    pool: DbPool,
}

impl PgCampaignStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    async fn create_campaign(&self, settings: &CampaignSettings) -> Result<Campaign, StoreError> {
        Ok(CampaignRepo::create(&self.pool, settings).await?)
    }

    async fn find_campaign(&self, id: DbId) -> Result<Option<Campaign>, StoreError> {
        Ok(CampaignRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, StoreError> {
        Ok(CampaignRepo::list(&self.pool, status).await?)
    }

    async fn update_settings(
        &self,
        id: DbId,
        settings: &CampaignSettings,
        allowed: &[CampaignStatus],
    ) -> Result<Option<Campaign>, StoreError> {
        Ok(CampaignRepo::update_settings(&self.pool, id, settings, allowed).await?)
    }

    async fn delete_campaign(
        &self,
        id: DbId,
        allowed: &[CampaignStatus],
    ) -> Result<bool, StoreError> {
        Ok(CampaignRepo::delete(&self.pool, id, allowed).await?)
    }

    async fn transition(
        &self,
        id: DbId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Option<Campaign>, StoreError> {
        Ok(CampaignRepo::transition(&self.pool, id, from, to).await?)
    }

    /// Runs in one transaction holding the campaign row lock, so concurrent
    /// prepares serialize and the loser sees the winner's rows.
    async fn enroll(
        &self,
        campaign_id: DbId,
        seeds: &[RecipientSeed],
    ) -> Result<EnrollOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(campaign) = CampaignRepo::find_for_update(&mut *tx, campaign_id).await? else {
            return Ok(EnrollOutcome::Missing);
        };

        let existing = CampaignRecipientRepo::count_for_campaign(&mut *tx, campaign_id).await?;
        if existing > 0 {
            let max = CampaignRecipientRepo::max_batch_number(&mut *tx, campaign_id).await?;
            return Ok(EnrollOutcome::AlreadyEnrolled(plan_from_existing(existing, max)));
        }

        let status = status_of(&campaign)?;
        if status != CampaignStatus::Draft {
            return Ok(EnrollOutcome::NotDraft(status));
        }

        let inserted = CampaignRecipientRepo::insert_many(&mut *tx, campaign_id, seeds).await?;
        let total = i32::try_from(inserted).unwrap_or(i32::MAX);
        CampaignRepo::mark_enrolled(&mut *tx, campaign_id, total).await?;
        let max = CampaignRecipientRepo::max_batch_number(&mut *tx, campaign_id).await?;

        tx.commit().await?;
        Ok(EnrollOutcome::Enrolled(plan_from_existing(inserted as i64, max)))
    }

    async fn enrollment(&self, campaign_id: DbId) -> Result<Option<BatchPlan>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let count = CampaignRecipientRepo::count_for_campaign(&mut *conn, campaign_id).await?;
        if count == 0 {
            return Ok(None);
        }
        let max = CampaignRecipientRepo::max_batch_number(&mut *conn, campaign_id).await?;
        Ok(Some(plan_from_existing(count, max)))
    }

    async fn next_pending_batch(&self, campaign_id: DbId) -> Result<Option<i32>, StoreError> {
        Ok(CampaignRecipientRepo::next_pending_batch(&self.pool, campaign_id).await?)
    }

    async fn pending_in_batch(
        &self,
        campaign_id: DbId,
        batch_number: i32,
    ) -> Result<Vec<CampaignRecipient>, StoreError> {
        Ok(CampaignRecipientRepo::list_pending_in_batch(&self.pool, campaign_id, batch_number).await?)
    }

    /// Row update and counter increment commit together.
    async fn record_outcome(
        &self,
        recipient: &CampaignRecipient,
        outcome: &RecipientOutcome,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(campaign_id) =
            CampaignRecipientRepo::record_outcome(&mut *tx, recipient.id, outcome).await?
        else {
            return Ok(false);
        };
        CampaignRepo::increment_counter(&mut *tx, campaign_id, outcome.status()).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn count_pending(&self, campaign_id: DbId) -> Result<i64, StoreError> {
        Ok(CampaignRecipientRepo::count_pending(&self.pool, campaign_id).await?)
    }

    async fn mark_batch_started(
        &self,
        campaign_id: DbId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        Ok(CampaignRepo::mark_batch_started(&self.pool, campaign_id, at).await?)
    }

    async fn recipient_stats(&self, campaign_id: DbId) -> Result<RecipientStats, StoreError> {
        Ok(CampaignRecipientRepo::stats(&self.pool, campaign_id).await?)
    }

    async fn list_recipients(
        &self,
        campaign_id: DbId,
        filter: &RecipientFilter,
    ) -> Result<Vec<CampaignRecipient>, StoreError> {
        Ok(CampaignRecipientRepo::list(
            &self.pool,
            campaign_id,
            filter.status,
            filter.batch_number,
            filter.limit,
            filter.offset,
        )
        .await?)
    }

    async fn record_activity(
        &self,
        campaign_id: DbId,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        ActivityRepo::create(&self.pool, campaign_id, event_type, &payload).await?;
        Ok(())
    }

    async fn list_activity(
        &self,
        campaign_id: DbId,
        limit: i64,
    ) -> Result<Vec<CampaignActivity>, StoreError> {
        Ok(ActivityRepo::list_for_campaign(&self.pool, campaign_id, limit).await?)
    }
}

// ---------------------------------------------------------------------------
// PgContactDirectory
// ---------------------------------------------------------------------------

/// Read-only directory over `email_contacts` and `email_groups`.
#[derive(Clone)]
pub struct PgContactDirectory {
    pool: DbPool,
}

impl PgContactDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactDirectory for PgContactDirectory {
    async fn subscribed_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        Ok(ContactRepo::list_subscribed(&self.pool).await?)
    }

    async fn group_exists(&self, group_id: DbId) -> Result<bool, StoreError> {
        Ok(ContactRepo::group_exists(&self.pool, group_id).await?)
    }

    async fn subscribed_group_members(&self, group_id: DbId) -> Result<Vec<Contact>, StoreError> {
        Ok(ContactRepo::list_subscribed_group_members(&self.pool, group_id).await?)
    }

    async fn contacts_by_ids(&self, ids: &[DbId]) -> Result<Vec<Contact>, StoreError> {
        Ok(ContactRepo::find_by_ids(&self.pool, ids).await?)
    }
}
