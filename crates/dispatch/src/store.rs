//! Persistence seams used by the engine.
//!
//! [`CampaignStore`] owns campaign, recipient and activity state;
//! [`ContactDirectory`] is the read-only view of contacts and groups.
//! Production uses [`crate::postgres`], tests and lightweight deployments
//! use [`crate::memory`].

use async_trait::async_trait;
use clinic_core::types::{DbId, Timestamp};
use clinic_db::models::activity::CampaignActivity;
use clinic_db::models::campaign::{Campaign, CampaignSettings};
use clinic_db::models::campaign_recipient::{
    CampaignRecipient, RecipientOutcome, RecipientSeed, RecipientStats,
};
use clinic_db::models::contact::Contact;
use clinic_db::models::status::{CampaignStatus, RecipientStatus, StatusId};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure inside a store or directory implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored status id has no matching enum variant.
    #[error("Unknown campaign status id {0}")]
    UnknownStatus(StatusId),
}

/// Typed status of a stored campaign.
pub fn status_of(campaign: &Campaign) -> Result<CampaignStatus, StoreError> {
    campaign
        .status()
        .ok_or(StoreError::UnknownStatus(campaign.status_id))
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Size of an enrolled campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub recipients: i64,
    pub batches: i64,
}

impl BatchPlan {
    /// Recipient count for the campaign's `total_recipients` column, saturating.
    pub fn total_recipients(&self) -> i32 {
        i32::try_from(self.recipients).unwrap_or(i32::MAX)
    }
}

/// Result of an enrollment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollOutcome {
    /// Rows were written and the campaign moved to `sending`.
    Enrolled(BatchPlan),
    /// Rows already existed; nothing changed.
    AlreadyEnrolled(BatchPlan),
    /// The campaign left `draft` before enrollment could start.
    NotDraft(CampaignStatus),
    Missing,
}

/// Filter and page for recipient listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipientFilter {
    pub status: Option<RecipientStatus>,
    pub batch_number: Option<i32>,
    pub limit: i64,
    pub offset: i64,
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Durable campaign state.
///
/// Status changes are conditional on the current status so that two callers
/// racing on the same campaign cannot both win.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn create_campaign(&self, settings: &CampaignSettings) -> Result<Campaign, StoreError>;

    async fn find_campaign(&self, id: DbId) -> Result<Option<Campaign>, StoreError>;

    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, StoreError>;

    /// Overwrite editable settings if the status is one of `allowed`.
    async fn update_settings(
        &self,
        id: DbId,
        settings: &CampaignSettings,
        allowed: &[CampaignStatus],
    ) -> Result<Option<Campaign>, StoreError>;

    /// Delete the campaign and everything it owns if the status is one of `allowed`.
    async fn delete_campaign(
        &self,
        id: DbId,
        allowed: &[CampaignStatus],
    ) -> Result<bool, StoreError>;

    /// Move to `to` if the current status is one of `from`. `None` when the
    /// guard did not match or the campaign is missing.
    async fn transition(
        &self,
        id: DbId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Option<Campaign>, StoreError>;

    /// Atomically persist every recipient row, set the total and move the
    /// campaign from `draft` to `sending`. A no-op if rows already exist.
    async fn enroll(
        &self,
        campaign_id: DbId,
        seeds: &[RecipientSeed],
    ) -> Result<EnrollOutcome, StoreError>;

    /// Size of an existing enrollment, if any.
    async fn enrollment(&self, campaign_id: DbId) -> Result<Option<BatchPlan>, StoreError>;

    /// Lowest batch number that still has pending rows.
    async fn next_pending_batch(&self, campaign_id: DbId) -> Result<Option<i32>, StoreError>;

    async fn pending_in_batch(
        &self,
        campaign_id: DbId,
        batch_number: i32,
    ) -> Result<Vec<CampaignRecipient>, StoreError>;

    /// Resolve a pending row and bump the matching campaign counter in one
    /// atomic step. Returns `false` if the row was no longer pending.
    async fn record_outcome(
        &self,
        recipient: &CampaignRecipient,
        outcome: &RecipientOutcome,
    ) -> Result<bool, StoreError>;

    async fn count_pending(&self, campaign_id: DbId) -> Result<i64, StoreError>;

    async fn mark_batch_started(&self, campaign_id: DbId, at: Timestamp)
        -> Result<(), StoreError>;

    async fn recipient_stats(&self, campaign_id: DbId) -> Result<RecipientStats, StoreError>;

    async fn list_recipients(
        &self,
        campaign_id: DbId,
        filter: &RecipientFilter,
    ) -> Result<Vec<CampaignRecipient>, StoreError>;

    async fn record_activity(
        &self,
        campaign_id: DbId,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_activity(
        &self,
        campaign_id: DbId,
        limit: i64,
    ) -> Result<Vec<CampaignActivity>, StoreError>;
}

/// Read-only access to contacts and groups.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Every subscribed contact.
    async fn subscribed_contacts(&self) -> Result<Vec<Contact>, StoreError>;

    async fn group_exists(&self, group_id: DbId) -> Result<bool, StoreError>;

    /// Subscribed members of one group.
    async fn subscribed_group_members(&self, group_id: DbId) -> Result<Vec<Contact>, StoreError>;

    /// Contacts for the given ids; unknown ids are omitted.
    async fn contacts_by_ids(&self, ids: &[DbId]) -> Result<Vec<Contact>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_recipients_saturates() {
        let plan = BatchPlan {
            recipients: 23,
            batches: 3,
        };
        assert_eq!(plan.total_recipients(), 23);

        let huge = BatchPlan {
            recipients: i64::from(i32::MAX) + 1,
            batches: 1,
        };
        assert_eq!(huge.total_recipients(), i32::MAX);
    }
}
