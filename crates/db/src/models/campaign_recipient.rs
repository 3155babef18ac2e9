//! Campaign recipient models (one row per targeted contact).
//!
//! Maps to the `campaign_recipients` and `campaign_recipient_statuses`
//! tables. Rows are created exactly once, when a campaign is prepared.

use clinic_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{RecipientStatus, StatusId};

/// A row from the `campaign_recipients` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CampaignRecipient {
    pub id: DbId,
    pub campaign_id: DbId,
    pub contact_id: DbId,
    pub batch_number: i32,
    pub status_id: StatusId,
    pub error: Option<String>,
    pub attempted_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl CampaignRecipient {
    pub fn status(&self) -> Option<RecipientStatus> {
        RecipientStatus::from_id(self.status_id)
    }
}

/// A recipient to enroll: the contact and the batch it was partitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipientSeed {
    pub contact_id: DbId,
    pub batch_number: i32,
}

/// Final outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientOutcome {
    Sent,
    Failed(String),
}

impl RecipientOutcome {
    pub fn status(&self) -> RecipientStatus {
        match self {
            RecipientOutcome::Sent => RecipientStatus::Sent,
            RecipientOutcome::Failed(_) => RecipientStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RecipientOutcome::Sent => None,
            RecipientOutcome::Failed(reason) => Some(reason),
        }
    }
}

/// Recipient counts grouped by status for one campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecipientStats {
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
}

impl RecipientStats {
    pub fn total(&self) -> i64 {
        self.pending + self.sent + self.failed
    }
}

/// Query parameters for `GET /campaigns/{id}/recipients`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipientListQuery {
    /// Status name filter, e.g. `failed`.
    pub status: Option<String>,
    pub batch_number: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
