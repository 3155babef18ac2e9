//! Email campaign models and DTOs.
//!
//! Maps to the `email_campaigns` and `campaign_statuses` tables.

use clinic_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{CampaignStatus, StatusId};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row from the `email_campaigns` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Campaign {
    pub id: DbId,
    pub name: String,
    pub subject: String,
    pub template_slug: Option<String>,
    pub html_body: Option<String>,
    pub locale: String,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub group_id: Option<DbId>,
    pub send_to_all: bool,
    pub batch_size: i32,
    pub batch_interval_ms: i64,
    pub status_id: StatusId,
    pub total_recipients: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub last_batch_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Campaign {
    /// Typed status. `None` only if the lookup table and enum disagree.
    pub fn status(&self) -> Option<CampaignStatus> {
        CampaignStatus::from_id(self.status_id)
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// DTO for inserting a new campaign. Campaigns always start in `draft`.
///
/// The interval may be given in milliseconds or, as operators configure it,
/// in whole minutes; milliseconds win when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    pub subject: String,
    pub template_slug: Option<String>,
    pub html_body: Option<String>,
    pub locale: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub group_id: Option<DbId>,
    pub send_to_all: Option<bool>,
    pub batch_size: Option<i32>,
    pub batch_interval_ms: Option<i64>,
    pub batch_interval_minutes: Option<i64>,
}

// ---------------------------------------------------------------------------
// Update DTO
// ---------------------------------------------------------------------------

/// DTO for updating a campaign (all fields optional).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub template_slug: Option<String>,
    pub html_body: Option<String>,
    pub locale: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub group_id: Option<DbId>,
    pub send_to_all: Option<bool>,
    pub batch_size: Option<i32>,
    pub batch_interval_ms: Option<i64>,
    pub batch_interval_minutes: Option<i64>,
}

impl UpdateCampaign {
    /// Whether the patch touches who receives the campaign or how it is split.
    ///
    /// These settings are frozen once recipients have been enrolled.
    pub fn changes_enrollment(&self) -> bool {
        self.group_id.is_some() || self.send_to_all.is_some() || self.batch_size.is_some()
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Every operator-editable column, fully resolved (no "keep current" holes).
///
/// Built by merging an [`UpdateCampaign`] patch over the stored row so the
/// repository can write targeting as a consistent pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignSettings {
    pub name: String,
    pub subject: String,
    pub template_slug: Option<String>,
    pub html_body: Option<String>,
    pub locale: String,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub group_id: Option<DbId>,
    pub send_to_all: bool,
    pub batch_size: i32,
    pub batch_interval_ms: i64,
}

impl From<&Campaign> for CampaignSettings {
    fn from(campaign: &Campaign) -> Self {
        Self {
            name: campaign.name.clone(),
            subject: campaign.subject.clone(),
            template_slug: campaign.template_slug.clone(),
            html_body: campaign.html_body.clone(),
            locale: campaign.locale.clone(),
            from_name: campaign.from_name.clone(),
            from_email: campaign.from_email.clone(),
            reply_to: campaign.reply_to.clone(),
            group_id: campaign.group_id,
            send_to_all: campaign.send_to_all,
            batch_size: campaign.batch_size,
            batch_interval_ms: campaign.batch_interval_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Query params
// ---------------------------------------------------------------------------

/// Query parameters for `GET /campaigns`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignListQuery {
    /// Status name filter, e.g. `sending`.
    pub status: Option<String>,
}
