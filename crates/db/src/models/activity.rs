//! Campaign activity log.
//!
//! Append-only history of engine events per campaign, queried by clients
//! that want to show live progress.

use clinic_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// Campaign enrolled its recipients.
pub const ACTIVITY_PREPARED: &str = "prepared";
/// One batch finished sending.
pub const ACTIVITY_BATCH_DISPATCHED: &str = "batch_dispatched";
/// A dispatch call found the mail transport down.
pub const ACTIVITY_TRANSPORT_UNAVAILABLE: &str = "transport_unavailable";
pub const ACTIVITY_PAUSED: &str = "paused";
pub const ACTIVITY_RESUMED: &str = "resumed";
pub const ACTIVITY_CANCELLED: &str = "cancelled";
pub const ACTIVITY_COMPLETED: &str = "completed";

/// Default and maximum page size for activity listings.
pub const DEFAULT_ACTIVITY_LIMIT: i64 = 100;
pub const MAX_ACTIVITY_LIMIT: i64 = 500;

/// A row from the `campaign_activity` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CampaignActivity {
    pub id: DbId,
    pub campaign_id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}
