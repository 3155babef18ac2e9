use clinic_core::campaign::MAX_BATCH_SIZE;
use clinic_core::error::CoreError;
use clinic_core::types::DbId;
use clinic_db::models::status::CampaignStatus;

use crate::store::StoreError;

/// Everything the engine can refuse or fail with.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Campaign {0} not found")]
    NotFound(DbId),

    #[error("Invalid targeting: {0}")]
    InvalidTargeting(String),

    #[error("Invalid batch size {0}: must be between 1 and {MAX_BATCH_SIZE}")]
    InvalidBatchSize(i32),

    #[error("Campaign has neither a template nor an HTML body")]
    MissingContent,

    #[error("Contact group {0} not found")]
    GroupNotFound(DbId),

    #[error("Campaign targets no subscribed contacts")]
    EmptyRecipientSet,

    #[error("Cannot {action} a campaign that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: CampaignStatus,
    },

    #[error("Campaign is {status}, not sending")]
    CampaignNotSending { status: CampaignStatus },

    #[error("A dispatch for campaign {0} is already in progress")]
    DispatchInProgress(DbId),

    #[error("Campaign {campaign_id} is throttled; next batch allowed in {retry_after_ms} ms")]
    ThrottleActive { campaign_id: DbId, retry_after_ms: i64 },

    #[error("Mail transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Template unavailable: {0}")]
    TemplateUnavailable(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Errors after which the same call may simply be retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::DispatchInProgress(_)
                | DispatchError::ThrottleActive { .. }
                | DispatchError::TransportUnavailable(_)
                | DispatchError::TemplateUnavailable(_)
                | DispatchError::Store(_)
        )
    }
}
