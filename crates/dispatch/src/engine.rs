//! Campaign state machine and operator-facing operations.
//!
//! ```text
//! DRAFT --prepare--> SENDING --dispatch (nothing pending)--> COMPLETED
//!                     |   ^
//!                pause|   |resume
//!                     v   |
//!                    PAUSED
//! DRAFT | PAUSED --cancel--> CANCELLED
//! ```
//!
//! `dispatch` advances exactly one batch per call under the campaign's
//! single-flight lock, no sooner than the campaign's interval after the last.
//! The next batch is always re-derived from recipient row status, never from
//! an in-memory cursor.

use std::sync::Arc;
use std::time::Duration;

use clinic_core::campaign::{
    batch_count, has_content, minutes_to_ms, validate_batch_interval_ms, validate_batch_size,
    validate_email_address, validate_name, validate_subject, Targeting, DEFAULT_BATCH_INTERVAL_MS,
    DEFAULT_BATCH_SIZE, DEFAULT_LOCALE,
};
use clinic_core::error::CoreError;
use clinic_core::mail::{MailTransport, TemplateRenderer};
use clinic_core::types::DbId;
use clinic_db::models::activity::{
    CampaignActivity, ACTIVITY_BATCH_DISPATCHED, ACTIVITY_CANCELLED, ACTIVITY_COMPLETED,
    ACTIVITY_PAUSED, ACTIVITY_PREPARED, ACTIVITY_RESUMED, ACTIVITY_TRANSPORT_UNAVAILABLE,
    DEFAULT_ACTIVITY_LIMIT, MAX_ACTIVITY_LIMIT,
};
use clinic_db::models::campaign::{Campaign, CampaignSettings, CreateCampaign, UpdateCampaign};
use clinic_db::models::campaign_recipient::{
    CampaignRecipient, RecipientListQuery, RecipientStats,
};
use clinic_db::models::status::{CampaignStatus, RecipientStatus};
use clinic_db::repositories::campaign_recipient_repo::{
    DEFAULT_RECIPIENT_LIMIT, MAX_RECIPIENT_LIMIT,
};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::json;
use tokio::time::Instant;

use crate::error::DispatchError;
use crate::executor::BatchExecutor;
use crate::lock::DispatchLocks;
use crate::partitioner::partition;
use crate::resolver::resolve_recipients;
use crate::store::{
    status_of, BatchPlan, CampaignStore, ContactDirectory, EnrollOutcome, RecipientFilter,
};
use crate::throttle::BatchThrottle;

/// Default prefix for unsubscribe links.
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Engine-wide knobs, independent of any single campaign.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Sends in flight at once inside one batch.
    pub send_concurrency: usize,
    /// Base URL used to build unsubscribe links.
    pub public_base_url: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            send_concurrency: 1,
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrepareReport {
    pub prepared: i64,
    pub batches: i64,
    /// `false` when the call found an existing enrollment.
    #[serde(skip)]
    pub newly_enrolled: bool,
}

impl PrepareReport {
    fn new(plan: BatchPlan, newly_enrolled: bool) -> Self {
        Self {
            prepared: plan.recipients,
            batches: plan.batches,
            newly_enrolled,
        }
    }
}

/// One dispatched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_number: i32,
    pub sent: i64,
    pub failed: i64,
    /// Pending rows across the whole campaign after this batch.
    pub remaining: i64,
    /// Minimum wait before the next dispatch; 0 once nothing remains.
    pub next_dispatch_ms: i64,
}

/// Result of `dispatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was pending; the campaign is now completed.
    Completed,
    Batch(BatchReport),
}

impl DispatchOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, DispatchOutcome::Completed)
    }
}

/// Wire shape: `{done: true}` or `{done: false, batch_number, sent, ...}`.
impl Serialize for DispatchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DispatchOutcome::Completed => {
                let mut s = serializer.serialize_struct("DispatchOutcome", 1)?;
                s.serialize_field("done", &true)?;
                s.end()
            }
            DispatchOutcome::Batch(report) => {
                let mut s = serializer.serialize_struct("DispatchOutcome", 6)?;
                s.serialize_field("done", &false)?;
                s.serialize_field("batch_number", &report.batch_number)?;
                s.serialize_field("sent", &report.sent)?;
                s.serialize_field("failed", &report.failed)?;
                s.serialize_field("remaining", &report.remaining)?;
                s.serialize_field("next_dispatch_ms", &report.next_dispatch_ms)?;
                s.end()
            }
        }
    }
}

/// Acknowledgement of pause/resume/cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub campaign_id: DbId,
    pub status: CampaignStatus,
    /// `false` when the campaign was already in the requested status.
    pub changed: bool,
}

/// Campaign row plus recipient counts grouped by status.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignProgress {
    pub campaign: Campaign,
    pub status: CampaignStatus,
    pub recipients: RecipientStats,
    pub batches: i64,
    pub next_batch: Option<i32>,
}

// ---------------------------------------------------------------------------
// CampaignEngine
// ---------------------------------------------------------------------------

/// Owns the campaign lifecycle. Cheap to share behind an `Arc`.
pub struct CampaignEngine {
    store: Arc<dyn CampaignStore>,
    directory: Arc<dyn ContactDirectory>,
    transport: Arc<dyn MailTransport>,
    renderer: Arc<dyn TemplateRenderer>,
    locks: Arc<DispatchLocks>,
    throttle: BatchThrottle,
    settings: EngineSettings,
}

impl CampaignEngine {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        directory: Arc<dyn ContactDirectory>,
        transport: Arc<dyn MailTransport>,
        renderer: Arc<dyn TemplateRenderer>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            directory,
            transport,
            renderer,
            locks: Arc::new(DispatchLocks::new()),
            throttle: BatchThrottle::new(),
            settings,
        }
    }

    /// Whether a dispatch for this campaign is running right now.
    pub fn is_dispatching(&self, campaign_id: DbId) -> bool {
        self.locks.is_held(campaign_id)
    }

    /// How long before `dispatch` will start another batch of `campaign`.
    pub fn throttle_remaining(&self, campaign: &Campaign) -> Duration {
        self.throttle
            .remaining(campaign.id, campaign.batch_interval_ms, campaign.last_batch_at)
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    /// Create a campaign in `draft`, filling in defaults.
    pub async fn create_campaign(&self, input: CreateCampaign) -> Result<Campaign, DispatchError> {
        let batch_interval_ms = match (input.batch_interval_ms, input.batch_interval_minutes) {
            (Some(ms), _) => ms,
            (None, Some(minutes)) => minutes_to_ms(minutes)?,
            (None, None) => DEFAULT_BATCH_INTERVAL_MS,
        };
        let send_to_all = input.send_to_all.unwrap_or(false);
        if input.group_id.is_some() && send_to_all {
            return Err(DispatchError::InvalidTargeting(
                "A campaign cannot target a group and all contacts at the same time".to_string(),
            ));
        }

        let settings = CampaignSettings {
            name: input.name.trim().to_string(),
            subject: input.subject,
            template_slug: non_blank(input.template_slug),
            html_body: non_blank(input.html_body),
            locale: non_blank(input.locale).unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            from_name: non_blank(input.from_name),
            from_email: non_blank(input.from_email),
            reply_to: non_blank(input.reply_to),
            group_id: input.group_id,
            send_to_all,
            batch_size: input.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            batch_interval_ms,
        };
        validate_settings(&settings)?;

        let campaign = self.store.create_campaign(&settings).await?;
        tracing::info!(campaign_id = campaign.id, name = %campaign.name, "Campaign created");
        Ok(campaign)
    }

    /// Apply a partial update.
    ///
    /// Everything is editable in `draft`. While `sending` or `paused` only the
    /// name and the batch interval may change; the executor reads the interval
    /// on every call, so a new value applies from the next batch.
    pub async fn update_campaign(
        &self,
        id: DbId,
        patch: UpdateCampaign,
    ) -> Result<Campaign, DispatchError> {
        let current = self.find_campaign(id).await?;
        let status = status_of(&current)?;

        let allowed: &[CampaignStatus] = match status {
            CampaignStatus::Draft => &[CampaignStatus::Draft],
            CampaignStatus::Sending | CampaignStatus::Paused if !touches_frozen(&patch) => {
                &[CampaignStatus::Sending, CampaignStatus::Paused]
            }
            _ => {
                return Err(DispatchError::InvalidTransition {
                    action: "edit",
                    status,
                })
            }
        };

        let settings = merge_settings(CampaignSettings::from(&current), patch)?;
        validate_settings(&settings)?;

        match self.store.update_settings(id, &settings, allowed).await? {
            Some(updated) => {
                tracing::info!(campaign_id = id, "Campaign updated");
                Ok(updated)
            }
            None => Err(self.transition_error(id, "edit").await),
        }
    }

    /// Delete a campaign that is not currently sending.
    pub async fn delete_campaign(&self, id: DbId) -> Result<(), DispatchError> {
        const DELETABLE: &[CampaignStatus] = &[
            CampaignStatus::Draft,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Cancelled,
        ];
        if self.store.delete_campaign(id, DELETABLE).await? {
            self.throttle.forget(id);
            tracing::info!(campaign_id = id, "Campaign deleted");
            return Ok(());
        }
        Err(self.transition_error(id, "delete").await)
    }

    pub async fn find_campaign(&self, id: DbId) -> Result<Campaign, DispatchError> {
        self.store
            .find_campaign(id)
            .await?
            .ok_or(DispatchError::NotFound(id))
    }

    /// List campaigns, optionally filtered by a status name.
    pub async fn list_campaigns(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<Campaign>, DispatchError> {
        let status = status
            .map(|name| {
                CampaignStatus::from_name(name).ok_or_else(|| {
                    CoreError::Validation(format!("Unknown campaign status: {name}"))
                })
            })
            .transpose()?;
        Ok(self.store.list_campaigns(status).await?)
    }

    /// Campaigns in `sending`, for driver recovery.
    pub async fn sending_campaign_ids(&self) -> Result<Vec<DbId>, DispatchError> {
        let campaigns = self
            .store
            .list_campaigns(Some(CampaignStatus::Sending))
            .await?;
        Ok(campaigns.into_iter().map(|c| c.id).collect())
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    pub async fn progress(&self, id: DbId) -> Result<CampaignProgress, DispatchError> {
        let campaign = self.find_campaign(id).await?;
        let status = status_of(&campaign)?;
        let recipients = self.store.recipient_stats(id).await?;
        let next_batch = self.store.next_pending_batch(id).await?;
        let batches = batch_count(recipients.total(), campaign.batch_size);
        Ok(CampaignProgress {
            campaign,
            status,
            recipients,
            batches,
            next_batch,
        })
    }

    pub async fn list_recipients(
        &self,
        id: DbId,
        query: &RecipientListQuery,
    ) -> Result<Vec<CampaignRecipient>, DispatchError> {
        self.find_campaign(id).await?;
        let status = query
            .status
            .as_deref()
            .map(|name| {
                RecipientStatus::from_name(name).ok_or_else(|| {
                    CoreError::Validation(format!("Unknown recipient status: {name}"))
                })
            })
            .transpose()?;
        let filter = RecipientFilter {
            status,
            batch_number: query.batch_number,
            limit: query
                .limit
                .unwrap_or(DEFAULT_RECIPIENT_LIMIT)
                .clamp(1, MAX_RECIPIENT_LIMIT),
            offset: query.offset.unwrap_or(0).max(0),
        };
        Ok(self.store.list_recipients(id, &filter).await?)
    }

    pub async fn list_activity(
        &self,
        id: DbId,
        limit: Option<i64>,
    ) -> Result<Vec<CampaignActivity>, DispatchError> {
        self.find_campaign(id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .clamp(1, MAX_ACTIVITY_LIMIT);
        Ok(self.store.list_activity(id, limit).await?)
    }

    // -----------------------------------------------------------------------
    // prepare
    // -----------------------------------------------------------------------

    /// Resolve and enroll recipients, moving the campaign from `draft` to
    /// `sending`. Calling it again returns the existing totals unchanged.
    pub async fn prepare(&self, id: DbId) -> Result<PrepareReport, DispatchError> {
        let campaign = self.find_campaign(id).await?;
        let status = status_of(&campaign)?;

        if let Some(plan) = self.store.enrollment(id).await? {
            return Ok(PrepareReport::new(plan, false));
        }
        if status != CampaignStatus::Draft {
            return Err(DispatchError::InvalidTransition {
                action: "prepare",
                status,
            });
        }

        let targeting = Targeting::from_parts(campaign.group_id, campaign.send_to_all)
            .map_err(|e| match e {
                CoreError::Validation(msg) => DispatchError::InvalidTargeting(msg),
                other => DispatchError::Core(other),
            })?;
        if !has_content(
            campaign.template_slug.as_deref(),
            campaign.html_body.as_deref(),
        ) {
            return Err(DispatchError::MissingContent);
        }

        let recipients = resolve_recipients(self.directory.as_ref(), targeting).await?;
        let (seeds, _) = partition(&recipients, campaign.batch_size)?;

        match self.store.enroll(id, &seeds).await? {
            EnrollOutcome::Enrolled(plan) => {
                tracing::info!(
                    campaign_id = id,
                    prepared = plan.recipients,
                    batches = plan.batches,
                    "Campaign prepared",
                );
                self.log_activity(
                    id,
                    ACTIVITY_PREPARED,
                    json!({"prepared": plan.recipients, "batches": plan.batches}),
                )
                .await;
                Ok(PrepareReport::new(plan, true))
            }
            EnrollOutcome::AlreadyEnrolled(plan) => Ok(PrepareReport::new(plan, false)),
            EnrollOutcome::NotDraft(status) => Err(DispatchError::InvalidTransition {
                action: "prepare",
                status,
            }),
            EnrollOutcome::Missing => Err(DispatchError::NotFound(id)),
        }
    }

    // -----------------------------------------------------------------------
    // dispatch
    // -----------------------------------------------------------------------

    /// Send the lowest pending batch, or complete the campaign if none remain.
    ///
    /// A batch may not start within `batch_interval_ms` of the previous one;
    /// such calls get `ThrottleActive` and change nothing.
    pub async fn dispatch(&self, id: DbId) -> Result<DispatchOutcome, DispatchError> {
        let guard = self
            .locks
            .try_acquire(id)
            .ok_or(DispatchError::DispatchInProgress(id))?;

        let campaign = self.find_campaign(id).await?;
        let status = status_of(&campaign)?;
        if status != CampaignStatus::Sending {
            return Err(DispatchError::CampaignNotSending { status });
        }

        let Some(batch_number) = self.store.next_pending_batch(id).await? else {
            return self.complete(&campaign).await;
        };

        let wait = self.throttle_remaining(&campaign);
        if !wait.is_zero() {
            return Err(DispatchError::ThrottleActive {
                campaign_id: id,
                retry_after_ms: i64::try_from(wait.as_millis()).unwrap_or(i64::MAX),
            });
        }

        let executor = BatchExecutor {
            store: self.store.as_ref(),
            directory: self.directory.as_ref(),
            transport: self.transport.as_ref(),
            renderer: self.renderer.as_ref(),
            send_concurrency: self.settings.send_concurrency,
            public_base_url: &self.settings.public_base_url,
        };

        let started = Instant::now();
        let tally = match executor.run(&guard, &campaign, batch_number).await {
            Ok(tally) => {
                self.throttle.record_start(id, started);
                tally
            }
            Err(DispatchError::TransportUnavailable(reason)) => {
                tracing::warn!(
                    campaign_id = id,
                    batch_number,
                    reason = %reason,
                    "Mail transport unavailable",
                );
                self.log_activity(
                    id,
                    ACTIVITY_TRANSPORT_UNAVAILABLE,
                    json!({"batch_number": batch_number, "reason": &reason, "sent": 0, "failed": 0}),
                )
                .await;
                return Err(DispatchError::TransportUnavailable(reason));
            }
            Err(e) => return Err(e),
        };

        if let Some(reason) = tally.interrupted {
            self.log_activity(
                id,
                ACTIVITY_TRANSPORT_UNAVAILABLE,
                json!({
                    "batch_number": batch_number,
                    "reason": &reason,
                    "sent": tally.sent,
                    "failed": tally.failed,
                }),
            )
            .await;
            return Err(DispatchError::TransportUnavailable(reason));
        }

        let remaining = self.store.count_pending(id).await?;
        let report = BatchReport {
            batch_number,
            sent: tally.sent,
            failed: tally.failed,
            remaining,
            next_dispatch_ms: if remaining == 0 {
                0
            } else {
                campaign.batch_interval_ms
            },
        };

        tracing::info!(
            campaign_id = id,
            batch_number,
            sent = report.sent,
            failed = report.failed,
            remaining,
            "Batch dispatched",
        );
        self.log_activity(
            id,
            ACTIVITY_BATCH_DISPATCHED,
            json!({
                "batch_number": batch_number,
                "sent": report.sent,
                "failed": report.failed,
                "remaining": remaining,
            }),
        )
        .await;

        Ok(DispatchOutcome::Batch(report))
    }

    async fn complete(&self, campaign: &Campaign) -> Result<DispatchOutcome, DispatchError> {
        let id = campaign.id;
        let completed = self
            .store
            .transition(id, &[CampaignStatus::Sending], CampaignStatus::Completed)
            .await?;
        let Some(completed) = completed else {
            let status = status_of(&self.find_campaign(id).await?)?;
            return Err(DispatchError::CampaignNotSending { status });
        };

        tracing::info!(
            campaign_id = id,
            sent = completed.sent_count,
            failed = completed.failed_count,
            "Campaign completed",
        );
        self.throttle.forget(id);
        self.log_activity(
            id,
            ACTIVITY_COMPLETED,
            json!({"sent": completed.sent_count, "failed": completed.failed_count}),
        )
        .await;
        Ok(DispatchOutcome::Completed)
    }

    // -----------------------------------------------------------------------
    // pause / resume / cancel
    // -----------------------------------------------------------------------

    /// `sending -> paused`. An in-flight batch still finishes.
    pub async fn pause(&self, id: DbId) -> Result<StatusChange, DispatchError> {
        self.change_status(
            id,
            "pause",
            &[CampaignStatus::Sending],
            CampaignStatus::Paused,
            ACTIVITY_PAUSED,
        )
        .await
    }

    /// `paused -> sending`. The next dispatch picks up the lowest pending batch.
    pub async fn resume(&self, id: DbId) -> Result<StatusChange, DispatchError> {
        self.change_status(
            id,
            "resume",
            &[CampaignStatus::Paused],
            CampaignStatus::Sending,
            ACTIVITY_RESUMED,
        )
        .await
    }

    /// `draft | paused -> cancelled`. Pending rows stay pending.
    pub async fn cancel(&self, id: DbId) -> Result<StatusChange, DispatchError> {
        self.change_status(
            id,
            "cancel",
            &[CampaignStatus::Draft, CampaignStatus::Paused],
            CampaignStatus::Cancelled,
            ACTIVITY_CANCELLED,
        )
        .await
    }

    async fn change_status(
        &self,
        id: DbId,
        action: &'static str,
        from: &[CampaignStatus],
        to: CampaignStatus,
        event_type: &str,
    ) -> Result<StatusChange, DispatchError> {
        if self.store.transition(id, from, to).await?.is_some() {
            tracing::info!(campaign_id = id, status = %to, "Campaign status changed");
            self.log_activity(id, event_type, json!({})).await;
            return Ok(StatusChange {
                campaign_id: id,
                status: to,
                changed: true,
            });
        }

        let status = status_of(&self.find_campaign(id).await?)?;
        if status == to {
            return Ok(StatusChange {
                campaign_id: id,
                status,
                changed: false,
            });
        }
        Err(DispatchError::InvalidTransition { action, status })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Error for a conditional write whose status guard did not match.
    async fn transition_error(&self, id: DbId, action: &'static str) -> DispatchError {
        match self.find_campaign(id).await {
            Ok(campaign) => match status_of(&campaign) {
                Ok(status) => DispatchError::InvalidTransition { action, status },
                Err(e) => e.into(),
            },
            Err(e) => e,
        }
    }

    /// Activity is a progress view; failing to write it never fails the operation.
    async fn log_activity(&self, id: DbId, event_type: &str, payload: serde_json::Value) {
        if let Err(e) = self.store.record_activity(id, event_type, payload).await {
            tracing::warn!(campaign_id = id, event_type, error = %e, "Failed to record activity");
        }
    }
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fields that are frozen once a campaign leaves `draft`.
fn touches_frozen(patch: &UpdateCampaign) -> bool {
    patch.changes_enrollment()
        || patch.subject.is_some()
        || patch.template_slug.is_some()
        || patch.html_body.is_some()
        || patch.locale.is_some()
        || patch.from_name.is_some()
        || patch.from_email.is_some()
        || patch.reply_to.is_some()
}

fn merge_settings(
    mut settings: CampaignSettings,
    patch: UpdateCampaign,
) -> Result<CampaignSettings, DispatchError> {
    if let Some(name) = patch.name {
        settings.name = name.trim().to_string();
    }
    if let Some(subject) = patch.subject {
        settings.subject = subject;
    }
    if patch.template_slug.is_some() {
        settings.template_slug = non_blank(patch.template_slug);
    }
    if patch.html_body.is_some() {
        settings.html_body = non_blank(patch.html_body);
    }
    if let Some(locale) = non_blank(patch.locale) {
        settings.locale = locale;
    }
    if patch.from_name.is_some() {
        settings.from_name = non_blank(patch.from_name);
    }
    if patch.from_email.is_some() {
        settings.from_email = non_blank(patch.from_email);
    }
    if patch.reply_to.is_some() {
        settings.reply_to = non_blank(patch.reply_to);
    }

    match (patch.group_id, patch.send_to_all) {
        (Some(_), Some(true)) => {
            return Err(DispatchError::InvalidTargeting(
                "A campaign cannot target a group and all contacts at the same time".to_string(),
            ))
        }
        (Some(group_id), _) => {
            settings.group_id = Some(group_id);
            settings.send_to_all = false;
        }
        (None, Some(true)) => {
            settings.group_id = None;
            settings.send_to_all = true;
        }
        (None, Some(false)) => settings.send_to_all = false,
        (None, None) => {}
    }

    if let Some(batch_size) = patch.batch_size {
        settings.batch_size = batch_size;
    }
    match (patch.batch_interval_ms, patch.batch_interval_minutes) {
        (Some(ms), _) => settings.batch_interval_ms = ms,
        (None, Some(minutes)) => settings.batch_interval_ms = minutes_to_ms(minutes)?,
        (None, None) => {}
    }
    Ok(settings)
}

fn validate_settings(settings: &CampaignSettings) -> Result<(), DispatchError> {
    validate_name(&settings.name)?;
    validate_subject(&settings.subject)?;
    if validate_batch_size(settings.batch_size).is_err() {
        return Err(DispatchError::InvalidBatchSize(settings.batch_size));
    }
    validate_batch_interval_ms(settings.batch_interval_ms)?;
    if let Some(from_email) = &settings.from_email {
        validate_email_address("from_email", from_email)?;
    }
    if let Some(reply_to) = &settings.reply_to {
        validate_email_address("reply_to", reply_to)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clinic_core::campaign::MAX_BATCH_SIZE;

    use super::*;

    fn base() -> CampaignSettings {
        CampaignSettings {
            name: "Spring".to_string(),
            subject: "News".to_string(),
            template_slug: Some("NEWSLETTER".to_string()),
            html_body: None,
            locale: DEFAULT_LOCALE.to_string(),
            from_name: None,
            from_email: None,
            reply_to: None,
            group_id: Some(4),
            send_to_all: false,
            batch_size: 10,
            batch_interval_ms: DEFAULT_BATCH_INTERVAL_MS,
        }
    }

    // -- merge_settings -------------------------------------------------------

    #[test]
    fn switching_to_all_clears_group() {
        let patch = UpdateCampaign {
            send_to_all: Some(true),
            ..Default::default()
        };
        let merged = merge_settings(base(), patch).unwrap();
        assert_eq!(merged.group_id, None);
        assert!(merged.send_to_all);
    }

    #[test]
    fn group_and_all_together_rejected() {
        let patch = UpdateCampaign {
            group_id: Some(9),
            send_to_all: Some(true),
            ..Default::default()
        };
        assert_matches!(
            merge_settings(base(), patch),
            Err(DispatchError::InvalidTargeting(_))
        );
    }

    #[test]
    fn blank_template_clears_slug() {
        let patch = UpdateCampaign {
            template_slug: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(merge_settings(base(), patch).unwrap().template_slug, None);
    }

    #[test]
    fn interval_minutes_converted() {
        let patch = UpdateCampaign {
            batch_interval_minutes: Some(2),
            ..Default::default()
        };
        assert_eq!(merge_settings(base(), patch).unwrap().batch_interval_ms, 120_000);
    }

    // -- frozen fields --------------------------------------------------------

    #[test]
    fn interval_and_name_are_not_frozen() {
        let patch = UpdateCampaign {
            name: Some("Renamed".to_string()),
            batch_interval_ms: Some(1_000),
            ..Default::default()
        };
        assert!(!touches_frozen(&patch));
    }

    #[test]
    fn batch_size_and_content_are_frozen() {
        assert!(touches_frozen(&UpdateCampaign {
            batch_size: Some(5),
            ..Default::default()
        }));
        assert!(touches_frozen(&UpdateCampaign {
            html_body: Some("<p>x</p>".to_string()),
            ..Default::default()
        }));
    }

    // -- validation -----------------------------------------------------------

    #[test]
    fn out_of_range_batch_is_invalid_batch_size() {
        let mut settings = base();
        settings.batch_size = 0;
        assert_matches!(
            validate_settings(&settings),
            Err(DispatchError::InvalidBatchSize(0))
        );

        let oversized = MAX_BATCH_SIZE + 1;
        settings.batch_size = oversized;
        assert_matches!(
            validate_settings(&settings),
            Err(DispatchError::InvalidBatchSize(n)) if n == oversized
        );
    }

    #[test]
    fn bad_sender_is_validation_error() {
        let mut settings = base();
        settings.from_email = Some("nope".to_string());
        assert_matches!(
            validate_settings(&settings),
            Err(DispatchError::Core(CoreError::Validation(_)))
        );
    }

    // -- wire shape -----------------------------------------------------------

    #[test]
    fn completed_outcome_serializes_done_only() {
        let json = serde_json::to_value(DispatchOutcome::Completed).unwrap();
        assert_eq!(json, serde_json::json!({"done": true}));
    }

    #[test]
    fn batch_outcome_serializes_all_fields() {
        let outcome = DispatchOutcome::Batch(BatchReport {
            batch_number: 0,
            sent: 10,
            failed: 0,
            remaining: 13,
            next_dispatch_ms: 60_000,
        });
        assert_eq!(
            serde_json::to_value(outcome).unwrap(),
            serde_json::json!({
                "done": false,
                "batch_number": 0,
                "sent": 10,
                "failed": 0,
                "remaining": 13,
                "next_dispatch_ms": 60_000,
            })
        );
    }

    #[test]
    fn prepare_report_hides_enrollment_flag() {
        let report = PrepareReport {
            prepared: 23,
            batches: 3,
            newly_enrolled: true,
        };
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            serde_json::json!({"prepared": 23, "batches": 3})
        );
    }
}
