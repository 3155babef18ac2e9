//! In-memory store and directory for lightweight deployments and tests.
//!
//! Each type keeps its state behind a single `tokio::sync::Mutex`, so every
//! trait method is atomic with respect to the others.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use clinic_core::types::{DbId, Timestamp};
use clinic_db::models::activity::CampaignActivity;
use clinic_db::models::campaign::{Campaign, CampaignSettings};
use clinic_db::models::campaign_recipient::{
    CampaignRecipient, RecipientOutcome, RecipientSeed, RecipientStats,
};
use clinic_db::models::contact::Contact;
use clinic_db::models::status::{CampaignStatus, RecipientStatus};
use tokio::sync::Mutex;

use crate::partitioner::plan_from_existing;
use crate::store::{
    BatchPlan, CampaignStore, ContactDirectory, EnrollOutcome, RecipientFilter, StoreError,
};

fn next_id(counter: &mut DbId) -> DbId {
    *counter += 1;
    *counter
}

// ---------------------------------------------------------------------------
// InMemoryCampaignStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    campaigns: BTreeMap<DbId, Campaign>,
    recipients: BTreeMap<DbId, CampaignRecipient>,
    activity: Vec<CampaignActivity>,
    campaign_seq: DbId,
    recipient_seq: DbId,
    activity_seq: DbId,
}

impl StoreState {
    fn recipients_of(&self, campaign_id: DbId) -> impl Iterator<Item = &CampaignRecipient> {
        self.recipients
            .values()
            .filter(move |r| r.campaign_id == campaign_id)
    }

    fn pending_of(&self, campaign_id: DbId) -> impl Iterator<Item = &CampaignRecipient> {
        self.recipients_of(campaign_id)
            .filter(|r| r.status_id == RecipientStatus::Pending.id())
    }

    fn enrollment(&self, campaign_id: DbId) -> Option<BatchPlan> {
        let (count, max) = self
            .recipients_of(campaign_id)
            .fold((0i64, None::<i32>), |(count, max), r| {
                (count + 1, Some(max.map_or(r.batch_number, |m| m.max(r.batch_number))))
            });
        (count > 0).then(|| plan_from_existing(count, max))
    }
}

/// Campaign store held entirely in process memory.
#[derive(Default)]
pub struct InMemoryCampaignStore {
    state: Mutex<StoreState>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_settings(campaign: &mut Campaign, settings: &CampaignSettings) {
    campaign.name = settings.name.clone();
    campaign.subject = settings.subject.clone();
    campaign.template_slug = settings.template_slug.clone();
    campaign.html_body = settings.html_body.clone();
    campaign.locale = settings.locale.clone();
    campaign.from_name = settings.from_name.clone();
    campaign.from_email = settings.from_email.clone();
    campaign.reply_to = settings.reply_to.clone();
    campaign.group_id = settings.group_id;
    campaign.send_to_all = settings.send_to_all;
    campaign.batch_size = settings.batch_size;
    campaign.batch_interval_ms = settings.batch_interval_ms;
}

fn status_in(campaign: &Campaign, allowed: &[CampaignStatus]) -> bool {
    allowed.iter().any(|s| s.id() == campaign.status_id)
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn create_campaign(&self, settings: &CampaignSettings) -> Result<Campaign, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut campaign = Campaign {
            id: next_id(&mut state.campaign_seq),
            name: String::new(),
            subject: String::new(),
            template_slug: None,
            html_body: None,
            locale: String::new(),
            from_name: None,
            from_email: None,
            reply_to: None,
            group_id: None,
            send_to_all: false,
            batch_size: 0,
            batch_interval_ms: 0,
            status_id: CampaignStatus::Draft.id(),
            total_recipients: 0,
            sent_count: 0,
            failed_count: 0,
            last_batch_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        apply_settings(&mut campaign, settings);
        state.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn find_campaign(&self, id: DbId) -> Result<Option<Campaign>, StoreError> {
        Ok(self.state.lock().await.campaigns.get(&id).cloned())
    }

    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, StoreError> {
        let state = self.state.lock().await;
        let mut campaigns: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|c| status.map_or(true, |s| c.status_id == s.id()))
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(campaigns)
    }

    async fn update_settings(
        &self,
        id: DbId,
        settings: &CampaignSettings,
        allowed: &[CampaignStatus],
    ) -> Result<Option<Campaign>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(campaign) = state.campaigns.get_mut(&id) else {
            return Ok(None);
        };
        if !status_in(campaign, allowed) {
            return Ok(None);
        }
        apply_settings(campaign, settings);
        campaign.updated_at = Utc::now();
        Ok(Some(campaign.clone()))
    }

    async fn delete_campaign(
        &self,
        id: DbId,
        allowed: &[CampaignStatus],
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.campaigns.get(&id) {
            Some(campaign) if status_in(campaign, allowed) => {}
            _ => return Ok(false),
        }
        state.campaigns.remove(&id);
        state.recipients.retain(|_, r| r.campaign_id != id);
        state.activity.retain(|a| a.campaign_id != id);
        Ok(true)
    }

    async fn transition(
        &self,
        id: DbId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Option<Campaign>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(campaign) = state.campaigns.get_mut(&id) else {
            return Ok(None);
        };
        if !status_in(campaign, from) {
            return Ok(None);
        }
        let now = Utc::now();
        campaign.status_id = to.id();
        if to == CampaignStatus::Completed {
            campaign.completed_at = Some(now);
        }
        campaign.updated_at = now;
        Ok(Some(campaign.clone()))
    }

    async fn enroll(
        &self,
        campaign_id: DbId,
        seeds: &[RecipientSeed],
    ) -> Result<EnrollOutcome, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(plan) = state.enrollment(campaign_id) {
            return Ok(EnrollOutcome::AlreadyEnrolled(plan));
        }
        let Some(campaign) = state.campaigns.get(&campaign_id) else {
            return Ok(EnrollOutcome::Missing);
        };
        if campaign.status_id != CampaignStatus::Draft.id() {
            let status = campaign
                .status()
                .ok_or(StoreError::UnknownStatus(campaign.status_id))?;
            return Ok(EnrollOutcome::NotDraft(status));
        }

        let now = Utc::now();
        let mut seen = BTreeSet::new();
        for seed in seeds {
            if !seen.insert(seed.contact_id) {
                continue;
            }
            let id = next_id(&mut state.recipient_seq);
            state.recipients.insert(
                id,
                CampaignRecipient {
                    id,
                    campaign_id,
                    contact_id: seed.contact_id,
                    batch_number: seed.batch_number,
                    status_id: RecipientStatus::Pending.id(),
                    error: None,
                    attempted_at: None,
                    created_at: now,
                },
            );
        }

        let plan = state
            .enrollment(campaign_id)
            .unwrap_or(BatchPlan { recipients: 0, batches: 0 });
        if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
            campaign.status_id = CampaignStatus::Sending.id();
            campaign.total_recipients = plan.total_recipients();
            campaign.started_at.get_or_insert(now);
            campaign.updated_at = now;
        }
        Ok(EnrollOutcome::Enrolled(plan))
    }

    async fn enrollment(&self, campaign_id: DbId) -> Result<Option<BatchPlan>, StoreError> {
        Ok(self.state.lock().await.enrollment(campaign_id))
    }

    async fn next_pending_batch(&self, campaign_id: DbId) -> Result<Option<i32>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.pending_of(campaign_id).map(|r| r.batch_number).min())
    }

    async fn pending_in_batch(
        &self,
        campaign_id: DbId,
        batch_number: i32,
    ) -> Result<Vec<CampaignRecipient>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .pending_of(campaign_id)
            .filter(|r| r.batch_number == batch_number)
            .cloned()
            .collect())
    }

    async fn record_outcome(
        &self,
        recipient: &CampaignRecipient,
        outcome: &RecipientOutcome,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(row) = state.recipients.get_mut(&recipient.id) else {
            return Ok(false);
        };
        if row.status_id != RecipientStatus::Pending.id() {
            return Ok(false);
        }
        let now = Utc::now();
        row.status_id = outcome.status().id();
        row.error = outcome.error().map(str::to_string);
        row.attempted_at = Some(now);
        let campaign_id = row.campaign_id;

        if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
            match outcome {
                RecipientOutcome::Sent => campaign.sent_count += 1,
                RecipientOutcome::Failed(_) => campaign.failed_count += 1,
            }
            campaign.updated_at = now;
        }
        Ok(true)
    }

    async fn count_pending(&self, campaign_id: DbId) -> Result<i64, StoreError> {
        Ok(self.state.lock().await.pending_of(campaign_id).count() as i64)
    }

    async fn mark_batch_started(
        &self,
        campaign_id: DbId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
            campaign.last_batch_at = Some(at);
            campaign.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn recipient_stats(&self, campaign_id: DbId) -> Result<RecipientStats, StoreError> {
        let state = self.state.lock().await;
        let mut stats = RecipientStats::default();
        for recipient in state.recipients_of(campaign_id) {
            match recipient.status() {
                Some(RecipientStatus::Pending) => stats.pending += 1,
                Some(RecipientStatus::Sent) => stats.sent += 1,
                Some(RecipientStatus::Failed) => stats.failed += 1,
                None => {}
            }
        }
        Ok(stats)
    }

    async fn list_recipients(
        &self,
        campaign_id: DbId,
        filter: &RecipientFilter,
    ) -> Result<Vec<CampaignRecipient>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<CampaignRecipient> = state
            .recipients_of(campaign_id)
            .filter(|r| filter.status.map_or(true, |s| r.status_id == s.id()))
            .filter(|r| filter.batch_number.map_or(true, |b| r.batch_number == b))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.batch_number, r.id));
        Ok(rows
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn record_activity(
        &self,
        campaign_id: DbId,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let id = next_id(&mut state.activity_seq);
        state.activity.push(CampaignActivity {
            id,
            campaign_id,
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_activity(
        &self,
        campaign_id: DbId,
        limit: i64,
    ) -> Result<Vec<CampaignActivity>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .activity
            .iter()
            .rev()
            .filter(|a| a.campaign_id == campaign_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// InMemoryDirectory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DirectoryState {
    contacts: BTreeMap<DbId, Contact>,
    groups: BTreeMap<DbId, BTreeSet<DbId>>,
    contact_seq: DbId,
    group_seq: DbId,
}

/// Contact directory held in process memory.
#[derive(Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscribed contact and return its id.
    pub async fn add_contact(
        &self,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> DbId {
        let mut state = self.state.lock().await;
        let id = next_id(&mut state.contact_seq);
        let now = Utc::now();
        state.contacts.insert(
            id,
            Contact {
                id,
                email: email.to_string(),
                first_name: first_name.map(str::to_string),
                last_name: last_name.map(str::to_string),
                subscribed: true,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub async fn set_subscribed(&self, contact_id: DbId, subscribed: bool) {
        if let Some(contact) = self.state.lock().await.contacts.get_mut(&contact_id) {
            contact.subscribed = subscribed;
            contact.updated_at = Utc::now();
        }
    }

    pub async fn remove_contact(&self, contact_id: DbId) {
        let mut state = self.state.lock().await;
        state.contacts.remove(&contact_id);
        for members in state.groups.values_mut() {
            members.remove(&contact_id);
        }
    }

    /// Create an empty group and return its id.
    pub async fn add_group(&self) -> DbId {
        let mut state = self.state.lock().await;
        let id = next_id(&mut state.group_seq);
        state.groups.insert(id, BTreeSet::new());
        id
    }

    pub async fn add_member(&self, group_id: DbId, contact_id: DbId) {
        if let Some(members) = self.state.lock().await.groups.get_mut(&group_id) {
            members.insert(contact_id);
        }
    }
}

#[async_trait]
impl ContactDirectory for InMemoryDirectory {
    async fn subscribed_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .values()
            .filter(|c| c.subscribed)
            .cloned()
            .collect())
    }

    async fn group_exists(&self, group_id: DbId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.groups.contains_key(&group_id))
    }

    async fn subscribed_group_members(&self, group_id: DbId) -> Result<Vec<Contact>, StoreError> {
        let state = self.state.lock().await;
        let Some(members) = state.groups.get(&group_id) else {
            return Ok(vec![]);
        };
        Ok(members
            .iter()
            .filter_map(|id| state.contacts.get(id))
            .filter(|c| c.subscribed)
            .cloned()
            .collect())
    }

    async fn contacts_by_ids(&self, ids: &[DbId]) -> Result<Vec<Contact>, StoreError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.contacts.get(id))
            .cloned()
            .collect())
    }
}
