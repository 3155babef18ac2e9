//! Sends one batch of a campaign.
//!
//! Every message is composed before anything is sent, so a template that is
//! missing altogether aborts the batch with no row touched. After that each
//! recipient's outcome is written right after its own attempt, conditional on
//! the row still being pending.

use std::collections::HashMap;

use chrono::Utc;
use clinic_core::campaign::recipient_variables;
use clinic_core::mail::{
    format_mailbox, replace_variables, MailTransport, OutgoingEmail, SendError, TemplateRenderer,
};
use clinic_core::types::DbId;
use clinic_db::models::campaign::Campaign;
use clinic_db::models::campaign_recipient::{CampaignRecipient, RecipientOutcome};
use clinic_db::models::contact::Contact;
use futures::future::join_all;

use crate::error::DispatchError;
use crate::lock::DispatchGuard;
use crate::store::{CampaignStore, ContactDirectory};

/// Collaborators and knobs for running a batch.
pub struct BatchExecutor<'a> {
    pub store: &'a dyn CampaignStore,
    pub directory: &'a dyn ContactDirectory,
    pub transport: &'a dyn MailTransport,
    pub renderer: &'a dyn TemplateRenderer,
    /// Sends in flight at once inside the batch. At least 1.
    pub send_concurrency: usize,
    /// Prefix for per-recipient unsubscribe links.
    pub public_base_url: &'a str,
}

/// Counts for the rows this batch resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub sent: i64,
    pub failed: i64,
    /// Set when the transport went down mid-batch; unattempted rows stay pending.
    pub interrupted: Option<String>,
}

enum Composed {
    Ready(OutgoingEmail),
    Unsendable(String),
}

impl BatchExecutor<'_> {
    /// Send the pending rows of `batch_number`.
    ///
    /// The caller must hold the campaign's dispatch lock.
    pub async fn run(
        &self,
        guard: &DispatchGuard,
        campaign: &Campaign,
        batch_number: i32,
    ) -> Result<BatchTally, DispatchError> {
        debug_assert_eq!(guard.campaign_id(), campaign.id);

        let recipients = self.store.pending_in_batch(campaign.id, batch_number).await?;

        self.transport
            .check_available()
            .await
            .map_err(|e| DispatchError::TransportUnavailable(transport_reason(e)))?;

        let contact_ids: Vec<DbId> = recipients.iter().map(|r| r.contact_id).collect();
        let contacts: HashMap<DbId, Contact> = self
            .directory
            .contacts_by_ids(&contact_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut ready = Vec::with_capacity(recipients.len());
        let mut unsendable = Vec::new();
        for recipient in recipients {
            match self.compose(campaign, contacts.get(&recipient.contact_id)).await? {
                Composed::Ready(email) => ready.push((recipient, email)),
                Composed::Unsendable(reason) => unsendable.push((recipient, reason)),
            }
        }

        self.store.mark_batch_started(campaign.id, Utc::now()).await?;

        let mut tally = BatchTally::default();
        for (recipient, reason) in unsendable {
            tracing::warn!(
                campaign_id = campaign.id,
                recipient_id = recipient.id,
                reason = %reason,
                "Recipient cannot be sent to",
            );
            self.record(&recipient, RecipientOutcome::Failed(reason), &mut tally)
                .await?;
        }

        for chunk in ready.chunks(self.send_concurrency.max(1)) {
            let results = join_all(chunk.iter().map(|(recipient, email)| async move {
                (recipient, self.transport.send(email).await)
            }))
            .await;

            let mut unavailable = None;
            for (recipient, result) in results {
                match result {
                    Ok(()) => self.record(recipient, RecipientOutcome::Sent, &mut tally).await?,
                    Err(SendError::Rejected(reason)) => {
                        tracing::info!(
                            campaign_id = campaign.id,
                            recipient_id = recipient.id,
                            reason = %reason,
                            "Delivery rejected",
                        );
                        self.record(recipient, RecipientOutcome::Failed(reason), &mut tally)
                            .await?;
                    }
                    Err(SendError::Unavailable(reason)) => {
                        unavailable.get_or_insert(reason);
                    }
                }
            }

            if let Some(reason) = unavailable {
                tracing::warn!(
                    campaign_id = campaign.id,
                    batch_number,
                    sent = tally.sent,
                    failed = tally.failed,
                    reason = %reason,
                    "Transport went down mid-batch",
                );
                tally.interrupted = Some(reason);
                break;
            }
        }

        Ok(tally)
    }

    /// Build the personalised message for one recipient.
    async fn compose(
        &self,
        campaign: &Campaign,
        contact: Option<&Contact>,
    ) -> Result<Composed, DispatchError> {
        let Some(contact) = contact else {
            return Ok(Composed::Unsendable("Contact no longer exists".to_string()));
        };
        if !contact.subscribed {
            return Ok(Composed::Unsendable("Contact has unsubscribed".to_string()));
        }

        let variables = recipient_variables(
            &contact.email,
            contact.first_name.as_deref(),
            contact.last_name.as_deref(),
            self.public_base_url,
        );

        let template_slug = campaign
            .template_slug
            .as_deref()
            .filter(|slug| !slug.trim().is_empty());
        let html = match template_slug {
            Some(slug) => match self.renderer.render(slug, &variables, &campaign.locale).await {
                Ok(rendered) => rendered.html,
                Err(e) if e.is_campaign_wide() => {
                    return Err(DispatchError::TemplateUnavailable(e.to_string()));
                }
                Err(e) => return Ok(Composed::Unsendable(e.to_string())),
            },
            None => match campaign.html_body.as_deref() {
                Some(body) if !body.trim().is_empty() => replace_variables(body, &variables),
                _ => return Err(DispatchError::MissingContent),
            },
        };

        Ok(Composed::Ready(OutgoingEmail {
            to: contact.email.clone(),
            subject: replace_variables(&campaign.subject, &variables),
            html,
            from: campaign
                .from_email
                .as_deref()
                .map(|address| format_mailbox(campaign.from_name.as_deref(), address)),
            reply_to: campaign.reply_to.clone(),
        }))
    }

    async fn record(
        &self,
        recipient: &CampaignRecipient,
        outcome: RecipientOutcome,
        tally: &mut BatchTally,
    ) -> Result<(), DispatchError> {
        if !self.store.record_outcome(recipient, &outcome).await? {
            tracing::warn!(
                campaign_id = recipient.campaign_id,
                recipient_id = recipient.id,
                "Recipient already resolved, outcome discarded",
            );
            return Ok(());
        }
        match outcome {
            RecipientOutcome::Sent => tally.sent += 1,
            RecipientOutcome::Failed(_) => tally.failed += 1,
        }
        Ok(())
    }
}

fn transport_reason(err: SendError) -> String {
    match err {
        SendError::Unavailable(reason) | SendError::Rejected(reason) => reason,
    }
}
