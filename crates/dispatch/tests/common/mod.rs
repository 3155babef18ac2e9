#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clinic_core::mail::{
    replace_variables, MailTransport, OutgoingEmail, RenderError, RenderedEmail, SendError,
    TemplateRenderer,
};
use clinic_core::types::DbId;
use clinic_db::models::campaign::{Campaign, CreateCampaign};
use clinic_dispatch::{CampaignEngine, EngineSettings, InMemoryCampaignStore, InMemoryDirectory};

// ---------------------------------------------------------------------------
// Fake transport
// ---------------------------------------------------------------------------

/// Records every delivered message. Can reject chosen addresses, be switched
/// off, or go down after a number of successful sends.
#[derive(Default)]
pub struct FakeTransport {
    delivered: Mutex<Vec<OutgoingEmail>>,
    rejected: Mutex<HashSet<String>>,
    down: AtomicBool,
    down_after: Mutex<Option<usize>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject(&self, address: &str) {
        self.rejected.lock().unwrap().insert(address.to_string());
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
        if !down {
            *self.down_after.lock().unwrap() = None;
        }
    }

    /// Accept `count` more messages, then report the server unreachable.
    pub fn go_down_after(&self, count: usize) {
        let already = self.delivered.lock().unwrap().len();
        *self.down_after.lock().unwrap() = Some(already + count);
    }

    pub fn delivered(&self) -> Vec<OutgoingEmail> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_to(&self) -> Vec<String> {
        self.delivered().into_iter().map(|e| e.to).collect()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn check_available(&self) -> Result<(), SendError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SendError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SendError::Unavailable("connection refused".to_string()));
        }
        let mut delivered = self.delivered.lock().unwrap();
        if let Some(limit) = *self.down_after.lock().unwrap() {
            if delivered.len() >= limit {
                self.down.store(true, Ordering::SeqCst);
                return Err(SendError::Unavailable("connection reset".to_string()));
            }
        }
        if self.rejected.lock().unwrap().contains(&email.to) {
            return Err(SendError::Rejected(format!("550 5.1.1 <{}> unknown", email.to)));
        }
        delivered.push(email.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake renderer
// ---------------------------------------------------------------------------

/// Renders templates held in a map keyed by slug.
#[derive(Default)]
pub struct FakeRenderer {
    templates: Mutex<HashMap<String, String>>,
}

impl FakeRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, slug: &str, html: &str) {
        self.templates
            .lock()
            .unwrap()
            .insert(slug.to_string(), html.to_string());
    }
}

#[async_trait]
impl TemplateRenderer for FakeRenderer {
    async fn render(
        &self,
        template_slug: &str,
        variables: &BTreeMap<String, String>,
        _locale: &str,
    ) -> Result<RenderedEmail, RenderError> {
        let html = self
            .templates
            .lock()
            .unwrap()
            .get(template_slug)
            .cloned()
            .ok_or_else(|| RenderError::TemplateNotFound(template_slug.to_string()))?;
        Ok(RenderedEmail {
            subject: String::new(),
            html: replace_variables(&html, variables),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub const BASE_URL: &str = "https://clinic.example";

/// Engine wired to in-memory collaborators the test can poke at.
pub struct Harness {
    pub engine: Arc<CampaignEngine>,
    pub store: Arc<InMemoryCampaignStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub transport: Arc<FakeTransport>,
    pub renderer: Arc<FakeRenderer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_transport(FakeTransport::new())
    }

    pub fn with_transport(transport: Arc<FakeTransport>) -> Self {
        let store = Arc::new(InMemoryCampaignStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let renderer = FakeRenderer::new();
        let engine = Arc::new(CampaignEngine::new(
            store.clone(),
            directory.clone(),
            transport.clone(),
            renderer.clone(),
            EngineSettings {
                send_concurrency: 1,
                public_base_url: BASE_URL.to_string(),
            },
        ));
        Self {
            engine,
            store,
            directory,
            transport,
            renderer,
        }
    }

    /// A group of `count` subscribed contacts named `patient{i}`.
    pub async fn seed_group(&self, count: usize) -> (DbId, Vec<DbId>) {
        let group_id = self.directory.add_group().await;
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let first = format!("Patient{i}");
            let id = self
                .directory
                .add_contact(&email_for(i), Some(&first), Some("Lee"))
                .await;
            self.directory.add_member(group_id, id).await;
            ids.push(id);
        }
        (group_id, ids)
    }

    /// Draft campaign targeting `group_id` with an inline body.
    pub async fn campaign_for_group(
        &self,
        group_id: DbId,
        batch_size: i32,
        batch_interval_ms: i64,
    ) -> Campaign {
        self.engine
            .create_campaign(CreateCampaign {
                name: "Newsletter".to_string(),
                subject: "News for {{firstName}}".to_string(),
                html_body: Some(
                    "<p>Hi {{recipientName}}</p><a href=\"{{unsubscribeUrl}}\">unsubscribe</a>"
                        .to_string(),
                ),
                group_id: Some(group_id),
                batch_size: Some(batch_size),
                batch_interval_ms: Some(batch_interval_ms),
                ..Default::default()
            })
            .await
            .unwrap()
    }
}

pub fn email_for(i: usize) -> String {
    format!("patient{i}@clinic.example")
}
