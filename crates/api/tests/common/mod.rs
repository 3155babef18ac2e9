#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use clinic_core::mail::{
    MailTransport, OutgoingEmail, RenderError, RenderedEmail, SendError, TemplateRenderer,
};
use clinic_core::types::DbId;
use clinic_dispatch::{
    CampaignEngine, EngineSettings, InMemoryCampaignStore, InMemoryDirectory, Orchestrator,
    OrchestratorSettings,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

use clinic_api::config::ServerConfig;
use clinic_api::router::build_app_router;
use clinic_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Records sends; can reject addresses, be switched off or hold sends.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    rejected: Mutex<HashSet<String>>,
    down: AtomicBool,
    held: Mutex<Option<Arc<Notify>>>,
}

impl RecordingTransport {
    pub fn reject(&self, address: &str) {
        self.rejected.lock().unwrap().insert(address.to_string());
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Hold every send until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.held.lock().unwrap() = Some(release.clone());
        release
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn check_available(&self) -> Result<(), SendError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SendError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        let held = self.held.lock().unwrap().clone();
        if let Some(release) = held {
            release.notified().await;
        }
        if self.rejected.lock().unwrap().contains(&email.to) {
            return Err(SendError::Rejected("550 mailbox unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Knows no templates at all.
pub struct NoTemplates;

#[async_trait]
impl TemplateRenderer for NoTemplates {
    async fn render(
        &self,
        template_slug: &str,
        _variables: &BTreeMap<String, String>,
        _locale: &str,
    ) -> Result<RenderedEmail, RenderError> {
        Err(RenderError::TemplateNotFound(template_slug.to_string()))
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Handles on the in-memory collaborators behind a test app.
pub struct TestApp {
    pub router: Router,
    pub directory: Arc<InMemoryDirectory>,
    pub transport: Arc<RecordingTransport>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the full application router on in-memory collaborators, using the
/// same middleware stack as `main.rs`.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let directory = Arc::new(InMemoryDirectory::new());
    let transport = Arc::new(RecordingTransport::default());

    let engine = Arc::new(CampaignEngine::new(
        Arc::new(InMemoryCampaignStore::new()),
        directory.clone(),
        transport.clone(),
        Arc::new(NoTemplates),
        EngineSettings::default(),
    ));
    let orchestrator = Orchestrator::new(engine.clone(), OrchestratorSettings::default());

    let state = AppState {
        pool: None,
        config: Arc::new(config.clone()),
        engine,
        orchestrator: orchestrator.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        directory,
        transport,
        orchestrator,
    }
}

impl TestApp {
    /// A group of `count` subscribed contacts.
    pub async fn seed_group(&self, count: usize) -> DbId {
        let group_id = self.directory.add_group().await;
        for i in 0..count {
            let id = self
                .directory
                .add_contact(&format!("patient{i}@clinic.example"), Some("Pat"), None)
                .await;
            self.directory.add_member(group_id, id).await;
        }
        group_id
    }

    /// Create a draft campaign for `group_id` over HTTP and return its id.
    pub async fn create_campaign(&self, group_id: DbId, batch_size: i32) -> DbId {
        let response = post_json(
            self.router.clone(),
            "/api/v1/campaigns",
            serde_json::json!({
                "name": "Newsletter",
                "subject": "Hello {{firstName}}",
                "html_body": "<p>Hi {{recipientName}}</p>",
                "group_id": group_id,
                "batch_size": batch_size,
                "batch_interval_ms": 60000,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["data"]["id"].as_i64().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    json_request(app, Method::POST, uri, body).await
}

pub async fn patch_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    json_request(app, Method::PATCH, uri, body).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn json_request(app: Router, method: Method, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
