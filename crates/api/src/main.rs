use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clinic_core::mail::MailTransport;
use clinic_dispatch::{CampaignEngine, Orchestrator, PgCampaignStore, PgContactDirectory};
use clinic_mail::{DbTemplateRenderer, DisabledTransport, EmailConfig, SmtpMailer};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_api::config::{DispatchSettings, ServerConfig};
use clinic_api::router::build_app_router;
use clinic_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "clinic_api=debug,clinic_dispatch=debug,clinic_mail=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let dispatch = DispatchSettings::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        send_concurrency = dispatch.send_concurrency,
        sweep_interval_secs = dispatch.sweep_interval_secs,
        retry_backoff_secs = dispatch.retry_backoff_secs,
        public_base_url = %dispatch.public_base_url,
        "Loaded dispatch configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = clinic_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    clinic_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    clinic_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Mail transport ---
    let transport: Arc<dyn MailTransport> = match EmailConfig::from_env() {
        Some(email_config) => {
            let mailer = SmtpMailer::new(&email_config).expect("Invalid SMTP configuration");
            tracing::info!(
                smtp_host = %email_config.smtp_host,
                smtp_port = email_config.smtp_port,
                "SMTP transport configured",
            );
            Arc::new(mailer)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, campaign sends will report the transport unavailable");
            Arc::new(DisabledTransport)
        }
    };

    // --- Campaign engine and drivers ---
    let engine = Arc::new(CampaignEngine::new(
        Arc::new(PgCampaignStore::new(pool.clone())),
        Arc::new(PgContactDirectory::new(pool.clone())),
        transport,
        Arc::new(DbTemplateRenderer::new(pool.clone())),
        dispatch.engine(),
    ));
    let orchestrator = Orchestrator::new(Arc::clone(&engine), dispatch.orchestrator());

    // Adopts every sending campaign on its first tick, then sweeps periodically.
    let orchestrator_cancel = CancellationToken::new();
    let orchestrator_handle = tokio::spawn(
        Arc::clone(&orchestrator).run(orchestrator_cancel.clone()),
    );
    tracing::info!("Campaign orchestrator started");

    // --- App state ---
    let state = AppState {
        pool: Some(pool),
        config: Arc::new(config.clone()),
        engine,
        orchestrator,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Cancels driver waits; batches already sending finish first.
    orchestrator_cancel.cancel();
    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(timeout, orchestrator_handle).await.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Campaign drivers did not finish before the shutdown timeout",
        );
    } else {
        tracing::info!("Campaign orchestrator stopped");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
