use std::time::Duration;

use clinic_dispatch::{EngineSettings, OrchestratorSettings};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on waiting for in-flight batches at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_u64("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_u64("SHUTDOWN_TIMEOUT_SECS", 30),
        }
    }
}

/// Campaign engine and driver tunables.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Concurrent sends inside one batch (default: `1`).
    pub send_concurrency: usize,
    /// Seconds between recovery sweeps for orphaned `sending` campaigns (default: `60`).
    pub sweep_interval_secs: u64,
    /// Seconds a driver backs off after a retryable failure (default: `30`).
    pub retry_backoff_secs: u64,
    /// Base URL for unsubscribe links (default: `http://localhost:3000`).
    pub public_base_url: String,
}

impl DispatchSettings {
    /// Load dispatch settings from environment variables with defaults.
    ///
    /// | Env Var                        | Default                  |
    /// |--------------------------------|--------------------------|
    /// | `CAMPAIGN_SEND_CONCURRENCY`    | `1`                      |
    /// | `CAMPAIGN_SWEEP_INTERVAL_SECS` | `60`                     |
    /// | `CAMPAIGN_RETRY_BACKOFF_SECS`  | `30`                     |
    /// | `PUBLIC_BASE_URL`              | `http://localhost:3000`  |
    pub fn from_env() -> Self {
        let send_concurrency: usize = std::env::var("CAMPAIGN_SEND_CONCURRENCY")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("CAMPAIGN_SEND_CONCURRENCY must be a valid usize");

        Self {
            send_concurrency: send_concurrency.max(1),
            sweep_interval_secs: env_u64("CAMPAIGN_SWEEP_INTERVAL_SECS", 60).max(1),
            retry_backoff_secs: env_u64("CAMPAIGN_RETRY_BACKOFF_SECS", 30),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
        }
    }

    pub fn engine(&self) -> EngineSettings {
        EngineSettings {
            send_concurrency: self.send_concurrency,
            public_base_url: self.public_base_url.clone(),
        }
    }

    pub fn orchestrator(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}
