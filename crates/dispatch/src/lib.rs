//! Throttled campaign dispatch engine.
//!
//! A campaign is prepared once (recipients resolved, partitioned into
//! fixed-size batches and persisted), then dispatched one batch per call.
//! [`engine::CampaignEngine`] owns the state machine and the single-flight
//! lock; [`orchestrator::Orchestrator`] drives sending campaigns server-side
//! at the configured cadence.
//!
//! Durable state lives behind [`store::CampaignStore`] and contacts behind
//! [`store::ContactDirectory`], with Postgres and in-memory implementations.

pub mod engine;
pub mod error;
pub mod executor;
pub mod lock;
pub mod memory;
pub mod orchestrator;
pub mod partitioner;
pub mod postgres;
pub mod resolver;
pub mod store;
pub mod throttle;

pub use engine::{
    BatchReport, CampaignEngine, CampaignProgress, DispatchOutcome, EngineSettings,
    PrepareReport, StatusChange,
};
pub use error::DispatchError;
pub use memory::{InMemoryCampaignStore, InMemoryDirectory};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use postgres::{PgCampaignStore, PgContactDirectory};
pub use store::{BatchPlan, CampaignStore, ContactDirectory, EnrollOutcome, StoreError};
pub use throttle::BatchThrottle;
