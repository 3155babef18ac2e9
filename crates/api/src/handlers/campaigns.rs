//! Handlers for the `/campaigns` resource.
//!
//! Lifecycle endpoints go through [`clinic_dispatch::CampaignEngine`]; the
//! ones that change whether a campaign should be sending also start or stop
//! its server-side driver.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clinic_core::types::DbId;
use clinic_db::models::campaign::{CampaignListQuery, CreateCampaign, UpdateCampaign};
use clinic_db::models::campaign_recipient::RecipientListQuery;
use clinic_dispatch::{CampaignProgress, PrepareReport};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Progress view plus what the server is doing with the campaign right now.
#[derive(Debug, Serialize)]
pub struct CampaignView {
    #[serde(flatten)]
    pub progress: CampaignProgress,
    /// A server-side driver owns the campaign.
    pub driver_active: bool,
    /// A batch is being sent at this moment.
    pub dispatching: bool,
}

/// Result of `POST /campaigns/{id}/start`.
#[derive(Debug, Serialize)]
pub struct StartReport {
    #[serde(flatten)]
    pub prepared: PrepareReport,
    /// `false` when a driver was already running.
    pub driver_started: bool,
}

/// Query parameters for `GET /campaigns/{id}/activity`.
#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// POST /api/v1/campaigns
///
/// Create a campaign in `draft`. Returns 201 with the created row.
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(input): Json<CreateCampaign>,
) -> AppResult<impl IntoResponse> {
    let campaign = state.engine.create_campaign(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: campaign })))
}

/// GET /api/v1/campaigns
///
/// List campaigns, newest first. Supports an optional `status` name filter.
pub async fn list_campaigns(
    State(state): State<AppState>,
    Query(params): Query<CampaignListQuery>,
) -> AppResult<impl IntoResponse> {
    let campaigns = state.engine.list_campaigns(params.status.as_deref()).await?;
    Ok(Json(DataResponse { data: campaigns }))
}

/// GET /api/v1/campaigns/{id}
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let progress = state.engine.progress(id).await?;
    Ok(Json(DataResponse {
        data: CampaignView {
            progress,
            driver_active: state.orchestrator.is_driving(id),
            dispatching: state.engine.is_dispatching(id),
        },
    }))
}

/// PATCH /api/v1/campaigns/{id}
///
/// Partial update. Once sending, only `name` and the batch interval may change.
pub async fn update_campaign(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateCampaign>,
) -> AppResult<impl IntoResponse> {
    let campaign = state.engine.update_campaign(id, input).await?;
    Ok(Json(DataResponse { data: campaign }))
}

/// DELETE /api/v1/campaigns/{id}
///
/// Returns 204. Refused with 409 while the campaign is sending.
pub async fn delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.engine.delete_campaign(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Progress logs
// ---------------------------------------------------------------------------

/// GET /api/v1/campaigns/{id}/recipients
pub async fn list_recipients(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<RecipientListQuery>,
) -> AppResult<impl IntoResponse> {
    let recipients = state.engine.list_recipients(id, &params).await?;
    Ok(Json(DataResponse { data: recipients }))
}

/// GET /api/v1/campaigns/{id}/activity
pub async fn list_activity(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<ActivityQuery>,
) -> AppResult<impl IntoResponse> {
    let activity = state.engine.list_activity(id, params.limit).await?;
    Ok(Json(DataResponse { data: activity }))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// POST /api/v1/campaigns/{id}/prepare
///
/// Enroll recipients and move the campaign to `sending`. Idempotent.
pub async fn prepare_campaign(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let report = state.engine.prepare(id).await?;
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/campaigns/{id}/dispatch
///
/// Send exactly one batch, for clients that drive the cadence themselves.
/// Returns 409 `DISPATCH_IN_PROGRESS` if another dispatch holds the campaign
/// and 429 `THROTTLED` if the batch interval has not yet elapsed.
///
/// The batch runs on its own task so a request timeout or client disconnect
/// cannot stop it between a send and the write recording it.
pub async fn dispatch_batch(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let engine = state.engine.clone();
    let outcome = tokio::spawn(async move { engine.dispatch(id).await })
        .await
        .map_err(|e| AppError::InternalError(format!("Dispatch task failed: {e}")))??;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/campaigns/{id}/start
///
/// Prepare (idempotent) and hand the campaign to the server-side driver.
pub async fn start_campaign(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let prepared = state.engine.prepare(id).await?;
    let driver_started = state.orchestrator.start(id);
    tracing::info!(campaign_id = id, driver_started, "Campaign start requested");
    Ok(Json(DataResponse {
        data: StartReport {
            prepared,
            driver_started,
        },
    }))
}

/// POST /api/v1/campaigns/{id}/pause
pub async fn pause_campaign(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let change = state.engine.pause(id).await?;
    state.orchestrator.stop(id);
    Ok(Json(DataResponse { data: change }))
}

/// POST /api/v1/campaigns/{id}/resume
pub async fn resume_campaign(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let change = state.engine.resume(id).await?;
    state.orchestrator.start(id);
    Ok(Json(DataResponse { data: change }))
}

/// POST /api/v1/campaigns/{id}/cancel
pub async fn cancel_campaign(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let change = state.engine.cancel(id).await?;
    state.orchestrator.stop(id);
    Ok(Json(DataResponse { data: change }))
}
