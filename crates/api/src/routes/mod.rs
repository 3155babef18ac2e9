pub mod campaigns;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /campaigns                        list, create
/// /campaigns/{id}                   progress, update, delete
/// /campaigns/{id}/recipients        recipient status log
/// /campaigns/{id}/activity          activity log
/// /campaigns/{id}/prepare           enroll recipients (POST)
/// /campaigns/{id}/dispatch          send one batch (POST)
/// /campaigns/{id}/start             prepare and hand to the driver (POST)
/// /campaigns/{id}/pause             pause (POST)
/// /campaigns/{id}/resume            resume (POST)
/// /campaigns/{id}/cancel            cancel (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/campaigns", campaigns::router())
}
