//! Route definitions for the `/campaigns` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::campaigns;
use crate::state::AppState;

/// Routes mounted at `/campaigns`.
///
/// ```text
/// GET    /                    -> list_campaigns
/// POST   /                    -> create_campaign
/// GET    /{id}                -> get_campaign
/// PATCH  /{id}                -> update_campaign
/// DELETE /{id}                -> delete_campaign
/// GET    /{id}/recipients     -> list_recipients
/// GET    /{id}/activity       -> list_activity
/// POST   /{id}/prepare        -> prepare_campaign
/// POST   /{id}/dispatch       -> dispatch_batch
/// POST   /{id}/start          -> start_campaign
/// POST   /{id}/pause          -> pause_campaign
/// POST   /{id}/resume         -> resume_campaign
/// POST   /{id}/cancel         -> cancel_campaign
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route(
            "/{id}",
            get(campaigns::get_campaign)
                .patch(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route("/{id}/recipients", get(campaigns::list_recipients))
        .route("/{id}/activity", get(campaigns::list_activity))
        .route("/{id}/prepare", post(campaigns::prepare_campaign))
        .route("/{id}/dispatch", post(campaigns::dispatch_batch))
        .route("/{id}/start", post(campaigns::start_campaign))
        .route("/{id}/pause", post(campaigns::pause_campaign))
        .route("/{id}/resume", post(campaigns::resume_campaign))
        .route("/{id}/cancel", post(campaigns::cancel_campaign))
}
