//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server needed.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use clinic_api::error::AppError;
use clinic_core::error::CoreError;
use clinic_db::models::status::CampaignStatus;
use clinic_dispatch::{DispatchError, StoreError};
use http_body_util::BodyExt;

/// Convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: core errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("Campaign name must not be empty".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "Campaign name must not be empty");
}

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::InternalError("smtp password in stack trace".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

// ---------------------------------------------------------------------------
// Test: engine errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_campaign_returns_404() {
    let (status, json) = error_to_response(DispatchError::NotFound(7).into()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Campaign 7 not found");
}

#[tokio::test]
async fn missing_group_returns_404() {
    let (status, json) = error_to_response(DispatchError::GroupNotFound(3).into()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn configuration_errors_return_400() {
    for err in [
        DispatchError::InvalidTargeting("no target".into()),
        DispatchError::InvalidBatchSize(0),
        DispatchError::MissingContent,
        DispatchError::EmptyRecipientSet,
    ] {
        let (status, json) = error_to_response(err.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn state_errors_return_409_conflict() {
    let (status, json) = error_to_response(
        DispatchError::InvalidTransition {
            action: "cancel",
            status: CampaignStatus::Sending,
        }
        .into(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert_eq!(json["error"], "Cannot cancel a campaign that is sending");

    let (status, json) = error_to_response(
        DispatchError::CampaignNotSending {
            status: CampaignStatus::Paused,
        }
        .into(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn dispatch_in_progress_returns_409_with_own_code() {
    let (status, json) = error_to_response(DispatchError::DispatchInProgress(1).into()).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "DISPATCH_IN_PROGRESS");
}

#[tokio::test]
async fn throttled_dispatch_returns_429() {
    let err = DispatchError::ThrottleActive {
        campaign_id: 4,
        retry_after_ms: 30_000,
    };

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["code"], "THROTTLED");
}

#[tokio::test]
async fn transport_unavailable_returns_503() {
    let err = DispatchError::TransportUnavailable("connection refused".into());

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "TRANSPORT_UNAVAILABLE");
}

#[tokio::test]
async fn template_unavailable_returns_422() {
    let err = DispatchError::TemplateUnavailable("Template not found: NEWSLETTER".into());

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "TEMPLATE_UNAVAILABLE");
}

#[tokio::test]
async fn store_errors_are_sanitized() {
    let err = DispatchError::Store(StoreError::Database(sqlx::Error::PoolTimedOut));

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn row_not_found_returns_404() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}
