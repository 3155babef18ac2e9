use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clinic_core::error::CoreError;
use clinic_dispatch::{DispatchError, StoreError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`DispatchError`] and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `clinic_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An engine error from `clinic_dispatch`.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Dispatch(err) => classify_dispatch_error(err),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Map engine errors onto the HTTP contract.
///
/// - Missing campaign or group: 404.
/// - Configuration problems: 400 `VALIDATION_ERROR`.
/// - Wrong lifecycle state: 409 `CONFLICT`.
/// - Concurrent dispatch: 409 `DISPATCH_IN_PROGRESS`.
/// - Batch interval not yet elapsed: 429 `THROTTLED`.
/// - Mail server down: 503, template missing: 422. Both are safe to retry.
fn classify_dispatch_error(err: &DispatchError) -> Classified {
    let message = err.to_string();
    match err {
        DispatchError::NotFound(_) | DispatchError::GroupNotFound(_) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", message)
        }
        DispatchError::InvalidTargeting(_)
        | DispatchError::InvalidBatchSize(_)
        | DispatchError::MissingContent
        | DispatchError::EmptyRecipientSet => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
        }
        DispatchError::InvalidTransition { .. } | DispatchError::CampaignNotSending { .. } => {
            (StatusCode::CONFLICT, "CONFLICT", message)
        }
        DispatchError::DispatchInProgress(_) => {
            (StatusCode::CONFLICT, "DISPATCH_IN_PROGRESS", message)
        }
        DispatchError::ThrottleActive { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, "THROTTLED", message)
        }
        DispatchError::TransportUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "TRANSPORT_UNAVAILABLE",
            message,
        ),
        DispatchError::TemplateUnavailable(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "TEMPLATE_UNAVAILABLE",
            message,
        ),
        DispatchError::Core(core) => classify_core_error(core),
        DispatchError::Store(StoreError::Database(db)) => classify_sqlx_error(db),
        DispatchError::Store(other) => {
            tracing::error!(error = %other, "Store error");
            internal()
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> Classified {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
