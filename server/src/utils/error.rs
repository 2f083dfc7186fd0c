use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::ticket::TicketCategory;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Not eligible: {0}")]
    NotEligible(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Immutable: {0}")]
    Immutable(String),

    #[error("Insufficient quota: requested {requested}, remaining {remaining}")]
    InsufficientQuota { requested: i32, remaining: i32 },

    #[error("Total quota ({requested_total}) exceeds venue capacity ({capacity})")]
    CapacityExceeded { requested_total: i64, capacity: i32 },

    #[error("Ticket type '{0}' already exists for this event")]
    DuplicateCategory(TicketCategory),

    #[error("Event is not bookable: {0}")]
    EventNotBookable(String),

    #[error("Quota ({quota}) cannot be less than sold quantity ({sold})")]
    BelowSold { quota: i32, sold: i32 },

    #[error("Ticket type cannot be deleted: {0} unit(s) already sold")]
    HasSales(i32),

    #[error("Schedule conflict: {0}")]
    Conflict(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Remote service rejected the request: {message}")]
    RemoteRejected {
        code: Option<String>,
        message: String,
    },

    #[error("Confirmation failed: {0}")]
    ConfirmationFailed(String),

    #[error("Compensation failed: {0}")]
    CompensationFailed(String),

    #[error("Event {event_id} was saved but schedule sync failed: {message}")]
    SyncFailed { event_id: Uuid, message: String },

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotEligible(_)
            | AppError::InvalidState(_)
            | AppError::Immutable(_)
            | AppError::InsufficientQuota { .. }
            | AppError::CapacityExceeded { .. }
            | AppError::DuplicateCategory(_)
            | AppError::EventNotBookable(_)
            | AppError::BelowSold { .. }
            | AppError::HasSales(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RemoteRejected { .. }
            | AppError::ConfirmationFailed(_)
            | AppError::CompensationFailed(_)
            | AppError::SyncFailed { .. } => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NotEligible(_) => "NOT_ELIGIBLE",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Immutable(_) => "IMMUTABLE",
            AppError::InsufficientQuota { .. } => "INSUFFICIENT_QUOTA",
            AppError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            AppError::DuplicateCategory(_) => "DUPLICATE_CATEGORY",
            AppError::EventNotBookable(_) => "EVENT_NOT_BOOKABLE",
            AppError::BelowSold { .. } => "BELOW_SOLD",
            AppError::HasSales(_) => "HAS_SALES",
            AppError::Conflict(_) => "SCHEDULE_CONFLICT",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::RemoteRejected { .. } => "REMOTE_REJECTED",
            AppError::ConfirmationFailed(_) => "CONFIRMATION_FAILED",
            AppError::CompensationFailed(_) => "COMPENSATION_FAILED",
            AppError::SyncFailed { .. } => "SYNC_FAILED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Structured payload attached to the error envelope, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::InsufficientQuota {
                requested,
                remaining,
            } => Some(json!({ "requested": requested, "remaining": remaining })),
            AppError::CapacityExceeded {
                requested_total,
                capacity,
            } => Some(json!({ "requestedTotal": requested_total, "capacity": capacity })),
            AppError::RemoteRejected {
                code: Some(code), ..
            } => Some(json!({ "remoteCode": code })),
            AppError::SyncFailed { event_id, .. } => Some(json!({ "eventId": event_id })),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            AppError::SyncFailed { event_id, message } => {
                warn!(%event_id, message = %message, "Local commit diverged from schedule authority");
            }
            AppError::Database(e) => {
                error!(error = ?e, "Database error");
            }
            other if other.status_code().is_server_error() => {
                error!(code = other.code(), error = %other, "Application error");
            }
            other => {
                info!(code = other.code(), error = %other, "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        let public_message = match &self {
            AppError::Database(_) => "A database error occurred".to_string(),
            other => other.to_string(),
        };

        error_response(code, public_message, self.details(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_errors_are_conflicts() {
        let err = AppError::InsufficientQuota {
            requested: 2,
            remaining: 1,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "INSUFFICIENT_QUOTA");
        assert_eq!(err.details(), Some(json!({ "requested": 2, "remaining": 1 })));
    }

    #[test]
    fn test_sync_failed_carries_event_id() {
        let event_id = Uuid::new_v4();
        let err = AppError::SyncFailed {
            event_id,
            message: "timeout".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.details(), Some(json!({ "eventId": event_id })));
    }

    #[test]
    fn test_database_error_is_not_exposed() {
        let response = AppError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
