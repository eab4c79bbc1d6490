use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::errors::{AccountingError, FleetError, SnapshotError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorNumber {
    InvalidOwner = 1,
    InvalidFilter = 2,
    NotFound = 3,
    StoreUnavailable = 4,
    MalformedInterval = 5,
    Overflow = 6,
    InternalError = 7,
}

#[derive(Debug)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub code: ErrorNumber,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, code: ErrorNumber, message: String) -> Self {
        Self { status, code, message }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error_code": self.code as u32,
                "message": self.message
            })),
        )
            .into_response()
    }
}

impl From<AccountingError> for ErrorResponse {
    fn from(error: AccountingError) -> Self {
        let (status, code) = match &error {
            AccountingError::InvalidOwner => (StatusCode::BAD_REQUEST, ErrorNumber::InvalidOwner),
            AccountingError::LedgerUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorNumber::StoreUnavailable)
            }
            AccountingError::MalformedInterval { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorNumber::MalformedInterval)
            }
            AccountingError::Overflow { .. } => (StatusCode::INTERNAL_SERVER_ERROR, ErrorNumber::Overflow),
        };
        Self::new(status, code, error.to_string())
    }
}

impl From<SnapshotError> for ErrorResponse {
    fn from(error: SnapshotError) -> Self {
        let (status, code) = match &error {
            SnapshotError::NotFound { .. } => (StatusCode::NOT_FOUND, ErrorNumber::NotFound),
            SnapshotError::StoreUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorNumber::StoreUnavailable)
            }
        };
        Self::new(status, code, error.to_string())
    }
}

impl From<FleetError> for ErrorResponse {
    fn from(error: FleetError) -> Self {
        match error {
            FleetError::Accounting(e) => e.into(),
            FleetError::Snapshot(e) => e.into(),
            FleetError::Config(e) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorNumber::InternalError,
                e.to_string(),
            ),
        }
    }
}
