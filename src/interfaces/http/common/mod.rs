//! Shared HTTP building blocks: the response envelope and the validating
//! JSON extractor.

pub mod validated_json;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::SimulatorError;

pub use validated_json::ValidatedJson;

/// Standard API response wrapper
///
/// Success: `{"success": true, "data": {...}}`,
/// failure: `{"success": false, "data": null, "error": "..."}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Error half of every handler result.
pub type ApiError<T> = (StatusCode, Json<ApiResponse<T>>);

/// HTTP status for a simulator error.
pub fn error_status(error: &SimulatorError) -> StatusCode {
    match error {
        SimulatorError::AlreadyExists(_)
        | SimulatorError::NoActiveConnection(_)
        | SimulatorError::TransactionAlreadyActive(_)
        | SimulatorError::NoActiveTransaction(_) => StatusCode::CONFLICT,
        SimulatorError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn api_error<T>(error: SimulatorError) -> ApiError<T> {
    (error_status(&error), Json(ApiResponse::error(error.to_string())))
}
