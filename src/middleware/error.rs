//! Error response formatting
//!
//! Every failed request is answered with the same JSON shape: the stable
//! error code, the message, the response status and whether retrying can help.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, ResponseStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: String,
    pub message: String,
    pub status: ResponseStatus,
    /// ISO 8601 timestamp of the error
    pub timestamp: String,
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn from_billing_error(error: &BillingError) -> Self {
        let message = match error {
            // storage and internal details stay in the logs
            BillingError::Storage(_) | BillingError::Internal(_) => {
                "An internal server error occurred. Please try again later.".to_string()
            }
            other => other.to_string(),
        };

        Self {
            error: error.code().to_string(),
            message,
            status: error.status(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: error.is_retryable(),
        }
    }
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let status_code = StatusCode::from_u16(self.status().http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.code(),
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = %self,
                code = self.code(),
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        (status_code, Json(ErrorResponse::from_billing_error(&self))).into_response()
    }
}

/// Standard envelope for successful responses
pub fn success_response<T: Serialize>(data: T) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_from_billing_error() {
        let response = ErrorResponse::from_billing_error(&BillingError::ProjectNotFound);
        assert_eq!(response.error, "PROJECT_NOT_FOUND");
        assert_eq!(response.status, ResponseStatus::NotFound);
        assert!(!response.retryable);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let response =
            ErrorResponse::from_billing_error(&BillingError::Storage("pg: relation".to_string()));
        assert_eq!(response.error, "STORAGE_ERROR");
        assert!(!response.message.contains("pg"));
        assert!(response.retryable);
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            BillingError::SignatureInvalid.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BillingError::OrderNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BillingError::Internal("boom".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
