use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use tracing::{debug, error};

use crate::schema::ValidationError;

/// Errors surfaced by the HTTP layer. Nothing is retried: each variant maps
/// straight to a status code and a `{ success: false, message }` body.
#[derive(Debug)]
pub enum AppError {
    Validation(Vec<ValidationError>),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Persistence(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(errors) => {
                let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "Validation failed: {}", details.join("; "))
            }
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Persistence(err) => write!(f, "Storage error: {:#}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Persistence(err)
    }
}

impl From<Vec<ValidationError>> for AppError {
    fn from(errors: Vec<ValidationError>) -> Self {
        AppError::Validation(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::Validation(errors) => {
                debug!(error = %self, "Rejected invalid input");
                json!({
                    "success": false,
                    "message": self.to_string(),
                    "errors": errors,
                })
            }
            AppError::Persistence(err) => {
                // Storage details stay in the log
                error!(error = %format!("{:#}", err), "Storage failure");
                json!({
                    "success": false,
                    "message": "Internal server error",
                })
            }
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => {
                debug!(status = %status, message = %msg, "Request failed");
                json!({
                    "success": false,
                    "message": msg,
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn field_error(field: &str) -> ValidationError {
        ValidationError {
            field: field.to_string(),
            message: "Required field is missing".to_string(),
        }
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::Validation(vec![field_error("month"), field_error("year")]);
        assert_eq!(
            err.to_string(),
            "Validation failed: month: Required field is missing; year: Required field is missing"
        );

        let err = AppError::NotFound("Revenue record not found".to_string());
        assert_eq!(err.to_string(), "Not found: Revenue record not found");

        let err = AppError::Persistence(anyhow!("disk full").context("Failed to insert"));
        assert_eq!(err.to_string(), "Storage error: Failed to insert: disk full");
    }

    #[test]
    fn test_app_error_status_codes() {
        let cases = vec![
            (AppError::Validation(vec![field_error("revenue")]), StatusCode::BAD_REQUEST),
            (AppError::BadRequest("bad".to_string()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("who".to_string()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("no".to_string()), StatusCode::FORBIDDEN),
            (AppError::NotFound("gone".to_string()), StatusCode::NOT_FOUND),
            (AppError::Persistence(anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_persistence_error_body_hides_details() {
        let err = AppError::Persistence(
            anyhow!("no such table: revenue_records").context("Failed to list revenue records"),
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({ "success": false, "message": "Internal server error" })
        );
    }

    #[test]
    fn test_app_error_from_conversions() {
        let err: AppError = anyhow!("locked").into();
        assert!(matches!(err, AppError::Persistence(_)));

        let err: AppError = vec![field_error("month")].into();
        assert!(matches!(err, AppError::Validation(ref e) if e.len() == 1));
    }
}
