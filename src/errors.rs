use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Failures surfaced by the study service, mapped to HTTP responses at the edge.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),
}

/// Where an error happened, recorded alongside it in the log.
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Logs the error at a level matching its severity and builds the
    /// response envelope. Store failures are not echoed to the client.
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        let status = self.status_code();
        let message = match &self {
            ApiError::NotFound(detail) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                detail.clone()
            }
            ApiError::ValidationError(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Validation error"
                );
                self.to_string()
            }
            ApiError::Unauthorized(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Unauthorized request"
                );
                self.to_string()
            }
            ApiError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                "Database operation failed. Please try again.".to_string()
            }
        };

        (status, Json(ApiResponse::error(message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("review_card", "progress").with_id("123");

        assert_eq!(context.operation, "review_card");
        assert_eq!(context.resource_type, "progress");
        assert_eq!(context.resource_id, Some("123".to_string()));
    }

    #[test]
    fn test_api_error_responses() {
        let error = ApiError::NotFound("progress not found".to_string());
        let context = ErrorContext::new("review_card", "progress").with_id("123");
        let (status, Json(body)) = error.to_response_with_context(context);

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.success);
        assert_eq!(body.error.as_deref(), Some("progress not found"));

        let error = ApiError::ValidationError("Invalid rating".to_string());
        let context = ErrorContext::new("review_card", "progress");
        let (status, _) = error.to_response_with_context(context);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let error = ApiError::Unauthorized("missing user".to_string());
        let context = ErrorContext::new("list_contests", "contest");
        let (status, _) = error.to_response_with_context(context);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_database_errors_are_not_leaked() {
        let error = ApiError::from(anyhow::anyhow!("no such table: user_progress"));
        let (status, Json(body)) =
            error.to_response_with_context(ErrorContext::new("todays_cards", "contest"));

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body.error.unwrap();
        assert!(!message.contains("user_progress"));
    }
}
