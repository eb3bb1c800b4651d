//! Error handling - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode, http::header};
use quill_core::DomainError;
use quill_shared::ErrorResponse;
use std::fmt;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Forbidden,
    SlugConflict(String),
    RateLimited { retry_after_secs: u64 },
    Unavailable(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Forbidden => write!(f, "Forbidden"),
            AppError::SlugConflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited, retry after {}s", retry_after_secs)
            }
            AppError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::SlugConflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::NotFound(detail) => ErrorResponse::not_found(detail),
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::Forbidden => ErrorResponse::forbidden(),
            AppError::SlugConflict(detail) => ErrorResponse::slug_conflict(detail),
            AppError::RateLimited { retry_after_secs } => {
                return too_many_requests(*retry_after_secs, None);
            }
            AppError::Unavailable(detail) => {
                tracing::error!("Storage unavailable: {}", detail);
                ErrorResponse::service_unavailable()
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                ErrorResponse::internal_error()
            }
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

/// 429 with `Retry-After`, shared with the rate-limit middleware.
pub fn too_many_requests(retry_after_secs: u64, request_id: Option<&str>) -> HttpResponse {
    let mut error = ErrorResponse::too_many_requests(retry_after_secs);
    if let Some(id) = request_id {
        error = error.with_request_id(id);
    }
    HttpResponse::TooManyRequests()
        .insert_header((header::RETRY_AFTER, retry_after_secs.to_string()))
        .json(error)
}

// Conversion from domain errors
impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity_type, key } => {
                AppError::NotFound(format!("{} '{}' not found", entity_type, key))
            }
            DomainError::Conflict { entity_type, slug } => AppError::SlugConflict(format!(
                "A {} with slug '{}' already exists. Please choose a different slug.",
                entity_type, slug
            )),
            DomainError::Forbidden => AppError::Forbidden,
            DomainError::StorageUnavailable(msg) => AppError::Unavailable(msg),
            DomainError::RateLimited { retry_after } => AppError::RateLimited {
                retry_after_secs: (retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0))
                    .max(1),
            },
            DomainError::Validation(msg) => AppError::BadRequest(msg),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use std::time::Duration;

    async fn body_json(response: HttpResponse) -> serde_json::Value {
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_rt::test]
    async fn test_conflict_asks_for_another_slug() {
        let err = AppError::from(DomainError::Conflict {
            entity_type: "post",
            slug: "hello".to_string(),
        });

        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["type"], "/problems/slug-conflict");
        assert!(
            body["detail"]
                .as_str()
                .unwrap()
                .contains("choose a different slug")
        );
    }

    #[actix_rt::test]
    async fn test_rate_limited_sets_retry_after() {
        let err = AppError::from(DomainError::RateLimited {
            retry_after: Duration::from_millis(200),
        });

        let response = err.error_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
        let body = body_json(response).await;
        assert_eq!(body["title"], "Too Many Requests");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(DomainError::StorageUnavailable("down".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(DomainError::Validation("Title is required".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(DomainError::Forbidden).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(DomainError::not_found("post", "x")).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
