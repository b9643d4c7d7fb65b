use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::application::feed::FeedError;
use crate::application::render::RenderError;
use crate::application::signing::SigningError;
use crate::domain::error::DomainError;
use crate::infra::cache::CacheError;
use crate::infra::error::InfraError;
use crate::infra::platform::PlatformError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("content digest rejected")]
    ForbiddenDigest,
    #[error("upstream platform failure: {0}")]
    Upstream(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) | AppError::NotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::ForbiddenDigest => StatusCode::FORBIDDEN,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Domain(DomainError::Invariant { .. })
            | AppError::Infra(_)
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) | AppError::NotFound => {
                "Resource not found"
            }
            AppError::ForbiddenDigest => "Content digest rejected",
            AppError::Upstream(_) => "Upstream platform unavailable",
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                "Request could not be processed"
            }
            AppError::Domain(DomainError::Invariant { .. })
            | AppError::Infra(_)
            | AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound => AppError::NotFound,
            CacheError::Upstream(inner) => AppError::Upstream(inner.to_string()),
            CacheError::Io(inner) => AppError::Infra(InfraError::Io(inner)),
            CacheError::Index(inner) => AppError::unexpected(inner.to_string()),
        }
    }
}

impl From<PlatformError> for AppError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound => AppError::NotFound,
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::NotFound => AppError::NotFound,
            FeedError::Upstream(inner) => AppError::Upstream(inner.to_string()),
        }
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::unexpected(err.to_string())
    }
}

impl From<SigningError> for AppError {
    fn from(err: SigningError) -> Self {
        AppError::unexpected(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(target = "application::error", error = %self, "request failed");
        }
        (status, self.presentation_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::ForbiddenDigest.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Upstream("down".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(CacheError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
