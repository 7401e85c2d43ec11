//! Service-level errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    /// Store, identity or object-storage call failed.
    #[error("remote failure: {0}")]
    Remote(#[source] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn remote(err: impl Into<anyhow::Error>) -> Self {
        Self::Remote(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Remote(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, id } => {
                Self::NotFound(format!("{} {id} not found", entity_name(&collection)))
            }
            StoreError::AlreadyExists { collection, id } => {
                Self::Conflict(format!("{} {id} already exists", entity_name(&collection)))
            }
            StoreError::VersionConflict { .. } => {
                Self::Conflict("record was modified concurrently, please retry".into())
            }
            StoreError::Invalid(msg) => Self::Validation(msg),
            e @ StoreError::Decode { .. } => Self::Remote(e.into()),
            StoreError::Remote(e) => Self::Remote(e),
        }
    }
}

fn entity_name(collection: &str) -> &str {
    match collection.rsplit('/').next().unwrap_or(collection) {
        "causes" => "cause",
        "products" => "product",
        "users" => "user",
        "comments" => "comment",
        "credentials" => "account",
        other => other,
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Remote(e) => {
                error!(error = %e, "remote failure");
                "upstream service unavailable".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(ErrorBody {
                status: "error",
                message: &message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let e: AppError = StoreError::not_found("causes", "c1").into();
        assert!(matches!(e, AppError::NotFound(ref m) if m == "cause c1 not found"));
        assert_eq!(e.status(), StatusCode::NOT_FOUND);

        let e: AppError = StoreError::version_conflict("causes", "c1", 1, 2).into();
        assert_eq!(e.status(), StatusCode::CONFLICT);

        let e: AppError = StoreError::remote(anyhow::anyhow!("timeout")).into();
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn nested_collections_use_leaf_name() {
        assert_eq!(entity_name("causes/abc/comments"), "comment");
    }

    #[tokio::test]
    async fn remote_details_are_not_exposed() {
        let resp = AppError::remote(anyhow::anyhow!("password=hunter2")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("\"status\":\"error\""));
    }
}
