use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failure of one clustering step. The clusterer maps every variant to the
/// empty result; none of these reach the HTTP caller.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("no terms remain after document-frequency pruning")]
    EmptyVocabulary,
    #[error("numerical failure: {0}")]
    Numerical(String),
    #[error("clustering backend failed: {0}")]
    Backend(String),
}

impl ClusterError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::EmptyVocabulary => "empty_vocabulary",
            Self::Numerical(_) => "numerical",
            Self::Backend(_) => "backend",
        }
    }
}

/// Model loading failures are cached per model id, so the error is `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("backend not compiled into this build: {0}")]
    Unavailable(String),
    #[error("failed to fetch model files for {model}: {reason}")]
    Fetch { model: String, reason: String },
    #[error("invalid model {model}: {reason}")]
    Invalid { model: String, reason: String },
}

impl LoadError {
    /// Fetch failures may clear up on a later attempt; the rest will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

#[derive(Debug, Error)]
#[error("inference failed: {0}")]
pub struct InferenceError(pub String);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request")]
    Validation(Vec<String>),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response(),
        }
    }
}
