//! HTTP-facing errors.

use crate::archive::ArchiveError;
use crate::error::PipelineError;
use crate::output::ArtifactKind;
use crate::pipeline::Step;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    // ── Upload ───────────────────────────────────────────────────────────
    #[error("Malformed multipart upload: {0}")]
    InvalidUpload(String),

    #[error("No 'file' field in upload")]
    MissingFile,

    #[error("Upload has no usable file name")]
    InvalidFileName,

    #[error("Invalid value for embed_images: '{0}'")]
    InvalidFlag(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    // ── Download ─────────────────────────────────────────────────────────
    #[error("No session cookie")]
    MissingSession,

    #[error("Session not found or expired")]
    SessionNotFound,

    #[error("Artifact not available: {0}")]
    ArtifactNotFound(String),

    #[error("Could not build bundle: {0}")]
    Bundle(#[from] ArchiveError),

    // ── Other ────────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
}

impl ApiError {
    pub fn artifact(kind: ArtifactKind) -> Self {
        ApiError::ArtifactNotFound(kind.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidUpload(_)
            | ApiError::MissingFile
            | ApiError::InvalidFileName
            | ApiError::InvalidFlag(_)
            | ApiError::MissingSession => StatusCode::BAD_REQUEST,
            ApiError::SessionNotFound | ApiError::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Pipeline(_)
            | ApiError::Bundle(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidUpload(_) => "INVALID_UPLOAD",
            ApiError::MissingFile => "MISSING_FILE",
            ApiError::InvalidFileName => "INVALID_FILE_NAME",
            ApiError::InvalidFlag(_) => "INVALID_FLAG",
            ApiError::Pipeline(e) => e.source.code(),
            ApiError::MissingSession => "MISSING_SESSION",
            ApiError::SessionNotFound => "SESSION_NOT_FOUND",
            ApiError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            ApiError::Bundle(_) => "BUNDLE_FAILED",
            ApiError::Io(_) => "IO_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        }
        let step = match &self {
            ApiError::Pipeline(e) => Some(e.step),
            _ => None,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            step,
        });
        (status, body).into_response()
    }
}
