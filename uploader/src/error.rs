use std::io;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Client errors
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),

    // Merge preconditions
    #[error("no chunks found for {0}, please upload the file again")]
    NoChunks(String),

    #[error("upload {file_hash} is missing {total_missing} chunk(s), first missing: {missing:?}")]
    IncompleteChunks {
        file_hash: String,
        missing: Vec<u64>,
        total_missing: u64,
    },

    #[error("upload {file_hash} holds {found} chunk(s) but {expected} were announced")]
    ChunkCountMismatch {
        file_hash: String,
        found: u64,
        expected: u64,
    },

    #[error("chunk {index} of {file_hash} is {actual} bytes, expected {expected}")]
    ChunkSizeMismatch {
        file_hash: String,
        index: u64,
        actual: u64,
        expected: u64,
    },

    // Internal errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingField(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::InvalidBody(rejection) => rejection.status(),
            Self::Multipart(err) => err.status(),
            Self::NoChunks(_) => StatusCode::NOT_FOUND,
            Self::IncompleteChunks { .. }
            | Self::ChunkCountMismatch { .. }
            | Self::ChunkSizeMismatch { .. } => StatusCode::CONFLICT,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let message = if status_code.is_server_error() {
            tracing::error!("Generating response for AppError: {:?}", self);
            "an internal server error occurred".to_string()
        } else {
            tracing::warn!(status = %status_code, "rejecting request: {}", self);
            self.to_string()
        };

        (status_code, Json(json!({ "ok": false, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_error_taxonomy() {
        assert_eq!(
            AppError::MissingField("fileHash").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NoChunks("H".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::ChunkSizeMismatch {
                file_hash: "H".into(),
                index: 0,
                actual: 3,
                expected: 5,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Io(io::Error::other("disk full")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response = AppError::Io(io::Error::other("/secret/path")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["message"], "an internal server error occurred");
    }
}
