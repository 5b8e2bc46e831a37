use std::io;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::routing::{get, post};
use bytes::Bytes;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::domain::FileHash;
use crate::error::AppError;
use crate::service::receiver::ChunkFields;
use crate::service::{MergeOutcome, MergeRequest};
use crate::storage::{ByteStream, byte_stream};
use crate::utils::state::AppState;

const CHUNK_DATA_FIELD: &str = "chunkData";

pub fn create_upload_router(max_chunk_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            post(upload_chunk_handler).layer(DefaultBodyLimit::max(max_chunk_bytes)),
        )
        .route("/merge", post(merge_handler))
        .route("/verify", post(verify_handler))
        .route("/{file_hash}", get(status_handler))
}

#[derive(Serialize, Debug)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(MessageResponse {
            ok: true,
            message: message.into(),
        })
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MergeBody {
    pub file_hash: String,
    pub file_name: String,
    #[serde(alias = "size")]
    pub chunk_size: u64,
    #[serde(default)]
    pub chunk_count: Option<u64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBody {
    pub file_hash: String,
    pub file_name: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub ok: bool,
    pub should_upload: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub file_name: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct StatusResponse {
    pub ok: bool,
    pub chunks: Vec<u64>,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<bool>,
}

/// POST /upload
///
/// The payload is streamed straight to disk when the identity fields precede
/// it in the form, and buffered otherwise.
pub async fn upload_chunk_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, AppError> {
    let mut fields = ChunkFields::default();
    let mut buffered: Option<Bytes> = None;
    let mut stored: Option<u64> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(CHUNK_DATA_FIELD) => {
                if buffered.is_some() || stored.is_some() {
                    return Err(AppError::InvalidInput(
                        "more than one `chunkData` field".to_string(),
                    ));
                }
                if fields.is_complete() {
                    let (file_hash, chunk) = fields.resolve()?;
                    let bytes = state
                        .receiver
                        .receive(&file_hash, &chunk, field_stream(field))
                        .await
                        .map_err(unwrap_multipart)?;
                    stored = Some(bytes);
                } else {
                    buffered = Some(field.bytes().await?);
                }
            }
            Some("fileHash") => fields.file_hash = Some(field.text().await?),
            Some("chunkHash") => fields.chunk_hash = Some(field.text().await?),
            Some("index") => fields.index = Some(field.text().await?),
            _ => {}
        }
    }

    if stored.is_none() {
        let data = buffered.ok_or(AppError::MissingField(CHUNK_DATA_FIELD))?;
        let (file_hash, chunk) = fields.resolve()?;
        state
            .receiver
            .receive(&file_hash, &chunk, byte_stream(data))
            .await?;
    }

    Ok(MessageResponse::ok("chunk uploaded"))
}

/// POST /upload/merge
pub async fn merge_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MergeBody>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(body) = body?;
    if body.file_name.trim().is_empty() {
        return Err(AppError::MissingField("fileName"));
    }
    let request = MergeRequest {
        file_hash: FileHash::parse(body.file_hash.trim())?,
        file_name: body.file_name,
        chunk_size: body.chunk_size,
        chunk_count: body.chunk_count,
    };

    let message = match state.merger.merge(&request).await? {
        MergeOutcome::AlreadyExists => "file already exists".to_string(),
        MergeOutcome::Merged { chunks, bytes } => {
            format!("merged {chunks} chunks into {bytes} bytes")
        }
    };
    Ok(MessageResponse::ok(message))
}

/// POST /upload/verify
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VerifyBody>, JsonRejection>,
) -> Result<Json<VerifyResponse>, AppError> {
    let Json(body) = body?;
    let file_hash = FileHash::parse(body.file_hash.trim())?;
    let should_upload = state.dedup.check(&file_hash, &body.file_name).await?;
    Ok(Json(VerifyResponse {
        ok: true,
        should_upload,
    }))
}

/// GET /upload/{file_hash}
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(file_hash): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    let file_hash = FileHash::parse(&file_hash)?;
    let status = state.receiver.status(&file_hash).await?;
    let uploaded = match query.file_name {
        Some(file_name) => Some(!state.dedup.check(&file_hash, &file_name).await?),
        None => None,
    };
    Ok(Json(StatusResponse {
        ok: true,
        chunks: status.chunks,
        bytes: status.bytes,
        uploaded,
    }))
}

fn field_stream(field: Field<'_>) -> ByteStream<'_> {
    Box::pin(field.map_err(io::Error::other))
}

/// Recovers a multipart failure that surfaced as an IO error while the
/// payload was being streamed, so an oversized body still maps to 413.
fn unwrap_multipart(err: AppError) -> AppError {
    let AppError::Io(err) = err else {
        return err;
    };
    if !err.get_ref().is_some_and(|inner| inner.is::<MultipartError>()) {
        return AppError::Io(err);
    }
    match err.into_inner().map(|inner| inner.downcast::<MultipartError>()) {
        Some(Ok(multipart)) => AppError::Multipart(*multipart),
        _ => AppError::Io(io::Error::other("malformed multipart payload")),
    }
}
