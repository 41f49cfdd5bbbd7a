//! HTTP handlers for individual file objects: the raw gateway operations used
//! by remote chunk writers, and the read side (metadata, preview, download).
//! Every read goes through the share reader's access check.

use super::caller::Caller;
use crate::{
    errors::{AppError, ShareError},
    models::{Chunk, DeclareRequest, ResolvedMetadata},
    services::{FileService, reader::Content},
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;

pub const TOTAL_CHUNKS_HEADER: &str = "x-total-chunks";
const METADATA_SOURCE_HEADER: &str = "x-metadata-source";

#[derive(Debug, Serialize)]
pub struct DeclareResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct SharedResponse {
    pub id: String,
    pub shared: bool,
}

#[derive(Debug, Serialize)]
pub struct ChunkPayload {
    pub index: u32,
    pub size: u64,
    pub total_chunks: u32,
    /// Standard base64 of the raw payload.
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct ChunksResponse {
    pub id: String,
    pub chunks: Vec<ChunkPayload>,
}

impl From<Chunk> for ChunkPayload {
    fn from(chunk: Chunk) -> Self {
        Self {
            index: chunk.index,
            size: chunk.size,
            total_chunks: chunk.total_chunks,
            data: general_purpose::STANDARD.encode(&chunk.data),
        }
    }
}

/// `POST /api/files`: Declare an upload and mint its id.
pub async fn declare_file(
    State(service): State<FileService>,
    caller: Caller,
    Json(request): Json<DeclareRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = service.gateway.declare(&caller.0, request).await?;
    Ok((StatusCode::CREATED, Json(DeclareResponse { id })))
}

/// `PUT /api/files/{id}/chunks/{index}`: Store one chunk. The body is the raw
/// payload; `x-total-chunks` carries the writer's declared chunk count.
pub async fn write_chunk(
    State(service): State<FileService>,
    caller: Caller,
    Path((id, index)): Path<(String, u32)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let total_chunks = headers
        .get(TOTAL_CHUNKS_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u32>().ok())
        .ok_or_else(|| {
            AppError::bad_request(format!("missing or invalid {} header", TOTAL_CHUNKS_HEADER))
        })?;

    let chunk = Chunk::new(id, index, body, total_chunks);
    service.gateway.write_chunk(&caller.0, chunk).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/files/{id}/finalize`
pub async fn finalize_file(
    State(service): State<FileService>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.gateway.finalize(&caller.0, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/files/{id}/shared`
pub async fn is_shared(
    State(service): State<FileService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let shared = service.gateway.is_published(&id).await?;
    Ok(Json(SharedResponse { id, shared }))
}

/// `GET /api/files/{id}/chunk-info`
pub async fn chunk_info(
    State(service): State<FileService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let info = service
        .gateway
        .chunk_info(&id)
        .await?
        .ok_or(ShareError::NotFound(id))?;
    Ok(Json(info))
}

/// `GET /api/files/{id}/chunks`: Raw chunks, for clients that reassemble
/// themselves.
pub async fn get_chunks(
    State(service): State<FileService>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut chunks = service.reader.fetch_chunks(&caller.0, &id).await?;
    chunks.sort_by_key(|chunk| chunk.index);
    Ok(Json(ChunksResponse {
        chunks: chunks.into_iter().map(ChunkPayload::from).collect(),
        id,
    }))
}

/// `GET /api/files/{id}`: Metadata as the caller may see it.
pub async fn get_metadata(
    State(service): State<FileService>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ResolvedMetadata>, AppError> {
    let metadata = service.reader.resolve_metadata(&caller.0, &id).await?;
    Ok(Json(metadata))
}

/// `GET /api/files/{id}/download`: Full bytes as an attachment. Counts as a
/// download once the bytes have been rebuilt.
pub async fn download_file(
    State(service): State<FileService>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let content = service.reader.fetch_content(&caller.0, &id).await?;
    service.reader.record_download(&caller.0, &id).await?;
    Ok(content_response(content, Disposition::Attachment))
}

/// `GET /share/{id}`: Inline preview. Not counted as a download.
pub async fn preview_file(
    State(service): State<FileService>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let content = service.reader.fetch_content(&caller.0, &id).await?;
    Ok(content_response(content, Disposition::Inline))
}

#[derive(Clone, Copy)]
enum Disposition {
    Inline,
    Attachment,
}

fn content_response(content: Content, disposition: Disposition) -> Response {
    let mut response = Response::new(Body::from(content.data.clone()));
    *response.status_mut() = StatusCode::OK;
    set_content_headers(response.headers_mut(), &content, disposition);
    response
}

fn set_content_headers(headers: &mut HeaderMap, content: &Content, disposition: Disposition) {
    let meta = &content.metadata;
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(meta.content_type())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&content.data.len().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    let kind = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    let value = format!(
        "{}; filename=\"{}\"",
        kind,
        quote_filename(meta.filename())
    );
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let source = if meta.is_best_effort() {
        "reconstructed"
    } else {
        "authoritative"
    };
    headers.insert(
        HeaderName::from_static(METADATA_SOURCE_HEADER),
        HeaderValue::from_static(source),
    );
}

/// Keep header-safe ASCII only; quotes and backslashes would end the value.
fn quote_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_quoting() {
        assert_eq!(quote_filename("cat pic.png"), "cat pic.png");
        assert_eq!(quote_filename("a\"b\\c\u{e9}.jpg"), "a_b_c_.jpg");
    }
}
