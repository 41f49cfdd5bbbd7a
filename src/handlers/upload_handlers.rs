//! HTTP handlers for the owner's side: whole-file uploads, listing, publishing
//! and deleting. Uploads go through the upload orchestrator end to end.

use super::caller::Caller;
use crate::{
    errors::{AppError, ShareError, ShareResult},
    models::FileObject,
    services::{FileService, upload::UploadReceipt, upload::UploadRequest},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

pub const FILENAME_HEADER: &str = "x-filename";

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
    /// Overrides the configured share-on-upload default.
    pub share: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub receipt: UploadReceipt,
    pub share_url: String,
}

#[derive(Debug, Serialize)]
pub struct UploadListEntry {
    #[serde(flatten)]
    pub object: FileObject,
    pub share_url: String,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub id: String,
    pub share_url: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_uploads: u64,
    /// Uploads owned by the caller; absent for anonymous callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_uploads: Option<u64>,
}

/// Read the request body, giving up as soon as it grows past `limit` so an
/// oversized upload is rejected before anything reaches the store.
async fn collect_body(body: Body, limit: u64) -> ShareResult<Bytes> {
    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();
    while let Some(frame) = stream.next().await {
        let frame = frame
            .map_err(|err| ShareError::validation(format!("could not read body: {}", err)))?;
        if (buffer.len() + frame.len()) as u64 > limit {
            return Err(ShareError::validation(format!(
                "file exceeds the {} byte limit",
                limit
            )));
        }
        buffer.extend_from_slice(&frame);
    }
    Ok(buffer.freeze())
}

/// Owner endpoints reject the anonymous principal before touching the body.
fn require_named(caller: &Caller) -> Result<(), AppError> {
    if caller.0.is_anonymous() {
        return Err(ShareError::Unauthenticated.into());
    }
    Ok(())
}

/// `POST /api/uploads?filename=&share=`: Upload a whole file.
pub async fn upload_file(
    State(service): State<FileService>,
    caller: Caller,
    Query(q): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    require_named(&caller)?;

    let filename = q
        .filename
        .or_else(|| {
            headers
                .get(FILENAME_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("a filename is required"))?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let data = collect_body(body, service.uploader.policy().max_file_size).await?;
    let request = UploadRequest {
        filename,
        content_type,
        data,
        publish: q.share.unwrap_or(service.share_on_upload),
    };

    let receipt = service
        .uploader
        .upload(&caller.0, request, |progress| {
            tracing::trace!("upload progress {}%", progress);
        })
        .await?;
    let share_url = service.links.link(&receipt.id);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse { receipt, share_url }),
    ))
}

/// `GET /api/uploads`: The caller's uploads, newest first.
pub async fn list_uploads(
    State(service): State<FileService>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    require_named(&caller)?;
    let entries: Vec<UploadListEntry> = service
        .gateway
        .owned_objects(&caller.0)
        .await?
        .into_iter()
        .map(|object| UploadListEntry {
            share_url: service.links.link(&object.id),
            object,
        })
        .collect();
    Ok(Json(entries))
}

/// `POST /api/uploads/{id}/publish`
pub async fn publish_upload(
    State(service): State<FileService>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    require_named(&caller)?;
    service.gateway.publish(&caller.0, &id).await?;
    Ok(Json(PublishResponse {
        share_url: service.links.link(&id),
        id,
    }))
}

/// `DELETE /api/uploads/{id}`
pub async fn delete_upload(
    State(service): State<FileService>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    require_named(&caller)?;
    service.gateway.delete_object(&caller.0, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/stats`
pub async fn stats(
    State(service): State<FileService>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    let total_uploads = service.gateway.total_uploads().await?;
    let your_uploads = if caller.0.is_anonymous() {
        None
    } else {
        Some(service.gateway.upload_count(&caller.0).await?)
    };
    Ok(Json(StatsResponse {
        total_uploads,
        your_uploads,
    }))
}
