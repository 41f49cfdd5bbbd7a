//! Defines routes for the chunked file store.
//!
//! ## Structure
//! - **Owner endpoints** (require `x-principal`)
//!   - `POST   /api/uploads`              upload a whole file (split, store, finalize)
//!   - `GET    /api/uploads`              list the caller's uploads
//!   - `POST   /api/uploads/{id}/publish` make an upload public
//!   - `DELETE /api/uploads/{id}`         delete an upload and its chunks
//!   - `GET    /api/stats`                total uploads, plus the caller's own count
//!
//! - **Gateway operations** (for clients that chunk themselves)
//!   - `POST /api/files`                       declare
//!   - `PUT  /api/files/{id}/chunks/{index}`   write one chunk
//!   - `POST /api/files/{id}/finalize`         finalize
//!   - `GET  /api/files/{id}/chunks`           fetch chunks (access checked)
//!   - `GET  /api/files/{id}/shared`           published flag
//!   - `GET  /api/files/{id}/chunk-info`       declared size and chunk count
//!
//! - **Read side**
//!   - `GET /api/files/{id}`          metadata (authoritative or reconstructed)
//!   - `GET /api/files/{id}/download` bytes as attachment, counts a download
//!   - `GET /share/{id}`              inline preview

use crate::{
    handlers::{
        file_handlers::{
            chunk_info, declare_file, download_file, finalize_file, get_chunks, get_metadata,
            is_shared, preview_file, write_chunk,
        },
        health_handlers::{healthz, readyz},
        upload_handlers::{delete_upload, list_uploads, publish_upload, stats, upload_file},
    },
    services::FileService,
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Build the router. It carries the shared `FileService` to all handlers.
pub fn routes() -> Router<FileService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // owner endpoints
        .route("/api/uploads", post(upload_file).get(list_uploads))
        .route("/api/uploads/{id}", delete(delete_upload))
        .route("/api/uploads/{id}/publish", post(publish_upload))
        .route("/api/stats", get(stats))
        // gateway operations
        .route("/api/files", post(declare_file))
        .route("/api/files/{id}", get(get_metadata))
        .route("/api/files/{id}/chunks", get(get_chunks))
        .route("/api/files/{id}/chunks/{index}", put(write_chunk))
        .route("/api/files/{id}/finalize", post(finalize_file))
        .route("/api/files/{id}/shared", get(is_shared))
        .route("/api/files/{id}/chunk-info", get(chunk_info))
        .route("/api/files/{id}/download", get(download_file))
        // public share links
        .route("/share/{id}", get(preview_file))
}
