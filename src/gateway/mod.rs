//! The storage gateway: the durable store the chunking core talks to.
//!
//! The core only ever reaches the store through [`StorageGateway`]; a gateway
//! value is constructed once and handed to every component that needs it.
//! Backends:
//! - [`sqlite::SqliteGateway`] keeps metadata in SQLite and payloads on disk.
//! - [`memory::MemoryGateway`] keeps everything in process.
//! - [`cache::CachedGateway`] wraps either with a read-through metadata cache.

pub mod cache;
pub mod memory;
pub mod sqlite;

use crate::{
    errors::{ShareError, ShareResult},
    models::{Chunk, ChunkInfo, DeclareRequest, FileObject, Principal},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use cache::CachedGateway;
pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

/// Operation set of the remote durable store.
///
/// Every call is a single request/response round trip. Chunk writes are
/// idempotent per `(id, index)`: a later write replaces an earlier one.
#[async_trait]
pub trait StorageGateway: Send + Sync + 'static {
    /// Record a new upload and mint its identifier. No chunks exist yet.
    async fn declare(&self, caller: &Principal, request: DeclareRequest) -> ShareResult<String>;

    /// Store (or overwrite) one chunk of an owned upload.
    async fn write_chunk(&self, caller: &Principal, chunk: Chunk) -> ShareResult<()>;

    /// Mark an owned upload as complete. The store does not re-verify chunks.
    async fn finalize(&self, caller: &Principal, id: &str) -> ShareResult<()>;

    /// Make an owned upload readable by anyone.
    async fn publish(&self, caller: &Principal, id: &str) -> ShareResult<()>;

    /// All uploads owned by `caller`; empty when none.
    async fn owned_objects(&self, caller: &Principal) -> ShareResult<Vec<FileObject>>;

    /// Whether `id` has been published. Unknown ids are not published.
    async fn is_published(&self, id: &str) -> ShareResult<bool>;

    /// Every stored chunk of `id`, in no particular order. Unknown ids yield
    /// an empty list.
    async fn chunks(&self, id: &str) -> ShareResult<Vec<Chunk>>;

    /// Declared size and chunk count of `id`, if it exists.
    async fn chunk_info(&self, id: &str) -> ShareResult<Option<ChunkInfo>>;

    /// Remove an owned upload and all of its chunks.
    async fn delete_object(&self, caller: &Principal, id: &str) -> ShareResult<()>;

    /// Increment the download counter of `id`.
    async fn record_download(&self, id: &str) -> ShareResult<()>;

    /// Number of uploads currently held by the store.
    async fn total_uploads(&self) -> ShareResult<u64>;

    /// Number of uploads owned by `caller`. Zero for the anonymous principal.
    async fn upload_count(&self, caller: &Principal) -> ShareResult<u64> {
        Ok(self.owned_objects(caller).await?.len() as u64)
    }

    /// Cheap readiness probe.
    async fn ping(&self) -> ShareResult<()>;
}

/// Longest filename stem kept in a minted id. Ids become directory names, so
/// the whole id has to stay well under `NAME_MAX`.
pub(crate) const MAX_ID_STEM: usize = 128;

/// Mint an identifier of the form `<sanitized filename>_<unix nanos>`.
///
/// The filename prefix is what lets a non-owner recover a display name. Runs
/// of dots collapse to one so an id never contains `..`.
pub(crate) fn mint_id(filename: &str, at: DateTime<Utc>) -> String {
    let mut stem = String::with_capacity(filename.len().min(MAX_ID_STEM));
    for c in filename.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '-'
        };
        if c == '.' && stem.ends_with('.') {
            continue;
        }
        if stem.len() + c.len_utf8() > MAX_ID_STEM {
            break;
        }
        stem.push(c);
    }
    if stem.is_empty() {
        stem.push_str("file");
    }
    let nanos = at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1_000));
    format!("{}_{}", stem, nanos)
}

pub(crate) fn ensure_named(caller: &Principal, id: &str) -> ShareResult<()> {
    if caller.is_anonymous() {
        tracing::debug!("anonymous caller rejected for {}", id);
        return Err(ShareError::Unauthenticated);
    }
    Ok(())
}

pub(crate) fn validate_declare(request: &DeclareRequest) -> ShareResult<()> {
    if request.filename.trim().is_empty() {
        return Err(ShareError::validation("filename must not be empty"));
    }
    if request.chunk_count == 0 {
        return Err(ShareError::validation("chunk count must be at least 1"));
    }
    Ok(())
}

/// Check a chunk against the declared shape of its file.
pub(crate) fn validate_chunk(chunk: &Chunk, declared_count: u32) -> ShareResult<()> {
    if chunk.size != chunk.data.len() as u64 {
        return Err(ShareError::validation(format!(
            "chunk {} claims {} bytes but carries {}",
            chunk.index,
            chunk.size,
            chunk.data.len()
        )));
    }
    if chunk.index >= declared_count {
        return Err(ShareError::validation(format!(
            "chunk index {} outside [0, {})",
            chunk.index, declared_count
        )));
    }
    if chunk.total_chunks != declared_count {
        return Err(ShareError::validation(format!(
            "chunk {} declares {} total chunks, object declares {}",
            chunk.index, chunk.total_chunks, declared_count
        )));
    }
    Ok(())
}
