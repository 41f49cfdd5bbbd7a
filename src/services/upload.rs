//! Upload orchestration: declare, transfer chunks, finalize, optionally
//! publish.
//!
//! Each step is a remote mutation and a failure aborts everything after it.
//! Chunks are sent one at a time in index order; the orchestrator never
//! retries. A failed transfer reports the index to resume from.

use super::{
    sniffer::{OCTET_STREAM, SNIFF_LEN, recognize},
    splitter::{ChunkPart, split},
};
use crate::{
    errors::{ShareError, ShareResult},
    gateway::StorageGateway,
    models::{Chunk, DeclareRequest, Principal},
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 500_000;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2000 * 1024;

/// Caller-side limits checked before the store is contacted.
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    pub max_file_size: u64,
    /// Accepted MIME prefixes such as `image/`. Empty accepts everything.
    pub allowed_type_prefixes: Vec<String>,
    pub chunk_size: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_type_prefixes: vec!["image/".into(), "video/".into()],
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl UploadPolicy {
    pub fn check_size(&self, size: u64) -> ShareResult<()> {
        if size > self.max_file_size {
            return Err(ShareError::validation(format!(
                "file is {} bytes, the limit is {}",
                size, self.max_file_size
            )));
        }
        Ok(())
    }

    pub fn check_type(&self, content_type: &str) -> ShareResult<()> {
        let lowered = content_type.to_ascii_lowercase();
        if self.allowed_type_prefixes.is_empty()
            || self
                .allowed_type_prefixes
                .iter()
                .any(|prefix| lowered.starts_with(&prefix.to_ascii_lowercase()))
        {
            Ok(())
        } else {
            Err(ShareError::validation(format!(
                "content type `{}` is not allowed",
                content_type
            )))
        }
    }

    /// The declared type, or the sniffed one when nothing was declared.
    ///
    /// A declared type that disagrees with a recognized payload signature is
    /// kept, but logged.
    pub fn effective_content_type(&self, declared: Option<&str>, data: &[u8]) -> String {
        let prefix = &data[..data.len().min(SNIFF_LEN)];
        let sniffed = recognize(prefix);
        match declared.map(str::trim).filter(|t| !t.is_empty()) {
            Some(declared) => {
                if let Some(sniffed) = sniffed {
                    if !declared.eq_ignore_ascii_case(sniffed) {
                        warn!(
                            "declared content type {} but payload looks like {}",
                            declared, sniffed
                        );
                    }
                }
                declared.to_string()
            }
            None => sniffed.unwrap_or(OCTET_STREAM).to_string(),
        }
    }
}

/// A whole file to push through the write protocol.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
    /// Publish right after finalizing.
    pub publish: bool,
}

/// Outcome of a completed upload.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
    pub id: String,
    pub content_type: String,
    pub size: u64,
    pub chunk_count: u32,
    pub shared: bool,
    pub progress: u8,
}

/// `round(100 * (index + 1) / chunk_count)`, halves rounding up.
pub fn progress_percent(index: u32, chunk_count: u32) -> u8 {
    if chunk_count == 0 {
        return 100;
    }
    let done = u64::from(index) + 1;
    let total = u64::from(chunk_count);
    ((200 * done + total) / (2 * total)).min(100) as u8
}

/// Drives the write protocol against a gateway.
#[derive(Clone)]
pub struct UploadOrchestrator {
    gateway: Arc<dyn StorageGateway>,
    policy: UploadPolicy,
}

impl UploadOrchestrator {
    pub fn new(gateway: Arc<dyn StorageGateway>, policy: UploadPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Run declare → transfer → finalize → (publish) for one file.
    ///
    /// `on_progress` sees a non-decreasing percentage after each accepted
    /// chunk, ending at 100.
    pub async fn upload<P>(
        &self,
        caller: &Principal,
        request: UploadRequest,
        mut on_progress: P,
    ) -> ShareResult<UploadReceipt>
    where
        P: FnMut(u8) + Send,
    {
        let size = request.data.len() as u64;
        let content_type = self
            .policy
            .effective_content_type(request.content_type.as_deref(), &request.data);
        self.policy.check_size(size)?;
        self.policy.check_type(&content_type)?;

        let parts = split(&request.data, self.policy.chunk_size)?;
        let chunk_count = parts.len() as u32;

        let id = self
            .gateway
            .declare(
                caller,
                DeclareRequest {
                    filename: request.filename.clone(),
                    content_type: content_type.clone(),
                    size,
                    chunk_count,
                },
            )
            .await?;

        self.transfer(caller, &id, parts, chunk_count, &mut on_progress)
            .await?;
        self.complete(caller, &id, request.publish).await?;

        info!(
            "uploaded {} ({} bytes in {} chunks, shared: {})",
            id, size, chunk_count, request.publish
        );
        Ok(UploadReceipt {
            id,
            content_type,
            size,
            chunk_count,
            shared: request.publish,
            progress: 100,
        })
    }

    /// Re-send chunks of an already declared upload starting at `from_index`,
    /// then finalize (and publish). Writes are idempotent per index, so
    /// resuming at the failed index is safe.
    pub async fn resume<P>(
        &self,
        caller: &Principal,
        id: &str,
        data: &Bytes,
        from_index: u32,
        publish: bool,
        mut on_progress: P,
    ) -> ShareResult<()>
    where
        P: FnMut(u8) + Send,
    {
        let parts = split(data, self.policy.chunk_size)?;
        let chunk_count = parts.len() as u32;
        if from_index >= chunk_count {
            return Err(ShareError::validation(format!(
                "resume index {} outside [0, {})",
                from_index, chunk_count
            )));
        }
        let remaining = parts
            .into_iter()
            .filter(|part| part.index >= from_index)
            .collect();

        info!("resuming {} from chunk {}", id, from_index);
        self.transfer(caller, id, remaining, chunk_count, &mut on_progress)
            .await?;
        self.complete(caller, id, publish).await
    }

    async fn transfer<P>(
        &self,
        caller: &Principal,
        id: &str,
        parts: Vec<ChunkPart>,
        chunk_count: u32,
        on_progress: &mut P,
    ) -> ShareResult<()>
    where
        P: FnMut(u8) + Send,
    {
        for part in parts {
            let index = part.index;
            let chunk = Chunk::new(id, index, part.data, chunk_count);
            if let Err(err) = self.gateway.write_chunk(caller, chunk).await {
                warn!("chunk {} of {} failed: {}", index, id, err);
                return Err(ShareError::ChunkUploadFailed {
                    index,
                    source: Box::new(err),
                });
            }
            let progress = progress_percent(index, chunk_count);
            debug!("{}: chunk {}/{} ({}%)", id, index + 1, chunk_count, progress);
            on_progress(progress);
        }
        Ok(())
    }

    async fn complete(&self, caller: &Principal, id: &str, publish: bool) -> ShareResult<()> {
        self.gateway.finalize(caller, id).await?;
        if publish {
            self.gateway.publish(caller, id).await?;
        }
        Ok(())
    }
}
