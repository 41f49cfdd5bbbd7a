//! Read path: decide who may see an object, then fetch and rebuild it.
//!
//! Lookup is two-step. The caller's own uploads are checked first and yield
//! authoritative metadata; only when the caller is not the owner does the
//! lookup fall through to the published view, which is reconstructed from
//! chunk bytes. Gateway failures in the first step are returned, not treated
//! as "not owner". No chunk bytes are fetched before access is granted.

use super::{
    access::authorize,
    reassembler::{ExpectedShape, reassemble},
    reconciler::{MetadataReconciler, reconstruct},
};
use crate::{
    errors::{ShareError, ShareResult},
    gateway::StorageGateway,
    models::{Chunk, FileObject, Principal, ResolvedMetadata},
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// How the caller was granted access.
#[derive(Debug)]
enum Access {
    Owner(FileObject),
    Published,
}

/// Reassembled file bytes plus the metadata they were resolved with.
#[derive(Clone, Debug)]
pub struct Content {
    pub metadata: ResolvedMetadata,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct ShareReader {
    gateway: Arc<dyn StorageGateway>,
}

impl ShareReader {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self { gateway }
    }

    async fn access(&self, caller: &Principal, id: &str) -> ShareResult<Access> {
        if !caller.is_anonymous() {
            let owned = self.gateway.owned_objects(caller).await?;
            if let Some(object) = owned.into_iter().find(|object| object.id == id) {
                authorize(caller, &object)?;
                return Ok(Access::Owner(object));
            }
        }

        debug!("{} is not the owner of {}, checking published view", caller, id);
        if self.gateway.is_published(id).await? {
            return Ok(Access::Published);
        }
        // Existence is revealed, contents are not.
        match self.gateway.chunk_info(id).await? {
            Some(_) => Err(ShareError::PermissionDenied(id.to_string())),
            None => Err(ShareError::NotFound(id.to_string())),
        }
    }

    /// Metadata for `id` as `caller` is allowed to see it.
    pub async fn resolve_metadata(
        &self,
        caller: &Principal,
        id: &str,
    ) -> ShareResult<ResolvedMetadata> {
        match self.access(caller, id).await? {
            Access::Owner(object) => Ok(ResolvedMetadata::Authoritative(object)),
            Access::Published => MetadataReconciler::new(self.gateway.as_ref())
                .reconcile(id)
                .await
                .map(ResolvedMetadata::Reconstructed),
        }
    }

    /// Fetch every chunk of `id` in one batch and reassemble the file.
    ///
    /// Fails with `IncompleteObject` rather than returning partial bytes.
    pub async fn fetch_content(&self, caller: &Principal, id: &str) -> ShareResult<Content> {
        match self.access(caller, id).await? {
            Access::Owner(object) => {
                let chunks = self.gateway.chunks(id).await?;
                let shape = ExpectedShape {
                    chunk_count: object.chunk_count,
                    size: Some(object.size),
                };
                let data = reassemble(id, chunks, Some(shape))?;
                Ok(Content {
                    metadata: ResolvedMetadata::Authoritative(object),
                    data,
                })
            }
            Access::Published => {
                let shape = self
                    .gateway
                    .chunk_info(id)
                    .await?
                    .ok_or_else(|| ShareError::NotFound(id.to_string()))?;
                let chunks = self.gateway.chunks(id).await?;
                let metadata = reconstruct(id, &chunks)?;
                let data = reassemble(
                    id,
                    chunks,
                    Some(ExpectedShape {
                        chunk_count: shape.chunk_count,
                        size: Some(shape.size),
                    }),
                )?;
                Ok(Content {
                    metadata: ResolvedMetadata::Reconstructed(metadata),
                    data,
                })
            }
        }
    }

    /// Raw stored chunks of `id`, unordered, after the same access check.
    pub async fn fetch_chunks(&self, caller: &Principal, id: &str) -> ShareResult<Vec<Chunk>> {
        self.access(caller, id).await?;
        self.gateway.chunks(id).await
    }

    /// Count one completed download. Gated by the same rule as reading.
    pub async fn record_download(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        self.access(caller, id).await?;
        self.gateway.record_download(id).await
    }
}
