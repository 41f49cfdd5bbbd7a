//! In-memory storage gateway.
//!
//! Provides a non-persistent store using DashMap for concurrent access.
//! Used by tests and for embedding the core without a database.

use super::{StorageGateway, ensure_named, mint_id, validate_chunk, validate_declare};
use crate::{
    errors::{ShareError, ShareResult},
    models::{Chunk, ChunkInfo, DeclareRequest, FileObject, Principal},
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct MemoryObject {
    meta: FileObject,
    chunks: BTreeMap<u32, Chunk>,
}

/// In-memory gateway. All data is lost when the value is dropped.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    objects: DashMap<String, MemoryObject>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn owned_entry<'a>(
        &'a self,
        caller: &Principal,
        id: &str,
    ) -> ShareResult<dashmap::mapref::one::RefMut<'a, String, MemoryObject>> {
        ensure_named(caller, id)?;
        let entry = self
            .objects
            .get_mut(id)
            .ok_or_else(|| ShareError::NotFound(id.to_string()))?;
        if &entry.meta.owner != caller {
            return Err(ShareError::PermissionDenied(id.to_string()));
        }
        Ok(entry)
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    async fn declare(&self, caller: &Principal, request: DeclareRequest) -> ShareResult<String> {
        ensure_named(caller, &request.filename)?;
        validate_declare(&request)?;

        let uploaded = Utc::now();
        let mut at = uploaded;
        loop {
            let id = mint_id(&request.filename, at);
            match self.objects.entry(id.clone()) {
                Entry::Occupied(_) => at += Duration::nanoseconds(1),
                Entry::Vacant(slot) => {
                    slot.insert(MemoryObject {
                        meta: FileObject {
                            id: id.clone(),
                            filename: request.filename.clone(),
                            content_type: request.content_type.clone(),
                            owner: caller.clone(),
                            size: request.size,
                            chunk_count: request.chunk_count,
                            uploaded,
                            download_count: 0,
                            is_shared: false,
                            finalized: false,
                        },
                        chunks: BTreeMap::new(),
                    });
                    info!("declared {} ({} chunks) for {}", id, request.chunk_count, caller);
                    return Ok(id);
                }
            }
        }
    }

    async fn write_chunk(&self, caller: &Principal, chunk: Chunk) -> ShareResult<()> {
        let mut entry = self.owned_entry(caller, &chunk.file_id)?;
        validate_chunk(&chunk, entry.meta.chunk_count)?;
        if entry.meta.finalized {
            warn!("chunk {} written to finalized {}", chunk.index, chunk.file_id);
        }
        debug!("stored chunk {} of {}", chunk.index, chunk.file_id);
        entry.chunks.insert(chunk.index, chunk);
        Ok(())
    }

    async fn finalize(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        let mut entry = self.owned_entry(caller, id)?;
        entry.meta.finalized = true;
        Ok(())
    }

    async fn publish(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        let mut entry = self.owned_entry(caller, id)?;
        entry.meta.is_shared = true;
        Ok(())
    }

    async fn owned_objects(&self, caller: &Principal) -> ShareResult<Vec<FileObject>> {
        if caller.is_anonymous() {
            return Ok(Vec::new());
        }
        let mut owned: Vec<FileObject> = self
            .objects
            .iter()
            .filter(|entry| &entry.value().meta.owner == caller)
            .map(|entry| entry.value().meta.clone())
            .collect();
        owned.sort_by(|a, b| b.uploaded.cmp(&a.uploaded).then_with(|| a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn is_published(&self, id: &str) -> ShareResult<bool> {
        Ok(self
            .objects
            .get(id)
            .map(|entry| entry.meta.is_shared)
            .unwrap_or(false))
    }

    async fn chunks(&self, id: &str) -> ShareResult<Vec<Chunk>> {
        Ok(self
            .objects
            .get(id)
            .map(|entry| entry.chunks.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn chunk_info(&self, id: &str) -> ShareResult<Option<ChunkInfo>> {
        Ok(self.objects.get(id).map(|entry| ChunkInfo {
            size: entry.meta.size,
            chunk_count: entry.meta.chunk_count,
        }))
    }

    async fn delete_object(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        ensure_named(caller, id)?;
        if self
            .objects
            .remove_if(id, |_, object| &object.meta.owner == caller)
            .is_none()
        {
            return Err(if self.objects.contains_key(id) {
                ShareError::PermissionDenied(id.to_string())
            } else {
                ShareError::NotFound(id.to_string())
            });
        }
        info!("deleted {}", id);
        Ok(())
    }

    async fn record_download(&self, id: &str) -> ShareResult<()> {
        let mut entry = self
            .objects
            .get_mut(id)
            .ok_or_else(|| ShareError::NotFound(id.to_string()))?;
        entry.meta.download_count += 1;
        Ok(())
    }

    async fn total_uploads(&self) -> ShareResult<u64> {
        Ok(self.objects.len() as u64)
    }

    async fn upload_count(&self, caller: &Principal) -> ShareResult<u64> {
        if caller.is_anonymous() {
            return Ok(0);
        }
        Ok(self
            .objects
            .iter()
            .filter(|entry| &entry.value().meta.owner == caller)
            .count() as u64)
    }

    async fn ping(&self) -> ShareResult<()> {
        Ok(())
    }
}
