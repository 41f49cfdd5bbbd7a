//! Read-through metadata cache in front of a gateway.
//!
//! Owned listings, publish flags and chunk info live in bounded moka caches
//! and are dropped synchronously after the mutations that can change them.
//! Chunk payloads are never cached.
//!
//! A miss fetches from the inner gateway and keeps the answer only if no
//! invalidation ran while the fetch was in flight. Without that check a read
//! that started before a publish could write its stale answer back.

use super::StorageGateway;
use crate::{
    errors::ShareResult,
    models::{Chunk, ChunkInfo, DeclareRequest, FileObject, Principal},
};
use async_trait::async_trait;
use moka::future::Cache;
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::debug;

pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;
pub const DEFAULT_CACHE_TTI_SECS: u64 = 300;

/// Bounds applied to each kind of cached lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: u64,
    pub time_to_idle: Duration,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_CAPACITY,
            time_to_idle: Duration::from_secs(DEFAULT_CACHE_TTI_SECS),
        }
    }
}

fn build_cache<V>(limits: &CacheLimits) -> Cache<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(limits.max_entries)
        .time_to_idle(limits.time_to_idle)
        .build()
}

/// Wraps a gateway with a read-through cache for metadata lookups.
#[derive(Clone)]
pub struct CachedGateway {
    inner: Arc<dyn StorageGateway>,
    /// Keyed by principal.
    owned: Cache<String, Vec<FileObject>>,
    /// Keyed by file id.
    published: Cache<String, bool>,
    /// Keyed by file id.
    info: Cache<String, Option<ChunkInfo>>,
    /// Bumped before every invalidation.
    epoch: Arc<AtomicU64>,
}

impl CachedGateway {
    pub fn new(inner: Arc<dyn StorageGateway>) -> Self {
        Self::with_limits(inner, CacheLimits::default())
    }

    pub fn with_limits(inner: Arc<dyn StorageGateway>, limits: CacheLimits) -> Self {
        Self {
            inner,
            owned: build_cache(&limits),
            published: build_cache(&limits),
            info: build_cache(&limits),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn read_through<V, F, Fut>(
        &self,
        cache: &Cache<String, V>,
        key: &str,
        fetch: F,
    ) -> ShareResult<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ShareResult<V>>,
    {
        if let Some(hit) = cache.get(key).await {
            debug!("cache hit for {}", key);
            return Ok(hit);
        }

        let started = self.epoch.load(Ordering::SeqCst);
        let value = fetch().await?;
        if self.epoch.load(Ordering::SeqCst) != started {
            debug!("not caching {}: invalidated during fetch", key);
            return Ok(value);
        }
        cache.insert(key.to_string(), value.clone()).await;
        // An invalidation between the check and the insert must still win.
        if self.epoch.load(Ordering::SeqCst) != started {
            cache.invalidate(key).await;
        }
        Ok(value)
    }

    fn bump(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Approximate number of live entries across all lookup kinds, after
    /// pending evictions have run.
    pub async fn len(&self) -> u64 {
        self.owned.run_pending_tasks().await;
        self.published.run_pending_tasks().await;
        self.info.run_pending_tasks().await;
        self.owned.entry_count() + self.published.entry_count() + self.info.entry_count()
    }
}

#[async_trait]
impl StorageGateway for CachedGateway {
    async fn declare(&self, caller: &Principal, request: DeclareRequest) -> ShareResult<String> {
        let id = self.inner.declare(caller, request).await?;
        self.bump();
        self.owned.invalidate(caller.as_str()).await;
        Ok(id)
    }

    async fn write_chunk(&self, caller: &Principal, chunk: Chunk) -> ShareResult<()> {
        let id = chunk.file_id.clone();
        self.inner.write_chunk(caller, chunk).await?;
        self.bump();
        self.owned.invalidate(caller.as_str()).await;
        self.info.invalidate(id.as_str()).await;
        Ok(())
    }

    async fn finalize(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        self.inner.finalize(caller, id).await?;
        self.bump();
        self.owned.invalidate(caller.as_str()).await;
        self.info.invalidate(id).await;
        Ok(())
    }

    async fn publish(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        self.inner.publish(caller, id).await?;
        self.bump();
        self.owned.invalidate(caller.as_str()).await;
        self.published.invalidate(id).await;
        Ok(())
    }

    async fn owned_objects(&self, caller: &Principal) -> ShareResult<Vec<FileObject>> {
        self.read_through(&self.owned, caller.as_str(), || {
            self.inner.owned_objects(caller)
        })
        .await
    }

    async fn is_published(&self, id: &str) -> ShareResult<bool> {
        self.read_through(&self.published, id, || self.inner.is_published(id))
            .await
    }

    async fn chunks(&self, id: &str) -> ShareResult<Vec<Chunk>> {
        self.inner.chunks(id).await
    }

    async fn chunk_info(&self, id: &str) -> ShareResult<Option<ChunkInfo>> {
        self.read_through(&self.info, id, || self.inner.chunk_info(id))
            .await
    }

    async fn delete_object(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        self.inner.delete_object(caller, id).await?;
        self.bump();
        self.owned.invalidate(caller.as_str()).await;
        self.published.invalidate(id).await;
        self.info.invalidate(id).await;
        Ok(())
    }

    async fn record_download(&self, id: &str) -> ShareResult<()> {
        self.inner.record_download(id).await?;
        self.bump();
        // The owner is not known here; any cached listing may hold the counter.
        self.owned.invalidate_all();
        Ok(())
    }

    async fn total_uploads(&self) -> ShareResult<u64> {
        self.inner.total_uploads().await
    }

    async fn upload_count(&self, caller: &Principal) -> ShareResult<u64> {
        self.inner.upload_count(caller).await
    }

    async fn ping(&self) -> ShareResult<()> {
        self.inner.ping().await
    }
}
