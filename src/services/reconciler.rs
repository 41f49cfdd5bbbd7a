//! Best-effort metadata for callers who cannot see the authoritative record.
//!
//! Everything is inferred from stored chunks: size by summation, type by
//! sniffing the lowest-index chunk, filename from the identifier. The owner
//! is not disclosed and the upload time is the reconstruction time. Results
//! are [`ReconstructedMetadata`], never a [`crate::models::FileObject`].

use super::sniffer::{SNIFF_LEN, sniff};
use crate::{
    errors::{ShareError, ShareResult},
    gateway::StorageGateway,
    models::{Chunk, ReconstructedMetadata},
};
use chrono::Utc;
use std::collections::BTreeSet;

/// Recover a display name from an id minted as `<filename>_<suffix>`.
pub fn filename_from_id(id: &str) -> String {
    match id.rsplit_once('_') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => id.to_string(),
    }
}

/// Build a metadata view from a non-empty chunk set.
pub fn reconstruct(id: &str, chunks: &[Chunk]) -> ShareResult<ReconstructedMetadata> {
    let first = chunks
        .iter()
        .min_by_key(|chunk| chunk.index)
        .ok_or_else(|| ShareError::NotFound(id.to_string()))?;

    let prefix = &first.data[..first.data.len().min(SNIFF_LEN)];
    let size = chunks.iter().map(|chunk| chunk.data.len() as u64).sum();
    let distinct: BTreeSet<u32> = chunks.iter().map(|chunk| chunk.index).collect();

    Ok(ReconstructedMetadata {
        id: id.to_string(),
        filename: filename_from_id(id),
        content_type: sniff(prefix).to_string(),
        size,
        chunk_count: distinct.len() as u32,
        uploaded: Utc::now(),
        download_count: 0,
        is_shared: true,
    })
}

/// Fetches chunks through a gateway and reconstructs metadata from them.
pub struct MetadataReconciler<'a> {
    gateway: &'a dyn StorageGateway,
}

impl<'a> MetadataReconciler<'a> {
    pub fn new(gateway: &'a dyn StorageGateway) -> Self {
        Self { gateway }
    }

    /// Reconstruct metadata for a shared object.
    ///
    /// NotFound when the object is not shared or has no chunks.
    pub async fn reconcile(&self, id: &str) -> ShareResult<ReconstructedMetadata> {
        if !self.gateway.is_published(id).await? {
            return Err(ShareError::NotFound(id.to_string()));
        }
        let chunks = self.gateway.chunks(id).await?;
        if chunks.is_empty() {
            return Err(ShareError::NotFound(id.to_string()));
        }
        reconstruct(id, &chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gateway::MemoryGateway,
        models::{DeclareRequest, Principal},
    };
    use bytes::Bytes;

    #[test]
    fn test_filename_recovery() {
        assert_eq!(filename_from_id("cat.png_1700000000"), "cat.png");
        assert_eq!(filename_from_id("my_holiday.jpg_17"), "my_holiday.jpg");
        assert_eq!(filename_from_id("plainid"), "plainid");
        assert_eq!(filename_from_id("_17"), "_17");
    }

    #[test]
    fn test_reconstruct_sums_and_sniffs_lowest_index() {
        let chunks = vec![
            Chunk::new("img.gif_9", 1, Bytes::from_static(b"\xff\xd8\xff tail"), 2),
            Chunk::new("img.gif_9", 0, Bytes::from_static(b"GIF89a-head"), 2),
        ];
        let meta = reconstruct("img.gif_9", &chunks).unwrap();
        assert_eq!(meta.content_type, "image/gif");
        assert_eq!(meta.size, 19);
        assert_eq!(meta.chunk_count, 2);
        assert_eq!(meta.filename, "img.gif");
        assert_eq!(meta.download_count, 0);
        assert!(meta.is_shared);
    }

    #[tokio::test]
    async fn test_unshared_or_empty_is_not_found() {
        let gw = MemoryGateway::new();
        let alice = Principal::new("alice");
        let id = gw
            .declare(
                &alice,
                DeclareRequest {
                    filename: "a.png".into(),
                    content_type: "image/png".into(),
                    size: 4,
                    chunk_count: 1,
                },
            )
            .await
            .unwrap();
        let reconciler = MetadataReconciler::new(&gw);

        assert!(matches!(
            reconciler.reconcile(&id).await,
            Err(ShareError::NotFound(_))
        ));

        gw.publish(&alice, &id).await.unwrap();
        assert!(matches!(
            reconciler.reconcile(&id).await,
            Err(ShareError::NotFound(_))
        ));

        gw.write_chunk(&alice, Chunk::new(&id, 0, Bytes::from_static(b"\x89PNG"), 1))
            .await
            .unwrap();
        let meta = reconciler.reconcile(&id).await.unwrap();
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.size, 4);
    }
}
