use bytes::Bytes;
use chunk_share::{
    errors::ShareError,
    gateway::{CachedGateway, MemoryGateway, SqliteGateway, StorageGateway},
    models::{Chunk, DeclareRequest, Principal},
    services::{
        FileService,
        reassembler::reassemble,
        splitter::split,
        upload::{UploadPolicy, UploadRequest},
    },
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

const SIZE: usize = 1_200_000;

fn cat_png() -> Bytes {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend((0..SIZE - 8).map(|i| (i * 31 % 256) as u8));
    Bytes::from(data)
}

async fn sqlite_gateway(dir: &tempfile::TempDir) -> SqliteGateway {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let gw = SqliteGateway::new(Arc::new(pool), dir.path().join("chunks"));
    gw.migrate().await.unwrap();
    gw
}

/// Declare, write 500000/500000/200000, finalize, publish, then read the
/// shared chunks as someone else.
async fn run_manual_protocol(gw: &dyn StorageGateway) {
    let owner = Principal::new("owner");
    let visitor = Principal::new("visitor");
    let data = cat_png();

    let id = gw
        .declare(
            &owner,
            DeclareRequest {
                filename: "cat.png".into(),
                content_type: "image/png".into(),
                size: SIZE as u64,
                chunk_count: 3,
            },
        )
        .await
        .unwrap();

    let parts = split(&data, 500_000).unwrap();
    let sizes: Vec<usize> = parts.iter().map(|p| p.data.len()).collect();
    assert_eq!(sizes, vec![500_000, 500_000, 200_000]);
    for part in parts {
        gw.write_chunk(&owner, Chunk::new(&id, part.index, part.data, 3))
            .await
            .unwrap();
    }
    gw.finalize(&owner, &id).await.unwrap();
    gw.publish(&owner, &id).await.unwrap();

    assert!(gw.is_published(&id).await.unwrap());
    let chunks = gw.chunks(&id).await.unwrap();
    let stored: u64 = chunks.iter().map(|c| c.size).sum();
    assert_eq!(stored, SIZE as u64);

    let out = reassemble(&id, chunks, None).unwrap();
    assert_eq!(out.len(), SIZE);
    assert_eq!(&out[..4], &[0x89, 0x50, 0x4E, 0x47]);
    assert_eq!(out, data);

    // Not the owner, so no authoritative record is visible to the visitor.
    assert!(gw.owned_objects(&visitor).await.unwrap().is_empty());
}

#[tokio::test]
async fn cat_png_scenario_in_memory() {
    let gw = MemoryGateway::new();
    run_manual_protocol(&gw).await;
}

#[tokio::test]
async fn cat_png_scenario_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let gw = sqlite_gateway(&dir).await;
    run_manual_protocol(&gw).await;
}

#[tokio::test]
async fn orchestrated_upload_is_readable_by_visitors() {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = sqlite_gateway(&dir).await;
    let service = FileService::new(
        Arc::new(CachedGateway::new(Arc::new(sqlite))),
        UploadPolicy::default(),
        "https://share.example",
        true,
    );
    let owner = Principal::new("owner");
    let visitor = Principal::new("visitor");
    let data = cat_png();

    let mut progress = Vec::new();
    let receipt = service
        .uploader
        .upload(
            &owner,
            UploadRequest {
                filename: "cat.png".into(),
                content_type: Some("image/png".into()),
                data: data.clone(),
                publish: service.share_on_upload,
            },
            |p| progress.push(p),
        )
        .await
        .unwrap();
    assert_eq!(progress, vec![33, 67, 100]);
    assert_eq!(receipt.chunk_count, 3);
    assert_eq!(
        service.links.link(&receipt.id),
        format!("https://share.example/share/{}", receipt.id)
    );

    let meta = service
        .reader
        .resolve_metadata(&visitor, &receipt.id)
        .await
        .unwrap();
    assert!(meta.is_best_effort());
    assert_eq!(meta.content_type(), "image/png");
    assert_eq!(meta.size(), SIZE as u64);
    assert_eq!(meta.filename(), "cat.png");

    let content = service
        .reader
        .fetch_content(&visitor, &receipt.id)
        .await
        .unwrap();
    assert_eq!(content.data, data);
    service
        .reader
        .record_download(&visitor, &receipt.id)
        .await
        .unwrap();

    let owned = service.gateway.owned_objects(&owner).await.unwrap();
    assert_eq!(owned[0].download_count, 1);
    assert!(owned[0].finalized && owned[0].is_shared);

    let own_view = service
        .reader
        .resolve_metadata(&owner, &receipt.id)
        .await
        .unwrap();
    assert!(!own_view.is_best_effort());

    service
        .gateway
        .delete_object(&owner, &receipt.id)
        .await
        .unwrap();
    assert!(matches!(
        service.reader.fetch_content(&visitor, &receipt.id).await,
        Err(ShareError::NotFound(_))
    ));
}
