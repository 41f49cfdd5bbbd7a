//! SqliteGateway: the durable store, backed by SQLite for metadata and local
//! disk for chunk payloads. Payloads are sharded beneath
//! `base_path/{shard}/{shard}/{file_id}/{index}.chunk`.

use super::{StorageGateway, ensure_named, mint_id, validate_chunk, validate_declare};
use crate::{
    errors::{ShareError, ShareResult},
    models::{Chunk, ChunkInfo, DeclareRequest, FileObject, Principal},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");
const MAX_DECLARE_ATTEMPTS: usize = 4;

#[derive(FromRow, Debug)]
struct FileRow {
    id: String,
    filename: String,
    content_type: String,
    owner: String,
    size_bytes: i64,
    chunk_count: i64,
    uploaded_at: DateTime<Utc>,
    download_count: i64,
    is_shared: bool,
    is_finalized: bool,
}

impl From<FileRow> for FileObject {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            filename: row.filename,
            content_type: row.content_type,
            owner: Principal::new(row.owner),
            size: row.size_bytes.max(0) as u64,
            chunk_count: row.chunk_count.clamp(0, u32::MAX as i64) as u32,
            uploaded: row.uploaded_at,
            download_count: row.download_count.max(0) as u64,
            is_shared: row.is_shared,
            finalized: row.is_finalized,
        }
    }
}

#[derive(FromRow, Debug)]
struct ChunkRow {
    chunk_index: i64,
    size_bytes: i64,
    total_chunks: i64,
}

const FILE_COLUMNS: &str = "id, filename, content_type, owner, size_bytes, chunk_count, \
     uploaded_at, download_count, is_shared, is_finalized";

/// Durable gateway over a SQLite pool and a payload directory.
#[derive(Clone)]
pub struct SqliteGateway {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where chunk payloads are stored.
    pub base_path: PathBuf,
}

impl SqliteGateway {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> ShareResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Two-level shard identifiers for a file id: the first two bytes of
    /// MD5(id) as lowercase hex. Keeps directory fan-out bounded.
    fn shards(id: &str) -> (String, String) {
        let digest = md5::compute(id);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_dir(&self, id: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(id);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(id);
        path
    }

    fn chunk_path(&self, id: &str, index: u32) -> PathBuf {
        self.object_dir(id).join(format!("{}.chunk", index))
    }

    /// Ids end up as directory names, so anything that could escape the
    /// payload root is treated as unknown.
    fn ensure_id_safe(id: &str) -> ShareResult<()> {
        if id.is_empty()
            || id.contains("..")
            || id
                .bytes()
                .any(|b| b == b'/' || b == b'\\' || b == b'\0' || b.is_ascii_control())
        {
            return Err(ShareError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn fetch_file(&self, id: &str) -> ShareResult<Option<FileObject>> {
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {} FROM files WHERE id = ?",
            FILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row.map(FileObject::from))
    }

    /// Fetch a file row the caller owns.
    ///
    /// NotFound when missing, PermissionDenied when someone else owns it.
    async fn fetch_owned(&self, caller: &Principal, id: &str) -> ShareResult<FileObject> {
        ensure_named(caller, id)?;
        Self::ensure_id_safe(id)?;
        let object = self
            .fetch_file(id)
            .await?
            .ok_or_else(|| ShareError::NotFound(id.to_string()))?;
        if &object.owner != caller {
            return Err(ShareError::PermissionDenied(id.to_string()));
        }
        Ok(object)
    }

    /// Write a payload to a temp file, fsync it, and rename it into place so
    /// readers only ever see a whole chunk.
    async fn write_payload(&self, path: &Path, data: &[u8]) -> ShareResult<()> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ShareError::Io(io::Error::other("chunk path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, path).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ShareError::Io(err));
        }
        Ok(())
    }

    /// Remove a payload that lost its file row, along with any directories
    /// left empty.
    async fn discard_payload(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("could not discard {}: {}", path.display(), err),
        }
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
    }

    /// Upsert a chunk row only while the caller's file row still exists.
    /// Returns false when the file was deleted after the ownership check.
    async fn record_chunk(
        &self,
        caller: &Principal,
        chunk: &Chunk,
        etag: &str,
    ) -> ShareResult<bool> {
        let result = sqlx::query(
            "INSERT INTO chunks (file_id, chunk_index, size_bytes, total_chunks, etag, written_at)
             SELECT ?, ?, ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM files WHERE id = ? AND owner = ?)
             ON CONFLICT(file_id, chunk_index) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                total_chunks = excluded.total_chunks,
                etag = excluded.etag,
                written_at = excluded.written_at",
        )
        .bind(&chunk.file_id)
        .bind(chunk.index as i64)
        .bind(chunk.size as i64)
        .bind(chunk.total_chunks as i64)
        .bind(etag)
        .bind(Utc::now())
        .bind(&chunk.file_id)
        .bind(caller.as_str())
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn read_payload(&self, id: &str, index: u32) -> ShareResult<Option<Bytes>> {
        match fs::read(self.chunk_path(id, index)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ShareError::Io(err)),
        }
    }

    /// Remove empty directories from `start` up to (not including) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    async fn probe_disk(&self) -> ShareResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if bytes? != b"readyz" {
            return Err(ShareError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "probe file content mismatch",
            )));
        }
        Ok(())
    }
}

/// Return true if the SQLx error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[async_trait]
impl StorageGateway for SqliteGateway {
    async fn declare(&self, caller: &Principal, request: DeclareRequest) -> ShareResult<String> {
        ensure_named(caller, &request.filename)?;
        validate_declare(&request)?;

        let uploaded = Utc::now();
        let mut at = uploaded;
        for _ in 0..MAX_DECLARE_ATTEMPTS {
            let id = mint_id(&request.filename, at);
            let inserted = sqlx::query(
                "INSERT INTO files (id, filename, content_type, owner, size_bytes, chunk_count,
                                    uploaded_at, download_count, is_shared, is_finalized)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, 0)",
            )
            .bind(&id)
            .bind(&request.filename)
            .bind(&request.content_type)
            .bind(caller.as_str())
            .bind(request.size as i64)
            .bind(request.chunk_count as i64)
            .bind(uploaded)
            .execute(&*self.db)
            .await;

            match inserted {
                Ok(_) => {
                    info!(
                        "declared {} ({} bytes, {} chunks) for {}",
                        id, request.size, request.chunk_count, caller
                    );
                    return Ok(id);
                }
                Err(err) if is_unique_violation(&err) => {
                    debug!("id {} already taken, re-minting", id);
                    at += chrono::Duration::nanoseconds(1);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ShareError::GatewayUnavailable(
            "could not mint a unique file id".into(),
        ))
    }

    async fn write_chunk(&self, caller: &Principal, chunk: Chunk) -> ShareResult<()> {
        let object = self.fetch_owned(caller, &chunk.file_id).await?;
        validate_chunk(&chunk, object.chunk_count)?;
        if object.finalized {
            warn!("chunk {} written to finalized {}", chunk.index, object.id);
        }

        let path = self.chunk_path(&object.id, chunk.index);
        self.write_payload(&path, &chunk.data).await?;

        let etag = format!("{:x}", md5::compute(&chunk.data));
        if !self.record_chunk(caller, &chunk, &etag).await? {
            warn!("{} was deleted while chunk {} was written", object.id, chunk.index);
            self.discard_payload(&path).await;
            return Err(ShareError::NotFound(object.id));
        }

        debug!(
            "stored chunk {}/{} of {} ({} bytes, etag {})",
            chunk.index + 1,
            chunk.total_chunks,
            object.id,
            chunk.size,
            etag
        );
        Ok(())
    }

    async fn finalize(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        self.fetch_owned(caller, id).await?;
        sqlx::query("UPDATE files SET is_finalized = 1 WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        info!("finalized {}", id);
        Ok(())
    }

    async fn publish(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        self.fetch_owned(caller, id).await?;
        sqlx::query("UPDATE files SET is_shared = 1 WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        info!("published {}", id);
        Ok(())
    }

    async fn owned_objects(&self, caller: &Principal) -> ShareResult<Vec<FileObject>> {
        if caller.is_anonymous() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {} FROM files WHERE owner = ? ORDER BY uploaded_at DESC, id ASC",
            FILE_COLUMNS
        ))
        .bind(caller.as_str())
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.into_iter().map(FileObject::from).collect())
    }

    async fn is_published(&self, id: &str) -> ShareResult<bool> {
        let shared = sqlx::query_scalar::<_, bool>("SELECT is_shared FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(shared.unwrap_or(false))
    }

    async fn chunks(&self, id: &str) -> ShareResult<Vec<Chunk>> {
        if Self::ensure_id_safe(id).is_err() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT chunk_index, size_bytes, total_chunks
             FROM chunks WHERE file_id = ? ORDER BY chunk_index ASC",
        )
        .bind(id)
        .fetch_all(&*self.db)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len());
        for row in rows {
            let index = row.chunk_index.clamp(0, u32::MAX as i64) as u32;
            let Some(data) = self.read_payload(id, index).await? else {
                warn!("chunk {} of {} has metadata but no payload", index, id);
                continue;
            };
            if data.len() as i64 != row.size_bytes {
                warn!(
                    "chunk {} of {} recorded {} bytes, payload holds {}",
                    index,
                    id,
                    row.size_bytes,
                    data.len()
                );
            }
            chunks.push(Chunk::new(
                id,
                index,
                data,
                row.total_chunks.clamp(0, u32::MAX as i64) as u32,
            ));
        }
        Ok(chunks)
    }

    async fn chunk_info(&self, id: &str) -> ShareResult<Option<ChunkInfo>> {
        Ok(self.fetch_file(id).await?.map(|object| ChunkInfo {
            size: object.size,
            chunk_count: object.chunk_count,
        }))
    }

    async fn delete_object(&self, caller: &Principal, id: &str) -> ShareResult<()> {
        self.fetch_owned(caller, id).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ShareError::NotFound(id.to_string()));
        }
        tx.commit().await?;

        let dir = self.object_dir(id);
        match fs::remove_dir_all(&dir).await {
            Ok(_) => debug!("removed payload directory {}", dir.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload directory {} already missing", dir.display());
            }
            Err(err) => return Err(ShareError::Io(err)),
        }
        if let Some(parent) = dir.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }

        info!("deleted {}", id);
        Ok(())
    }

    async fn record_download(&self, id: &str) -> ShareResult<()> {
        let result =
            sqlx::query("UPDATE files SET download_count = download_count + 1 WHERE id = ?")
                .bind(id)
                .execute(&*self.db)
                .await?;
        if result.rows_affected() == 0 {
            return Err(ShareError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn total_uploads(&self) -> ShareResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files")
            .fetch_one(&*self.db)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn upload_count(&self, caller: &Principal) -> ShareResult<u64> {
        if caller.is_anonymous() {
            return Ok(0);
        }
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files WHERE owner = ?")
            .bind(caller.as_str())
            .fetch_one(&*self.db)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn ping(&self) -> ShareResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(ShareError::GatewayUnavailable(format!(
                "unexpected probe result: {}",
                one
            )));
        }
        self.probe_disk()
            .await
            .map_err(|err| ShareError::GatewayUnavailable(format!("disk probe failed: {}", err)))
    }
}
