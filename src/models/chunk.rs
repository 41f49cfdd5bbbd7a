//! Represents one indexed payload fragment of a file.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single stored chunk.
///
/// `size` duplicates `data.len()` on purpose: it is what the writer claimed,
/// and gateways reject a chunk whose claim disagrees with its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Identifier of the owning file object.
    pub file_id: String,

    /// Position within the file, in `[0, total_chunks)`.
    pub index: u32,

    /// Raw payload bytes.
    pub data: Bytes,

    /// Payload length in bytes.
    pub size: u64,

    /// Chunk count the writer declared for the whole file.
    pub total_chunks: u32,
}

impl Chunk {
    pub fn new(file_id: impl Into<String>, index: u32, data: Bytes, total_chunks: u32) -> Self {
        let size = data.len() as u64;
        Self {
            file_id: file_id.into(),
            index,
            data,
            size,
            total_chunks,
        }
    }
}

/// Declared shape of a file, as recorded at declare time.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkInfo {
    pub size: u64,
    pub chunk_count: u32,
}
