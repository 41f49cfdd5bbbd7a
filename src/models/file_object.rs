//! Metadata records describing uploaded files.

use super::principal::Principal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authoritative metadata for an uploaded file.
///
/// Only the payload lives in chunks; this record is what the owner sees when
/// listing uploads.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FileObject {
    /// Identifier minted at declare time.
    pub id: String,

    /// Display name supplied by the owner.
    pub filename: String,

    /// MIME type supplied by the owner (or sniffed when none was given).
    pub content_type: String,

    /// Principal that declared the upload. Never changes.
    pub owner: Principal,

    /// Total payload length in bytes.
    pub size: u64,

    /// Number of chunks the payload is split into.
    pub chunk_count: u32,

    /// When the upload was declared.
    pub uploaded: DateTime<Utc>,

    /// Completed downloads recorded so far.
    pub download_count: u64,

    /// Whether non-owners may read the object.
    pub is_shared: bool,

    /// Whether the writer has signalled that every chunk was sent.
    pub finalized: bool,
}

/// Parameters of the declare step.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeclareRequest {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub chunk_count: u32,
}

/// Best-effort metadata rebuilt from stored chunk bytes.
///
/// Produced when the caller cannot see the authoritative record. The owner is
/// not disclosed, the upload time is the reconstruction time, and the filename
/// is recovered from the identifier, so none of these fields are guaranteed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReconstructedMetadata {
    pub id: String,
    pub filename: String,
    /// Sniffed from the first chunk, not declared.
    pub content_type: String,
    /// Sum of the stored chunk payload lengths.
    pub size: u64,
    /// Number of chunks observed in the store.
    pub chunk_count: u32,
    /// Approximate: reconstruction time.
    pub uploaded: DateTime<Utc>,
    /// Not tracked in this view; always zero.
    pub download_count: u64,
    pub is_shared: bool,
}

/// Metadata as resolved for a particular caller.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "source", content = "metadata", rename_all = "snake_case")]
pub enum ResolvedMetadata {
    Authoritative(FileObject),
    Reconstructed(ReconstructedMetadata),
}

impl ResolvedMetadata {
    pub fn id(&self) -> &str {
        match self {
            Self::Authoritative(obj) => &obj.id,
            Self::Reconstructed(meta) => &meta.id,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Self::Authoritative(obj) => &obj.filename,
            Self::Reconstructed(meta) => &meta.filename,
        }
    }

    pub fn content_type(&self) -> &str {
        match self {
            Self::Authoritative(obj) => &obj.content_type,
            Self::Reconstructed(meta) => &meta.content_type,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::Authoritative(obj) => obj.size,
            Self::Reconstructed(meta) => meta.size,
        }
    }

    /// True when the record was rebuilt from chunk bytes rather than read.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, Self::Reconstructed(_))
    }
}
