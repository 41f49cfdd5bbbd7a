//! Core data models for the chunked file store.
//!
//! File objects carry metadata only; payload bytes live in index-addressed
//! chunks. Everything here serializes naturally as JSON via `serde`.

pub mod chunk;
pub mod file_object;
pub mod principal;

pub use chunk::{Chunk, ChunkInfo};
pub use file_object::{DeclareRequest, FileObject, ReconstructedMetadata, ResolvedMetadata};
pub use principal::Principal;
