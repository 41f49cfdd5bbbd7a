//! Rebuilds a file's bytes from its complete chunk set.

use crate::{
    errors::{ShareError, ShareResult},
    models::Chunk,
};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use tracing::warn;

/// Declared shape the reassembled bytes must match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpectedShape {
    pub chunk_count: u32,
    /// Declared byte length, when known.
    pub size: Option<u64>,
}

/// Concatenate `chunks` in index order.
///
/// Every index in `[0, chunk_count)` must be present; a short buffer is never
/// returned. Without an `expected` shape, the chunk count the writer recorded
/// on the chunks themselves is used. When the same index appears more than
/// once, the occurrence latest in `chunks` wins.
pub fn reassemble(
    id: &str,
    chunks: Vec<Chunk>,
    expected: Option<ExpectedShape>,
) -> ShareResult<Bytes> {
    let chunk_count = match expected {
        Some(shape) => shape.chunk_count,
        None => recorded_count(id, &chunks),
    };

    let mut by_index = BTreeMap::new();
    for chunk in chunks {
        if chunk.index >= chunk_count {
            warn!(
                "ignoring chunk {} of {}: outside declared count {}",
                chunk.index, id, chunk_count
            );
            continue;
        }
        by_index.insert(chunk.index, chunk.data);
    }

    let missing: Vec<u32> = (0..chunk_count)
        .filter(|index| !by_index.contains_key(index))
        .collect();
    if !missing.is_empty() {
        return Err(ShareError::IncompleteObject {
            id: id.to_string(),
            missing,
        });
    }

    let total: usize = by_index.values().map(Bytes::len).sum();
    if let Some(declared) = expected.and_then(|shape| shape.size) {
        if declared != total as u64 {
            return Err(ShareError::SizeMismatch {
                id: id.to_string(),
                declared,
                actual: total as u64,
            });
        }
    }

    // A single chunk needs no copy.
    if by_index.len() == 1 {
        if let Some((_, data)) = by_index.pop_first() {
            return Ok(data);
        }
    }

    let mut buffer = BytesMut::with_capacity(total);
    for data in by_index.values() {
        buffer.extend_from_slice(data);
    }
    Ok(buffer.freeze())
}

/// Chunk count recorded on the chunks. An empty set counts as one missing
/// chunk so it can never reassemble to an empty file by accident.
fn recorded_count(id: &str, chunks: &[Chunk]) -> u32 {
    let max = chunks.iter().map(|c| c.total_chunks).max().unwrap_or(1);
    let min = chunks.iter().map(|c| c.total_chunks).min().unwrap_or(1);
    if min != max {
        warn!(
            "chunks of {} disagree on total count ({} vs {}), using {}",
            id, min, max, max
        );
    }
    max.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::splitter::split;
    use proptest::prelude::*;

    fn chunks_of(id: &str, data: &[u8], chunk_size: usize) -> Vec<Chunk> {
        let parts = split(&Bytes::copy_from_slice(data), chunk_size).unwrap();
        let total = parts.len() as u32;
        parts
            .into_iter()
            .map(|p| Chunk::new(id, p.index, p.data, total))
            .collect()
    }

    #[test]
    fn test_out_of_order_chunks_reassemble() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut chunks = chunks_of("f", &data, 300);
        chunks.reverse();
        let out = reassemble("f", chunks, None).unwrap();
        assert_eq!(&out[..], &data[..]);
    }

    #[test]
    fn test_missing_middle_index_is_rejected() {
        let data = vec![1u8; 50];
        let mut chunks = chunks_of("f", &data, 10);
        assert_eq!(chunks.len(), 5);
        chunks.remove(2);

        match reassemble("f", chunks, None) {
            Err(ShareError::IncompleteObject { id, missing }) => {
                assert_eq!(id, "f");
                assert_eq!(missing, vec![2]);
            }
            other => panic!("expected IncompleteObject, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_tail_is_caught_by_declared_count() {
        let chunks = chunks_of("f", b"abcdef", 3);
        let shape = ExpectedShape {
            chunk_count: 3,
            size: None,
        };
        assert!(matches!(
            reassemble("f", chunks, Some(shape)),
            Err(ShareError::IncompleteObject { missing, .. }) if missing == vec![2]
        ));
    }

    #[test]
    fn test_latest_write_per_index_wins() {
        let chunks = vec![
            Chunk::new("f", 0, Bytes::from_static(b"AA"), 2),
            Chunk::new("f", 1, Bytes::from_static(b"old"), 2),
            Chunk::new("f", 1, Bytes::from_static(b"new"), 2),
        ];
        let out = reassemble("f", chunks, None).unwrap();
        assert_eq!(&out[..], b"AAnew");
    }

    #[test]
    fn test_declared_size_must_match() {
        let chunks = chunks_of("f", b"abcdef", 4);
        let shape = ExpectedShape {
            chunk_count: 2,
            size: Some(7),
        };
        assert!(matches!(
            reassemble("f", chunks, Some(shape)),
            Err(ShareError::SizeMismatch {
                declared: 7,
                actual: 6,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_set_is_incomplete() {
        assert!(matches!(
            reassemble("f", Vec::new(), None),
            Err(ShareError::IncompleteObject { missing, .. }) if missing == vec![0]
        ));
    }

    #[test]
    fn test_empty_file_round_trips() {
        let chunks = chunks_of("f", b"", 8);
        let out = reassemble("f", chunks, None).unwrap();
        assert!(out.is_empty());
    }

    proptest! {
        #[test]
        fn split_then_reassemble_is_identity(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            chunk_size in 1usize..700,
        ) {
            let chunks = chunks_of("p", &data, chunk_size);
            let shape = ExpectedShape {
                chunk_count: chunks.len() as u32,
                size: Some(data.len() as u64),
            };
            let out = reassemble("p", chunks, Some(shape)).unwrap();
            prop_assert_eq!(&out[..], &data[..]);
        }
    }
}
