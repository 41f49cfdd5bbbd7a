//! Deterministic fixed-size chunking of a byte buffer.

use crate::errors::{ShareError, ShareResult};
use bytes::Bytes;

/// One piece of a split buffer, borrowed from the original allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkPart {
    pub index: u32,
    pub data: Bytes,
}

/// Number of chunks `len` bytes split into at `chunk_size`.
///
/// An empty buffer is one empty chunk, so a declared object always has at
/// least one index to write and to read back.
pub fn chunk_count(len: usize, chunk_size: usize) -> ShareResult<u32> {
    if chunk_size == 0 {
        return Err(ShareError::validation("chunk size must be positive"));
    }
    let count = len.div_ceil(chunk_size).max(1);
    u32::try_from(count)
        .map_err(|_| ShareError::validation(format!("{} chunks exceed the index range", count)))
}

/// Split `data` into ordered chunks of `chunk_size` bytes; the last may be
/// shorter. Slices share the input allocation.
pub fn split(data: &Bytes, chunk_size: usize) -> ShareResult<Vec<ChunkPart>> {
    let count = chunk_count(data.len(), chunk_size)?;
    let parts = (0..count)
        .map(|index| {
            let start = (index as usize * chunk_size).min(data.len());
            let end = (start + chunk_size).min(data.len());
            ChunkPart {
                index,
                data: data.slice(start..end),
            }
        })
        .collect();
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remainder_goes_in_last_chunk() {
        let data = Bytes::from((0..10u8).collect::<Vec<_>>());
        let parts = split(&data, 4).unwrap();
        let lens: Vec<usize> = parts.iter().map(|p| p.data.len()).collect();
        assert_eq!(lens, vec![4, 4, 2]);
        assert_eq!(parts[2].index, 2);
        assert_eq!(&parts[2].data[..], &[8, 9]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let data = Bytes::from(vec![7u8; 1_000_000]);
        let parts = split(&data, 500_000).unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.data.len() == 500_000));
    }

    #[test]
    fn test_empty_buffer_is_one_empty_chunk() {
        let parts = split(&Bytes::new(), 16).unwrap();
        assert_eq!(parts.len(), 1);
        assert!(parts[0].data.is_empty());
        assert_eq!(chunk_count(0, 16).unwrap(), 1);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        assert!(matches!(
            split(&Bytes::from_static(b"abc"), 0),
            Err(ShareError::Validation(_))
        ));
    }

    #[test]
    fn test_chunk_count_rounds_up() {
        assert_eq!(chunk_count(1_200_000, 500_000).unwrap(), 3);
        assert_eq!(chunk_count(1, 500_000).unwrap(), 1);
    }
}
