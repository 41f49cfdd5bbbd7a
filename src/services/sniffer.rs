//! Magic-byte content type detection.
//!
//! Heuristic only: used when no declared type is available, or to sanity
//! check one. Any payload starting with three zero bytes is reported as MP4,
//! which misclassifies other formats with a zero prefix.

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Bytes worth passing in; shorter prefixes are fine but may not match.
pub const SNIFF_LEN: usize = 12;

/// Best-guess MIME type for a payload prefix. First match wins.
pub fn sniff(prefix: &[u8]) -> &'static str {
    let starts = |magic: &[u8]| prefix.starts_with(magic);

    if starts(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if starts(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if starts(&[0x47, 0x49, 0x46]) {
        "image/gif"
    } else if starts(&[0x52, 0x49, 0x46, 0x46]) {
        "image/webp"
    } else if prefix.get(4..8) == Some(b"ftyp".as_slice()) || starts(&[0x00, 0x00, 0x00]) {
        "video/mp4"
    } else {
        OCTET_STREAM
    }
}

/// Like [`sniff`], but `None` when nothing matched.
pub fn recognize(prefix: &[u8]) -> Option<&'static str> {
    match sniff(prefix) {
        OCTET_STREAM => None,
        known => Some(known),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_table() {
        let cases: Vec<(&[u8], &str)> = vec![
            (&[0xFFu8, 0xD8, 0xFF, 0xE0, 0x00, 0x10][..], "image/jpeg"),
            (&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A][..], "image/png"),
            (b"GIF89a".as_slice(), "image/gif"),
            (b"RIFF\x24\x00\x00\x00WEBP".as_slice(), "image/webp"),
            (b"\x00\x00\x00\x18ftypmp42".as_slice(), "video/mp4"),
            (b"\x1aE\xdf\xa3ftypisom".as_slice(), "video/mp4"),
            (b"%PDF-1.7".as_slice(), OCTET_STREAM),
        ];
        for (bytes, expected) in cases {
            assert_eq!(sniff(bytes), expected, "prefix {:02x?}", bytes);
        }
    }

    #[test]
    fn test_zero_prefix_reads_as_mp4() {
        assert_eq!(sniff(&[0u8; 12]), "video/mp4");
    }

    #[test]
    fn test_short_prefixes_do_not_panic() {
        assert_eq!(sniff(&[]), OCTET_STREAM);
        assert_eq!(sniff(&[0xFF, 0xD8]), OCTET_STREAM);
        assert_eq!(sniff(&[0x00, 0x00]), OCTET_STREAM);
        assert_eq!(recognize(b"GIF"), Some("image/gif"));
        assert_eq!(recognize(b"hello"), None);
    }
}
