//! Stream primitives: tar entry iteration, checksum-tee readers/writers,
//! and the compression capability.

pub mod checksum;
pub mod compress;

pub use checksum::{sha256_hex, ChecksumReader, ChecksumWriter};
pub use compress::{decompress_reader, CompressWriter, CompressionKind};

use crate::error::{Error, Result};

/// Formats a payload index as the zero-padded 4-digit string used in every
/// `headers/NNNN/...` and `data/NNNN.tar.<comp>` path.
pub fn format_index(index: u32) -> String {
    format!("{index:04}")
}

/// Parses the `NNNN` component out of a path segment like `headers/0001/files`
/// or `data/0001.tar.gz`, returning the numeric index.
pub fn parse_index(segment: &str) -> Result<u32> {
    if segment.len() != 4 || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidPayloadIndex(segment.to_string()));
    }
    segment.parse::<u32>().map_err(|_| Error::InvalidPayloadIndex(segment.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_index_zero_pads() {
        assert_eq!(format_index(0), "0000");
        assert_eq!(format_index(42), "0042");
        assert_eq!(format_index(9999), "9999");
    }

    #[test]
    fn parse_index_round_trips() {
        assert_eq!(parse_index("0000").unwrap(), 0);
        assert_eq!(parse_index("9999").unwrap(), 9999);
    }

    #[test]
    fn parse_index_rejects_bad_width() {
        assert!(parse_index("10000").is_err());
        assert!(parse_index("1").is_err());
        assert!(parse_index("abcd").is_err());
    }
}
