use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// The compression suffixes a `header.tar.<comp>` / `data/NNNN.tar.<comp>`
/// entry name may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    Gzip,
    Xz,
    Zstd,
}

impl CompressionKind {
    pub fn suffix(self) -> &'static str {
        match self {
            CompressionKind::Gzip => "gz",
            CompressionKind::Xz => "xz",
            CompressionKind::Zstd => "zst",
        }
    }

    /// Parses the compression suffix off a name like `header.tar.gz` or
    /// `data/0000.tar.zst`.
    pub fn from_entry_name(name: &str) -> Result<Self> {
        let suffix = name.rsplit('.').next().unwrap_or_default();
        match suffix {
            "gz" => Ok(CompressionKind::Gzip),
            "xz" => Ok(CompressionKind::Xz),
            "zst" => Ok(CompressionKind::Zstd),
            other => Err(Error::UnsupportedCompression(other.to_string())),
        }
    }
}

/// A compressing writer that must be explicitly `finish()`ed to flush the
/// trailing footer/checksum, unlike a plain `flush()`.
///
/// The compression back-end is treated as an external collaborator; gzip
/// (via `flate2`) is the one concrete implementation this codec ships,
/// matching the only suffix exercised by the bundled test fixtures.
pub enum CompressWriter<W: Write> {
    Gzip(GzEncoder<W>),
}

impl<W: Write> CompressWriter<W> {
    pub fn new(kind: CompressionKind, writer: W) -> Result<Self> {
        match kind {
            CompressionKind::Gzip => Ok(CompressWriter::Gzip(GzEncoder::new(writer, Compression::default()))),
            other => Err(Error::UnsupportedCompression(other.suffix().to_string())),
        }
    }

    pub fn finish(self) -> Result<W> {
        match self {
            CompressWriter::Gzip(enc) => Ok(enc.finish()?),
        }
    }
}

impl<W: Write> Write for CompressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressWriter::Gzip(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressWriter::Gzip(enc) => enc.flush(),
        }
    }
}

/// Wraps `reader` so that reads through it are decompressed.
pub fn decompress_reader<'a, R: Read + 'a>(kind: CompressionKind, reader: R) -> Result<Box<dyn Read + 'a>> {
    match kind {
        CompressionKind::Gzip => Ok(Box::new(GzDecoder::new(reader))),
        other => Err(Error::UnsupportedCompression(other.suffix().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn from_entry_name_recognizes_gzip() {
        assert_eq!(CompressionKind::from_entry_name("header.tar.gz").unwrap(), CompressionKind::Gzip);
        assert_eq!(CompressionKind::from_entry_name("data/0000.tar.gz").unwrap(), CompressionKind::Gzip);
    }

    #[test]
    fn from_entry_name_rejects_unknown_suffix() {
        assert!(CompressionKind::from_entry_name("header.tar.rar").is_err());
    }

    #[test]
    fn gzip_round_trips() {
        let mut w = CompressWriter::new(CompressionKind::Gzip, Vec::new()).unwrap();
        w.write_all(b"hello world").unwrap();
        let out = w.finish().unwrap();

        let mut r = decompress_reader(CompressionKind::Gzip, Cursor::new(out)).unwrap();
        let mut got = Vec::new();
        r.read_to_end(&mut got).unwrap();
        assert_eq!(got, b"hello world");
    }
}
