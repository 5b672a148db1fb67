use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::stream::sha256_hex;

use super::{FileInfo, Handler};

/// The built-in `rootfs-image` handler: exactly one data file, typically an
/// ext4 image. Writes a computed `rootfs-image.checksum` provide unless the
/// caller already declared one.
#[derive(Debug, Default)]
pub struct RootfsImageHandler;

impl Handler for RootfsImageHandler {
    fn type_tag(&self) -> &str {
        "rootfs-image"
    }

    fn default_clears_provides(&self, _update_type: &str) -> Vec<String> {
        vec!["artifact_group".to_string(), "rootfs_image_checksum".to_string(), "rootfs-image.*".to_string()]
    }

    fn validate_file_count(&self, n: usize) -> Result<()> {
        if n == 1 {
            Ok(())
        } else {
            Err(Error::CorruptArchive(format!("rootfs-image requires exactly one data file, got {n}")))
        }
    }

    fn compute_provides(&self, files: &[FileInfo]) -> BTreeMap<String, String> {
        let mut provides = BTreeMap::new();
        if let Some(file) = files.first() {
            if !file.checksum.is_empty() {
                provides.insert("rootfs-image.checksum".to_string(), file.checksum.clone());
            }
        }
        provides
    }
}

/// Computes what `rootfs-image.checksum` would be for raw file bytes, used
/// by the writer before the manifest digest is known.
pub fn rootfs_checksum(data: &[u8]) -> String {
    sha256_hex(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_or_multiple_files() {
        let handler = RootfsImageHandler;
        assert!(handler.validate_file_count(0).is_err());
        assert!(handler.validate_file_count(2).is_err());
        assert!(handler.validate_file_count(1).is_ok());
    }

    #[test]
    fn default_clears_provides_covers_legacy_and_checksum_keys() {
        let handler = RootfsImageHandler;
        assert_eq!(
            handler.default_clears_provides("rootfs-image"),
            vec!["artifact_group".to_string(), "rootfs_image_checksum".to_string(), "rootfs-image.*".to_string()]
        );
    }

    #[test]
    fn computes_checksum_provide_from_file() {
        let handler = RootfsImageHandler;
        let files = vec![FileInfo {
            name: "update.ext4".to_string(),
            size: 15,
            date: None,
            checksum: "a".repeat(64),
        }];
        let provides = handler.compute_provides(&files);
        assert_eq!(provides.get("rootfs-image.checksum"), Some(&"a".repeat(64)));
    }
}
