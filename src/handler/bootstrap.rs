use crate::error::{Error, Result};

use super::Handler;

/// The `bootstrap` handler: an update with header and metadata but zero data
/// files. Its type tag is the empty string.
#[derive(Debug, Default)]
pub struct BootstrapHandler;

impl Handler for BootstrapHandler {
    fn type_tag(&self) -> &str {
        ""
    }

    fn default_clears_provides(&self, _update_type: &str) -> Vec<String> {
        Vec::new()
    }

    fn validate_file_count(&self, n: usize) -> Result<()> {
        if n == 0 {
            Ok(())
        } else {
            Err(Error::CorruptArchive(format!("bootstrap update must carry zero data files, got {n}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_any_data_file() {
        let handler = BootstrapHandler;
        assert!(handler.validate_file_count(0).is_ok());
        assert!(handler.validate_file_count(1).is_err());
    }

    #[test]
    fn type_tag_is_empty() {
        assert_eq!(BootstrapHandler.type_tag(), "");
    }
}
