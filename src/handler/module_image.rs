use crate::error::Result;

use super::Handler;

/// The generic `module-image` handler: zero or more data files, free-form
/// meta-data. Used both for explicitly-declared module types and, in
/// lenient (non-strict) lookup mode, as the fallback for any unregistered
/// type tag.
#[derive(Debug)]
pub struct ModuleImageHandler {
    type_tag: String,
}

impl ModuleImageHandler {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self { type_tag: type_tag.into() }
    }
}

impl Handler for ModuleImageHandler {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn default_clears_provides(&self, update_type: &str) -> Vec<String> {
        vec![format!("rootfs-image.{update_type}.*")]
    }

    fn validate_file_count(&self, _n: usize) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_clears_provides_uses_declared_type() {
        let handler = ModuleImageHandler::new("testType");
        assert_eq!(handler.default_clears_provides("testType"), vec!["rootfs-image.testType.*".to_string()]);
    }

    #[test]
    fn accepts_any_number_of_files() {
        let handler = ModuleImageHandler::new("testType");
        assert!(handler.validate_file_count(0).is_ok());
        assert!(handler.validate_file_count(5).is_ok());
    }
}
