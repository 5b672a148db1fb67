use crate::error::Result;

use super::Handler;

/// Handler for version-1 artifacts: a permissive stub that accepts whatever
/// type string appears in the header, for forward compatibility with old
/// artifacts whose header subtree layout predates the v2/v3 conventions.
///
/// v1 is treated as read-only here: this handler exists to let a v1 artifact
/// be read and its contents inspected, never to produce new v1 output.
#[derive(Debug)]
pub struct LegacyHandler {
    type_tag: String,
}

impl LegacyHandler {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self { type_tag: type_tag.into() }
    }
}

impl Handler for LegacyHandler {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn default_clears_provides(&self, _update_type: &str) -> Vec<String> {
        Vec::new()
    }

    fn validate_file_count(&self, _n: usize) -> Result<()> {
        Ok(())
    }
}
