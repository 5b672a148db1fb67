//! Payload handler registry.
//!
//! A `Handler` is the policy object for one payload type tag: it decides how
//! many data files are legal, what `clears_provides` defaults to, what
//! `provides` get computed from the data files, and what happens to a data
//! file's bytes as they stream past (`store_update`). The mechanics shared
//! by every handler (walking `headers/NNNN/*`, framing `data/NNNN.tar.<comp>`,
//! checksumming) live in `reader`/`writer`, not here, so `Handler` stays a
//! small, object-safe trait: one trait rather than a closed enum, since the
//! registry supports runtime registration of new tags.

mod bootstrap;
mod legacy;
mod module_image;
mod rootfs;

pub use bootstrap::BootstrapHandler;
pub use legacy::LegacyHandler;
pub use module_image::ModuleImageHandler;
pub use rootfs::RootfsImageHandler;

use std::collections::BTreeMap;
use std::io::Read;

use crate::error::{Error, Result};

/// One data file belonging to an update, as recorded in the manifest or
/// (v1) the per-update `checksums/` subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub date: Option<u64>,
    pub checksum: String,
}

/// The per-update header state, shared across all handler types: what
/// differs between `rootfs-image` and `module-image` is policy, not shape.
#[derive(Debug, Clone, Default)]
pub struct UpdateHeader {
    pub type_tag: String,
    pub files: Vec<FileInfo>,
    pub provides: BTreeMap<String, String>,
    pub depends: BTreeMap<String, String>,
    pub clears_provides: Vec<String>,
    pub meta_data: serde_json::Value,
}

impl UpdateHeader {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            files: Vec::new(),
            provides: BTreeMap::new(),
            depends: BTreeMap::new(),
            clears_provides: Vec::new(),
            meta_data: serde_json::Value::Object(Default::default()),
        }
    }

    /// v3 augment-overlay merge: overlay values win on a per-field basis,
    /// original-only keys persist.
    pub fn merge_augment(&self, augment: &UpdateHeader) -> UpdateHeader {
        let mut merged = self.clone();
        if !augment.type_tag.is_empty() {
            merged.type_tag = augment.type_tag.clone();
        }
        for (k, v) in &augment.provides {
            merged.provides.insert(k.clone(), v.clone());
        }
        for (k, v) in &augment.depends {
            merged.depends.insert(k.clone(), v.clone());
        }
        if !augment.clears_provides.is_empty() {
            merged.clears_provides = augment.clears_provides.clone();
        }
        if let serde_json::Value::Object(extra) = &augment.meta_data {
            if !extra.is_empty() {
                if let serde_json::Value::Object(base) = &mut merged.meta_data {
                    for (k, v) in extra {
                        base.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        if !augment.files.is_empty() {
            let mut by_name: BTreeMap<String, FileInfo> = merged.files.into_iter().map(|f| (f.name.clone(), f)).collect();
            for f in &augment.files {
                by_name.insert(f.name.clone(), f.clone());
            }
            merged.files = by_name.into_values().collect();
        }
        merged
    }
}

/// The policy object for one update type tag.
pub trait Handler: Send + Sync {
    fn type_tag(&self) -> &str;

    /// Default `clears_provides` wildcards when the header didn't declare
    /// any explicitly.
    fn default_clears_provides(&self, update_type: &str) -> Vec<String>;

    /// Rejects an illegal number of data files for this handler (e.g.
    /// `rootfs-image` requires exactly one).
    fn validate_file_count(&self, n: usize) -> Result<()>;

    /// Provides entries computed from the data files themselves (e.g.
    /// `rootfs-image.checksum`), merged under the declared `provides`.
    fn compute_provides(&self, _files: &[FileInfo]) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Consumes one data file's bytes. The default discards them after the
    /// caller's checksum-tee reader verifies the digest; a persisting
    /// handler would copy `reader` to storage here instead.
    fn store_update(&self, reader: &mut dyn Read, _file_info: &FileInfo) -> Result<()> {
        let mut sink = [0u8; 8192];
        loop {
            let n = reader.read(&mut sink)?;
            if n == 0 {
                break;
            }
        }
        Ok(())
    }
}

/// Matches a `clears_provides` wildcard (`*` only, anchored) against a
/// provides key. The glob dialect this supports is recorded in DESIGN.md.
pub fn clears_provides_matches(pattern: &str, key: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == key,
        Some((prefix, suffix)) => key.starts_with(prefix) && key.ends_with(suffix) && key.len() >= prefix.len() + suffix.len(),
    }
}

type HandlerFactory = Box<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// Maps a type tag to the handler responsible for it. An explicit registry
/// value is threaded through reader/writer constructors rather than relying
/// on global registration.
#[derive(Default)]
pub struct Registry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry pre-populated with the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("rootfs-image", || Box::new(RootfsImageHandler)).expect("builtin registration cannot collide");
        registry.register("", || Box::new(BootstrapHandler)).expect("builtin registration cannot collide");
        registry
    }

    pub fn register<F>(&mut self, type_tag: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Handler> + Send + Sync + 'static,
    {
        let tag = type_tag.into();
        if self.factories.contains_key(&tag) {
            return Err(Error::HandlerAlreadyRegistered(tag));
        }
        self.factories.insert(tag, Box::new(factory));
        Ok(())
    }

    /// Looks up a handler by tag. `strict` controls the miss policy: a v3
    /// reader may fall back to the generic `module-image` handler, a strict
    /// caller gets `UnknownUpdateType`.
    pub fn lookup(&self, type_tag: &str, strict: bool) -> Result<Box<dyn Handler>> {
        if let Some(factory) = self.factories.get(type_tag) {
            return Ok(factory());
        }
        if strict {
            Err(Error::UnknownUpdateType(type_tag.to_string()))
        } else {
            Ok(Box::new(ModuleImageHandler::new(type_tag.to_string())))
        }
    }

    /// v1 artifacts fall back to the permissive legacy handler regardless of
    /// tag; v1 is treated as read-only in this implementation (see
    /// DESIGN.md).
    pub fn lookup_v1(&self, type_tag: &str) -> Box<dyn Handler> {
        Box::new(LegacyHandler::new(type_tag.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clears_provides_exact_match() {
        assert!(clears_provides_matches("artifact_group", "artifact_group"));
        assert!(!clears_provides_matches("artifact_group", "artifact_group2"));
    }

    #[test]
    fn clears_provides_wildcard_suffix() {
        assert!(clears_provides_matches("rootfs-image.*", "rootfs-image.checksum"));
        assert!(clears_provides_matches("rootfs-image.*", "rootfs-image.version"));
        assert!(!clears_provides_matches("rootfs-image.*", "rootfs_image_checksum"));
    }

    #[test]
    fn registry_rejects_duplicate_registration() {
        let mut registry = Registry::new();
        registry.register("custom", || Box::new(BootstrapHandler)).unwrap();
        assert!(registry.register("custom", || Box::new(BootstrapHandler)).is_err());
    }

    #[test]
    fn registry_lookup_falls_back_to_module_image_when_lenient() {
        let registry = Registry::with_builtins();
        let handler = registry.lookup("my-custom-type", false).unwrap();
        assert_eq!(handler.type_tag(), "my-custom-type");
    }

    #[test]
    fn registry_lookup_strict_rejects_unknown_type() {
        let registry = Registry::with_builtins();
        assert!(registry.lookup("my-custom-type", true).is_err());
    }

    #[test]
    fn merge_augment_keeps_original_only_keys_and_overrides_shared_ones() {
        let mut original = UpdateHeader::new("testType");
        original.provides.insert("originalOnlyKey".to_string(), "originalValue".to_string());
        original.provides.insert("overrideProvideKey".to_string(), "originalOverrideValue".to_string());

        let mut augment = UpdateHeader::new("augmentType");
        augment.provides.insert("overrideProvideKey".to_string(), "augmentOverrideProvideValue".to_string());

        let merged = original.merge_augment(&augment);
        assert_eq!(merged.type_tag, "augmentType");
        assert_eq!(merged.provides.get("originalOnlyKey"), Some(&"originalValue".to_string()));
        assert_eq!(merged.provides.get("overrideProvideKey"), Some(&"augmentOverrideProvideValue".to_string()));
    }
}
