//! Manifest & checksum store.
//!
//! The manifest is the text-format checksum index: one
//! `"<64-hex-sha256>  <path>\n"` line per integrity-protected entry. It
//! doubles as the signature message for `manifest.sig`.

use std::cell::Cell;

use crate::error::{Error, Result};

struct Entry {
    path: String,
    digest: String,
    consumed: Cell<bool>,
}

/// An ordered list of `(path, digest)` pairs with a per-entry consumed bit.
///
/// Lookup is by exact path, case-sensitive, with no fallback.
#[derive(Default)]
pub struct Manifest {
    entries: Vec<Entry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Parses the manifest's raw bytes. Every non-empty line must match
    /// `^<64-hex><SP><SP><path>$`.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw).map_err(|_| Error::MalformedManifest("not valid UTF-8".to_string()))?;
        let mut manifest = Manifest::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let Some((digest, path)) = line.split_once("  ") else {
                return Err(Error::MalformedManifest(line.to_string()));
            };
            if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::MalformedManifest(line.to_string()));
            }
            if path.is_empty() {
                return Err(Error::MalformedManifest(line.to_string()));
            }
            manifest.entries.push(Entry {
                path: path.to_string(),
                digest: digest.to_lowercase(),
                consumed: Cell::new(false),
            });
        }
        Ok(manifest)
    }

    /// Appends an entry in insertion order (writer side). The serialized
    /// order this produces is exactly the signature input.
    pub fn push(&mut self, path: impl Into<String>, digest_hex: impl Into<String>) {
        self.entries.push(Entry {
            path: path.into(),
            digest: digest_hex.into().to_lowercase(),
            consumed: Cell::new(false),
        });
    }

    /// Read-only lookup; does not mark the entry consumed.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.iter().find(|e| e.path == path).map(|e| e.digest.as_str())
    }

    /// Looks up `path` and marks it consumed. Returns `MissingChecksum` if
    /// absent.
    pub fn get_and_mark(&self, path: &str) -> Result<String> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.path == path)
            .ok_or_else(|| Error::MissingChecksum { path: path.to_string() })?;
        entry.consumed.set(true);
        Ok(entry.digest.clone())
    }

    /// Entries whose consumed bit is still clear, in manifest order.
    pub fn files_not_marked(&self) -> Vec<String> {
        self.entries.iter().filter(|e| !e.consumed.get()).map(|e| e.path.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// The canonical serialization: exactly what a signer signs and a
    /// verifier checks against.
    pub fn raw_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.digest.as_bytes());
            out.extend_from_slice(b"  ");
            out.extend_from_slice(entry.path.as_bytes());
            out.push(b'\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_round_trip() {
        let digest = "a".repeat(64);
        let raw = format!("{digest}  data/0000/update.ext4\n");
        let manifest = Manifest::parse(raw.as_bytes()).unwrap();
        assert_eq!(manifest.get("data/0000/update.ext4"), Some(digest.as_str()));
        assert_eq!(manifest.raw_bytes(), raw.as_bytes());
    }

    #[test]
    fn get_and_mark_consumes_entry() {
        let digest = "b".repeat(64);
        let raw = format!("{digest}  version\n");
        let manifest = Manifest::parse(raw.as_bytes()).unwrap();
        assert!(manifest.files_not_marked().contains(&"version".to_string()));
        manifest.get_and_mark("version").unwrap();
        assert!(manifest.files_not_marked().is_empty());
    }

    #[test]
    fn get_and_mark_missing_path_errors() {
        let manifest = Manifest::parse(b"").unwrap();
        assert!(manifest.get_and_mark("nope").is_err());
    }

    #[test]
    fn parse_rejects_malformed_line() {
        assert!(Manifest::parse(b"not-a-valid-line\n").is_err());
        assert!(Manifest::parse(b"deadbeef  too-short-digest\n").is_err());
    }

    #[test]
    fn digest_comparison_is_case_insensitive_on_lookup() {
        let digest_upper = "C".repeat(64);
        let raw = format!("{digest_upper}  version\n");
        let manifest = Manifest::parse(raw.as_bytes()).unwrap();
        assert_eq!(manifest.get("version"), Some("c".repeat(64)).as_deref());
    }

    #[test]
    fn push_preserves_insertion_order_not_lexicographic() {
        let mut manifest = Manifest::new();
        manifest.push("version", "1".repeat(64));
        manifest.push("manifest", "0".repeat(64));
        let paths: Vec<_> = manifest.paths().collect();
        assert_eq!(paths, vec!["version", "manifest"]);
    }
}
