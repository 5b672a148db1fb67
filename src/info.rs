//! Info & header-info records.
//!
//! All three are plain JSON objects; unknown keys are ignored on read
//! (forward compatibility), known keys are validated eagerly.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const FORMAT: &str = "mender";

/// The mandatory first outer entry, `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub format: String,
    pub version: i64,
}

impl Info {
    pub fn new(version: i64) -> Self {
        Self { format: FORMAT.to_string(), version }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let info: Info = serde_json::from_slice(raw)?;
        if info.format != FORMAT {
            return Err(Error::WrongFormat(info.format));
        }
        if !(1..=3).contains(&info.version) {
            return Err(Error::UnsupportedVersion(info.version));
        }
        Ok(info)
    }
}

/// One entry of `header-info`'s `updates` list: just the type tag, or empty
/// for "bootstrap" (v1/v2) / "no override for this slot" (v3 augment).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateTypeEntry {
    #[serde(rename = "type")]
    pub type_tag: String,
}

/// v3 `artifact_provides`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactProvides {
    pub artifact_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_group: Option<String>,
}

/// v3 `artifact_depends`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactDepends {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_group: Option<Vec<String>>,
    pub device_type: Vec<String>,
}

/// `header-info`, version-tagged: v1/v2 carry `device_types_compatible`
/// directly, v3 moves that list into `artifact_depends.device_type` and adds
/// `artifact_provides`/`artifact_depends`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub updates: Vec<UpdateTypeEntry>,
    pub artifact_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_types_compatible: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_provides: Option<ArtifactProvides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_depends: Option<ArtifactDepends>,
}

impl HeaderInfo {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let info: HeaderInfo = serde_json::from_slice(raw)?;
        info.validate()?;
        Ok(info)
    }

    pub fn validate(&self) -> Result<()> {
        if self.artifact_name.is_empty() || self.artifact_name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidArtifactName(self.artifact_name.clone()));
        }
        if self.compatible_devices().is_empty() {
            return Err(Error::NoCompatibleDevices);
        }
        Ok(())
    }

    /// Version-aware accessor: v3's compatible devices live under
    /// `artifact_depends.device_type`, v1/v2 under `device_types_compatible`.
    pub fn compatible_devices(&self) -> &[String] {
        if let Some(depends) = &self.artifact_depends {
            &depends.device_type
        } else {
            self.device_types_compatible.as_deref().unwrap_or(&[])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_round_trips() {
        let info = Info::new(3);
        let raw = info.to_json().unwrap();
        let parsed = Info::from_json(&raw).unwrap();
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.format, "mender");
    }

    #[test]
    fn info_rejects_bad_format() {
        let raw = br#"{"format":"not-mender","version":2}"#;
        assert!(Info::from_json(raw).is_err());
    }

    #[test]
    fn info_rejects_unsupported_version() {
        let raw = br#"{"format":"mender","version":7}"#;
        assert!(matches!(Info::from_json(raw), Err(Error::UnsupportedVersion(7))));
    }

    #[test]
    fn info_ignores_unknown_keys() {
        let raw = br#"{"format":"mender","version":2,"future_field":true}"#;
        Info::from_json(raw).unwrap();
    }

    #[test]
    fn header_info_v2_uses_device_types_compatible() {
        let header = HeaderInfo {
            updates: vec![UpdateTypeEntry { type_tag: "rootfs-image".to_string() }],
            artifact_name: "release-1".to_string(),
            device_types_compatible: Some(vec!["vexpress-qemu".to_string()]),
            artifact_provides: None,
            artifact_depends: None,
        };
        header.validate().unwrap();
        assert_eq!(header.compatible_devices(), &["vexpress-qemu".to_string()]);
    }

    #[test]
    fn header_info_v3_uses_artifact_depends_device_type() {
        let header = HeaderInfo {
            updates: vec![UpdateTypeEntry { type_tag: "rootfs-image".to_string() }],
            artifact_name: "release-1".to_string(),
            device_types_compatible: None,
            artifact_provides: Some(ArtifactProvides { artifact_name: "release-1".to_string(), artifact_group: None }),
            artifact_depends: Some(ArtifactDepends {
                artifact_name: None,
                artifact_group: None,
                device_type: vec!["vexpress-qemu".to_string()],
            }),
        };
        header.validate().unwrap();
        assert_eq!(header.compatible_devices(), &["vexpress-qemu".to_string()]);
    }

    #[test]
    fn header_info_rejects_empty_device_list() {
        let header = HeaderInfo {
            updates: vec![],
            artifact_name: "release-1".to_string(),
            device_types_compatible: Some(vec![]),
            artifact_provides: None,
            artifact_depends: None,
        };
        assert!(matches!(header.validate(), Err(Error::NoCompatibleDevices)));
    }

    #[test]
    fn header_info_rejects_whitespace_in_name() {
        let header = HeaderInfo {
            updates: vec![],
            artifact_name: "release 1".to_string(),
            device_types_compatible: Some(vec!["qemu".to_string()]),
            artifact_provides: None,
            artifact_depends: None,
        };
        assert!(matches!(header.validate(), Err(Error::InvalidArtifactName(_))));
    }
}
