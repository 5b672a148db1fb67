//! Wire records for the `headers/NNNN/*` subtree, shared between the reader
//! and the writer so both sides agree on the JSON shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TypeInfoRecord {
    #[serde(rename = "type", default)]
    pub type_tag: String,
    #[serde(default)]
    pub provides: BTreeMap<String, String>,
    #[serde(default)]
    pub depends: BTreeMap<String, String>,
    #[serde(default)]
    pub clears_provides: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FileListRecord {
    pub files: Vec<FileListEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileListEntry {
    pub name: String,
}
