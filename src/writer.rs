//! Artifact writer.
//!
//! Operates in two phases: buffer the header sub-archive (and each update's
//! data sub-archive) to learn their lengths and digests, then emit the outer
//! tar in canonical order with a manifest built from those digests.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use log::debug;

use artifact_sign::Signer;

use crate::error::{Error, Result};
use crate::handler::{Handler, Registry};
use crate::info::{ArtifactDepends, ArtifactProvides, HeaderInfo, Info, UpdateTypeEntry};
use crate::manifest::Manifest;
use crate::stream::{self, ChecksumWriter, CompressWriter, CompressionKind};
use crate::subheader::{FileListEntry, FileListRecord, TypeInfoRecord};

/// One file belonging to an update, as supplied by the caller (the writer
/// computes its checksum, it does not take one on trust).
pub struct WriterFile {
    pub name: String,
    pub contents: Vec<u8>,
}

impl WriterFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), contents: contents.into() }
    }
}

/// One update to be written, in caller-supplied form.
pub struct WriterUpdate {
    pub type_tag: String,
    pub files: Vec<WriterFile>,
    pub provides: BTreeMap<String, String>,
    pub depends: BTreeMap<String, String>,
    pub clears_provides: Vec<String>,
    pub meta_data: serde_json::Value,
}

impl WriterUpdate {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            files: Vec::new(),
            provides: BTreeMap::new(),
            depends: BTreeMap::new(),
            clears_provides: Vec::new(),
            meta_data: serde_json::Value::Null,
        }
    }

    pub fn with_file(mut self, file: WriterFile) -> Self {
        self.files.push(file);
        self
    }
}

/// Configuration for one write. v1 is rejected: new implementations are
/// expected to treat it as read-only.
pub struct WriterConfig {
    version: i64,
    artifact_name: String,
    device_types_compatible: Vec<String>,
    artifact_group: Option<String>,
    signer: Option<Box<dyn Signer>>,
    on_disk_buffer: bool,
}

impl WriterConfig {
    pub fn new(version: i64, artifact_name: impl Into<String>, device_types_compatible: Vec<String>) -> Self {
        Self {
            version,
            artifact_name: artifact_name.into(),
            device_types_compatible,
            artifact_group: None,
            signer: None,
            on_disk_buffer: false,
        }
    }

    pub fn with_signer(mut self, signer: Box<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_artifact_group(mut self, group: impl Into<String>) -> Self {
        self.artifact_group = Some(group.into());
        self
    }

    pub fn with_on_disk_buffer(mut self, yes: bool) -> Self {
        self.on_disk_buffer = yes;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.version == 1 {
            return Err(Error::WriteNotSupportedForVersion(1));
        }
        if !(2..=3).contains(&self.version) {
            return Err(Error::UnsupportedVersion(self.version));
        }
        if self.artifact_name.is_empty() || self.artifact_name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidArtifactName(self.artifact_name.clone()));
        }
        if self.device_types_compatible.is_empty() {
            return Err(Error::NoCompatibleDevices);
        }
        Ok(())
    }
}

/// A seekable sink for the header buffer phase. `InMemory` is the default;
/// `OnDisk` trades memory for disk I/O when the header tree is large.
enum HeaderBuffer {
    InMemory(Vec<u8>),
    OnDisk(tempfile::NamedTempFile),
}

impl HeaderBuffer {
    fn in_memory() -> Self {
        HeaderBuffer::InMemory(Vec::new())
    }

    fn on_disk() -> Result<Self> {
        Ok(HeaderBuffer::OnDisk(tempfile::NamedTempFile::new()?))
    }

    fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            HeaderBuffer::InMemory(buf) => Ok(buf),
            HeaderBuffer::OnDisk(mut file) => {
                use std::io::{Seek, SeekFrom};
                file.as_file_mut().seek(SeekFrom::Start(0))?;
                let mut buf = Vec::new();
                file.as_file_mut().read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

impl Write for HeaderBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            HeaderBuffer::InMemory(v) => v.write(buf),
            HeaderBuffer::OnDisk(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            HeaderBuffer::InMemory(v) => v.flush(),
            HeaderBuffer::OnDisk(f) => f.flush(),
        }
    }
}

pub struct Writer {
    config: WriterConfig,
    registry: Registry,
}

impl Writer {
    pub fn new(config: WriterConfig, registry: Registry) -> Self {
        Self { config, registry }
    }

    pub fn write<W: Write>(self, updates: Vec<WriterUpdate>, mut sink: W) -> Result<()> {
        self.config.validate()?;

        let mut handlers: Vec<Box<dyn Handler>> = Vec::with_capacity(updates.len());
        for update in &updates {
            let handler = self.registry.lookup(&update.type_tag, false)?;
            handler.validate_file_count(update.files.len())?;
            handlers.push(handler);
        }

        let mut header_buffer = if self.config.on_disk_buffer { HeaderBuffer::on_disk()? } else { HeaderBuffer::in_memory() };
        let header_digest;
        {
            let mut header_tee = ChecksumWriter::new(&mut header_buffer);
            {
                let compressed = CompressWriter::new(CompressionKind::Gzip, &mut header_tee)?;
                let mut builder = tar::Builder::new(compressed);
                write_header_info(&mut builder, &self.config, &updates)?;
                for (index, (update, handler)) in updates.iter().zip(handlers.iter()).enumerate() {
                    write_subheader(&mut builder, index as u32, update, handler.as_ref())?;
                }
                let compressed = builder.into_inner()?;
                compressed.finish()?;
            }
            header_digest = header_tee.digest_hex();
        }
        let header_bytes = header_buffer.into_bytes()?;
        debug!("buffered header.tar.gz: {} bytes, digest {}", header_bytes.len(), header_digest);

        let mut manifest = Manifest::new();
        manifest.push("header.tar.gz", &header_digest);

        let mut data_tars = Vec::with_capacity(updates.len());
        for (index, update) in updates.iter().enumerate() {
            let mut data_buf = Vec::new();
            {
                let compressed = CompressWriter::new(CompressionKind::Gzip, &mut data_buf)?;
                let mut builder = tar::Builder::new(compressed);
                for file in &update.files {
                    let digest = stream::sha256_hex(&file.contents);
                    manifest.push(format!("data/{}/{}", stream::format_index(index as u32), file.name), digest);
                    append_plain_entry(&mut builder, &file.name, &file.contents)?;
                }
                let compressed = builder.into_inner()?;
                compressed.finish()?;
            }
            data_tars.push(data_buf);
        }

        let mut outer = tar::Builder::new(&mut sink);
        let info = Info::new(self.config.version);
        append_plain_entry(&mut outer, "version", &info.to_json()?)?;
        append_plain_entry(&mut outer, "manifest", &manifest.raw_bytes())?;
        if let Some(signer) = &self.config.signer {
            let signature = signer.sign(&manifest.raw_bytes()).map_err(Error::BadSignature)?;
            append_plain_entry(&mut outer, "manifest.sig", &signature)?;
        }
        append_plain_entry(&mut outer, "header.tar.gz", &header_bytes)?;
        for (index, data_bytes) in data_tars.into_iter().enumerate() {
            let name = format!("data/{}.tar.gz", stream::format_index(index as u32));
            append_plain_entry(&mut outer, &name, &data_bytes)?;
        }
        outer.finish()?;
        Ok(())
    }
}

fn write_header_info<W: Write>(builder: &mut tar::Builder<W>, config: &WriterConfig, updates: &[WriterUpdate]) -> Result<()> {
    let v3 = config.version == 3;
    let header_info = HeaderInfo {
        updates: updates.iter().map(|u| UpdateTypeEntry { type_tag: u.type_tag.clone() }).collect(),
        artifact_name: config.artifact_name.clone(),
        device_types_compatible: if v3 { None } else { Some(config.device_types_compatible.clone()) },
        artifact_provides: v3.then(|| ArtifactProvides {
            artifact_name: config.artifact_name.clone(),
            artifact_group: config.artifact_group.clone(),
        }),
        artifact_depends: v3.then(|| ArtifactDepends {
            artifact_name: None,
            artifact_group: None,
            device_type: config.device_types_compatible.clone(),
        }),
    };
    header_info.validate()?;
    append_plain_entry(builder, "header-info", &header_info.to_json()?)
}

fn write_subheader<W: Write>(builder: &mut tar::Builder<W>, index: u32, update: &WriterUpdate, handler: &dyn Handler) -> Result<()> {
    let prefix = format!("headers/{}", stream::format_index(index));
    let clears_provides = if update.clears_provides.is_empty() {
        handler.default_clears_provides(&update.type_tag)
    } else {
        update.clears_provides.clone()
    };
    let type_info = TypeInfoRecord {
        type_tag: update.type_tag.clone(),
        provides: update.provides.clone(),
        depends: update.depends.clone(),
        clears_provides,
    };
    append_plain_entry(builder, &format!("{prefix}/type-info"), &serde_json::to_vec(&type_info)?)?;

    if !update.meta_data.is_null() {
        append_plain_entry(builder, &format!("{prefix}/meta-data"), &serde_json::to_vec(&update.meta_data)?)?;
    }

    let files = FileListRecord { files: update.files.iter().map(|f| FileListEntry { name: f.name.clone() }).collect() };
    append_plain_entry(builder, &format!("{prefix}/files"), &serde_json::to_vec(&files)?)
}

fn append_plain_entry<W: Write>(builder: &mut tar::Builder<W>, path: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_ustar();
    header.set_path(path)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_v1() {
        let config = WriterConfig::new(1, "release-1", vec!["vexpress-qemu".to_string()]);
        assert!(matches!(config.validate(), Err(Error::WriteNotSupportedForVersion(1))));
    }

    #[test]
    fn rejects_empty_device_list() {
        let config = WriterConfig::new(2, "release-1", vec![]);
        assert!(matches!(config.validate(), Err(Error::NoCompatibleDevices)));
    }

    #[test]
    fn rejects_whitespace_in_name() {
        let config = WriterConfig::new(2, "release 1", vec!["vexpress-qemu".to_string()]);
        assert!(matches!(config.validate(), Err(Error::InvalidArtifactName(_))));
    }

    #[test]
    fn accepts_valid_config() {
        let config = WriterConfig::new(2, "release-1", vec!["vexpress-qemu".to_string()]);
        assert!(config.validate().is_ok());
    }
}
