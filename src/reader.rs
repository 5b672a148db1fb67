//! Artifact reader state machine.
//!
//! Drives the outer tar entry-by-entry through the legal grammar for each
//! version, verifying checksums and signature along the way and handing
//! per-update subtrees to handlers looked up in a `Registry`.

use std::collections::BTreeMap;
use std::io::Read;

use log::{debug, info, warn};

use artifact_sign::Verifier;

use crate::error::{Error, Result};
use crate::handler::{FileInfo, Registry, UpdateHeader};
use crate::info::{HeaderInfo, Info};
use crate::manifest::Manifest;
use crate::stream::{self, ChecksumReader, CompressionKind};
use crate::subheader::{FileListRecord, TypeInfoRecord};

const MAX_SIGNATURE_BYTES: u64 = 20 * 1024;

/// Whether a signature was present, and if so, whether it was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    Unsigned,
    VerifiedOk,
    SignedButUnverified,
}

/// One update's read-only view, assembled after a successful read.
#[derive(Debug, Clone)]
pub struct UpdateSummary {
    pub type_tag: String,
    pub files: Vec<FileInfo>,
    pub provides: BTreeMap<String, String>,
    pub depends: BTreeMap<String, String>,
}

/// The data a `dump`/`read` front-end would need, without the front-end
/// itself: produced by `Reader::read` on success.
#[derive(Debug, Clone)]
pub struct Summary {
    pub version: i64,
    pub artifact_name: String,
    pub compatible_devices: Vec<String>,
    pub updates: Vec<UpdateSummary>,
    pub signature: SignatureStatus,
}

/// Configuration for one read. Consumed by `Reader::read`.
#[derive(Default)]
pub struct ReaderConfig {
    require_signed: bool,
    verifier: Option<Box<dyn Verifier>>,
    strict_unknown_types: bool,
    device_compat_callback: Option<Box<dyn Fn(&[String]) -> Result<()>>>,
    scripts_callback: Option<Box<dyn FnMut(&str, &mut dyn Read) -> Result<()>>>,
}

impl ReaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_signed(mut self, yes: bool) -> Self {
        self.require_signed = yes;
        self
    }

    pub fn verifier(mut self, verifier: Box<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn strict_unknown_types(mut self, yes: bool) -> Self {
        self.strict_unknown_types = yes;
        self
    }

    pub fn device_compat_callback(mut self, callback: impl Fn(&[String]) -> Result<()> + 'static) -> Self {
        self.device_compat_callback = Some(Box::new(callback));
        self
    }

    pub fn scripts_callback(mut self, callback: impl FnMut(&str, &mut dyn Read) -> Result<()> + 'static) -> Self {
        self.scripts_callback = Some(Box::new(callback));
        self
    }
}

/// Reads artifacts against a fixed handler registry.
pub struct Reader {
    config: ReaderConfig,
    registry: Registry,
}

impl Reader {
    pub fn new(registry: Registry) -> Self {
        Self { config: ReaderConfig::default(), registry }
    }

    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn read<R: Read>(self, source: R) -> Result<Summary> {
        let Reader { mut config, registry } = self;
        let mut archive = tar::Archive::new(source);
        let mut entries = archive.entries()?;

        let version_entry = next_entry(&mut entries, "version")?;
        let version_bytes = read_all(version_entry)?;
        let info = Info::from_json(&version_bytes)?;
        debug!("read version entry: format={}, version={}", info.format, info.version);

        if info.version == 1 {
            read_v1(entries, &registry, &config)
        } else {
            read_v2_or_v3(entries, info.version, &registry, &mut config)
        }
    }
}

fn next_entry<'a, R: Read + 'a>(entries: &mut tar::Entries<'a, R>, expected: &'static str) -> Result<tar::Entry<'a, R>> {
    match entries.next() {
        Some(entry) => {
            let entry = entry?;
            let name = entry_name(&entry)?;
            if name != expected {
                return Err(Error::GrammarViolation { expected, got: name });
            }
            Ok(entry)
        }
        None => Err(Error::GrammarViolation { expected, got: "end of archive".to_string() }),
    }
}

fn next_entry_any<'a, R: Read + 'a>(entries: &mut tar::Entries<'a, R>, expected: &'static str) -> Result<tar::Entry<'a, R>> {
    match entries.next() {
        Some(entry) => Ok(entry?),
        None => Err(Error::GrammarViolation { expected, got: "end of archive".to_string() }),
    }
}

/// Like `next_entry_any`, but end-of-archive is not an error: used where a
/// following entry is optional (no data tars, no header-augment).
fn maybe_next_entry<'a, R: Read + 'a>(entries: &mut tar::Entries<'a, R>) -> Result<Option<tar::Entry<'a, R>>> {
    match entries.next() {
        Some(entry) => Ok(Some(entry?)),
        None => Ok(None),
    }
}

fn entry_name<R: Read>(entry: &tar::Entry<R>) -> Result<String> {
    Ok(entry.path()?.to_string_lossy().into_owned())
}

fn read_all(mut entry: impl Read) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_capped(mut entry: impl Read, cap: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    entry.by_ref().take(cap).read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_v2_or_v3<'a, R: Read + 'a>(
    mut entries: tar::Entries<'a, R>,
    version: i64,
    registry: &Registry,
    config: &mut ReaderConfig,
) -> Result<Summary> {
    let manifest_entry = next_entry(&mut entries, "manifest")?;
    let manifest = Manifest::parse(&read_all(manifest_entry)?)?;

    let mut current = next_entry_any(&mut entries, "manifest.sig, manifest-augment, or header.tar.<comp>")?;
    let mut current_name = entry_name(&current)?;

    let mut signature = SignatureStatus::Unsigned;
    if current_name == "manifest.sig" {
        let signature_bytes = read_capped(current, MAX_SIGNATURE_BYTES)?;
        signature = match &config.verifier {
            Some(verifier) => {
                verifier.verify(&manifest.raw_bytes(), &signature_bytes).map_err(Error::BadSignature)?;
                info!("manifest signature verified");
                SignatureStatus::VerifiedOk
            }
            None => {
                warn!("artifact is signed but no verifier was configured");
                SignatureStatus::SignedButUnverified
            }
        };
        current = next_entry_any(&mut entries, "manifest-augment or header.tar.<comp>")?;
        current_name = entry_name(&current)?;
    }

    if config.require_signed && signature == SignatureStatus::Unsigned {
        return Err(Error::MissingSignature);
    }

    let mut manifest_augment = None;
    if version == 3 && current_name == "manifest-augment" {
        manifest_augment = Some(Manifest::parse(&read_all(current)?)?);
        current = next_entry_any(&mut entries, "header.tar.<comp>")?;
        current_name = entry_name(&current)?;
    } else if current_name == "manifest-augment" {
        return Err(Error::AugmentInWrongVersion);
    }

    if !current_name.starts_with("header.tar.") {
        return Err(Error::GrammarViolation { expected: "header.tar.<comp>", got: current_name });
    }
    let header_digest = manifest.get_and_mark(&current_name)?;
    let header_raw = read_checksummed(current, &current_name, &header_digest)?;
    let comp = CompressionKind::from_entry_name(&current_name)?;
    let (header_info, primary_updates) = read_header_tar(&header_raw, comp, registry, config, false)?;
    let mut updates: Vec<UpdateHeader> = primary_updates
        .into_iter()
        .enumerate()
        .map(|(i, u)| u.ok_or_else(|| Error::CorruptArchive(format!("header.tar.<comp> has no headers/{i:04}/ subtree for a declared update"))))
        .collect::<Result<Vec<_>>>()?;

    if let Some(device_check) = &config.device_compat_callback {
        device_check(header_info.compatible_devices())?;
    }

    let mut next = maybe_next_entry(&mut entries)?;
    let mut next_name = next.as_ref().map(entry_name).transpose()?;

    if version == 3 && next_name.as_deref().is_some_and(|n| n.starts_with("header-augment.tar.")) {
        let augment_entry = next.take().expect("next_name implies next is Some");
        let augment_name = next_name.take().expect("next_name implies next is Some");
        let manifest_augment = manifest_augment.as_ref().ok_or_else(|| Error::GrammarViolation {
            expected: "manifest-augment before header-augment.tar.<comp>",
            got: augment_name.clone(),
        })?;
        let augment_digest = manifest_augment.get_and_mark(&augment_name)?;
        let augment_comp = CompressionKind::from_entry_name(&augment_name)?;
        let augment_raw = read_checksummed(augment_entry, &augment_name, &augment_digest)?;
        let (_augment_info, augment_updates) = read_header_tar(&augment_raw, augment_comp, registry, config, true)?;
        for (i, augment_update) in augment_updates.into_iter().enumerate() {
            if let Some(augment_update) = augment_update {
                updates[i] = updates[i].merge_augment(&augment_update);
            }
        }
        next = maybe_next_entry(&mut entries)?;
        next_name = next.as_ref().map(entry_name).transpose()?;
    }

    let handlers: Vec<_> = header_info
        .updates
        .iter()
        .map(|u| registry.lookup(&u.type_tag, config.strict_unknown_types))
        .collect::<Result<Vec<_>>>()?;

    let mut expected_index = 0u32;
    while let Some(name) = next_name.take() {
        let entry = next.take().expect("next_name implies next is Some");
        if !name.starts_with("data/") {
            return Err(Error::GrammarViolation { expected: "data/NNNN.tar.<comp>", got: name });
        }
        let basename = name.trim_start_matches("data/");
        let (index_str, rest) = basename.split_once('.').ok_or_else(|| Error::InvalidPayloadIndex(name.clone()))?;
        let index = stream::parse_index(index_str)?;
        if index != expected_index {
            return Err(Error::PayloadIndicesOutOfOrder { expected: expected_index, got: index });
        }
        let comp = CompressionKind::from_entry_name(rest)?;
        let handler = handlers.get(index as usize).ok_or_else(|| Error::InvalidPayloadIndex(name.clone()))?;

        let update = &mut updates[index as usize];
        read_data_tar(entry, comp, handler.as_ref(), update, &manifest, manifest_augment.as_ref(), index)?;

        expected_index += 1;
        next = maybe_next_entry(&mut entries)?;
        next_name = next.as_ref().map(entry_name).transpose()?;
    }

    let mut stray = manifest.files_not_marked();
    if let Some(augment) = &manifest_augment {
        stray.extend(augment.files_not_marked());
    }
    if !stray.is_empty() {
        return Err(Error::StrayManifestEntries(stray));
    }

    let update_summaries = header_info
        .updates
        .iter()
        .zip(updates.into_iter())
        .map(|(entry, update)| UpdateSummary {
            type_tag: entry.type_tag.clone(),
            files: update.files,
            provides: update.provides,
            depends: update.depends,
        })
        .collect();

    let compatible_devices = header_info.compatible_devices().to_vec();
    Ok(Summary {
        version,
        artifact_name: header_info.artifact_name,
        compatible_devices,
        updates: update_summaries,
        signature,
    })
}

fn read_checksummed<R: Read>(entry: R, path: &str, expected_digest: &str) -> Result<Vec<u8>> {
    let mut reader = ChecksumReader::new(entry, path.to_string());
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    reader.verify(expected_digest)?;
    Ok(buf)
}

/// Reads a decompressed header tar's bytes: header-info, then scripts/*,
/// then headers/NNNN/* in order. Returns the parsed header-info record plus
/// one `UpdateHeader` per update slot (`None` for an augmented slot whose
/// `updates[i].type` was empty, meaning "no override").
fn read_header_tar(
    raw: &[u8],
    comp: CompressionKind,
    registry: &Registry,
    config: &mut ReaderConfig,
    augmented: bool,
) -> Result<(HeaderInfo, Vec<Option<UpdateHeader>>)> {
    let decompressed = stream::decompress_reader(comp, raw)?;
    let mut archive = tar::Archive::new(decompressed);
    let mut entries = archive.entries()?;

    let header_info_entry = next_entry(&mut entries, "header-info")?;
    let header_info = HeaderInfo::from_json(&read_all(header_info_entry)?)?;
    debug!("header-info: artifact_name={}, updates={}", header_info.artifact_name, header_info.updates.len());

    let mut peeked = None;
    loop {
        let entry = match entries.next() {
            Some(entry) => entry?,
            None => break,
        };
        let name = entry_name(&entry)?;
        if let Some(rest) = name.strip_prefix("scripts/") {
            let mut entry = entry;
            if let Some(callback) = &mut config.scripts_callback {
                callback(rest, &mut entry)?;
            }
            continue;
        }
        peeked = Some((name, entry));
        break;
    }

    let mut updates: Vec<Option<UpdateHeader>> = (0..header_info.updates.len()).map(|_| None).collect();
    let mut current = peeked;
    let mut expected_index = 0u32;
    while let Some((name, entry)) = current.take() {
        let rest = name.strip_prefix("headers/").ok_or_else(|| Error::GrammarViolation {
            expected: "headers/NNNN/*",
            got: name.clone(),
        })?;
        let (index_str, subpath) = rest.split_once('/').ok_or_else(|| Error::InvalidPayloadIndex(name.clone()))?;
        let index = stream::parse_index(index_str)?;
        if augmented {
            if index as usize >= updates.len() {
                return Err(Error::InvalidPayloadIndex(name));
            }
        } else if index != expected_index {
            return Err(Error::PayloadIndicesOutOfOrder { expected: expected_index, got: index });
        }

        let update_type = if augmented {
            header_info.updates.get(index as usize).map(|u| u.type_tag.as_str()).unwrap_or_default()
        } else {
            header_info.updates[index as usize].type_tag.as_str()
        };

        let mut header = UpdateHeader::new(update_type);
        let mut subpath = subpath.to_string();
        let mut entry = entry;
        loop {
            match subpath.as_str() {
                "type-info" => {
                    let record: TypeInfoRecord = serde_json::from_slice(&read_all(entry)?)?;
                    header.provides = record.provides;
                    header.depends = record.depends;
                    header.clears_provides = record.clears_provides;
                }
                "meta-data" => {
                    header.meta_data = serde_json::from_slice(&read_all(entry)?)?;
                }
                "files" => {
                    let record: FileListRecord = serde_json::from_slice(&read_all(entry)?)?;
                    header.files = record
                        .files
                        .into_iter()
                        .map(|f| FileInfo { name: f.name, size: 0, date: None, checksum: String::new() })
                        .collect();
                }
                other => {
                    warn!("ignoring unrecognized header subtree entry {other:?} under headers/{index_str}/");
                }
            }

            match entries.next() {
                Some(next_entry) => {
                    let next_entry = next_entry?;
                    let next_name = entry_name(&next_entry)?;
                    if let Some(next_rest) = next_name.strip_prefix("headers/") {
                        if let Some((next_index_str, next_subpath)) = next_rest.split_once('/') {
                            if next_index_str == index_str {
                                subpath = next_subpath.to_string();
                                entry = next_entry;
                                continue;
                            }
                        }
                    }
                    current = Some((next_name, next_entry));
                    break;
                }
                None => break,
            }
        }

        if !augmented || !update_type.is_empty() {
            handler_validate(registry, &header, update_type, config.strict_unknown_types)?;
            updates[index as usize] = Some(header);
        }
        expected_index = index + 1;
    }

    Ok((header_info, updates))
}

fn handler_validate(registry: &Registry, header: &UpdateHeader, update_type: &str, strict: bool) -> Result<()> {
    let handler = registry.lookup(update_type, strict)?;
    handler.validate_file_count(header.files.len())
}

fn read_data_tar<R: Read>(
    entry: R,
    comp: CompressionKind,
    handler: &dyn crate::handler::Handler,
    update: &mut UpdateHeader,
    manifest: &Manifest,
    manifest_augment: Option<&Manifest>,
    index: u32,
) -> Result<()> {
    let decompressed = stream::decompress_reader(comp, entry)?;
    let mut archive = tar::Archive::new(decompressed);
    let entries = archive.entries()?;

    for entry in entries {
        let mut entry = entry?;
        let name = entry_name(&entry)?;
        let size = entry.header().size()?;
        let manifest_path = format!("data/{}/{}", stream::format_index(index), name);
        let digest = match manifest.get_and_mark(&manifest_path) {
            Ok(digest) => digest,
            Err(Error::MissingChecksum { .. }) => match manifest_augment {
                Some(augment) => augment.get_and_mark(&manifest_path)?,
                None => return Err(Error::MissingChecksum { path: manifest_path }),
            },
            Err(other) => return Err(other),
        };

        let mut checksum_reader = ChecksumReader::new(&mut entry, manifest_path.clone());
        let file_info = FileInfo { name: name.clone(), size, date: None, checksum: digest.clone() };
        handler.store_update(&mut checksum_reader, &file_info)?;
        checksum_reader.verify(&digest)?;

        if let Some(existing) = update.files.iter_mut().find(|f| f.name == name) {
            existing.size = size;
            existing.checksum = digest;
        } else {
            update.files.push(FileInfo { name, size, date: None, checksum: digest });
        }
    }

    let computed = handler.compute_provides(&update.files);
    for (k, v) in computed {
        update.provides.entry(k).or_insert(v);
    }
    Ok(())
}

fn read_v1<'a, R: Read + 'a>(mut entries: tar::Entries<'a, R>, registry: &Registry, config: &ReaderConfig) -> Result<Summary> {
    let header_entry = next_entry_any(&mut entries, "header.tar.<comp>")?;
    let header_name = entry_name(&header_entry)?;
    if !header_name.starts_with("header.tar.") {
        return Err(Error::GrammarViolation { expected: "header.tar.<comp>", got: header_name });
    }
    let comp = CompressionKind::from_entry_name(&header_name)?;
    let decompressed = stream::decompress_reader(comp, header_entry)?;
    let mut header_archive = tar::Archive::new(decompressed);
    let mut header_entries = header_archive.entries()?;
    let info_entry = next_entry(&mut header_entries, "header-info")?;
    let header_info = HeaderInfo::from_json(&read_all(info_entry)?)?;

    if let Some(device_check) = &config.device_compat_callback {
        device_check(header_info.compatible_devices())?;
    }

    // v1 has no manifest; checksums embedded in the per-update header subtree
    // are not cross-checked against the data tar here (see DESIGN.md's Open
    // Question resolution: v1 is read-only and lenient about this mismatch).
    drop(header_entries);

    let mut updates: Vec<UpdateHeader> = header_info.updates.iter().map(|u| UpdateHeader::new(u.type_tag.clone())).collect();

    let mut expected_index = 0u32;
    let mut update_summaries = Vec::new();
    for entry in entries {
        let mut entry = entry?;
        let name = entry_name(&entry)?;
        if !name.starts_with("data/") {
            return Err(Error::GrammarViolation { expected: "data/NNNN.tar.<comp>", got: name });
        }
        let basename = name.trim_start_matches("data/");
        let (index_str, rest) = basename.split_once('.').ok_or_else(|| Error::InvalidPayloadIndex(name.clone()))?;
        let index = stream::parse_index(index_str)?;
        if index != expected_index {
            return Err(Error::PayloadIndicesOutOfOrder { expected: expected_index, got: index });
        }
        let comp = CompressionKind::from_entry_name(rest)?;
        let handler = registry.lookup_v1(&header_info.updates[index as usize].type_tag);
        let decompressed = stream::decompress_reader(comp, &mut entry)?;
        let mut data_archive = tar::Archive::new(decompressed);
        for data_entry in data_archive.entries()? {
            let mut data_entry = data_entry?;
            let file_name = entry_name(&data_entry)?;
            let size = data_entry.header().size()?;
            let mut checksum_reader = ChecksumReader::new(&mut data_entry, file_name.clone());
            let digest = stream::sha256_hex(b"");
            let file_info = FileInfo { name: file_name.clone(), size, date: None, checksum: digest };
            handler.store_update(&mut checksum_reader, &file_info)?;
            let digest = checksum_reader.digest_hex();
            updates[index as usize].files.push(FileInfo { name: file_name, size, date: None, checksum: digest });
        }
        expected_index += 1;
    }

    for (entry, update) in header_info.updates.iter().zip(updates.into_iter()) {
        update_summaries.push(UpdateSummary {
            type_tag: entry.type_tag.clone(),
            files: update.files,
            provides: update.provides,
            depends: update.depends,
        });
    }

    let compatible_devices = header_info.compatible_devices().to_vec();
    Ok(Summary {
        version: 1,
        artifact_name: header_info.artifact_name,
        compatible_devices,
        updates: update_summaries,
        signature: SignatureStatus::Unsigned,
    })
}
