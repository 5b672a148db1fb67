//! In-place (re-)signing: rewrites `manifest.sig` without touching any other
//! entry's bytes.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::info;

use artifact_sign::Signer;

use crate::error::{Error, Result};
use crate::info::Info;

/// Reads `path`, replaces (or adds) `manifest.sig`, and atomically replaces
/// the original file. Every other entry is streamed through untouched: no
/// data file is ever buffered in memory.
///
/// Refuses a v1 artifact (`CannotSignV1`) and refuses to clobber an existing
/// signature unless `force` is set (`AlreadySigned`).
pub fn sign_in_place(path: impl AsRef<Path>, signer: &dyn Signer, force: bool) -> Result<()> {
    let path = path.as_ref();
    let source = File::open(path)?;
    let mut archive = tar::Archive::new(source);
    let mut entries = archive.entries()?;

    let dir = path.parent().ok_or_else(|| Error::InvalidParentPath(path.to_path_buf()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    let mut outer = tar::Builder::new(tmp.as_file_mut());

    let Some(version_entry) = entries.next() else {
        return Err(Error::CorruptArchive("empty artifact".to_string()));
    };
    let mut version_entry = version_entry?;
    if entry_name(&version_entry)? != "version" {
        return Err(Error::GrammarViolation { expected: "version", got: entry_name(&version_entry)? });
    }
    let mut version_raw = Vec::new();
    version_entry.read_to_end(&mut version_raw)?;
    let info = Info::from_json(&version_raw)?;
    if info.version == 1 {
        return Err(Error::CannotSignV1);
    }
    append_verbatim(&mut outer, "version", &version_raw)?;

    let Some(manifest_entry) = entries.next() else {
        return Err(Error::CorruptArchive("missing manifest".to_string()));
    };
    let mut manifest_entry = manifest_entry?;
    if entry_name(&manifest_entry)? != "manifest" {
        return Err(Error::GrammarViolation { expected: "manifest", got: entry_name(&manifest_entry)? });
    }
    let mut manifest_raw = Vec::new();
    manifest_entry.read_to_end(&mut manifest_raw)?;
    append_verbatim(&mut outer, "manifest", &manifest_raw)?;

    let mut peeked = entries.next().transpose()?;
    if let Some(entry) = &peeked {
        if entry_name(entry)? == "manifest.sig" {
            if !force {
                return Err(Error::AlreadySigned);
            }
            peeked = entries.next().transpose()?;
        }
    }

    let signature = signer.sign(&manifest_raw).map_err(Error::BadSignature)?;
    append_verbatim(&mut outer, "manifest.sig", &signature)?;
    info!("wrote new manifest.sig ({} bytes) for {}", signature.len(), path.display());

    let mut next = peeked;
    while let Some(mut entry) = next {
        let name = entry_name(&entry)?;
        let mut header = entry.header().clone();
        outer.append_data(&mut header, &name, &mut entry)?;
        next = entries.next().transpose()?;
    }

    outer.finish()?;
    drop(outer);
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String> {
    Ok(entry.path()?.to_string_lossy().into_owned())
}

fn append_verbatim<W: Write>(builder: &mut tar::Builder<W>, path: &str, data: &[u8]) -> Result<()> {
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
    use std::io::Cursor;

    fn build_artifact(with_signature: bool) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut out);
            append_verbatim(&mut builder, "version", br#"{"format":"mender","version":3}"#).unwrap();
            append_verbatim(&mut builder, "manifest", b"aa  data/0000/file\n").unwrap();
            if with_signature {
                append_verbatim(&mut builder, "manifest.sig", b"old-signature").unwrap();
            }
            append_verbatim(&mut builder, "header.tar.gz", b"fake-header-bytes").unwrap();
            builder.finish().unwrap();
        }
        out
    }

    struct FixedSigner;
    impl Signer for FixedSigner {
        fn sign(&self, _message: &[u8]) -> artifact_sign::Result<Vec<u8>> {
            Ok(b"new-signature".to_vec())
        }
    }

    #[test]
    fn refuses_to_sign_v1() {
        let mut out = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut out);
            append_verbatim(&mut builder, "version", br#"{"format":"mender","version":1}"#).unwrap();
            builder.finish().unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.mender");
        std::fs::write(&path, &out).unwrap();
        assert!(matches!(sign_in_place(&path, &FixedSigner, false), Err(Error::CannotSignV1)));
    }

    #[test]
    fn refuses_to_clobber_existing_signature_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.mender");
        std::fs::write(&path, build_artifact(true)).unwrap();
        assert!(matches!(sign_in_place(&path, &FixedSigner, false), Err(Error::AlreadySigned)));
    }

    #[test]
    fn force_replaces_existing_signature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.mender");
        std::fs::write(&path, build_artifact(true)).unwrap();
        sign_in_place(&path, &FixedSigner, true).unwrap();

        let rewritten = std::fs::read(&path).unwrap();
        let mut archive = tar::Archive::new(Cursor::new(rewritten));
        let names: Vec<String> = archive.entries().unwrap().map(|e| entry_name(&e.unwrap()).unwrap()).collect();
        assert_eq!(names, vec!["version", "manifest", "manifest.sig", "header.tar.gz"]);
    }

    #[test]
    fn signs_previously_unsigned_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.mender");
        std::fs::write(&path, build_artifact(false)).unwrap();
        sign_in_place(&path, &FixedSigner, false).unwrap();

        let rewritten = std::fs::read(&path).unwrap();
        let mut archive = tar::Archive::new(Cursor::new(rewritten));
        let names: Vec<String> = archive.entries().unwrap().map(|e| entry_name(&e.unwrap()).unwrap()).collect();
        assert_eq!(names, vec!["version", "manifest", "manifest.sig", "header.tar.gz"]);
    }
}
