use std::path::PathBuf;

/// Crate-wide error type. Lower-level error types from dependency crates are
/// folded in via `From` impls rather than boxed, so callers can match on a
/// single flat enum.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    CorruptArchive(String),
    UnsupportedVersion(i64),
    UnsupportedCompression(String),
    MalformedManifest(String),
    GrammarViolation { expected: &'static str, got: String },
    ChecksumMismatch { path: String, expected: String, got: String },
    MissingChecksum { path: String },
    MissingSignature,
    BadSignature(artifact_sign::Error),
    UnknownUpdateType(String),
    HandlerAlreadyRegistered(String),
    IncompatibleDevice(String),
    NoCompatibleDevices,
    StrayManifestEntries(Vec<String>),
    PayloadIndicesOutOfOrder { expected: u32, got: u32 },
    InvalidPayloadIndex(String),
    AugmentInWrongVersion,
    AugmentPathCollision(String),
    CannotSignV1,
    AlreadySigned,
    InvalidArtifactName(String),
    InvalidParentPath(PathBuf),
    Json(serde_json::Error),
    WrongFormat(String),
    WriteNotSupportedForVersion(i64),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::BadSignature(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::CorruptArchive(msg) => write!(f, "corrupt archive: {msg}"),
            Error::UnsupportedVersion(v) => write!(f, "unsupported artifact version: {v}"),
            Error::UnsupportedCompression(suffix) => write!(f, "unsupported compression suffix: {suffix}"),
            Error::MalformedManifest(line) => write!(f, "malformed manifest line: {line:?}"),
            Error::GrammarViolation { expected, got } => write!(f, "grammar violation: expected {expected}, got {got:?}"),
            Error::ChecksumMismatch { path, expected, got } => write!(f, "checksum mismatch for {path}: expected {expected}, got {got}"),
            Error::MissingChecksum { path } => write!(f, "no manifest entry for {path}"),
            Error::MissingSignature => write!(f, "artifact requires a signature but manifest.sig is absent"),
            Error::BadSignature(err) => write!(f, "signature verification failed: {err}"),
            Error::UnknownUpdateType(tag) => write!(f, "unknown update type {tag:?}"),
            Error::HandlerAlreadyRegistered(tag) => write!(f, "a handler is already registered for type {tag:?}"),
            Error::IncompatibleDevice(msg) => write!(f, "incompatible device: {msg}"),
            Error::NoCompatibleDevices => write!(f, "device_types_compatible is empty"),
            Error::StrayManifestEntries(paths) => write!(f, "manifest entries never consumed: {}", paths.join(", ")),
            Error::PayloadIndicesOutOfOrder { expected, got } => write!(f, "payload indices out of order: expected {expected:04}, got {got:04}"),
            Error::InvalidPayloadIndex(name) => write!(f, "invalid payload index in {name:?}"),
            Error::AugmentInWrongVersion => write!(f, "augmented header present in a v1/v2 artifact"),
            Error::AugmentPathCollision(path) => write!(f, "path {path:?} appears in both manifest and manifest-augment"),
            Error::CannotSignV1 => write!(f, "version 1 artifacts cannot be signed"),
            Error::AlreadySigned => write!(f, "artifact is already signed (use force to replace)"),
            Error::InvalidArtifactName(name) => write!(f, "invalid artifact name {name:?}"),
            Error::InvalidParentPath(path) => write!(f, "invalid parent path: {path:?}"),
            Error::Json(err) => write!(f, "JSON error: {err}"),
            Error::WrongFormat(format) => write!(f, "unexpected format field: {format:?}"),
            Error::WriteNotSupportedForVersion(v) => write!(f, "writing version {v} artifacts is not supported; treat them as read-only"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<artifact_sign::Error> for Error {
    fn from(err: artifact_sign::Error) -> Self {
        Error::BadSignature(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
