//! Key-material-agnostic signer/verifier capability.
//!
//! Key-material providers (file-on-disk, PKCS#11, cloud KMS, Vault transit)
//! are treated as external collaborators: the codec only ever needs
//! `sign(bytes) -> bytes` and `verify(bytes, sig) -> ok|err`. This crate
//! defines those two capabilities as traits and ships one concrete
//! implementation, RSA PKCS#1v1.5 over SHA-256.

mod error;
mod rsa_pkcs;

pub use error::Error;
pub use rsa_pkcs::{get_private_key_pkcs_pem, get_public_key_pkcs_pem, KeyType, RsaPkcs1v15Signer, RsaPkcs1v15Verifier};

pub type Result<T> = std::result::Result<T, Error>;

/// Signs an opaque message, returning an opaque signature.
///
/// The codec never interprets the signature bytes; it only ever stores them
/// verbatim in `manifest.sig`.
pub trait Signer {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Verifies an opaque signature over an opaque message.
pub trait Verifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()>;
}
