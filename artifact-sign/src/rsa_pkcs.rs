use std::fs;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::sha2::Sha256;
use rsa::signature::{Signer as _, Verifier as _};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::{Error, Result, Signer, Verifier};

#[derive(Debug)]
pub enum KeyType {
    Pkcs1,
    Pkcs8,
}

/// Loads a PEM-encoded RSA private key, in either PKCS1 or PKCS8 form.
pub fn get_private_key_pkcs_pem(private_key_path: &str, key_type: KeyType) -> Result<RsaPrivateKey> {
    let private_key_buf = fs::read_to_string(private_key_path).map_err(Error::ReadPrivateKey)?;
    match key_type {
        KeyType::Pkcs1 => RsaPrivateKey::from_pkcs1_pem(private_key_buf.as_str()).map_err(Error::DeserialisePkcs1),
        KeyType::Pkcs8 => RsaPrivateKey::from_pkcs8_pem(private_key_buf.as_str()).map_err(Error::DeserialisePkcs8),
    }
}

/// Loads a PEM-encoded RSA public key, in either PKCS1 or PKCS8/SPKI form.
pub fn get_public_key_pkcs_pem(public_key_path: &str, key_type: KeyType) -> Result<RsaPublicKey> {
    let public_key_buf = fs::read_to_string(public_key_path).map_err(Error::ReadPublicKey)?;
    match key_type {
        KeyType::Pkcs1 => RsaPublicKey::from_pkcs1_pem(public_key_buf.as_str()).map_err(Error::DecodeRsaPublicKey),
        KeyType::Pkcs8 => RsaPublicKey::from_public_key_pem(public_key_buf.as_str()).map_err(Error::DecodePublicKey),
    }
}

/// `Signer` backed by an RSA private key, PKCS1v1.5 padding over a SHA-256 digest.
///
/// This is the codec's one concrete implementation of the signer capability;
/// the reader/writer never depend on this type directly, only on the
/// `Signer`/`Verifier` traits.
pub struct RsaPkcs1v15Signer {
    signing_key: pkcs1v15::SigningKey<Sha256>,
}

impl RsaPkcs1v15Signer {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self {
            signing_key: pkcs1v15::SigningKey::<Sha256>::new(private_key),
        }
    }
}

impl Signer for RsaPkcs1v15Signer {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        use rsa::signature::SignatureEncoding;

        let signature = self.signing_key.sign(message);
        Ok(signature.to_vec())
    }
}

/// `Verifier` backed by an RSA public key, PKCS1v1.5 padding over a SHA-256 digest.
pub struct RsaPkcs1v15Verifier {
    verifying_key: pkcs1v15::VerifyingKey<Sha256>,
}

impl RsaPkcs1v15Verifier {
    pub fn new(public_key: RsaPublicKey) -> Self {
        Self {
            verifying_key: pkcs1v15::VerifyingKey::<Sha256>::new(public_key),
        }
    }
}

impl Verifier for RsaPkcs1v15Verifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig = pkcs1v15::Signature::try_from(signature).map_err(Error::InvalidSignatureEncoding)?;
        self.verifying_key.verify(message, &sig).map_err(Error::SignatureRejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TESTDATA: &str = "test data for verifying signature";
    const PRIVKEY_PKCS1_PATH: &str = "testdata/private_key_test_pkcs1.pem";
    const PUBKEY_PKCS1_PATH: &str = "testdata/public_key_test_pkcs1.pem";
    const PRIVKEY_PKCS8_PATH: &str = "testdata/private_key_test_pkcs8.pem";
    const PUBKEY_PKCS8_PATH: &str = "testdata/public_key_test_pkcs8.pem";
    const OTHER_PUBKEY_PKCS8_PATH: &str = "testdata/other_public_key_test_pkcs8.pem";

    #[test]
    fn sign_and_verify_pkcs1() {
        let signer = RsaPkcs1v15Signer::new(get_private_key_pkcs_pem(PRIVKEY_PKCS1_PATH, KeyType::Pkcs1).unwrap());
        let signature = signer.sign(TESTDATA.as_bytes()).unwrap();

        let verifier = RsaPkcs1v15Verifier::new(get_public_key_pkcs_pem(PUBKEY_PKCS1_PATH, KeyType::Pkcs1).unwrap());
        verifier.verify(TESTDATA.as_bytes(), &signature).unwrap();
    }

    #[test]
    fn sign_and_verify_pkcs8() {
        let signer = RsaPkcs1v15Signer::new(get_private_key_pkcs_pem(PRIVKEY_PKCS8_PATH, KeyType::Pkcs8).unwrap());
        let signature = signer.sign(TESTDATA.as_bytes()).unwrap();

        let verifier = RsaPkcs1v15Verifier::new(get_public_key_pkcs_pem(PUBKEY_PKCS8_PATH, KeyType::Pkcs8).unwrap());
        verifier.verify(TESTDATA.as_bytes(), &signature).unwrap();
    }

    #[test]
    fn verify_rejects_mismatched_key() {
        let signer = RsaPkcs1v15Signer::new(get_private_key_pkcs_pem(PRIVKEY_PKCS8_PATH, KeyType::Pkcs8).unwrap());
        let signature = signer.sign(TESTDATA.as_bytes()).unwrap();

        let verifier = RsaPkcs1v15Verifier::new(get_public_key_pkcs_pem(OTHER_PUBKEY_PKCS8_PATH, KeyType::Pkcs8).unwrap());
        assert!(verifier.verify(TESTDATA.as_bytes(), &signature).is_err());
    }

    #[test]
    fn verify_rejects_flipped_bit() {
        let signer = RsaPkcs1v15Signer::new(get_private_key_pkcs_pem(PRIVKEY_PKCS8_PATH, KeyType::Pkcs8).unwrap());
        let mut signature = signer.sign(TESTDATA.as_bytes()).unwrap();
        signature[0] ^= 0x01;

        let verifier = RsaPkcs1v15Verifier::new(get_public_key_pkcs_pem(PUBKEY_PKCS8_PATH, KeyType::Pkcs8).unwrap());
        assert!(verifier.verify(TESTDATA.as_bytes(), &signature).is_err());
    }
}
