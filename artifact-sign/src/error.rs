#[derive(Debug)]
pub enum Error {
    ReadPrivateKey(std::io::Error),
    DeserialisePkcs1(rsa::pkcs1::Error),
    DeserialisePkcs8(rsa::pkcs8::Error),
    InvalidPrivateKeyType,
    ReadPublicKey(std::io::Error),
    DecodeRsaPublicKey(rsa::pkcs1::Error),
    DecodePublicKey(rsa::pkcs8::spki::Error),
    InvalidSignatureEncoding(rsa::signature::Error),
    SignatureRejected(rsa::signature::Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::ReadPrivateKey(err) => write!(f, "failed to read private key: {err}"),
            Error::DeserialisePkcs1(err) => write!(f, "failed to deserialise PKCS1 PEM: {err}"),
            Error::DeserialisePkcs8(err) => write!(f, "failed to deserialise PKCS8 PEM: {err}"),
            Error::InvalidPrivateKeyType => write!(f, "invalid private key type"),
            Error::ReadPublicKey(err) => write!(f, "failed to read public key: {err}"),
            Error::DecodeRsaPublicKey(err) => write!(f, "failed to decode PKCS1 public key: {err}"),
            Error::DecodePublicKey(err) => write!(f, "failed to decode public key: {err}"),
            Error::InvalidSignatureEncoding(err) => write!(f, "invalid signature encoding: {err}"),
            Error::SignatureRejected(err) => write!(f, "signature verification failed: {err}"),
        }
    }
}
