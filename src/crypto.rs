use base64::engine::general_purpose;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::SignatureScheme;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha1,
    Sha256,
}

impl HashAlg {
    pub fn hash_name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum CryptoError {
        InvalidKey(err: String) {
            display("invalid public key: {}", err)
        }
        InvalidSignature(err: String) {
            display("invalid signature: {}", err)
        }
    }
}

/// Cryptographic capability used by the verifier: digest computation and
/// RSA PKCS#1 v1.5 signature verification over an already-canonicalized
/// byte stream.
pub trait Crypto: Sync + Send {
    fn hash(&self, alg: HashAlg, data: &[u8]) -> Vec<u8>;

    /// Verify `signature` over `signed` with the PEM-encoded public key.
    /// Hashing of `signed` happens here; callers pass the canonical bytes.
    fn verify(
        &self,
        alg: HashAlg,
        pem_key: &[u8],
        signed: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError>;
}

/// Default `Crypto` implementation on the RustCrypto stack.
pub struct RsaVerifier;

impl Crypto for RsaVerifier {
    fn hash(&self, alg: HashAlg, data: &[u8]) -> Vec<u8> {
        match alg {
            HashAlg::Sha1 => Sha1::digest(data).to_vec(),
            HashAlg::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    fn verify(
        &self,
        alg: HashAlg,
        pem_key: &[u8],
        signed: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        let der = pem_to_der(pem_key)?;
        // DKIM records publish SubjectPublicKeyInfo, but bare PKCS#1
        // RSAPublicKey blobs exist in the wild.
        let public_key = RsaPublicKey::from_public_key_der(&der)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
            .map_err(|err| CryptoError::InvalidKey(format!("failed to parse RSA key: {}", err)))?;

        let digest = self.hash(alg, signed);
        let scheme = match alg {
            HashAlg::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
            HashAlg::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        };
        Ok(scheme.verify(&public_key, &digest, signature).is_ok())
    }
}

fn pem_to_der(pem: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let text = std::str::from_utf8(pem)
        .map_err(|err| CryptoError::InvalidKey(format!("key is not UTF-8: {}", err)))?;
    let mut encoded = String::with_capacity(text.len());
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("-----") {
            continue;
        }
        encoded.push_str(line);
    }
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|err| CryptoError::InvalidKey(format!("invalid base64 in key: {}", err)))
}

/// Byte equality that does not leak the position of the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
