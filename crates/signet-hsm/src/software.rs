//! In-memory software token for development and tests.
//!
//! Implements the same contract as the PKCS#11 provider, including the raw
//! mechanism split: the primitive applies PKCS#1 v1.5 padding over whatever
//! bytes it is given and adds no digest prefix of its own, so the DigestInfo
//! framing in [`crate::digest_info`] is exercised on this path too.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::LineEnding;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};

use crate::{digest_info, HashAlgorithm, HsmError, HsmSigner, SignerProvider};

const RSA_MODULUS_BITS: usize = 2048;

/// Signer provider holding RSA keys in process memory.
#[derive(Default)]
pub struct SoftwareSignerProvider {
    keys: RwLock<HashMap<String, Arc<RsaPrivateKey>>>,
}

impl SoftwareSignerProvider {
    /// Create an empty software token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignerProvider for SoftwareSignerProvider {
    fn generate_key_pair(&self, label: &str) -> Result<String, HsmError> {
        let mut keys = self.keys.write().map_err(|_| HsmError::SessionLost)?;

        if keys.contains_key(label) {
            return Err(HsmError::LabelExists(label.to_string()));
        }

        let key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_MODULUS_BITS)
            .map_err(|e| HsmError::KeyGeneration(e.to_string()))?;
        let pem = key
            .to_public_key()
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| HsmError::InvalidPublicKey(e.to_string()))?;

        keys.insert(label.to_string(), Arc::new(key));
        Ok(pem)
    }

    fn find_public_key(&self, label: &str) -> Result<String, HsmError> {
        let keys = self.keys.read().map_err(|_| HsmError::SessionLost)?;
        let key = keys
            .get(label)
            .ok_or_else(|| HsmError::KeyNotFound(label.to_string()))?;

        key.to_public_key()
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| HsmError::InvalidPublicKey(e.to_string()))
    }

    fn signer_for(&self, label: &str) -> Result<Arc<dyn HsmSigner>, HsmError> {
        let keys = self.keys.read().map_err(|_| HsmError::SessionLost)?;
        let key = keys
            .get(label)
            .cloned()
            .ok_or_else(|| HsmError::KeyNotFound(label.to_string()))?;

        let public_key_pem = key
            .to_public_key()
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| HsmError::InvalidPublicKey(e.to_string()))?;

        Ok(Arc::new(SoftwareSigner {
            key,
            public_key_pem,
        }))
    }
}

struct SoftwareSigner {
    key: Arc<RsaPrivateKey>,
    public_key_pem: String,
}

impl HsmSigner for SoftwareSigner {
    fn sign_digest(&self, digest: &[u8], alg: HashAlgorithm) -> Result<Vec<u8>, HsmError> {
        let framed = digest_info::wrap(digest, alg)?;

        // new_unprefixed = raw PKCS#1 v1.5 padding over the framed input,
        // matching the token's CKM_RSA_PKCS mechanism.
        self.key
            .sign(Pkcs1v15Sign::new_unprefixed(), &framed)
            .map_err(|e| HsmError::Sign(e.to_string()))
    }

    fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::DecodeRsaPublicKey;
    use rsa::RsaPublicKey;
    use sha2::{Digest, Sha256};

    #[test]
    fn test_generate_rejects_duplicate_label() {
        let provider = SoftwareSignerProvider::new();
        provider.generate_key_pair("RootA-Key").unwrap();

        assert!(matches!(
            provider.generate_key_pair("RootA-Key"),
            Err(HsmError::LabelExists(_))
        ));
    }

    #[test]
    fn test_find_public_key_not_found() {
        let provider = SoftwareSignerProvider::new();
        assert!(matches!(
            provider.find_public_key("missing"),
            Err(HsmError::KeyNotFound(_))
        ));
        assert!(matches!(
            provider.signer_for("missing"),
            Err(HsmError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_public_key_is_pkcs1_pem() {
        let provider = SoftwareSignerProvider::new();
        let pem = provider.generate_key_pair("RootA-Key").unwrap();

        assert!(pem.starts_with("-----BEGIN RSA PUBLIC KEY-----"));
        assert_eq!(pem, provider.find_public_key("RootA-Key").unwrap());
    }

    #[test]
    fn test_signature_verifies_as_sha256_pkcs1v15() {
        let provider = SoftwareSignerProvider::new();
        provider.generate_key_pair("RootA-Key").unwrap();
        let signer = provider.signer_for("RootA-Key").unwrap();

        let message = b"to be signed";
        let digest = Sha256::digest(message);
        let signature = signer
            .sign_digest(&digest, HashAlgorithm::Sha256)
            .unwrap();

        // The DigestInfo framing must make the signature verify as a
        // standard SHA-256 PKCS#1 v1.5 signature over the message.
        let public_key = RsaPublicKey::from_pkcs1_pem(signer.public_key_pem()).unwrap();
        public_key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .expect("signature should verify");
    }

    #[test]
    fn test_sign_rejects_wrong_digest_length() {
        let provider = SoftwareSignerProvider::new();
        provider.generate_key_pair("RootA-Key").unwrap();
        let signer = provider.signer_for("RootA-Key").unwrap();

        assert!(matches!(
            signer.sign_digest(&[0u8; 20], HashAlgorithm::Sha256),
            Err(HsmError::UnsupportedDigest(20))
        ));
    }
}
