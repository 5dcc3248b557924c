//! Bridge between the certificate builder and the HSM signer.
//!
//! rcgen hands the DER-encoded TBS structure to the key pair; this adapter
//! computes its SHA-256 digest and passes the digest to the HSM, which adds
//! the DigestInfo framing and runs raw RSA-PKCS on the token. The private
//! key never exists on this side of the boundary.

use std::sync::Arc;

use rcgen::{KeyPair, RemoteKeyPair, SignatureAlgorithm, PKCS_RSA_SHA256};
use sha2::{Digest, Sha256};
use signet_hsm::{HashAlgorithm, HsmSigner};

use crate::error::CaError;

/// An rcgen key pair whose signing operations run inside the HSM.
pub struct HsmKeyPair {
    signer: Arc<dyn HsmSigner>,
    public_key_der: Vec<u8>,
}

impl HsmKeyPair {
    /// Wrap an HSM signing handle as an rcgen [`KeyPair`].
    pub fn from_signer(signer: Arc<dyn HsmSigner>) -> Result<KeyPair, CaError> {
        let public_key_der = pkcs1_der_from_pem(signer.public_key_pem())?;
        KeyPair::from_remote(Box::new(HsmKeyPair {
            signer,
            public_key_der,
        }))
        .map_err(|e| CaError::SigningFailed(e.to_string()))
    }
}

impl RemoteKeyPair for HsmKeyPair {
    fn public_key(&self) -> &[u8] {
        &self.public_key_der
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, rcgen::Error> {
        let digest = Sha256::digest(msg);
        self.signer
            .sign_digest(&digest, HashAlgorithm::Sha256)
            .map_err(|e| {
                tracing::error!(error = %e, "HSM signing failed");
                rcgen::Error::RemoteKeyError
            })
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        &PKCS_RSA_SHA256
    }
}

/// Decode a PKCS#1 `RSA PUBLIC KEY` PEM into its DER body.
pub fn pkcs1_der_from_pem(public_key_pem: &str) -> Result<Vec<u8>, CaError> {
    let block = pem::parse(public_key_pem).map_err(|e| CaError::InvalidPem(e.to_string()))?;
    if block.tag() != "RSA PUBLIC KEY" {
        return Err(CaError::InvalidPem(format!(
            "expected RSA PUBLIC KEY block, found {}",
            block.tag()
        )));
    }
    Ok(block.contents().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use signet_hsm::{SignerProvider, SoftwareSignerProvider};

    #[test]
    fn test_hsm_key_pair_exposes_public_key() {
        let provider = SoftwareSignerProvider::new();
        provider.generate_key_pair("Test-Key").unwrap();
        let signer = provider.signer_for("Test-Key").unwrap();

        let expected = pkcs1_der_from_pem(signer.public_key_pem()).unwrap();
        let key_pair = HsmKeyPair::from_signer(signer).unwrap();

        // rcgen's SPKI embeds the PKCS#1 body as the subjectPublicKey.
        let spki = key_pair.public_key_der();
        assert!(spki
            .windows(expected.len())
            .any(|window| window == expected.as_slice()));
    }

    #[test]
    fn test_rejects_wrong_pem_tag() {
        let result = pkcs1_der_from_pem(
            "-----BEGIN CERTIFICATE-----\nMA==\n-----END CERTIFICATE-----\n",
        );
        assert!(matches!(result, Err(CaError::InvalidPem(_))));
    }
}
