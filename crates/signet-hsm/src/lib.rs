//! Signet HSM: signer provider abstraction over PKCS#11 tokens.
//!
//! All private-key operations in Signet flow through the two traits defined
//! here. The service never sees key material: [`SignerProvider`] hands out
//! public keys (PKCS#1 PEM) and opaque [`HsmSigner`] handles bound to a key
//! label inside the token.
//!
//! The signing contract is pre-hash: callers pass a raw digest (32 bytes for
//! SHA-256) and the signer prepends the DER DigestInfo prefix before running
//! raw RSA-PKCS on the token. Some tokens do not implement hash-and-sign
//! mechanisms, so the framing lives on this side of the boundary; see
//! [`digest_info`].
//!
//! Two providers ship:
//! - [`Pkcs11SignerProvider`]: a real token via the `cryptoki` bindings,
//!   one authenticated session per process, all token calls serialised.
//! - [`SoftwareSignerProvider`]: an in-memory RSA token for development and
//!   tests, implementing the identical raw-mechanism contract.

pub mod digest_info;
mod error;
mod pkcs11;
mod software;

use std::sync::Arc;

pub use error::HsmError;
pub use pkcs11::{Pkcs11Config, Pkcs11SignerProvider};
pub use software::SoftwareSignerProvider;

/// Hash algorithms the signing contract supports.
///
/// Only SHA-256 is required by this core; the enum exists so the DigestInfo
/// selection stays explicit at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    /// Expected digest length in bytes.
    #[must_use]
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
        }
    }
}

/// A signing handle bound to one private key inside the token.
pub trait HsmSigner: Send + Sync {
    /// Sign a pre-computed digest.
    ///
    /// The implementation wraps the digest in the DER DigestInfo structure
    /// for `alg` and performs PKCS#1 v1.5 raw RSA on the token. The digest
    /// length must match `alg`.
    fn sign_digest(&self, digest: &[u8], alg: HashAlgorithm) -> Result<Vec<u8>, HsmError>;

    /// The PKCS#1 PEM encoding of the matching public key.
    fn public_key_pem(&self) -> &str;
}

/// Access to key pairs held by the token.
pub trait SignerProvider: Send + Sync {
    /// Create a 2048-bit RSA key pair in the token under `label`.
    ///
    /// The key pair is persistent; the private half is sensitive and
    /// non-extractable. Returns the public key as PKCS#1 PEM. Fails with
    /// [`HsmError::LabelExists`] if the label is taken.
    fn generate_key_pair(&self, label: &str) -> Result<String, HsmError>;

    /// Look up the public key stored under `label`.
    fn find_public_key(&self, label: &str) -> Result<String, HsmError>;

    /// Obtain a signing handle for the key stored under `label`.
    fn signer_for(&self, label: &str) -> Result<Arc<dyn HsmSigner>, HsmError>;
}
