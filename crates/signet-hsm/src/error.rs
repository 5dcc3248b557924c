//! Error types for the signet-hsm crate.

use thiserror::Error;

/// HSM operation errors.
#[derive(Debug, Error)]
pub enum HsmError {
    /// The PKCS#11 module could not be loaded or initialized.
    #[error("PKCS#11 module error: {0}")]
    Module(String),

    /// The configured slot does not exist or carries no token.
    #[error("HSM slot {0} not found")]
    SlotNotFound(u64),

    /// No key object with the requested label.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A key object with the requested label already exists.
    #[error("Key label already exists: {0}")]
    LabelExists(String),

    /// The token session is no longer usable.
    #[error("HSM session lost")]
    SessionLost,

    /// The token rejected a signing operation.
    #[error("Signing failed: {0}")]
    Sign(String),

    /// Key pair generation failed.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// The digest length matches no supported DigestInfo prefix.
    #[error("Unsupported digest length: {0} bytes")]
    UnsupportedDigest(usize),

    /// A public key read from the token could not be encoded.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}
