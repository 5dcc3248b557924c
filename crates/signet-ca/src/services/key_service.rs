//! Key management pass-throughs.
//!
//! Thin façade over the signer provider for the transport's key endpoints.
//! Private keys never leave the token; both operations deal in PKCS#1
//! public key PEM only.

use std::sync::Arc;

use signet_hsm::SignerProvider;

use crate::error::CaError;

/// Service exposing key-pair generation and lookup.
pub struct KeyService {
    signer_provider: Arc<dyn SignerProvider>,
}

impl KeyService {
    /// Create a new `KeyService`.
    #[must_use]
    pub fn new(signer_provider: Arc<dyn SignerProvider>) -> Self {
        Self { signer_provider }
    }

    /// Generate a key pair under `label` and return the public key PEM.
    pub fn generate_keypair(&self, label: &str) -> Result<String, CaError> {
        if label.is_empty() {
            return Err(CaError::Validation("key label must not be empty".to_string()));
        }
        Ok(self.signer_provider.generate_key_pair(label)?)
    }

    /// Fetch the public key PEM stored under `label`.
    pub fn get_keypair(&self, label: &str) -> Result<String, CaError> {
        Ok(self.signer_provider.find_public_key(label)?)
    }
}
