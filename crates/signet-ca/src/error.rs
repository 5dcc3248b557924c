//! Error types for the certificate authority core.

use signet_hsm::HsmError;
use thiserror::Error;

/// Coarse error categories surfaced to the transport layer.
///
/// The transport maps these onto status codes; the core never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input; no state change.
    Validation,
    /// CA, certificate, or key absent. OCSP translates this to `Unknown`.
    NotFound,
    /// Unique-constraint style collision; no retry in the core.
    Conflict,
    /// Token unreachable, login failure, sign failure.
    Hsm,
    /// Transaction or query failure; transactional guarantees hold.
    Persistence,
    /// Corrupted stored state; requires operator intervention.
    DataIntegrity,
}

/// Certificate authority errors.
#[derive(Debug, Error)]
pub enum CaError {
    // Validation
    /// CSR could not be decoded, parsed, or its self-signature is bad.
    #[error("Invalid CSR: {0}")]
    InvalidCsr(String),

    /// A PEM body could not be decoded or carried the wrong block type.
    #[error("Invalid PEM: {0}")]
    InvalidPem(String),

    /// Unknown CA kind string.
    #[error("Invalid CA type: {0}")]
    InvalidCaType(String),

    /// Unknown revocation reason string.
    #[error("Invalid revocation reason: {0}")]
    InvalidRevocationReason(String),

    /// A subordinate CA was requested without a parent.
    #[error("Subordinate CA requires a parent CA")]
    MissingParent,

    /// The requested parent cannot sign a subordinate.
    #[error("Parent CA not eligible: {0}")]
    ParentNotEligible(String),

    /// The CA exists but is not in the `active` state.
    #[error("Certificate Authority {0} is not active")]
    CaNotActive(i32),

    /// An OCSP request body could not be decoded.
    #[error("Invalid OCSP request: {0}")]
    InvalidOcspRequest(String),

    /// Generic input validation failure.
    #[error("Validation error: {0}")]
    Validation(String),

    // NotFound
    /// Certificate Authority not found.
    #[error("Certificate Authority {0} not found")]
    CaNotFound(i32),

    /// Certificate not found by serial number.
    #[error("Certificate {0} not found")]
    CertificateNotFound(String),

    // Conflict
    /// A CA with this name already exists (deleted names stay reserved).
    #[error("Certificate Authority name '{0}' already exists")]
    CaNameExists(String),

    /// The serial number has already been revoked.
    #[error("Certificate {0} is already revoked")]
    AlreadyRevoked(String),

    // Hsm
    /// HSM operation failed.
    #[error("HSM error: {0}")]
    Hsm(#[from] HsmError),

    /// Certificate, CRL, or OCSP signing failed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    // Persistence
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // DataIntegrity
    /// Chain traversal exceeded the depth bound.
    #[error("CA chain for {0} exceeds depth bound")]
    ChainTooDeep(i32),

    /// Stored state violates an invariant.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
}

impl CaError {
    /// The category the transport should report this error under.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            CaError::InvalidCsr(_)
            | CaError::InvalidPem(_)
            | CaError::InvalidCaType(_)
            | CaError::InvalidRevocationReason(_)
            | CaError::MissingParent
            | CaError::ParentNotEligible(_)
            | CaError::CaNotActive(_)
            | CaError::InvalidOcspRequest(_)
            | CaError::Validation(_) => ErrorCategory::Validation,

            CaError::CaNotFound(_) | CaError::CertificateNotFound(_) => ErrorCategory::NotFound,

            CaError::CaNameExists(_) | CaError::AlreadyRevoked(_) => ErrorCategory::Conflict,

            // The HSM is also where keys live, so absence and label
            // collisions keep their own categories.
            CaError::Hsm(HsmError::KeyNotFound(_)) => ErrorCategory::NotFound,
            CaError::Hsm(HsmError::LabelExists(_)) => ErrorCategory::Conflict,
            CaError::Hsm(_) | CaError::SigningFailed(_) => ErrorCategory::Hsm,

            CaError::Database(e) if is_unique_violation(e) => ErrorCategory::Conflict,
            CaError::Database(_) => ErrorCategory::Persistence,

            CaError::ChainTooDeep(_) | CaError::DataIntegrity(_) => ErrorCategory::DataIntegrity,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            CaError::InvalidCsr("bad".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            CaError::CaNotFound(3).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            CaError::CaNameExists("RootA".into()).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            CaError::AlreadyRevoked("00FF".into()).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            CaError::ChainTooDeep(1).category(),
            ErrorCategory::DataIntegrity
        );
        assert_eq!(
            CaError::SigningFailed("token said no".into()).category(),
            ErrorCategory::Hsm
        );
    }

    #[test]
    fn test_hsm_not_found_maps_to_not_found() {
        let err = CaError::Hsm(HsmError::KeyNotFound("RootA-Key".into()));
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let err = CaError::Hsm(HsmError::LabelExists("RootA-Key".into()));
        assert_eq!(err.category(), ErrorCategory::Conflict);

        let err = CaError::Hsm(HsmError::SessionLost);
        assert_eq!(err.category(), ErrorCategory::Hsm);
    }
}
