//! Row models for the Signet PKI schema.

pub mod certificate;
pub mod certificate_authority;
pub mod revoked_certificate;

pub use certificate::{Certificate, CertificateStatus};
pub use certificate_authority::{CaStatus, CaType, CertificateAuthority, NewCertificateAuthority};
pub use revoked_certificate::{RevocationReason, RevokedCertificate};
