//! Orchestration services over persistence and the HSM.

pub mod ca_service;
pub mod certificate_service;
pub mod key_service;
pub mod revocation_service;

pub use ca_service::{parse_ca_type, CaService};
pub use certificate_service::{parse_revocation_reason, CertificateService};
pub use key_service::KeyService;
pub use revocation_service::RevocationService;
