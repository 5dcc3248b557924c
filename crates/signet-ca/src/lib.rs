//! Signet CA: the certificate authority core.
//!
//! Issues, revokes and reports the status of X.509 certificates from a
//! depth-2 CA hierarchy. Private keys live in an HSM behind
//! [`signet_hsm::SignerProvider`]; state lives in PostgreSQL behind
//! `signet-db`; this crate holds the invariants:
//!
//! - every issued certificate's validity lies inside its issuer's validity,
//!   and subordinate CAs get half of their parent's remaining lifetime;
//! - a revocation record and the certificate status flip are one atomic
//!   write, so CRL and OCSP can never disagree with the store;
//! - every signature traces to an HSM-held key whose label derives from the
//!   CA name, through the pre-hash + DigestInfo signing contract.
//!
//! The transport layer that exposes these services over HTTP lives
//! elsewhere; errors carry an [`error::ErrorCategory`] for it to map.

pub mod config;
pub mod error;
pub mod services;
pub mod x509;

pub use config::CaConfig;
pub use error::{CaError, ErrorCategory};
pub use services::{CaService, CertificateService, KeyService, RevocationService};
