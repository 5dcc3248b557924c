//! X.509 assembly: certificates, CRLs, and OCSP structures.
//!
//! Everything in this module is pure apart from serial-number randomness.
//! Signing goes through [`signer::HsmKeyPair`], which hands digests to the
//! HSM; no private key material is ever present here.

pub mod certificate;
pub mod crl;
pub mod ocsp;
pub mod signer;

pub use certificate::{
    build_ca_certificate, build_end_entity, end_entity_validity, issuer_context,
    issuer_distribution_urls, parse_and_verify_csr, pem_to_der, random_serial,
    serial_hex_to_bytes, sub_ca_validity, BuiltCertificate, CaCertSpec, CsrInfo, EndEntityOptions,
    IssuerContext,
};
pub use crl::{build_crl, CrlEntry};
pub use signer::HsmKeyPair;
