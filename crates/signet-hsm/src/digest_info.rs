//! DER DigestInfo framing for PKCS#1 v1.5 signatures over raw RSA.
//!
//! Tokens driven through the raw `CKM_RSA_PKCS` mechanism apply padding but
//! not the DigestInfo structure, so the service must prepend it before
//! handing the digest to the token.

use crate::{HashAlgorithm, HsmError};

/// DER prefix for a SHA-256 DigestInfo:
/// `SEQUENCE { SEQUENCE { OID 2.16.840.1.101.3.4.2.1, NULL }, OCTET STRING (32) }`.
pub const SHA256_PREFIX: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];

/// Wrap a raw digest in the DigestInfo structure for `alg`.
///
/// The digest length is checked against the algorithm; a mismatch is a
/// caller bug surfaced as [`HsmError::UnsupportedDigest`].
pub fn wrap(digest: &[u8], alg: HashAlgorithm) -> Result<Vec<u8>, HsmError> {
    if digest.len() != alg.digest_len() {
        return Err(HsmError::UnsupportedDigest(digest.len()));
    }

    let prefix: &[u8] = match alg {
        HashAlgorithm::Sha256 => &SHA256_PREFIX,
    };

    let mut framed = Vec::with_capacity(prefix.len() + digest.len());
    framed.extend_from_slice(prefix);
    framed.extend_from_slice(digest);
    Ok(framed)
}

/// Select the hash algorithm from a digest's length.
///
/// Lets the signer validate callers that pass a digest without naming the
/// algorithm correctly; only SHA-256 (32 bytes) is known to this core.
pub fn algorithm_for_digest_len(len: usize) -> Result<HashAlgorithm, HsmError> {
    match len {
        32 => Ok(HashAlgorithm::Sha256),
        other => Err(HsmError::UnsupportedDigest(other)),
    }
}
