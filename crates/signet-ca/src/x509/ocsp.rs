//! RFC 6960 OCSP request parsing and response construction.
//!
//! The issuing CA doubles as the responder: responses are signed by the
//! same HSM key that signed the certificates being queried.

use chrono::{DateTime, Duration, Utc};
use der::asn1::{BitString, GeneralizedTime, Null, OctetString};
use der::{AnyRef, Decode, Encode};
use sha2::{Digest, Sha256};
use signet_db::models::RevocationReason;
use signet_hsm::{HashAlgorithm, HsmSigner};
use x509_cert::ext::pkix::CrlReason;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus,
    ResponderId, ResponseBytes, ResponseData, RevokedInfo, SingleResponse, Version,
};

use crate::error::CaError;
use crate::x509::certificate::pem_to_der;

/// OCSP responses are good for one day.
const OCSP_VALIDITY_HOURS: i64 = 24;

/// Resolved status of one queried serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialStatus {
    Good,
    Revoked {
        time: DateTime<Utc>,
        reason: RevocationReason,
    },
    Unknown,
}

/// Decode a DER OCSP request.
///
/// An empty request list is rejected along with undecodable input; both are
/// caller errors the transport reports as malformed.
pub fn parse_request(request_der: &[u8]) -> Result<OcspRequest, CaError> {
    let request = OcspRequest::from_der(request_der)
        .map_err(|e| CaError::InvalidOcspRequest(e.to_string()))?;

    if request.tbs_request.request_list.is_empty() {
        return Err(CaError::InvalidOcspRequest(
            "request list is empty".to_string(),
        ));
    }

    Ok(request)
}

/// Canonical storage form of a queried serial: upper-case hex of the value
/// left-padded to 128 bits.
///
/// DER integers are minimal-length, so the bytes carried in a request may
/// be shorter than the sixteen bytes the service stores (or carry a
/// leading zero pad octet); both are normalized here.
#[must_use]
pub fn serial_hex(cert_id: &CertId) -> String {
    let bytes = cert_id.serial_number.as_bytes();
    let trimmed: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();

    let mut padded = vec![0u8; 16usize.saturating_sub(trimmed.len())];
    padded.extend_from_slice(&trimmed);
    padded.iter().map(|b| format!("{b:02X}")).collect()
}

/// Build the single response for one queried serial, echoing its `CertId`.
pub fn single_response(
    cert_id: CertId,
    status: &SerialStatus,
    now: DateTime<Utc>,
) -> Result<SingleResponse, CaError> {
    let cert_status = match status {
        SerialStatus::Good => CertStatus::Good(Null),
        SerialStatus::Revoked { time, reason } => CertStatus::Revoked(RevokedInfo {
            revocation_time: x509_ocsp::OcspGeneralizedTime(generalized(*time)?),
            revocation_reason: Some(map_reason(*reason)),
        }),
        SerialStatus::Unknown => CertStatus::Unknown(Null),
    };

    Ok(SingleResponse {
        cert_id,
        cert_status,
        this_update: x509_ocsp::OcspGeneralizedTime(generalized(now)?),
        next_update: Some(x509_ocsp::OcspGeneralizedTime(generalized(
            now + Duration::hours(OCSP_VALIDITY_HOURS),
        )?)),
        single_extensions: None,
    })
}

/// Assemble and sign the full OCSP response.
///
/// The ResponseData is DER-encoded, digested with SHA-256 and signed by the
/// issuing CA's HSM key, then wrapped as a successful `OCSPResponse`
/// carrying an `id-pkix-ocsp-basic` body.
pub fn build_response(
    ca_cert_pem: &str,
    signer: &dyn HsmSigner,
    responses: Vec<SingleResponse>,
    now: DateTime<Utc>,
) -> Result<Vec<u8>, CaError> {
    let ca_der = pem_to_der(ca_cert_pem, "CERTIFICATE")?;
    let ca = x509_cert::Certificate::from_der(&ca_der).map_err(|e| {
        CaError::DataIntegrity(format!("stored CA certificate unparseable: {e}"))
    })?;

    let tbs_response_data = ResponseData {
        version: Version::V1,
        responder_id: ResponderId::ByName(ca.tbs_certificate.subject.clone()),
        produced_at: x509_ocsp::OcspGeneralizedTime(generalized(now)?),
        responses,
        response_extensions: None,
    };

    let tbs_der = tbs_response_data
        .to_der()
        .map_err(|e| CaError::SigningFailed(format!("ResponseData encoding failed: {e}")))?;
    let digest = Sha256::digest(&tbs_der);
    let signature = signer.sign_digest(&digest, HashAlgorithm::Sha256)?;

    let basic = BasicOcspResponse {
        tbs_response_data,
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: Some(AnyRef::NULL.into()),
        },
        signature: BitString::from_bytes(&signature)
            .map_err(|e| CaError::SigningFailed(format!("signature encoding failed: {e}")))?,
        certs: None,
    };
    let basic_der = basic
        .to_der()
        .map_err(|e| CaError::SigningFailed(format!("BasicOCSPResponse encoding failed: {e}")))?;

    let response = OcspResponse {
        response_status: OcspResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: const_oid::db::rfc6960::ID_PKIX_OCSP_BASIC,
            response: OctetString::new(basic_der)
                .map_err(|e| CaError::SigningFailed(format!("response wrapping failed: {e}")))?,
        }),
    };

    response
        .to_der()
        .map_err(|e| CaError::SigningFailed(format!("OCSPResponse encoding failed: {e}")))
}

/// OCSP reason codes share the CRLReason numeric values.
fn map_reason(reason: RevocationReason) -> CrlReason {
    match reason {
        RevocationReason::Unspecified => CrlReason::Unspecified,
        RevocationReason::KeyCompromise => CrlReason::KeyCompromise,
        RevocationReason::CaCompromise => CrlReason::CaCompromise,
        RevocationReason::AffiliationChanged => CrlReason::AffiliationChanged,
        RevocationReason::Superseded => CrlReason::Superseded,
        RevocationReason::CessationOfOperation => CrlReason::CessationOfOperation,
        RevocationReason::CertificateHold => CrlReason::CertificateHold,
    }
}

fn generalized(dt: DateTime<Utc>) -> Result<GeneralizedTime, CaError> {
    let ts = u64::try_from(dt.timestamp())
        .map_err(|_| CaError::Validation("timestamp before epoch".to_string()))?;
    GeneralizedTime::from_unix_duration(std::time::Duration::from_secs(ts))
        .map_err(|e| CaError::Validation(format!("timestamp out of range: {e}")))
}
