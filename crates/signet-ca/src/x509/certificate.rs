//! Certificate templates and CSR handling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, CrlDistributionPoint,
    CustomExtension, DnType, ExtendedKeyUsagePurpose, IsCa, KeyIdMethod, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use sha1::{Digest, Sha1};
use signet_hsm::HsmSigner;
use time::OffsetDateTime;
use x509_parser::prelude::{FromDer, GeneralName, ParsedExtension, X509Certificate};

use crate::error::CaError;
use crate::x509::signer::HsmKeyPair;

/// OID 1.3.6.1.5.5.7.1.1 (Authority Information Access).
const AIA_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];
/// OID 1.3.6.1.5.5.7.48.1 (id-ad-ocsp), dotted form for x509-parser lookups.
const ID_AD_OCSP_DOTTED: &str = "1.3.6.1.5.5.7.48.1";

/// A signed certificate plus the metadata the persistence layer stores.
#[derive(Debug, Clone)]
pub struct BuiltCertificate {
    pub pem: String,
    pub der: Vec<u8>,
    pub serial_hex: String,
    pub subject_cn: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Template inputs for a CA certificate (root or subordinate).
#[derive(Debug, Clone)]
pub struct CaCertSpec<'a> {
    pub common_name: &'a str,
    pub organization: &'a str,
    pub country: &'a str,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub crl_url: Option<&'a str>,
    pub ocsp_url: Option<&'a str>,
    /// `None` for roots (unconstrained), `Some(0)` for subordinates.
    pub path_len: Option<u8>,
}

/// The issuer side of a signing operation: the CA's certificate rebuilt as
/// an rcgen object plus its HSM-backed key pair.
pub struct IssuerContext {
    pub certificate: rcgen::Certificate,
    pub key_pair: KeyPair,
    /// The issuer's SubjectKeyIdentifier (SHA-1 of its SPKI).
    pub ski: Vec<u8>,
}

/// A parsed, signature-verified CSR.
pub struct CsrInfo {
    pub params: CertificateSigningRequestParams,
    pub subject_cn: String,
    /// DER SubjectPublicKeyInfo from the request.
    pub spki_der: Vec<u8>,
}

/// Validity and issuer-derived extension inputs for an end-entity
/// certificate.
#[derive(Debug, Clone)]
pub struct EndEntityOptions {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub crl_url: Option<String>,
    pub ocsp_url: Option<String>,
}

/// Draw a uniform random 128-bit serial number.
///
/// Returns the big-endian bytes and their upper-case hex encoding (the
/// storage form).
#[must_use]
pub fn random_serial() -> ([u8; 16], String) {
    let bytes: [u8; 16] = rand::random();
    let hex = bytes.iter().map(|b| format!("{b:02X}")).collect();
    (bytes, hex)
}

/// Decode a hex serial back to big-endian bytes.
#[must_use]
pub fn serial_hex_to_bytes(serial_hex: &str) -> Option<Vec<u8>> {
    if serial_hex.is_empty() || serial_hex.len() % 2 != 0 {
        return None;
    }
    (0..serial_hex.len() / 2)
        .map(|i| u8::from_str_radix(&serial_hex[i * 2..i * 2 + 2], 16).ok())
        .collect()
}

/// Decode a PEM block, checking its type label.
pub fn pem_to_der(pem_str: &str, expected_tag: &str) -> Result<Vec<u8>, CaError> {
    let block = pem::parse(pem_str).map_err(|e| CaError::InvalidPem(e.to_string()))?;
    if block.tag() != expected_tag {
        return Err(CaError::InvalidPem(format!(
            "expected {expected_tag} block, found {}",
            block.tag()
        )));
    }
    Ok(block.contents().to_vec())
}

/// Validity window for an end-entity certificate: half the issuer's total
/// window from now, clamped to the issuer's NotAfter.
pub fn end_entity_validity(
    now: DateTime<Utc>,
    issuer_not_before: DateTime<Utc>,
    issuer_not_after: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), CaError> {
    check_issuer_window(now, issuer_not_before, issuer_not_after)?;

    let half = (issuer_not_after - issuer_not_before) / 2;
    let not_after = std::cmp::min(now + half, issuer_not_after);
    if not_after <= now {
        return Err(CaError::Validation(
            "certificate would have zero lifetime".to_string(),
        ));
    }
    Ok((now, not_after))
}

/// Validity window for a subordinate CA: half the parent's remaining
/// lifetime from now.
pub fn sub_ca_validity(
    now: DateTime<Utc>,
    parent_not_before: DateTime<Utc>,
    parent_not_after: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), CaError> {
    check_issuer_window(now, parent_not_before, parent_not_after)?;

    let not_after = now + (parent_not_after - now) / 2;
    if not_after <= now {
        return Err(CaError::Validation(
            "subordinate CA would have zero lifetime".to_string(),
        ));
    }
    Ok((now, not_after))
}

fn check_issuer_window(
    now: DateTime<Utc>,
    issuer_not_before: DateTime<Utc>,
    issuer_not_after: DateTime<Utc>,
) -> Result<(), CaError> {
    if now < issuer_not_before {
        return Err(CaError::Validation(
            "issuer certificate is not yet valid".to_string(),
        ));
    }
    if now >= issuer_not_after {
        return Err(CaError::Validation(
            "issuer certificate has expired".to_string(),
        ));
    }
    Ok(())
}

/// Build and sign a CA certificate.
///
/// Self-signed when `issuer` is `None` (roots), otherwise signed by the
/// issuer's HSM key.
pub fn build_ca_certificate(
    spec: &CaCertSpec<'_>,
    key: &KeyPair,
    issuer: Option<&IssuerContext>,
) -> Result<BuiltCertificate, CaError> {
    let (serial_bytes, serial_hex) = random_serial();

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, spec.common_name);
    params
        .distinguished_name
        .push(DnType::OrganizationName, spec.organization);
    params
        .distinguished_name
        .push(DnType::CountryName, spec.country);

    params.serial_number = Some(SerialNumber::from_slice(&serial_bytes));
    params.not_before = to_offset(spec.not_before)?;
    params.not_after = to_offset(spec.not_after)?;

    params.is_ca = match spec.path_len {
        Some(n) => IsCa::Ca(BasicConstraints::Constrained(n)),
        None => IsCa::Ca(BasicConstraints::Unconstrained),
    };
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
    ];

    params.key_identifier_method =
        KeyIdMethod::PreSpecified(Sha1::digest(key.public_key_der()).to_vec());
    params.use_authority_key_identifier_extension = true;

    if let Some(url) = spec.crl_url {
        params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: vec![url.to_string()],
        }];
    }
    if let Some(url) = spec.ocsp_url {
        params
            .custom_extensions
            .push(authority_info_access_extension(url)?);
    }

    let cert = match issuer {
        Some(ctx) => params.signed_by(key, &ctx.certificate, &ctx.key_pair),
        None => params.self_signed(key),
    }
    .map_err(|e| CaError::SigningFailed(e.to_string()))?;

    Ok(BuiltCertificate {
        pem: cert.pem(),
        der: cert.der().to_vec(),
        serial_hex,
        subject_cn: spec.common_name.to_string(),
        not_before: spec.not_before,
        not_after: spec.not_after,
    })
}

/// Rebuild an issuing CA as an rcgen certificate bound to its HSM key.
///
/// rcgen needs an issuer `Certificate` object to produce the issuer DN and
/// AuthorityKeyIdentifier of anything it signs, so the stored PEM is parsed
/// and its subject and key identifier are reconstructed around the remote
/// key. The extra self-signature this costs is discarded with the object.
pub fn issuer_context(
    issuer_cert_pem: &str,
    signer: Arc<dyn HsmSigner>,
) -> Result<IssuerContext, CaError> {
    let key_pair = HsmKeyPair::from_signer(signer)?;

    let issuer_der = pem_to_der(issuer_cert_pem, "CERTIFICATE")?;
    let (_, issuer) = X509Certificate::from_der(&issuer_der).map_err(|e| {
        CaError::DataIntegrity(format!("stored CA certificate unparseable: {e:?}"))
    })?;

    let mut params = CertificateParams::default();
    for rdn in issuer.subject().iter() {
        for attr in rdn.iter() {
            let value = attr.as_str().unwrap_or("");
            match attr.attr_type().to_string().as_str() {
                "2.5.4.3" => params.distinguished_name.push(DnType::CommonName, value),
                "2.5.4.6" => params.distinguished_name.push(DnType::CountryName, value),
                "2.5.4.7" => params.distinguished_name.push(DnType::LocalityName, value),
                "2.5.4.8" => params
                    .distinguished_name
                    .push(DnType::StateOrProvinceName, value),
                "2.5.4.10" => params
                    .distinguished_name
                    .push(DnType::OrganizationName, value),
                "2.5.4.11" => params
                    .distinguished_name
                    .push(DnType::OrganizationalUnitName, value),
                _ => {}
            }
        }
    }

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    // The recreated certificate must carry the real SKI so that AKIs in
    // anything signed below it match the stored issuer certificate.
    let ski = Sha1::digest(issuer.public_key().raw).to_vec();
    params.key_identifier_method = KeyIdMethod::PreSpecified(ski.clone());

    let certificate = params
        .self_signed(&key_pair)
        .map_err(|e| CaError::SigningFailed(e.to_string()))?;

    Ok(IssuerContext {
        certificate,
        key_pair,
        ski,
    })
}

/// Decode, parse and signature-verify a PKCS#10 CSR.
pub fn parse_and_verify_csr(csr_pem: &str) -> Result<CsrInfo, CaError> {
    use x509_parser::certification_request::X509CertificationRequest;

    let block = pem::parse(csr_pem)
        .map_err(|e| CaError::InvalidCsr(format!("PEM decode failed: {e}")))?;
    if block.tag() != "CERTIFICATE REQUEST" {
        return Err(CaError::InvalidCsr(format!(
            "unexpected PEM block type '{}'",
            block.tag()
        )));
    }

    let (_, csr) = X509CertificationRequest::from_der(block.contents())
        .map_err(|e| CaError::InvalidCsr(format!("parse failed: {e:?}")))?;
    csr.verify_signature()
        .map_err(|_| CaError::InvalidCsr("self-signature verification failed".to_string()))?;

    let info = &csr.certification_request_info;
    let subject_cn = info
        .subject
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or("")
        .to_string();
    let spki_der = info.subject_pki.raw.to_vec();

    let params = CertificateSigningRequestParams::from_pem(csr_pem)
        .map_err(|e| CaError::InvalidCsr(format!("unsupported CSR contents: {e}")))?;

    Ok(CsrInfo {
        params,
        subject_cn,
        spki_der,
    })
}

/// Build and sign an end-entity certificate from a verified CSR.
///
/// Subject and SAN come verbatim from the request; everything else is
/// stamped by the template.
pub fn build_end_entity(
    mut csr: CsrInfo,
    opts: &EndEntityOptions,
    issuer: &IssuerContext,
) -> Result<BuiltCertificate, CaError> {
    if opts.not_before >= opts.not_after {
        return Err(CaError::Validation(
            "certificate would have zero lifetime".to_string(),
        ));
    }

    let (serial_bytes, serial_hex) = random_serial();
    let ski = Sha1::digest(&csr.spki_der).to_vec();

    let params = &mut csr.params.params;
    params.serial_number = Some(SerialNumber::from_slice(&serial_bytes));
    params.not_before = to_offset(opts.not_before)?;
    params.not_after = to_offset(opts.not_after)?;
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    params.key_identifier_method = KeyIdMethod::PreSpecified(ski);
    params.use_authority_key_identifier_extension = true;

    if let Some(url) = &opts.crl_url {
        params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: vec![url.clone()],
        }];
    }
    if let Some(url) = &opts.ocsp_url {
        params
            .custom_extensions
            .push(authority_info_access_extension(url)?);
    }

    let subject_cn = csr.subject_cn.clone();
    let not_before = opts.not_before;
    let not_after = opts.not_after;

    let cert = csr
        .params
        .signed_by(&issuer.certificate, &issuer.key_pair)
        .map_err(|e| CaError::SigningFailed(e.to_string()))?;

    Ok(BuiltCertificate {
        pem: cert.pem(),
        der: cert.der().to_vec(),
        serial_hex,
        subject_cn,
        not_before,
        not_after,
    })
}

/// Extract the CRL distribution point and OCSP responder URLs from an
/// issuer certificate, for copying into end-entity certificates.
pub fn issuer_distribution_urls(
    issuer_cert_pem: &str,
) -> Result<(Option<String>, Option<String>), CaError> {
    use x509_parser::extensions::DistributionPointName;

    let der = pem_to_der(issuer_cert_pem, "CERTIFICATE")?;
    let (_, cert) = X509Certificate::from_der(&der).map_err(|e| {
        CaError::DataIntegrity(format!("stored CA certificate unparseable: {e:?}"))
    })?;

    let mut crl_url = None;
    let mut ocsp_url = None;

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::CRLDistributionPoints(points) => {
                for point in &points.points {
                    if let Some(DistributionPointName::FullName(names)) =
                        &point.distribution_point
                    {
                        for name in names {
                            if let GeneralName::URI(uri) = name {
                                crl_url.get_or_insert_with(|| (*uri).to_string());
                            }
                        }
                    }
                }
            }
            ParsedExtension::AuthorityInfoAccess(aia) => {
                for desc in &aia.accessdescs {
                    if desc.access_method.to_id_string() == ID_AD_OCSP_DOTTED {
                        if let GeneralName::URI(uri) = &desc.access_location {
                            ocsp_url.get_or_insert_with(|| (*uri).to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok((crl_url, ocsp_url))
}

fn authority_info_access_extension(ocsp_url: &str) -> Result<CustomExtension, CaError> {
    use der::Encode;
    use x509_cert::ext::pkix::name::GeneralName as CertGeneralName;
    use x509_cert::ext::pkix::{AccessDescription, AuthorityInfoAccessSyntax};

    let location = CertGeneralName::UniformResourceIdentifier(
        der::asn1::Ia5String::new(ocsp_url)
            .map_err(|e| CaError::Validation(format!("invalid OCSP URL: {e}")))?,
    );
    let aia = AuthorityInfoAccessSyntax(vec![AccessDescription {
        access_method: const_oid::db::rfc5280::ID_AD_OCSP,
        access_location: location,
    }]);
    let content = aia
        .to_der()
        .map_err(|e| CaError::Validation(format!("AIA encoding failed: {e}")))?;

    Ok(CustomExtension::from_oid_content(AIA_OID, content))
}

fn to_offset(dt: DateTime<Utc>) -> Result<OffsetDateTime, CaError> {
    OffsetDateTime::from_unix_timestamp(dt.timestamp())
        .map_err(|e| CaError::Validation(format!("timestamp out of range: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_random_serial_is_128_bit_hex() {
        let (bytes, hex) = random_serial();
        assert_eq!(bytes.len(), 16);
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(serial_hex_to_bytes(&hex).unwrap(), bytes.to_vec());
    }

    #[test]
    fn test_serial_hex_boundaries() {
        let min = "00".repeat(16);
        assert_eq!(serial_hex_to_bytes(&min).unwrap(), vec![0u8; 16]);

        let max = "FF".repeat(16);
        assert_eq!(serial_hex_to_bytes(&max).unwrap(), vec![0xFFu8; 16]);

        assert!(serial_hex_to_bytes("").is_none());
        assert!(serial_hex_to_bytes("ABC").is_none());
        assert!(serial_hex_to_bytes("ZZ").is_none());
    }

    #[test]
    fn test_end_entity_validity_half_window() {
        let issuer_nb = Utc::now() - Duration::days(100);
        let issuer_na = Utc::now() + Duration::days(900);
        let now = Utc::now();

        let (nb, na) = end_entity_validity(now, issuer_nb, issuer_na).unwrap();
        assert_eq!(nb, now);
        assert_eq!(na, now + (issuer_na - issuer_nb) / 2);
    }

    #[test]
    fn test_end_entity_validity_clamped_to_issuer() {
        // Issuer close to expiry: half its total window would overshoot.
        let issuer_nb = Utc::now() - Duration::days(3000);
        let issuer_na = Utc::now() + Duration::days(10);
        let now = Utc::now();

        let (_, na) = end_entity_validity(now, issuer_nb, issuer_na).unwrap();
        assert_eq!(na, issuer_na);
    }

    #[test]
    fn test_end_entity_validity_rejects_expired_issuer() {
        let issuer_nb = Utc::now() - Duration::days(200);
        let issuer_na = Utc::now() - Duration::days(1);
        let result = end_entity_validity(Utc::now(), issuer_nb, issuer_na);
        assert!(matches!(result, Err(CaError::Validation(_))));
    }

    #[test]
    fn test_end_entity_validity_rejects_zero_lifetime() {
        let now = Utc::now();
        let result = end_entity_validity(now, now - Duration::days(10), now);
        assert!(matches!(result, Err(CaError::Validation(_))));
    }

    #[test]
    fn test_sub_ca_validity_is_half_of_remaining() {
        let parent_nb = Utc::now() - Duration::days(1825);
        let parent_na = Utc::now() + Duration::days(1825);
        let now = Utc::now();

        let (nb, na) = sub_ca_validity(now, parent_nb, parent_na).unwrap();
        assert_eq!(nb, now);
        assert_eq!(na, now + (parent_na - now) / 2);
        assert!(na <= parent_na);
    }

    #[test]
    fn test_csr_rejects_wrong_block_type() {
        let not_a_csr = "-----BEGIN CERTIFICATE-----\nMA==\n-----END CERTIFICATE-----\n";
        assert!(matches!(
            parse_and_verify_csr(not_a_csr),
            Err(CaError::InvalidCsr(_))
        ));
    }

    #[test]
    fn test_csr_rejects_garbage() {
        assert!(matches!(
            parse_and_verify_csr("not pem at all"),
            Err(CaError::InvalidCsr(_))
        ));
    }
}
