//! End-to-end tests for the X.509 layer against the software token.
//!
//! These cover the full build-and-sign pipeline (hierarchy, issuance from
//! a CSR, CRL and OCSP) without requiring PostgreSQL or a hardware token.

use std::sync::Arc;

use chrono::{Duration, SubsecRound, Utc};
use der::{AnyRef, Decode, Encode};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use signet_ca::x509::ocsp::{self, SerialStatus};
use signet_ca::x509::{
    build_ca_certificate, build_crl, build_end_entity, end_entity_validity, issuer_context,
    issuer_distribution_urls, parse_and_verify_csr, pem_to_der, serial_hex_to_bytes,
    sub_ca_validity, BuiltCertificate, CaCertSpec, CrlEntry, EndEntityOptions, HsmKeyPair,
    IssuerContext,
};
use signet_ca::CaError;
use signet_db::models::RevocationReason;
use signet_hsm::{HsmSigner, SignerProvider, SoftwareSignerProvider};
use x509_parser::prelude::{FromDer, X509Certificate};

const CRL_URL: &str = "https://pki.example.com/signet.crl";
const OCSP_URL: &str = "https://pki.example.com/ocsp";

struct Hierarchy {
    provider: Arc<SoftwareSignerProvider>,
    root: BuiltCertificate,
    sub: BuiltCertificate,
}

fn build_hierarchy() -> Hierarchy {
    let provider = Arc::new(SoftwareSignerProvider::new());
    let now = Utc::now().trunc_subsecs(0);

    provider.generate_key_pair("RootA-Key").unwrap();
    let root_key = HsmKeyPair::from_signer(provider.signer_for("RootA-Key").unwrap()).unwrap();
    let root = build_ca_certificate(
        &CaCertSpec {
            common_name: "RootA",
            organization: "Example Org",
            country: "VN",
            not_before: now,
            not_after: now + Duration::days(3650),
            crl_url: Some(CRL_URL),
            ocsp_url: Some(OCSP_URL),
            path_len: None,
        },
        &root_key,
        None,
    )
    .unwrap();

    provider.generate_key_pair("SubA-Key").unwrap();
    let sub_key = HsmKeyPair::from_signer(provider.signer_for("SubA-Key").unwrap()).unwrap();
    let root_ctx = issuer_context(
        &root.pem,
        provider.signer_for("RootA-Key").unwrap(),
    )
    .unwrap();

    let (sub_nb, sub_na) = sub_ca_validity(now, root.not_before, root.not_after).unwrap();
    let sub = build_ca_certificate(
        &CaCertSpec {
            common_name: "SubA",
            organization: "Example Org",
            country: "VN",
            not_before: sub_nb,
            not_after: sub_na,
            crl_url: Some(CRL_URL),
            ocsp_url: Some(OCSP_URL),
            path_len: Some(0),
        },
        &sub_key,
        Some(&root_ctx),
    )
    .unwrap();

    Hierarchy {
        provider,
        root,
        sub,
    }
}

fn sub_issuer_context(h: &Hierarchy) -> IssuerContext {
    issuer_context(&h.sub.pem, h.provider.signer_for("SubA-Key").unwrap()).unwrap()
}

fn service_csr_pem() -> String {
    let key = rcgen::KeyPair::generate().unwrap();
    let mut params = rcgen::CertificateParams::new(vec!["svc.example".to_string()]).unwrap();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "svc.example");
    params.serialize_request(&key).unwrap().pem().unwrap()
}

fn issue_under_sub(h: &Hierarchy, csr_pem: &str) -> BuiltCertificate {
    let csr = parse_and_verify_csr(csr_pem).unwrap();
    let now = Utc::now().trunc_subsecs(0);
    let (nb, na) = end_entity_validity(now, h.sub.not_before, h.sub.not_after).unwrap();
    let (crl_url, ocsp_url) = issuer_distribution_urls(&h.sub.pem).unwrap();

    build_end_entity(
        csr,
        &EndEntityOptions {
            not_before: nb,
            not_after: na,
            crl_url,
            ocsp_url,
        },
        &sub_issuer_context(h),
    )
    .unwrap()
}

#[test]
fn root_ca_is_self_signed_with_ca_constraints() {
    let h = build_hierarchy();

    let der = pem_to_der(&h.root.pem, "CERTIFICATE").unwrap();
    let (_, cert) = X509Certificate::from_der(&der).unwrap();

    assert!(cert.subject().to_string().contains("CN=RootA"));
    assert_eq!(cert.subject(), cert.issuer());
    cert.verify_signature(None).expect("self-signature");

    let bc = cert.basic_constraints().unwrap().expect("BasicConstraints");
    assert!(bc.value.ca);

    let ku = cert.key_usage().unwrap().expect("KeyUsage").value;
    assert!(ku.digital_signature());
    assert!(ku.key_cert_sign());
    assert!(ku.crl_sign());
}

#[test]
fn sub_ca_chains_to_root_with_half_remaining_lifetime() {
    let h = build_hierarchy();

    let root_der = pem_to_der(&h.root.pem, "CERTIFICATE").unwrap();
    let (_, root) = X509Certificate::from_der(&root_der).unwrap();
    let sub_der = pem_to_der(&h.sub.pem, "CERTIFICATE").unwrap();
    let (_, sub) = X509Certificate::from_der(&sub_der).unwrap();

    assert!(sub.subject().to_string().contains("CN=SubA"));
    assert_eq!(sub.issuer(), root.subject());
    sub.verify_signature(Some(root.public_key()))
        .expect("sub CA signature under root");

    let bc = sub.basic_constraints().unwrap().expect("BasicConstraints");
    assert!(bc.value.ca);
    assert_eq!(bc.value.path_len_constraint, Some(0));

    // Created immediately after the root: half of ~3650 days remaining.
    let lifetime = h.sub.not_after - h.sub.not_before;
    assert!((lifetime.num_days() - 1825).abs() <= 1);
    assert!(h.sub.not_after <= h.root.not_after);
    assert!(h.sub.not_before >= h.root.not_before);
}

#[test]
fn issued_certificate_honors_csr_and_issuer() {
    let h = build_hierarchy();
    let issued = issue_under_sub(&h, &service_csr_pem());

    let (_, cert) = X509Certificate::from_der(&issued.der).unwrap();
    let sub_der = pem_to_der(&h.sub.pem, "CERTIFICATE").unwrap();
    let (_, sub) = X509Certificate::from_der(&sub_der).unwrap();

    // Subject and SAN come from the request.
    assert!(cert.subject().to_string().contains("CN=svc.example"));
    let san = cert
        .subject_alternative_name()
        .unwrap()
        .expect("SAN present");
    let has_dns = san.value.general_names.iter().any(|name| {
        matches!(name, x509_parser::prelude::GeneralName::DNSName(dns) if *dns == "svc.example")
    });
    assert!(has_dns, "DNS SAN copied from CSR");

    // Issuer, signature, and constraints come from the CA.
    assert_eq!(cert.issuer(), sub.subject());
    cert.verify_signature(Some(sub.public_key()))
        .expect("signature under SubA");
    let bc = cert.basic_constraints().unwrap().expect("BasicConstraints");
    assert!(!bc.value.ca);

    let eku = cert.extended_key_usage().unwrap().expect("EKU").value;
    assert!(eku.server_auth);
    assert!(eku.client_auth);

    // Validity inside the issuer's window.
    assert!(issued.not_before >= h.sub.not_before);
    assert!(issued.not_after <= h.sub.not_after);

    // The random serial ends up in the certificate unchanged.
    let mut serial = cert.serial.to_bytes_be();
    while serial.len() < 16 {
        serial.insert(0, 0);
    }
    assert_eq!(serial, serial_hex_to_bytes(&issued.serial_hex).unwrap());

    // CDP and OCSP URLs copied from the issuer certificate.
    let (crl_url, ocsp_url) = issuer_distribution_urls(&issued.pem).unwrap();
    assert_eq!(crl_url.as_deref(), Some(CRL_URL));
    assert_eq!(ocsp_url.as_deref(), Some(OCSP_URL));
}

#[test]
fn tampered_csr_signature_is_rejected() {
    let csr_pem = service_csr_pem();
    let mut der = pem_to_der(&csr_pem, "CERTIFICATE REQUEST").unwrap();

    // Flip a bit near the end, inside the signature bytes.
    let index = der.len() - 5;
    der[index] ^= 0x01;
    let tampered = pem::encode(&pem::Pem::new("CERTIFICATE REQUEST", der));

    assert!(matches!(
        parse_and_verify_csr(&tampered),
        Err(CaError::InvalidCsr(_))
    ));
}

#[test]
fn crl_lists_revoked_serials_with_reason() {
    let h = build_hierarchy();
    let issued = issue_under_sub(&h, &service_csr_pem());
    let now = Utc::now().trunc_subsecs(0);

    let entries = vec![CrlEntry {
        serial_hex: issued.serial_hex.clone(),
        revocation_time: now,
        reason: RevocationReason::KeyCompromise,
    }];

    let (crl_pem, crl_der) = build_crl(&sub_issuer_context(&h), &entries, 1, now).unwrap();
    assert!(crl_pem.starts_with("-----BEGIN X509 CRL-----"));

    let (_, crl) =
        x509_parser::revocation_list::CertificateRevocationList::from_der(&crl_der).unwrap();

    let sub_der = pem_to_der(&h.sub.pem, "CERTIFICATE").unwrap();
    let (_, sub) = X509Certificate::from_der(&sub_der).unwrap();
    assert_eq!(crl.issuer(), sub.subject());
    crl.verify_signature(sub.public_key())
        .expect("CRL signature under SubA");

    let revoked: Vec<_> = crl.iter_revoked_certificates().collect();
    assert_eq!(revoked.len(), 1);

    let mut serial = revoked[0].user_certificate.to_bytes_be();
    while serial.len() < 16 {
        serial.insert(0, 0);
    }
    assert_eq!(serial, serial_hex_to_bytes(&issued.serial_hex).unwrap());

    let (_, reason) = revoked[0].reason_code().expect("CRLReason entry extension");
    assert_eq!(reason.0, 1, "keyCompromise is reason code 1");

    // Weekly publication window.
    let this_update = crl.last_update().timestamp();
    let next_update = crl.next_update().expect("nextUpdate").timestamp();
    assert_eq!(next_update - this_update, 7 * 24 * 3600);
}

fn ocsp_request_for(serial_hexes: &[&str]) -> Vec<u8> {
    use x509_cert::serial_number::SerialNumber;
    use x509_ocsp::{CertId, OcspRequest, Request, TbsRequest, Version};

    let request_list = serial_hexes
        .iter()
        .map(|hex| Request {
            req_cert: CertId {
                hash_algorithm: x509_cert::spki::AlgorithmIdentifierOwned {
                    oid: const_oid::db::rfc5912::ID_SHA_1,
                    parameters: Some(AnyRef::NULL.into()),
                },
                issuer_name_hash: der::asn1::OctetString::new(vec![0u8; 20]).unwrap(),
                issuer_key_hash: der::asn1::OctetString::new(vec![0u8; 20]).unwrap(),
                serial_number: SerialNumber::new(&serial_hex_to_bytes(hex).unwrap()).unwrap(),
            },
            single_request_extensions: None,
        })
        .collect();

    OcspRequest {
        tbs_request: TbsRequest {
            version: Version::V1,
            requestor_name: None,
            request_list,
            request_extensions: None,
        },
        optional_signature: None,
    }
    .to_der()
    .unwrap()
}

#[test]
fn ocsp_response_reports_good_revoked_and_unknown() {
    use x509_ocsp::{BasicOcspResponse, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus};

    let h = build_hierarchy();
    let issued = issue_under_sub(&h, &service_csr_pem());
    let now = Utc::now().trunc_subsecs(0);
    let revoked_at = now - Duration::hours(1);

    let unknown_serial = "AB".repeat(16);
    let request_der = ocsp_request_for(&[&issued.serial_hex, &unknown_serial]);
    let request = OcspRequest::from_der(&request_der).unwrap();

    // First serial revoked, second never issued.
    let statuses = [
        SerialStatus::Revoked {
            time: revoked_at,
            reason: RevocationReason::KeyCompromise,
        },
        SerialStatus::Unknown,
    ];
    let responses = request
        .tbs_request
        .request_list
        .iter()
        .zip(statuses.iter())
        .map(|(single, status)| {
            assert_eq!(
                ocsp::serial_hex(&single.req_cert),
                if matches!(status, SerialStatus::Unknown) {
                    unknown_serial.clone()
                } else {
                    issued.serial_hex.clone()
                }
            );
            ocsp::single_response(single.req_cert.clone(), status, now).unwrap()
        })
        .collect();

    let signer = h.provider.signer_for("SubA-Key").unwrap();
    let response_der = ocsp::build_response(&h.sub.pem, signer.as_ref(), responses, now).unwrap();

    let response = OcspResponse::from_der(&response_der).unwrap();
    assert_eq!(response.response_status, OcspResponseStatus::Successful);

    let bytes = response.response_bytes.expect("response bytes");
    assert_eq!(bytes.response_type, const_oid::db::rfc6960::ID_PKIX_OCSP_BASIC);
    let basic = BasicOcspResponse::from_der(bytes.response.as_bytes()).unwrap();

    assert_eq!(basic.tbs_response_data.responses.len(), 2);
    match &basic.tbs_response_data.responses[0].cert_status {
        CertStatus::Revoked(info) => {
            assert_eq!(
                info.revocation_reason,
                Some(x509_cert::ext::pkix::CrlReason::KeyCompromise)
            );
        }
        other => panic!("expected revoked status, got {other:?}"),
    }
    assert!(matches!(
        basic.tbs_response_data.responses[1].cert_status,
        CertStatus::Unknown(_)
    ));

    // nextUpdate = thisUpdate + 24h on each single response.
    let single = &basic.tbs_response_data.responses[0];
    let this_update = single.this_update.0.to_unix_duration().as_secs() as i64;
    let next_update = single
        .next_update
        .expect("nextUpdate")
        .0
        .to_unix_duration()
        .as_secs() as i64;
    assert_eq!(next_update - this_update, 24 * 3600);

    // The response is signed by the issuing CA's key.
    let tbs_der = basic.tbs_response_data.to_der().unwrap();
    let digest = Sha256::digest(&tbs_der);
    let public_key = RsaPublicKey::from_pkcs1_pem(signer.public_key_pem()).unwrap();
    public_key
        .verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &digest,
            basic.signature.raw_bytes(),
        )
        .expect("OCSP response signature under SubA");
}

#[test]
fn good_status_round_trips() {
    use x509_ocsp::{BasicOcspResponse, CertStatus, OcspRequest, OcspResponse};

    let h = build_hierarchy();
    let issued = issue_under_sub(&h, &service_csr_pem());
    let now = Utc::now().trunc_subsecs(0);

    let request_der = ocsp_request_for(&[&issued.serial_hex]);
    let request = OcspRequest::from_der(&request_der).unwrap();
    let responses = vec![ocsp::single_response(
        request.tbs_request.request_list[0].req_cert.clone(),
        &SerialStatus::Good,
        now,
    )
    .unwrap()];

    let signer = h.provider.signer_for("SubA-Key").unwrap();
    let response_der = ocsp::build_response(&h.sub.pem, signer.as_ref(), responses, now).unwrap();

    let response = OcspResponse::from_der(&response_der).unwrap();
    let basic =
        BasicOcspResponse::from_der(response.response_bytes.unwrap().response.as_bytes()).unwrap();
    assert!(matches!(
        basic.tbs_response_data.responses[0].cert_status,
        CertStatus::Good(_)
    ));
}
