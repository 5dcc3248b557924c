//! CRL publication and the OCSP responder.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use signet_db::models::{Certificate, CertificateAuthority, RevokedCertificate};
use signet_hsm::SignerProvider;
use sqlx::PgPool;

use crate::error::CaError;
use crate::x509::ocsp::{self, SerialStatus};
use crate::x509::{build_crl, issuer_context, CrlEntry};

/// Service producing signed revocation artifacts for one CA at a time.
pub struct RevocationService {
    pool: PgPool,
    signer_provider: Arc<dyn SignerProvider>,
}

impl RevocationService {
    /// Create a new `RevocationService`.
    #[must_use]
    pub fn new(pool: PgPool, signer_provider: Arc<dyn SignerProvider>) -> Self {
        Self {
            pool,
            signer_provider,
        }
    }

    /// Build and sign the CRL for a CA, returning it PEM-encoded.
    ///
    /// The entry set is exactly the revoked serials issued by this CA:
    /// end-entity certificates and revoked child CAs alike. Each call
    /// consumes the next value of the CA's persisted CRL counter.
    pub async fn generate_crl(&self, ca_id: i32) -> Result<String, CaError> {
        let ca = CertificateAuthority::find_by_id(&self.pool, ca_id)
            .await?
            .ok_or(CaError::CaNotFound(ca_id))?;
        if !ca.is_usable() {
            return Err(CaError::CaNotActive(ca_id));
        }

        let revoked = RevokedCertificate::list_by_issuer(&self.pool, ca.id).await?;
        let entries: Vec<CrlEntry> = revoked
            .into_iter()
            .map(|record| CrlEntry {
                reason: record.reason_enum(),
                serial_hex: record.serial_number,
                revocation_time: record.revocation_date,
            })
            .collect();

        let crl_number = CertificateAuthority::next_crl_number(&self.pool, ca.id).await?;

        let signer = self.signer_provider.signer_for(&ca.signing_key_label())?;
        let ctx = issuer_context(&ca.cert_pem, signer)?;

        let now = Utc::now().trunc_subsecs(0);
        let (pem, _der) = build_crl(&ctx, &entries, crl_number, now)?;

        tracing::info!(ca_id, crl_number, entries = entries.len(), "Generated CRL");
        Ok(pem)
    }

    /// Answer a DER-encoded OCSP request on behalf of a CA.
    ///
    /// Every single-request in the query is answered. A serial that was
    /// never issued by this CA, or that has expired unrevoked, reports
    /// `Unknown`; a revoked serial carries its revocation time and reason.
    pub async fn handle_ocsp(
        &self,
        request_der: &[u8],
        ca_id: i32,
    ) -> Result<Vec<u8>, CaError> {
        let ca = CertificateAuthority::find_by_id(&self.pool, ca_id)
            .await?
            .ok_or(CaError::CaNotFound(ca_id))?;

        let request = ocsp::parse_request(request_der)?;
        let now = Utc::now().trunc_subsecs(0);

        let mut responses = Vec::with_capacity(request.tbs_request.request_list.len());
        for single in &request.tbs_request.request_list {
            let serial = ocsp::serial_hex(&single.req_cert);
            let status = self.resolve_status(ca.id, &serial).await?;
            responses.push(ocsp::single_response(single.req_cert.clone(), &status, now)?);
        }

        let signer = self.signer_provider.signer_for(&ca.signing_key_label())?;
        ocsp::build_response(&ca.cert_pem, signer.as_ref(), responses, now)
    }

    async fn resolve_status(&self, ca_id: i32, serial: &str) -> Result<SerialStatus, CaError> {
        let Some(certificate) = Certificate::find_by_serial(&self.pool, serial).await? else {
            return Ok(SerialStatus::Unknown);
        };
        if certificate.ca_id != ca_id {
            // Issued by some other CA: this responder knows nothing of it.
            return Ok(SerialStatus::Unknown);
        }

        if let Some(revocation) = RevokedCertificate::find_by_serial(&self.pool, serial).await? {
            return Ok(SerialStatus::Revoked {
                time: revocation.revocation_date,
                reason: revocation.reason_enum(),
            });
        }

        if certificate.is_expired_by_date() {
            return Ok(SerialStatus::Unknown);
        }

        Ok(SerialStatus::Good)
    }
}
