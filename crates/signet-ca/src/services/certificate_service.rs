//! End-entity certificate issuance and revocation.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use signet_db::models::{
    CaStatus, Certificate, CertificateAuthority, CertificateStatus, RevocationReason,
    RevokedCertificate,
};
use signet_hsm::SignerProvider;
use sqlx::PgPool;

use crate::error::CaError;
use crate::x509::{
    build_end_entity, end_entity_validity, issuer_context, issuer_distribution_urls,
    parse_and_verify_csr, EndEntityOptions,
};

/// Service for issuing and revoking end-entity certificates.
pub struct CertificateService {
    pool: PgPool,
    signer_provider: Arc<dyn SignerProvider>,
}

impl CertificateService {
    /// Create a new `CertificateService`.
    #[must_use]
    pub fn new(pool: PgPool, signer_provider: Arc<dyn SignerProvider>) -> Self {
        Self {
            pool,
            signer_provider,
        }
    }

    /// Issue a certificate from a PEM-encoded CSR.
    ///
    /// The CSR's self-signature is verified before anything else; subject
    /// and SAN are honored verbatim, validity is derived from the issuer
    /// and clamped inside its window. The HSM signs outside the database
    /// transaction; if persistence fails, the signed bytes are discarded
    /// and no one ever observes them.
    pub async fn issue_certificate(
        &self,
        csr_pem: &str,
        issuer_ca_id: i32,
    ) -> Result<Certificate, CaError> {
        let csr = parse_and_verify_csr(csr_pem)?;

        let issuer = CertificateAuthority::find_by_id(&self.pool, issuer_ca_id)
            .await?
            .ok_or(CaError::CaNotFound(issuer_ca_id))?;
        if issuer.is_active() && issuer.is_expired_by_date() {
            CertificateAuthority::update_status(&self.pool, issuer.id, CaStatus::Expired).await?;
            return Err(CaError::CaNotActive(issuer_ca_id));
        }
        if !issuer.is_active() {
            return Err(CaError::CaNotActive(issuer_ca_id));
        }

        let now = Utc::now().trunc_subsecs(0);
        let (not_before, not_after) =
            end_entity_validity(now, issuer.not_before, issuer.not_after)?;
        let (crl_url, ocsp_url) = issuer_distribution_urls(&issuer.cert_pem)?;

        let signer = self
            .signer_provider
            .signer_for(&issuer.signing_key_label())?;
        let ctx = issuer_context(&issuer.cert_pem, signer)?;

        let built = build_end_entity(
            csr,
            &EndEntityOptions {
                not_before,
                not_after,
                crl_url,
                ocsp_url,
            },
            &ctx,
        )?;

        let certificate = Certificate::create(
            &self.pool,
            &built.serial_hex,
            &built.subject_cn,
            built.not_before,
            built.not_after,
            &built.pem,
            issuer.id,
            false,
        )
        .await?;

        tracing::info!(
            serial = %certificate.serial_number,
            subject = %certificate.subject,
            ca_id = issuer.id,
            "Issued certificate"
        );
        Ok(certificate)
    }

    /// Get a certificate by serial number, recording time-driven expiry.
    pub async fn get_certificate(&self, serial_number: &str) -> Result<Certificate, CaError> {
        let mut certificate = Certificate::find_by_serial(&self.pool, serial_number)
            .await?
            .ok_or_else(|| CaError::CertificateNotFound(serial_number.to_string()))?;

        if certificate.status == "valid" && certificate.is_expired_by_date() {
            Certificate::update_status(
                &self.pool,
                &certificate.serial_number,
                CertificateStatus::Expired,
            )
            .await?;
            certificate.status = CertificateStatus::Expired.to_string();
        }

        Ok(certificate)
    }

    /// List all certificates.
    pub async fn list_certificates(&self) -> Result<Vec<Certificate>, CaError> {
        Ok(Certificate::list_all(&self.pool).await?)
    }

    /// List certificates issued by one CA.
    pub async fn list_certificates_by_ca(&self, ca_id: i32) -> Result<Vec<Certificate>, CaError> {
        Ok(Certificate::list_by_ca(&self.pool, ca_id).await?)
    }

    /// Revoke a certificate by serial number.
    ///
    /// The revocation record and the status flip are one atomic write; once
    /// this returns, every OCSP answer for the serial says revoked and the
    /// issuer's next CRL lists it. Revoking twice is a conflict: the first
    /// revocation's instant and reason stand.
    pub async fn revoke_certificate(
        &self,
        serial_number: &str,
        reason: &str,
    ) -> Result<RevokedCertificate, CaError> {
        let reason = parse_revocation_reason(reason)?;
        let certificate = Certificate::find_by_serial(&self.pool, serial_number)
            .await?
            .ok_or_else(|| CaError::CertificateNotFound(serial_number.to_string()))?;

        match RevokedCertificate::revoke_certificate(&self.pool, &certificate.serial_number, reason)
            .await?
        {
            Some(record) => {
                tracing::info!(serial = serial_number, reason = %reason, "Revoked certificate");
                Ok(record)
            }
            None => Err(CaError::AlreadyRevoked(serial_number.to_string())),
        }
    }
}

/// Parse a revocation reason from its wire form.
///
/// Supported reasons (RFC 5280 names, codes 0-6): `unspecified`,
/// `keyCompromise`, `caCompromise`, `affiliationChanged`, `superseded`,
/// `cessationOfOperation`, `certificateHold`.
pub fn parse_revocation_reason(reason: &str) -> Result<RevocationReason, CaError> {
    reason
        .parse()
        .map_err(|_| CaError::InvalidRevocationReason(reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_parse_revocation_reason() {
        assert_eq!(
            parse_revocation_reason("keyCompromise").unwrap(),
            RevocationReason::KeyCompromise
        );
        assert_eq!(
            parse_revocation_reason("certificateHold").unwrap(),
            RevocationReason::CertificateHold
        );
    }

    #[test]
    fn test_parse_revocation_reason_rejects_unknown() {
        let err = parse_revocation_reason("compromised").unwrap_err();
        assert!(matches!(err, CaError::InvalidRevocationReason(_)));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
}
