//! Certificate Authority lifecycle service.
//!
//! Creates root and subordinate CAs, reports their state (expiry is
//! time-driven and recorded lazily on read), walks chains, and drives the
//! `active → revoked | expired | deleted` state machine. Only `active` CAs
//! ever sign.

use std::sync::Arc;

use chrono::{Duration, SubsecRound, Utc};
use signet_db::models::certificate_authority::signing_key_label;
use signet_db::models::{
    CaStatus, CaType, CertificateAuthority, NewCertificateAuthority, RevokedCertificate,
};
use signet_hsm::SignerProvider;
use sqlx::PgPool;

use crate::config::CaConfig;
use crate::error::CaError;
use crate::services::certificate_service::parse_revocation_reason;
use crate::x509::{
    build_ca_certificate, issuer_context, sub_ca_validity, CaCertSpec, HsmKeyPair,
};

/// Chain walks stop here; a longer chain means the parent pointers form a
/// cycle or the tree was corrupted.
const MAX_CHAIN_DEPTH: usize = 10;

/// Service for managing certificate authorities.
pub struct CaService {
    pool: PgPool,
    signer_provider: Arc<dyn SignerProvider>,
    config: CaConfig,
}

impl CaService {
    /// Create a new `CaService`.
    #[must_use]
    pub fn new(pool: PgPool, signer_provider: Arc<dyn SignerProvider>, config: CaConfig) -> Self {
        Self {
            pool,
            signer_provider,
            config,
        }
    }

    /// Create a root or subordinate CA.
    ///
    /// The key pair is generated in the HSM under the label derived from
    /// the CA name; the certificate is self-signed for roots and signed by
    /// the parent for subs. Names are unique forever; deleted CAs keep
    /// theirs reserved.
    pub async fn create_ca(
        &self,
        name: &str,
        ca_type: &str,
        parent_ca_id: Option<i32>,
    ) -> Result<CertificateAuthority, CaError> {
        let ca_type = parse_ca_type(ca_type)?;
        if name.is_empty() {
            return Err(CaError::Validation("CA name must not be empty".to_string()));
        }
        if CertificateAuthority::find_by_name(&self.pool, name)
            .await?
            .is_some()
        {
            return Err(CaError::CaNameExists(name.to_string()));
        }

        match ca_type {
            CaType::Root => {
                if parent_ca_id.is_some() {
                    return Err(CaError::Validation(
                        "root CA cannot have a parent".to_string(),
                    ));
                }
                self.create_root(name).await
            }
            CaType::Sub => {
                let parent_id = parent_ca_id.ok_or(CaError::MissingParent)?;
                self.create_sub(name, parent_id).await
            }
        }
    }

    async fn create_root(&self, name: &str) -> Result<CertificateAuthority, CaError> {
        let label = signing_key_label(name);
        self.signer_provider.generate_key_pair(&label)?;
        let signer = self.signer_provider.signer_for(&label)?;
        let key_pair = HsmKeyPair::from_signer(signer)?;

        let now = Utc::now().trunc_subsecs(0);
        let not_after = now + Duration::days(self.config.root_validity_days);

        let built = build_ca_certificate(
            &CaCertSpec {
                common_name: name,
                organization: &self.config.organization,
                country: &self.config.country,
                not_before: now,
                not_after,
                crl_url: self.config.crl_url.as_deref(),
                ocsp_url: self.config.ocsp_url.as_deref(),
                path_len: None,
            },
            &key_pair,
            None,
        )?;

        let ca = CertificateAuthority::create_with_certificate(
            &self.pool,
            NewCertificateAuthority {
                name: name.to_string(),
                ca_type: CaType::Root,
                parent_ca_id: None,
                cert_pem: built.pem,
                serial_number: built.serial_hex,
                not_before: built.not_before,
                not_after: built.not_after,
            },
        )
        .await?;

        tracing::info!(ca_id = ca.id, name, "Created root CA");
        Ok(ca)
    }

    async fn create_sub(&self, name: &str, parent_id: i32) -> Result<CertificateAuthority, CaError> {
        let parent = self
            .load_with_expiry(parent_id)
            .await?
            .ok_or_else(|| CaError::ParentNotEligible("parent CA not found".to_string()))?;

        if !parent.is_active() {
            return Err(CaError::ParentNotEligible(format!(
                "parent CA is {}",
                parent.status
            )));
        }
        if parent.ca_type_enum() == Ok(CaType::Sub) {
            return Err(CaError::ParentNotEligible(
                "subordinate CAs cannot have children".to_string(),
            ));
        }

        let now = Utc::now().trunc_subsecs(0);
        let (not_before, not_after) = sub_ca_validity(now, parent.not_before, parent.not_after)?;

        let label = signing_key_label(name);
        self.signer_provider.generate_key_pair(&label)?;
        let sub_signer = self.signer_provider.signer_for(&label)?;
        let sub_key = HsmKeyPair::from_signer(sub_signer)?;

        let parent_signer = self
            .signer_provider
            .signer_for(&parent.signing_key_label())?;
        let parent_ctx = issuer_context(&parent.cert_pem, parent_signer)?;

        let built = build_ca_certificate(
            &CaCertSpec {
                common_name: name,
                organization: &self.config.organization,
                country: &self.config.country,
                not_before,
                not_after,
                crl_url: self.config.crl_url.as_deref(),
                ocsp_url: self.config.ocsp_url.as_deref(),
                path_len: Some(0),
            },
            &sub_key,
            Some(&parent_ctx),
        )?;

        let ca = CertificateAuthority::create_with_certificate(
            &self.pool,
            NewCertificateAuthority {
                name: name.to_string(),
                ca_type: CaType::Sub,
                parent_ca_id: Some(parent.id),
                cert_pem: built.pem,
                serial_number: built.serial_hex,
                not_before: built.not_before,
                not_after: built.not_after,
            },
        )
        .await?;

        tracing::info!(ca_id = ca.id, name, parent_id = parent.id, "Created subordinate CA");
        Ok(ca)
    }

    /// Get a CA by id, reporting time-driven expiry.
    pub async fn get_ca(&self, ca_id: i32) -> Result<CertificateAuthority, CaError> {
        self.load_with_expiry(ca_id)
            .await?
            .ok_or(CaError::CaNotFound(ca_id))
    }

    /// List all CAs (deleted tombstones excluded), newest first.
    pub async fn list_cas(&self) -> Result<Vec<CertificateAuthority>, CaError> {
        let mut cas = CertificateAuthority::list_all(&self.pool).await?;
        for ca in &mut cas {
            self.apply_expiry(ca).await?;
        }
        Ok(cas)
    }

    /// Walk parent pointers from a CA up to its root.
    ///
    /// Deleted ancestors stay visible here (and only here). The walk is
    /// bounded; exceeding the bound means corrupted parent pointers and is
    /// surfaced as a data-integrity failure.
    pub async fn get_ca_chain(&self, ca_id: i32) -> Result<Vec<CertificateAuthority>, CaError> {
        let mut chain = Vec::new();
        let mut current = Some(ca_id);

        while let Some(id) = current {
            if chain.len() >= MAX_CHAIN_DEPTH {
                tracing::error!(ca_id, "CA chain exceeds depth bound; parent pointers corrupt");
                return Err(CaError::ChainTooDeep(ca_id));
            }

            let ca = CertificateAuthority::find_by_id_any_status(&self.pool, id)
                .await?
                .ok_or_else(|| {
                    if chain.is_empty() {
                        CaError::CaNotFound(id)
                    } else {
                        tracing::error!(ca_id = id, "chain references a missing CA");
                        CaError::DataIntegrity(format!("chain references missing CA {id}"))
                    }
                })?;

            current = ca.parent_ca_id;
            chain.push(ca);
        }

        Ok(chain)
    }

    /// Apply a lifecycle transition requested by the operator.
    ///
    /// Only `active` CAs transition; `revoked`, `expired` and `deleted` are
    /// terminal.
    pub async fn update_ca_status(&self, ca_id: i32, status: CaStatus) -> Result<(), CaError> {
        let ca = self.get_ca(ca_id).await?;

        if status == CaStatus::Active {
            return Err(CaError::Validation(
                "a CA cannot transition back to active".to_string(),
            ));
        }
        if !ca.is_active() {
            return Err(CaError::Validation(format!(
                "CA is {}, which is terminal",
                ca.status
            )));
        }

        CertificateAuthority::update_status(&self.pool, ca_id, status).await?;
        tracing::info!(ca_id, status = %status, "Updated CA status");
        Ok(())
    }

    /// Revoke a CA.
    ///
    /// Writes the revocation record for the CA's own certificate (so the
    /// parent's next CRL carries it, flagged as a CA) and marks the CA
    /// revoked, atomically. Does not cascade to certificates the CA issued;
    /// chain validation invalidates them. Only `active` CAs can be revoked;
    /// `expired` and `deleted` are terminal.
    pub async fn revoke_ca(&self, ca_id: i32, reason: &str) -> Result<(), CaError> {
        let reason = parse_revocation_reason(reason)?;
        let ca = self.get_ca(ca_id).await?;

        if ca.status_enum() == Ok(CaStatus::Revoked) {
            return Err(CaError::AlreadyRevoked(ca.serial_number));
        }
        if !ca.is_active() {
            return Err(CaError::Validation(format!(
                "CA is {}, which is terminal",
                ca.status
            )));
        }

        let revoked =
            RevokedCertificate::revoke_ca(&self.pool, ca.id, &ca.serial_number, reason).await?;
        if revoked.is_none() {
            return Err(CaError::AlreadyRevoked(ca.serial_number));
        }

        tracing::info!(ca_id, reason = %reason, "Revoked CA");
        Ok(())
    }

    /// Soft-delete a CA. The row remains as a tombstone: the name stays
    /// reserved and chain traversal can still see it.
    pub async fn delete_ca(&self, ca_id: i32) -> Result<(), CaError> {
        self.update_ca_status(ca_id, CaStatus::Deleted).await
    }

    async fn load_with_expiry(
        &self,
        ca_id: i32,
    ) -> Result<Option<CertificateAuthority>, CaError> {
        let Some(mut ca) = CertificateAuthority::find_by_id(&self.pool, ca_id).await? else {
            return Ok(None);
        };
        self.apply_expiry(&mut ca).await?;
        Ok(Some(ca))
    }

    /// Expiry is time-driven and recorded when observed.
    async fn apply_expiry(&self, ca: &mut CertificateAuthority) -> Result<(), CaError> {
        if ca.is_active() && ca.is_expired_by_date() {
            CertificateAuthority::update_status(&self.pool, ca.id, CaStatus::Expired).await?;
            ca.status = CaStatus::Expired.to_string();
            tracing::info!(ca_id = ca.id, "CA certificate expired");
        }
        Ok(())
    }
}

/// Parse a CA kind from its wire form (`root` or `sub`).
pub fn parse_ca_type(value: &str) -> Result<CaType, CaError> {
    value
        .parse()
        .map_err(|_| CaError::InvalidCaType(value.to_string()))
}
