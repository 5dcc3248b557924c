//! Certificate Authority model.
//!
//! Represents one issuing authority in the depth-2 hierarchy: a self-signed
//! root or a subordinate signed by a root. The signing key itself lives in
//! the HSM; rows only carry the public certificate and the metadata needed
//! to enforce lifecycle and validity invariants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of certificate authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaType {
    /// Self-signed root CA.
    Root,
    /// Subordinate CA signed by a root, pathLenConstraint = 0.
    Sub,
}

impl std::fmt::Display for CaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaType::Root => write!(f, "root"),
            CaType::Sub => write!(f, "sub"),
        }
    }
}

impl std::str::FromStr for CaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "root" => Ok(CaType::Root),
            "sub" => Ok(CaType::Sub),
            _ => Err(format!("Invalid CA type: {s}")),
        }
    }
}

/// Lifecycle state of a certificate authority.
///
/// `active` is the only state that may sign. `revoked`, `expired` and
/// `deleted` are terminal; `deleted` rows are tombstones that keep the name
/// reserved and stay reachable through chain traversal only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaStatus {
    Active,
    Revoked,
    Expired,
    Deleted,
}

impl std::fmt::Display for CaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaStatus::Active => write!(f, "active"),
            CaStatus::Revoked => write!(f, "revoked"),
            CaStatus::Expired => write!(f, "expired"),
            CaStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for CaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(CaStatus::Active),
            "revoked" => Ok(CaStatus::Revoked),
            "expired" => Ok(CaStatus::Expired),
            "deleted" => Ok(CaStatus::Deleted),
            _ => Err(format!("Invalid CA status: {s}")),
        }
    }
}

/// A certificate authority row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CertificateAuthority {
    /// Unique identifier.
    pub id: i32,

    /// Human-readable CA name, unique across all rows (deleted included).
    pub name: String,

    /// CA type (`root` or `sub`).
    pub ca_type: String,

    /// Parent CA id; `None` iff this is a root.
    pub parent_ca_id: Option<i32>,

    /// The CA's own certificate in PEM format.
    pub cert_pem: String,

    /// Serial number of the CA's certificate (hex-encoded).
    pub serial_number: String,

    /// Certificate not valid before.
    pub not_before: DateTime<Utc>,

    /// Certificate not valid after.
    pub not_after: DateTime<Utc>,

    /// Lifecycle status (`active`, `revoked`, `expired`, `deleted`).
    pub status: String,

    /// Last CRL number issued by this CA.
    pub crl_number: i64,

    /// When the CA was created.
    pub created_at: DateTime<Utc>,
}

/// Fields required to persist a freshly signed CA.
#[derive(Debug, Clone)]
pub struct NewCertificateAuthority {
    pub name: String,
    pub ca_type: CaType,
    pub parent_ca_id: Option<i32>,
    pub cert_pem: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateAuthority {
    /// Returns the CA type as an enum.
    pub fn ca_type_enum(&self) -> Result<CaType, String> {
        self.ca_type.parse()
    }

    /// Returns the lifecycle status as an enum.
    pub fn status_enum(&self) -> Result<CaStatus, String> {
        self.status.parse()
    }

    /// Check if the CA is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Check if the CA certificate has expired (by date).
    #[must_use]
    pub fn is_expired_by_date(&self) -> bool {
        self.not_after < Utc::now()
    }

    /// Check if the CA may sign right now (active and within validity).
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.is_active() && !self.is_expired_by_date() && self.not_before <= Utc::now()
    }

    /// The HSM label of this CA's signing key, derived from the name.
    #[must_use]
    pub fn signing_key_label(&self) -> String {
        signing_key_label(&self.name)
    }
}

/// HSM key label for a CA name.
#[must_use]
pub fn signing_key_label(ca_name: &str) -> String {
    format!("{ca_name}-Key")
}

impl CertificateAuthority {
    /// Persist a new CA as `active`.
    pub async fn create(
        pool: &sqlx::PgPool,
        input: NewCertificateAuthority,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO certificate_authorities (
                name, ca_type, parent_ca_id, cert_pem, serial_number,
                not_before, not_after, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(input.ca_type.to_string())
        .bind(input.parent_ca_id)
        .bind(&input.cert_pem)
        .bind(&input.serial_number)
        .bind(input.not_before)
        .bind(input.not_after)
        .fetch_one(pool)
        .await
    }

    /// Persist a new CA together with its own certificate row.
    ///
    /// The certificate row is filed under the issuing CA: the parent for
    /// subs, the new CA itself for roots. Both inserts share one
    /// transaction, so a CA never exists without its certificate record.
    pub async fn create_with_certificate(
        pool: &sqlx::PgPool,
        input: NewCertificateAuthority,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let ca: Self = sqlx::query_as(
            r#"
            INSERT INTO certificate_authorities (
                name, ca_type, parent_ca_id, cert_pem, serial_number,
                not_before, not_after, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(input.ca_type.to_string())
        .bind(input.parent_ca_id)
        .bind(&input.cert_pem)
        .bind(&input.serial_number)
        .bind(input.not_before)
        .bind(input.not_after)
        .fetch_one(&mut *tx)
        .await?;

        let issuer_ca_id = input.parent_ca_id.unwrap_or(ca.id);
        sqlx::query(
            r#"
            INSERT INTO certificates (
                serial_number, subject, not_before, not_after, cert_pem,
                ca_id, status, is_ca
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'valid', TRUE)
            "#,
        )
        .bind(&input.serial_number)
        .bind(&input.name)
        .bind(input.not_before)
        .bind(input.not_after)
        .bind(&input.cert_pem)
        .bind(issuer_ca_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ca)
    }

    /// Find a CA by id, excluding deleted tombstones.
    pub async fn find_by_id(pool: &sqlx::PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM certificate_authorities
            WHERE id = $1 AND status != 'deleted'
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Find a CA by id regardless of status.
    ///
    /// Chain traversal must see deleted ancestors; every other lookup goes
    /// through [`find_by_id`](Self::find_by_id).
    pub async fn find_by_id_any_status(
        pool: &sqlx::PgPool,
        id: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM certificate_authorities
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Find a CA by name, any status.
    ///
    /// Deleted rows keep their name reserved, so duplicate checks must see
    /// them.
    pub async fn find_by_name(
        pool: &sqlx::PgPool,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM certificate_authorities
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await
    }

    /// Find the CA that issued the certificate with the given serial.
    pub async fn find_by_issued_serial(
        pool: &sqlx::PgPool,
        serial_number: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT ca.* FROM certificate_authorities ca
            JOIN certificates c ON c.ca_id = ca.id
            WHERE c.serial_number = $1 AND ca.status != 'deleted'
            "#,
        )
        .bind(serial_number)
        .fetch_optional(pool)
        .await
    }

    /// List all non-deleted CAs, newest first.
    pub async fn list_all(pool: &sqlx::PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM certificate_authorities
            WHERE status != 'deleted'
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// List the direct children of a CA, excluding deleted tombstones.
    pub async fn list_children(
        pool: &sqlx::PgPool,
        parent_ca_id: i32,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM certificate_authorities
            WHERE parent_ca_id = $1 AND status != 'deleted'
            ORDER BY created_at DESC
            "#,
        )
        .bind(parent_ca_id)
        .fetch_all(pool)
        .await
    }

    /// Update a CA's lifecycle status. Returns `false` if no row matched.
    pub async fn update_status(
        pool: &sqlx::PgPool,
        id: i32,
        status: CaStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE certificate_authorities
            SET status = $1
            WHERE id = $2
            "#,
        )
        .bind(status.to_string())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically increment and return this CA's CRL number.
    pub async fn next_crl_number(pool: &sqlx::PgPool, id: i32) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            UPDATE certificate_authorities
            SET crl_number = crl_number + 1
            WHERE id = $1
            RETURNING crl_number
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await
    }
}
