//! Revocation records.
//!
//! A serial appears here iff the corresponding certificate row is in status
//! `revoked`; both writes happen inside one transaction so no observer can
//! ever see half a revocation. The insert uses `ON CONFLICT DO NOTHING`,
//! which also serialises concurrent revocations of the same serial: the
//! first writer's instant and reason persist, later writers see `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// RFC 5280 revocation reasons supported by this core (codes 0-6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
}

impl RevocationReason {
    /// RFC 5280 CRLReason numeric code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            RevocationReason::Unspecified => 0,
            RevocationReason::KeyCompromise => 1,
            RevocationReason::CaCompromise => 2,
            RevocationReason::AffiliationChanged => 3,
            RevocationReason::Superseded => 4,
            RevocationReason::CessationOfOperation => 5,
            RevocationReason::CertificateHold => 6,
        }
    }

    /// Convert a numeric CRLReason code back to the enum.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(RevocationReason::Unspecified),
            1 => Some(RevocationReason::KeyCompromise),
            2 => Some(RevocationReason::CaCompromise),
            3 => Some(RevocationReason::AffiliationChanged),
            4 => Some(RevocationReason::Superseded),
            5 => Some(RevocationReason::CessationOfOperation),
            6 => Some(RevocationReason::CertificateHold),
            _ => None,
        }
    }
}

impl std::fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RevocationReason::Unspecified => "unspecified",
            RevocationReason::KeyCompromise => "keyCompromise",
            RevocationReason::CaCompromise => "caCompromise",
            RevocationReason::AffiliationChanged => "affiliationChanged",
            RevocationReason::Superseded => "superseded",
            RevocationReason::CessationOfOperation => "cessationOfOperation",
            RevocationReason::CertificateHold => "certificateHold",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RevocationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspecified" | "" => Ok(RevocationReason::Unspecified),
            "keyCompromise" => Ok(RevocationReason::KeyCompromise),
            "caCompromise" => Ok(RevocationReason::CaCompromise),
            "affiliationChanged" => Ok(RevocationReason::AffiliationChanged),
            "superseded" => Ok(RevocationReason::Superseded),
            "cessationOfOperation" => Ok(RevocationReason::CessationOfOperation),
            "certificateHold" => Ok(RevocationReason::CertificateHold),
            _ => Err(format!("Invalid revocation reason: {s}")),
        }
    }
}

/// A revocation record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RevokedCertificate {
    /// Serial number of the revoked certificate.
    pub serial_number: String,

    /// When the certificate was revoked.
    pub revocation_date: DateTime<Utc>,

    /// Revocation reason (string form of [`RevocationReason`]).
    pub reason: String,

    /// Whether the revoked certificate belongs to a CA.
    pub is_ca: bool,
}

impl RevokedCertificate {
    /// The revocation reason as an enum, defaulting to `unspecified` for
    /// unparseable legacy rows.
    #[must_use]
    pub fn reason_enum(&self) -> RevocationReason {
        self.reason
            .parse()
            .unwrap_or(RevocationReason::Unspecified)
    }
}

impl RevokedCertificate {
    /// Revoke an end-entity certificate.
    ///
    /// Inserts the revocation record and flips the certificate status to
    /// `revoked` in one transaction. Returns `None` if the serial was
    /// already revoked; the stored record is left untouched.
    pub async fn revoke_certificate(
        pool: &sqlx::PgPool,
        serial_number: &str,
        reason: RevocationReason,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let inserted: Option<Self> = sqlx::query_as(
            r#"
            INSERT INTO revoked_certificates (serial_number, revocation_date, reason, is_ca)
            VALUES ($1, NOW(), $2, FALSE)
            ON CONFLICT (serial_number) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(serial_number)
        .bind(reason.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = inserted else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE certificates
            SET status = 'revoked'
            WHERE serial_number = $1
            "#,
        )
        .bind(serial_number)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    /// Revoke a CA.
    ///
    /// Inserts the revocation record for the CA's own certificate (flagged
    /// `is_ca` so the parent's CRL can carry it), flips the certificate row,
    /// and marks the CA row `revoked`, all in one transaction. Returns
    /// `None` if the CA's serial was already revoked.
    pub async fn revoke_ca(
        pool: &sqlx::PgPool,
        ca_id: i32,
        serial_number: &str,
        reason: RevocationReason,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let inserted: Option<Self> = sqlx::query_as(
            r#"
            INSERT INTO revoked_certificates (serial_number, revocation_date, reason, is_ca)
            VALUES ($1, NOW(), $2, TRUE)
            ON CONFLICT (serial_number) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(serial_number)
        .bind(reason.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = inserted else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE certificates
            SET status = 'revoked'
            WHERE serial_number = $1
            "#,
        )
        .bind(serial_number)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE certificate_authorities
            SET status = 'revoked'
            WHERE id = $1
            "#,
        )
        .bind(ca_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    /// Find a revocation record by serial number.
    pub async fn find_by_serial(
        pool: &sqlx::PgPool,
        serial_number: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM revoked_certificates
            WHERE serial_number = $1
            "#,
        )
        .bind(serial_number)
        .fetch_optional(pool)
        .await
    }

    /// List revocation records for certificates issued by one CA.
    ///
    /// Each CA publishes its own CRL, so the set is scoped through the
    /// certificates table's issuer column.
    pub async fn list_by_issuer(
        pool: &sqlx::PgPool,
        ca_id: i32,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT r.* FROM revoked_certificates r
            JOIN certificates c ON c.serial_number = r.serial_number
            WHERE c.ca_id = $1
            "#,
        )
        .bind(ca_id)
        .fetch_all(pool)
        .await
    }
}
