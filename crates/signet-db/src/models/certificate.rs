//! Issued certificate model.
//!
//! Every certificate signed by a CA gets a row here, including the CA
//! certificates themselves (flagged `is_ca`, issuer = parent for subs, self
//! for roots). That keeps the revocation table's foreign key satisfied for
//! CA revocations and lets one query assemble a CRL covering both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Certificate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    /// Certificate is valid.
    Valid,
    /// Certificate has been revoked.
    Revoked,
    /// Certificate has expired.
    Expired,
    /// Status cannot be determined.
    Unknown,
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificateStatus::Valid => write!(f, "valid"),
            CertificateStatus::Revoked => write!(f, "revoked"),
            CertificateStatus::Expired => write!(f, "expired"),
            CertificateStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for CertificateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "valid" => Ok(CertificateStatus::Valid),
            "revoked" => Ok(CertificateStatus::Revoked),
            "expired" => Ok(CertificateStatus::Expired),
            "unknown" => Ok(CertificateStatus::Unknown),
            _ => Err(format!("Invalid certificate status: {s}")),
        }
    }
}

/// An issued X.509 certificate.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Certificate {
    /// Serial number (hex-encoded 128-bit value, primary key).
    pub serial_number: String,

    /// Subject common name.
    pub subject: String,

    /// Certificate not valid before.
    pub not_before: DateTime<Utc>,

    /// Certificate not valid after.
    pub not_after: DateTime<Utc>,

    /// Certificate in PEM format.
    pub cert_pem: String,

    /// The CA that issued this certificate.
    pub ca_id: i32,

    /// Stored status (`valid`, `revoked`, `expired`, `unknown`).
    pub status: String,

    /// Whether this row is a CA certificate.
    pub is_ca: bool,

    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

impl Certificate {
    /// Returns the stored status as an enum.
    pub fn status_enum(&self) -> Result<CertificateStatus, String> {
        self.status.parse()
    }

    /// Check if the certificate is revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.status == "revoked"
    }

    /// Check if the certificate has expired (by date).
    #[must_use]
    pub fn is_expired_by_date(&self) -> bool {
        self.not_after < Utc::now()
    }

    /// The status as observed right now: expiry is time-driven and reported
    /// on read, revocation always wins.
    #[must_use]
    pub fn effective_status(&self) -> CertificateStatus {
        match self.status_enum() {
            Ok(CertificateStatus::Valid) if self.is_expired_by_date() => {
                CertificateStatus::Expired
            }
            Ok(status) => status,
            Err(_) => CertificateStatus::Unknown,
        }
    }
}

impl Certificate {
    /// Persist a newly issued certificate as `valid`.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &sqlx::PgPool,
        serial_number: &str,
        subject: &str,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        cert_pem: &str,
        ca_id: i32,
        is_ca: bool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO certificates (
                serial_number, subject, not_before, not_after, cert_pem,
                ca_id, status, is_ca
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'valid', $7)
            RETURNING *
            "#,
        )
        .bind(serial_number)
        .bind(subject)
        .bind(not_before)
        .bind(not_after)
        .bind(cert_pem)
        .bind(ca_id)
        .bind(is_ca)
        .fetch_one(pool)
        .await
    }

    /// Find a certificate by serial number.
    pub async fn find_by_serial(
        pool: &sqlx::PgPool,
        serial_number: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM certificates
            WHERE serial_number = $1
            "#,
        )
        .bind(serial_number)
        .fetch_optional(pool)
        .await
    }

    /// List certificates issued by a CA.
    pub async fn list_by_ca(pool: &sqlx::PgPool, ca_id: i32) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM certificates
            WHERE ca_id = $1
            "#,
        )
        .bind(ca_id)
        .fetch_all(pool)
        .await
    }

    /// List all certificates.
    pub async fn list_all(pool: &sqlx::PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM certificates").fetch_all(pool).await
    }

    /// Update a certificate's stored status. Returns `false` if no row
    /// matched.
    pub async fn update_status(
        pool: &sqlx::PgPool,
        serial_number: &str,
        status: CertificateStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE certificates
            SET status = $1
            WHERE serial_number = $2
            "#,
        )
        .bind(status.to_string())
        .bind(serial_number)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_cert(status: &str, not_after: DateTime<Utc>) -> Certificate {
        Certificate {
            serial_number: "00FF".to_string(),
            subject: "svc.example".to_string(),
            not_before: Utc::now() - Duration::days(1),
            not_after,
            cert_pem: "-----BEGIN CERTIFICATE-----\n...\n-----END CERTIFICATE-----".to_string(),
            ca_id: 1,
            status: status.to_string(),
            is_ca: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            CertificateStatus::Valid,
            CertificateStatus::Revoked,
            CertificateStatus::Expired,
            CertificateStatus::Unknown,
        ] {
            assert_eq!(
                status.to_string().parse::<CertificateStatus>().unwrap(),
                status
            );
        }
    }

    #[test]
    fn test_effective_status_reports_expiry_on_read() {
        let live = sample_cert("valid", Utc::now() + Duration::days(30));
        assert_eq!(live.effective_status(), CertificateStatus::Valid);

        let expired = sample_cert("valid", Utc::now() - Duration::hours(1));
        assert_eq!(expired.effective_status(), CertificateStatus::Expired);
    }

    #[test]
    fn test_effective_status_revocation_wins_over_expiry() {
        let cert = sample_cert("revoked", Utc::now() - Duration::hours(1));
        assert_eq!(cert.effective_status(), CertificateStatus::Revoked);
        assert!(cert.is_revoked());
    }
}
