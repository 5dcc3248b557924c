//! Signet Database: `PostgreSQL` persistence for the certificate authority.
//!
//! This crate provides:
//! - Connection pool management ([`DbPool`], [`DbPoolOptions`])
//! - Embedded schema migrations ([`run_migrations`])
//! - Row models with query methods for CAs, certificates, and revocations
//! - Error types ([`DbError`])
//!
//! The one guarantee everything else leans on lives in
//! [`models::revoked_certificate`]: a revocation record and the certificate
//! status flip are written in a single transaction, so a serial is either
//! fully revoked or not revoked at all.

mod error;
mod migrations;
pub mod models;
mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::{DbPool, DbPoolOptions};
