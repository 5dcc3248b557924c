//! Service configuration.
//!
//! Values come from the environment or the defaults below; configuration
//! files belong to the deployment layer, not this core.

/// Settings applied when building CA certificates.
#[derive(Debug, Clone)]
pub struct CaConfig {
    /// Organization (O=) for CA subject names.
    pub organization: String,

    /// Country (C=) for CA subject names.
    pub country: String,

    /// Validity of newly created root CAs, in days.
    pub root_validity_days: i64,

    /// CRL distribution point URL embedded in issued certificates.
    pub crl_url: Option<String>,

    /// OCSP responder URL embedded in issued certificates.
    pub ocsp_url: Option<String>,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            organization: "Example Org".to_string(),
            country: "VN".to_string(),
            root_validity_days: 3650,
            crl_url: None,
            ocsp_url: None,
        }
    }
}

impl CaConfig {
    /// Read the configuration from `SIGNET_CA_*` environment variables,
    /// falling back to the defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            organization: std::env::var("SIGNET_CA_ORG").unwrap_or(defaults.organization),
            country: std::env::var("SIGNET_CA_COUNTRY").unwrap_or(defaults.country),
            root_validity_days: std::env::var("SIGNET_CA_ROOT_VALIDITY_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.root_validity_days),
            crl_url: std::env::var("SIGNET_CA_CRL_URL").ok(),
            ocsp_url: std::env::var("SIGNET_CA_OCSP_URL").ok(),
        }
    }
}
