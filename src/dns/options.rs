use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// Timeouts and probe targets used by the domain resolver.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsOptions {
    pub mx_timeout: Duration,
    pub address_timeout: Duration,
    pub txt_timeout: Duration,
    pub subdomain_timeout: Duration,
    pub port_probe_timeout: Duration,
    pub fallback_subdomains: Vec<String>,
}

impl Default for DnsOptions {
    fn default() -> Self {
        Self {
            mx_timeout: Duration::from_secs(5),
            address_timeout: Duration::from_secs(5),
            txt_timeout: Duration::from_secs(2),
            subdomain_timeout: Duration::from_millis(1_500),
            port_probe_timeout: Duration::from_millis(1_500),
            fallback_subdomains: ["mail", "smtp", "mx"].map(String::from).to_vec(),
        }
    }
}
