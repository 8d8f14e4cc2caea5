use thiserror::Error;

/// Classified DNS failure. The kind is kept (not just a boolean) because the
/// scoring stage treats a nonexistent domain very differently from a resolver
/// hiccup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("domain does not exist")]
    DomainNotFound,
    #[error("domain has no MX records")]
    NoMxRecords,
    /// RFC 7505: the only MX record is `.`, the domain accepts no mail.
    #[error("domain publishes a null MX")]
    NullMx,
    #[error("DNS query timed out")]
    Timeout,
    #[error("DNS server failure: {reason}")]
    ServerFailure { reason: String },
    #[error("DNS error: {reason}")]
    Other { reason: String },
}

impl DnsError {
    pub(crate) fn server_failure(reason: impl Into<String>) -> Self {
        Self::ServerFailure {
            reason: reason.into(),
        }
    }

    pub(crate) fn other(reason: impl Into<String>) -> Self {
        Self::Other {
            reason: reason.into(),
        }
    }

    /// Stable upper-case identifier for the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DomainNotFound => "DOMAIN_NOT_FOUND",
            Self::NoMxRecords | Self::NullMx => "NO_MX_RECORDS",
            Self::Timeout => "DNS_TIMEOUT",
            Self::ServerFailure { .. } => "DNS_SERVER_FAILURE",
            Self::Other { .. } => "DNS_ERROR",
        }
    }

    /// Transient failures say nothing about the domain itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::ServerFailure { .. })
    }
}
