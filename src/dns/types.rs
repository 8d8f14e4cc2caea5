use std::collections::BTreeSet;
use std::fmt;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MxRecord {
    pub priority: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(priority: u16, exchange: impl Into<String>) -> Self {
        Self {
            priority,
            exchange: exchange.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

/// Result of the basic A/AAAA existence check.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainPresence {
    pub exists: bool,
    pub has_a_record: bool,
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMethod {
    TxtRecords,
    MailSubdomain,
    DirectConnection,
}

impl FallbackMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TxtRecords => "txt_records",
            Self::MailSubdomain => "mail_subdomain",
            Self::DirectConnection => "direct_connection",
        }
    }
}

impl fmt::Display for FallbackMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`attempt_fallback_validation`](super::attempt_fallback_validation).
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackReport {
    pub can_receive_email: bool,
    pub fallback_method: Option<FallbackMethod>,
    pub confidence: u8,
    pub flags: BTreeSet<String>,
    pub message: String,
    /// Host worth probing over SMTP when the fallback succeeded.
    pub host: Option<String>,
}

impl FallbackReport {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            can_receive_email: false,
            fallback_method: None,
            confidence: 10,
            flags: BTreeSet::new(),
            message: message.into(),
            host: None,
        }
    }
}
