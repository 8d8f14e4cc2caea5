use thiserror::Error;

/// A syntactically valid address, split and with its domain in ASCII form.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    pub original: String,
    pub local: String,
    pub domain: String,
    pub ascii_domain: String,
}

impl EmailAddress {
    /// `local@ascii_domain`, the form used on the wire.
    pub fn wire_form(&self) -> String {
        format!("{}@{}", self.local, self.ascii_domain)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid email format: {}", reasons.join("; "))]
pub struct FormatError {
    pub reasons: Vec<String>,
}

impl FormatError {
    pub(crate) fn new(reasons: Vec<String>) -> Self {
        Self { reasons }
    }
}
