use std::collections::BTreeSet;
use std::fmt;

/// A parsed SMTP reply. Multi-line replies keep one line of text per
/// `message` line.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_transient_failure(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// True when an EHLO reply advertises `cap` as a keyword.
    pub fn has_capability(&self, cap: &str) -> bool {
        self.message.lines().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(cap))
        })
    }
}

impl fmt::Display for SmtpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.message.replace('\n', " / "))
        }
    }
}

/// Classification vocabulary shared by the probe, the catch-all detector and
/// the scoring stage.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeResult {
    Valid,
    Invalid,
    Unknown,
    Disposable,
    Catchall,
    Risky,
}

impl ProbeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Unknown => "unknown",
            Self::Disposable => "disposable",
            Self::Catchall => "catchall",
            Self::Risky => "risky",
        }
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one SMTP conversation against one host.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub is_valid: bool,
    pub result: ProbeResult,
    pub flags: BTreeSet<String>,
    pub message: String,
    pub mx_host: Option<String>,
    pub transcript: Vec<String>,
}

impl ProbeOutcome {
    pub fn new(result: ProbeResult, is_valid: bool, message: impl Into<String>) -> Self {
        Self {
            is_valid,
            result,
            flags: BTreeSet::new(),
            message: message.into(),
            mx_host: None,
            transcript: Vec::new(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ProbeResult::Unknown, false, message)
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.add_flag(flag);
        self
    }

    pub fn add_flag(&mut self, flag: &str) {
        self.flags.insert(flag.to_string());
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }
}
