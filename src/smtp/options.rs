use std::borrow::Cow;
use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// Controls how [`SmtpProber`](super::SmtpProber) talks to a mail exchanger.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    pub port: u16,
    pub helo_domain: Option<String>,
    pub envelope_sender: Option<String>,
    pub connect_timeout: Duration,
    pub greeting_timeout: Duration,
    pub command_timeout: Duration,
    pub tls_timeout: Duration,
    /// Opportunistic STARTTLS when the server advertises it.
    pub starttls: bool,
    pub verify_tls_certs: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            port: 25,
            helo_domain: None,
            envelope_sender: None,
            connect_timeout: Duration::from_secs(6),
            greeting_timeout: Duration::from_secs(6),
            command_timeout: Duration::from_secs(5),
            tls_timeout: Duration::from_secs(5),
            starttls: true,
            verify_tls_certs: false,
        }
    }
}

impl ProbeOptions {
    /// Returns the hostname used in the `EHLO` command. Defaults to
    /// `localhost` when none is provided.
    pub fn helo_domain(&self) -> Cow<'_, str> {
        self.helo_domain
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(Cow::Borrowed)
            .unwrap_or(Cow::Borrowed("localhost"))
    }

    /// Returns the envelope sender used in the `MAIL FROM` command. When unspecified
    /// a `postmaster@domain` placeholder is synthesised.
    pub fn envelope_sender(&self, ascii_domain: &str) -> String {
        self.envelope_sender
            .as_ref()
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("postmaster@{ascii_domain}"))
    }
}
