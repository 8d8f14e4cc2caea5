use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmtpError {
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: io::Error,
    },
    #[error("TLS initialization failed: {source}")]
    Tls {
        #[source]
        source: native_tls::Error,
    },
    #[error("TLS handshake with {host} failed: {reason}")]
    Handshake { host: String, reason: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl SmtpError {
    pub(crate) fn connect(host: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            host: host.into(),
            source,
        }
    }

    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io { source }
    }

    pub(crate) fn handshake(host: impl Into<String>, reason: impl ToString) -> Self {
        Self::Handshake {
            host: host.into(),
            reason: reason.to_string(),
        }
    }

    /// Read/write/connect deadline exceeded. Blocking sockets report an
    /// expired read timeout as `WouldBlock` on Unix and `TimedOut` elsewhere.
    pub fn is_timeout(&self) -> bool {
        let source = match self {
            Self::Connect { source, .. } | Self::Io { source } => source,
            _ => return false,
        };
        matches!(
            source.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        )
    }
}
