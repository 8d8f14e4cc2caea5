//! SMTP probe engine.
//!
//! [`SmtpProber::probe`] holds one conversation with a mail exchanger up to
//! `RCPT TO` and classifies the reply into a [`ProbeOutcome`]. Connections go
//! through the [`SmtpConnector`] seam; [`TcpConnector`] is the real one.

mod classify;
mod error;
mod options;
mod probe;
mod session;
mod transport;
mod types;

pub use error::SmtpError;
pub use options::ProbeOptions;
pub use probe::SmtpProber;
pub use transport::{SmtpChannel, SmtpConnector, TcpConnector};
pub use types::{ProbeOutcome, ProbeResult, SmtpResponse};

#[cfg(test)]
pub(crate) mod tests;
