use std::io;

use thiserror::Error;

use crate::smtp::SmtpError;

/// Failures building an [`EmailValidator`](super::EmailValidator). Validation
/// itself never fails: network problems end up in the verdict.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("system DNS configuration unavailable: {source}")]
    ResolverInit {
        #[source]
        source: io::Error,
    },
    #[error("SMTP transport unavailable: {0}")]
    Transport(#[source] SmtpError),
}
