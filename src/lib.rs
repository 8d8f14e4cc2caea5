#![forbid(unsafe_code)]
//! mailprobe_lib: vérification de délivrabilité e-mail sans envoi.
//!
//! Pipeline: syntax check, MX resolution (with a graduated fallback when MX
//! is missing), a single-recipient SMTP probe that stops before `DATA`,
//! catch-all detection, then a confidence score folding in domain
//! reputation. See [`EmailValidator`].

pub mod address;
pub mod cancel;
pub mod catchall;
pub mod dns;
pub mod engine;
pub mod flags;
pub mod reputation;
pub mod scoring;
pub mod smtp;

pub use address::{EmailAddress, FormatError, parse_address};
pub use cancel::CancellationToken;
pub use catchall::{CatchAllReport, detect_catchall};
pub use dns::{DnsError, DnsLookup, DnsOptions, MxRecord, SystemDns};
pub use engine::{
    EmailValidator, ValidationVerdict, ValidatorError, ValidatorOptions, validate_email,
};
pub use reputation::{BounceRisk, ReputationClassifier, ReputationInfo, StaticReputation};
pub use scoring::{ConfidenceAnalysis, ConfidenceLevel, analyze_confidence};
pub use smtp::{
    ProbeOptions, ProbeOutcome, ProbeResult, SmtpConnector, SmtpError, SmtpProber,
    SmtpResponse, TcpConnector,
};
