//! Evidence tags attached to probe outcomes and verdicts.
//!
//! Flags are append-only: every stage may add to the set, none removes from
//! it. The scoring stage reads them back by these exact names.

pub const INVALID_FORMAT: &str = "invalid_format";
pub const DISPOSABLE_EMAIL: &str = "disposable_email";

pub const USER_UNKNOWN: &str = "user_unknown";
pub const CATCHALL_DOMAIN: &str = "catchall_domain";
pub const TEMPORARY_FAILURE: &str = "temporary_failure";
pub const SERVICE_UNAVAILABLE: &str = "service_unavailable";
pub const UNEXPECTED_RESPONSE: &str = "unexpected_response";
pub const ANTI_SPAM_POLICY: &str = "anti_spam_policy";

pub const CONNECTION_FAILED: &str = "connection_failed";
pub const SMTP_TIMEOUT: &str = "smtp_timeout";
pub const SMTP_IO_ERROR: &str = "smtp_io_error";
pub const PROTOCOL_ERROR: &str = "protocol_error";
pub const UNEXPECTED_GREETING: &str = "unexpected_greeting";
pub const EHLO_REJECTED: &str = "ehlo_rejected";
pub const SENDER_REJECTED: &str = "sender_rejected";
pub const STARTTLS_FAILED: &str = "starttls_failed";
pub const CANCELLED: &str = "cancelled";

pub const DOMAIN_NOT_FOUND: &str = "domain_not_found";
pub const NO_MX_RECORD: &str = "no_mx_record";
pub const DNS_FAILURE: &str = "dns_failure";
pub const MX_FALLBACK: &str = "mx_fallback";

pub const AGGRESSIVE_OVERRIDE: &str = "aggressive_override";

/// Flag recorded when the graduated fallback succeeded with `method`.
pub fn fallback_method(method: &str) -> String {
    format!("fallback_{method}")
}
