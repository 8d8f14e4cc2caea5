//! Address syntax checks run before any network I/O.

mod domain;
mod local;
mod types;

pub use types::{EmailAddress, FormatError};

use domain::check_domain;
use local::is_local_acceptable;

/// Splits and checks `email`. Any syntax problem is reported as a
/// [`FormatError`] listing every reason found.
pub fn parse_address(email: &str) -> Result<EmailAddress, FormatError> {
    let input = email.trim();
    let mut reasons = Vec::new();

    if input.is_empty() {
        return Err(FormatError::new(vec!["address is empty".to_string()]));
    }

    // RFC 5321: 254 max avec @
    if input.len() > 254 {
        reasons.push(format!("total length {} > 254", input.len()));
    }

    let parts: Vec<&str> = input.split('@').collect();
    if parts.len() != 2 {
        reasons.push("must contain exactly one '@'".to_string());
        return Err(FormatError::new(reasons));
    }
    let (local, domain) = (parts[0], parts[1]);

    if local.is_empty() || local.len() > 64 {
        reasons.push(format!(
            "local part length {} invalid (1..=64)",
            local.len()
        ));
    } else if !is_local_acceptable(local) {
        reasons.push("invalid local part".to_string());
    }

    let ascii_domain = check_domain(domain, &mut reasons);

    match ascii_domain {
        Some(ascii_domain) if reasons.is_empty() => Ok(EmailAddress {
            original: email.to_string(),
            local: local.to_string(),
            domain: domain.to_lowercase(),
            ascii_domain,
        }),
        _ => Err(FormatError::new(reasons)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_basic() {
        let addr = parse_address("alice@example.com").expect("valid");
        assert_eq!(addr.local, "alice");
        assert_eq!(addr.ascii_domain, "example.com");
        assert_eq!(addr.wire_form(), "alice@example.com");
    }

    #[test]
    fn rejects_missing_at() {
        let err = parse_address("alice.example.com").expect_err("no @");
        assert!(err.reasons.iter().any(|r| r.contains("exactly one '@'")));
    }

    #[test]
    fn rejects_two_at_signs() {
        assert!(parse_address("a@b@example.com").is_err());
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert!(parse_address("").is_err());
        assert!(parse_address("   ").is_err());
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(parse_address("@example.com").is_err());
        assert!(parse_address("alice@").is_err());
    }

    #[test]
    fn normalizes_unicode_domain() {
        let addr = parse_address("alice@Exämple.com").expect("valid");
        assert_eq!(addr.domain, "exämple.com");
        assert!(addr.ascii_domain.starts_with("xn--"));
    }
}
