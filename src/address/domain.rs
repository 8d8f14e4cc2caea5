/// Converts `domain` to its ASCII (IDNA) form and checks every label.
/// Problems are appended to `reasons`; the ASCII form is returned whenever
/// the conversion itself worked, so callers can still report it.
pub(crate) fn check_domain(domain: &str, reasons: &mut Vec<String>) -> Option<String> {
    let Ok(ascii) = idna::domain_to_ascii(domain) else {
        reasons.push(format!("domain '{domain}' is not IDNA-convertible"));
        return None;
    };
    if ascii.is_empty() {
        reasons.push("domain is empty".to_string());
        return None;
    }

    if ascii.len() > 253 {
        reasons.push(format!("domain length {} > 253", ascii.len()));
    }
    let labels: Vec<&str> = ascii.split('.').collect();
    if labels.len() < 2 {
        reasons.push("domain must contain at least one dot".to_string());
    }
    reasons.extend(labels.iter().filter_map(|label| label_problem(label)));
    if labels
        .last()
        .is_some_and(|tld| !tld.is_empty() && tld.chars().all(|c| c.is_ascii_digit()))
    {
        reasons.push("top-level label cannot be numeric".to_string());
    }

    Some(ascii)
}

fn label_problem(label: &str) -> Option<String> {
    if label.is_empty() {
        Some("empty domain label".to_string())
    } else if label.len() > 63 {
        Some(format!("domain label '{label}' is {} bytes (max 63)", label.len()))
    } else if label.starts_with('-') || label.ends_with('-') {
        Some(format!("domain label '{label}' starts or ends with '-'"))
    } else if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        Some(format!("domain label '{label}' has invalid characters"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problems(domain: &str) -> Vec<String> {
        let mut reasons = Vec::new();
        check_domain(domain, &mut reasons);
        reasons
    }

    #[test]
    fn plain_domain_passes() {
        let mut reasons = Vec::new();
        let ascii = check_domain("Example.COM", &mut reasons);
        assert!(reasons.is_empty(), "{reasons:?}");
        assert_eq!(ascii.as_deref(), Some("example.com"));
    }

    #[test]
    fn label_rules() {
        assert!(!problems(&format!("{}.com", "a".repeat(64))).is_empty());
        assert!(!problems("-mail.example.com").is_empty());
        assert!(!problems("mail_relay.example.com").is_empty());
        assert!(!problems("example..com").is_empty());
        assert!(!problems("localhost").is_empty());
        assert!(!problems("10.0.0.1").is_empty());
    }

    #[test]
    fn unicode_domain_converted_to_punycode() {
        let mut reasons = Vec::new();
        let ascii = check_domain("exämple.com", &mut reasons).expect("idna");
        assert!(reasons.is_empty(), "{reasons:?}");
        assert!(ascii.starts_with("xn--"));
    }
}
