use std::sync::LazyLock;

use regex::Regex;

use super::{ProbeOutcome, ProbeResult, SmtpResponse};
use crate::flags;

static USER_UNKNOWN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)user\s+unknown|no\s+such\s+user|user\s+not\s+found")
        .expect("user-unknown pattern is valid")
});

static CATCH_ALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)catch|accept\s*all|wildcard|^250\b.*\bok\b.*\b(any|all)\b")
        .expect("catch-all pattern is valid")
});

static POLICY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)polic(y|ies)|spam|block|blacklist|denylist")
        .expect("policy pattern is valid")
});

/// Turns the `RCPT TO` reply into a probe outcome. Only `250` counts as
/// acceptance; catch-all wording forces `catchall` regardless of the code.
pub(crate) fn classify_rcpt(host: &str, reply: &SmtpResponse) -> ProbeOutcome {
    let text = reply.to_string();
    let mut outcome = match reply.code {
        250 => ProbeOutcome::new(
            ProbeResult::Valid,
            true,
            format!("{host} accepted the recipient ({text})"),
        ),
        550..=559 => {
            let mut outcome = ProbeOutcome::new(
                ProbeResult::Invalid,
                false,
                format!("{host} rejected the recipient ({text})"),
            );
            if USER_UNKNOWN.is_match(&text) {
                outcome.add_flag(flags::USER_UNKNOWN);
            }
            outcome
        }
        450..=459 => ProbeOutcome::unknown(format!("{host} reported a temporary failure ({text})"))
            .with_flag(flags::TEMPORARY_FAILURE),
        421 => ProbeOutcome::unknown(format!("{host} service unavailable ({text})"))
            .with_flag(flags::SERVICE_UNAVAILABLE),
        _ => ProbeOutcome::unknown(format!("{host} sent an unexpected reply ({text})"))
            .with_flag(flags::UNEXPECTED_RESPONSE),
    };

    if CATCH_ALL.is_match(&text) {
        outcome.result = ProbeResult::Catchall;
        outcome.is_valid = true;
        outcome.add_flag(flags::CATCHALL_DOMAIN);
        outcome.message = format!("{host} advertises catch-all acceptance ({text})");
    }
    note_policy(&mut outcome, reply);
    outcome.mx_host = Some(host.to_string());
    outcome
}

/// Adds `anti_spam_policy` when the reply text talks about policy or
/// blocking. The classification itself is left alone.
pub(crate) fn note_policy(outcome: &mut ProbeOutcome, reply: &SmtpResponse) {
    if POLICY.is_match(&reply.message) {
        outcome.add_flag(flags::ANTI_SPAM_POLICY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: u16, message: &str) -> ProbeOutcome {
        classify_rcpt("mx.example.com", &SmtpResponse::new(code, message))
    }

    #[test]
    fn accepted_is_valid() {
        let outcome = classify(250, "2.1.5 Ok");
        assert_eq!(outcome.result, ProbeResult::Valid);
        assert!(outcome.is_valid);
        assert!(outcome.flags.is_empty());
        assert_eq!(outcome.mx_host.as_deref(), Some("mx.example.com"));
    }

    #[test]
    fn permanent_rejection_flags_user_unknown() {
        let outcome = classify(550, "5.1.1 <bob@example.com>: Recipient address rejected: User unknown");
        assert_eq!(outcome.result, ProbeResult::Invalid);
        assert!(!outcome.is_valid);
        assert!(outcome.has_flag(flags::USER_UNKNOWN));

        let outcome = classify(553, "mailbox name not allowed");
        assert_eq!(outcome.result, ProbeResult::Invalid);
        assert!(!outcome.has_flag(flags::USER_UNKNOWN));
    }

    #[test]
    fn no_such_user_variants() {
        assert!(classify(550, "No such user here").has_flag(flags::USER_UNKNOWN));
        assert!(classify(551, "user not found").has_flag(flags::USER_UNKNOWN));
    }

    #[test]
    fn transient_codes_are_unknown() {
        let outcome = classify(451, "4.7.1 Greylisted, try later");
        assert_eq!(outcome.result, ProbeResult::Unknown);
        assert!(outcome.has_flag(flags::TEMPORARY_FAILURE));

        let outcome = classify(421, "4.3.2 Service shutting down");
        assert_eq!(outcome.result, ProbeResult::Unknown);
        assert!(outcome.has_flag(flags::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn other_codes_are_unexpected() {
        for code in [251, 252, 462, 500, 530] {
            let outcome = classify(code, "whatever");
            assert_eq!(outcome.result, ProbeResult::Unknown, "code {code}");
            assert!(outcome.has_flag(flags::UNEXPECTED_RESPONSE), "code {code}");
        }
    }

    #[test]
    fn catch_all_wording_overrides_result() {
        let outcome = classify(250, "OK - catch-all mailbox");
        assert_eq!(outcome.result, ProbeResult::Catchall);
        assert!(outcome.is_valid);
        assert!(outcome.has_flag(flags::CATCHALL_DOMAIN));

        let outcome = classify(250, "ok, will accept any recipient");
        assert_eq!(outcome.result, ProbeResult::Catchall);

        let outcome = classify(451, "wildcard routing pending");
        assert_eq!(outcome.result, ProbeResult::Catchall);
        assert!(outcome.is_valid);
    }

    #[test]
    fn policy_language_only_adds_flag() {
        let outcome = classify(550, "5.7.1 Message rejected due to local policy");
        assert_eq!(outcome.result, ProbeResult::Invalid);
        assert!(outcome.has_flag(flags::ANTI_SPAM_POLICY));

        let outcome = classify(450, "Client host blocked using Spamhaus");
        assert_eq!(outcome.result, ProbeResult::Unknown);
        assert!(outcome.has_flag(flags::ANTI_SPAM_POLICY));
        assert!(outcome.has_flag(flags::TEMPORARY_FAILURE));
    }
}
