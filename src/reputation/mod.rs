//! Domain reputation lookups.
//!
//! The engine consults a [`ReputationClassifier`] for every validated domain.
//! [`StaticReputation`] is the built-in classifier, backed by compile-time
//! tables; callers with better data inject their own implementation.

mod types;

use phf::phf_set;
use tracing::trace;

pub use types::{BounceRisk, ReputationInfo};

/// Risk factor names understood by the scoring stage.
pub mod factors {
    pub const HIGH_BOUNCE_PROVIDER: &str = "high_bounce_provider";
    pub const DISPOSABLE_DOMAIN: &str = "disposable_domain";
    pub const MX_LOOKUP_FAILED: &str = "mx_lookup_failed";
    pub const DOMAIN_NOT_FOUND: &str = "domain_not_found";
    pub const NO_MX_RECORDS: &str = "no_mx_records";
    pub const DNS_ISSUES: &str = "dns_issues";
    pub const SIMPLE_MX_SETUP: &str = "simple_mx_setup";
}

pub trait ReputationClassifier: Send + Sync {
    fn classify(&self, domain: &str) -> ReputationInfo;

    /// Throwaway-inbox providers. Checked before any network I/O.
    fn is_disposable(&self, _domain: &str) -> bool {
        false
    }
}

const DISPOSABLE_DOMAINS: phf::Set<&'static str> = phf_set! {
    "10minutemail.com",
    "burnermail.io",
    "discard.email",
    "dispostable.com",
    "emailondeck.com",
    "fakeinbox.com",
    "getnada.com",
    "grr.la",
    "guerrillamail.com",
    "guerrillamail.net",
    "guerrillamail.org",
    "maildrop.cc",
    "mailinator.com",
    "mailnesia.com",
    "mintemail.com",
    "mohmal.com",
    "sharklasers.com",
    "spamgourmet.com",
    "temp-mail.org",
    "tempmail.net",
    "tempr.email",
    "throwawaymail.com",
    "trashmail.com",
    "yopmail.com",
    "yopmail.fr",
};

// Providers that accept RCPT TO for unknown mailboxes and bounce later.
const HIGH_BOUNCE_PROVIDERS: phf::Set<&'static str> = phf_set! {
    "aol.com",
    "yahoo.com",
    "yahoo.fr",
    "yahoo.co.uk",
    "ymail.com",
    "rocketmail.com",
    "verizon.net",
    "att.net",
};

const ESTABLISHED_PROVIDERS: phf::Set<&'static str> = phf_set! {
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "msn.com",
    "icloud.com",
    "me.com",
    "protonmail.com",
    "proton.me",
    "gmx.com",
    "gmx.de",
    "orange.fr",
    "free.fr",
    "laposte.net",
};

/// Table-driven classifier. Subdomains inherit the entry of their closest
/// listed parent (`mx.mailinator.com` is disposable).
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticReputation;

impl StaticReputation {
    pub fn new() -> Self {
        Self
    }
}

impl ReputationClassifier for StaticReputation {
    fn classify(&self, domain: &str) -> ReputationInfo {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        let info = if listed_in(&DISPOSABLE_DOMAINS, &domain) {
            ReputationInfo::new(BounceRisk::High).with_factor(factors::DISPOSABLE_DOMAIN)
        } else if listed_in(&HIGH_BOUNCE_PROVIDERS, &domain) {
            ReputationInfo::new(BounceRisk::Medium).with_factor(factors::HIGH_BOUNCE_PROVIDER)
        } else if listed_in(&ESTABLISHED_PROVIDERS, &domain) {
            ReputationInfo::new(BounceRisk::Low)
        } else {
            ReputationInfo::new(BounceRisk::Medium)
        };
        trace!(domain = %domain, bounce_risk = %info.bounce_risk, "reputation classified");
        info
    }

    fn is_disposable(&self, domain: &str) -> bool {
        listed_in(
            &DISPOSABLE_DOMAINS,
            &domain.trim_end_matches('.').to_ascii_lowercase(),
        )
    }
}

fn listed_in(set: &phf::Set<&'static str>, domain: &str) -> bool {
    let mut candidate = domain;
    loop {
        if set.contains(candidate) {
            return true;
        }
        match candidate.split_once('.') {
            Some((_, parent)) if parent.contains('.') => candidate = parent,
            _ => return false,
        }
    }
}
