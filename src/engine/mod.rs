//! Validation pipeline.
//!
//! `parse -> disposable check -> MX (or fallback) -> SMTP probe -> catch-all
//! -> reputation -> scoring`. Every stage degrades to an `unknown` outcome
//! with flags; only malformed input is classified `invalid` without network
//! I/O.

mod error;
mod options;
mod types;

pub use error::ValidatorError;
pub use options::ValidatorOptions;
pub use types::ValidationVerdict;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::address::{EmailAddress, parse_address};
use crate::cancel::CancellationToken;
use crate::catchall::{CatchAllReport, SYNTHETIC_PROBES, detect_catchall};
use crate::dns::{
    DnsError, DnsLookup, DnsOptions, FallbackReport, SystemDns, attempt_fallback_validation,
    domain_exists, resolve_mx,
};
use crate::flags;
use crate::reputation::{
    BounceRisk, ReputationClassifier, ReputationInfo, StaticReputation, factors,
};
use crate::scoring::analyze_confidence;
use crate::smtp::{ProbeOutcome, ProbeResult, SmtpConnector, SmtpProber, TcpConnector};

/// Validates `address` with a default [`EmailValidator`] built on the system
/// resolver and plain TCP.
pub fn validate_email(address: &str, aggressive: bool) -> Result<ValidationVerdict, ValidatorError> {
    Ok(EmailValidator::new(ValidatorOptions::default())?.validate(address, aggressive))
}

/// Deliverability engine with injected DNS, SMTP transport and reputation
/// collaborators. Holds no per-validation state, so one instance can serve
/// concurrent calls.
pub struct EmailValidator {
    options: ValidatorOptions,
    dns: Box<dyn DnsLookup>,
    connector: Box<dyn SmtpConnector>,
    reputation: Box<dyn ReputationClassifier>,
}

impl std::fmt::Debug for EmailValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailValidator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// What the DNS stage learned about the domain.
#[derive(Default)]
struct DnsEvidence {
    hosts: Vec<String>,
    flags: BTreeSet<String>,
    factors: BTreeSet<String>,
    fallback: Option<FallbackReport>,
    /// Set when there is nothing to probe.
    failure: Option<ProbeOutcome>,
}

impl EmailValidator {
    pub fn new(options: ValidatorOptions) -> Result<Self, ValidatorError> {
        let dns: Arc<dyn DnsLookup> = Arc::new(
            SystemDns::from_system_conf()
                .map_err(|source| ValidatorError::ResolverInit { source })?,
        );
        let connector = TcpConnector::new(options.probe.verify_tls_certs, Arc::clone(&dns))
            .map_err(ValidatorError::Transport)?;
        Ok(Self::with_parts(
            options,
            Box::new(dns),
            Box::new(connector),
            Box::new(StaticReputation::new()),
        ))
    }

    pub fn with_parts(
        options: ValidatorOptions,
        dns: Box<dyn DnsLookup>,
        connector: Box<dyn SmtpConnector>,
        reputation: Box<dyn ReputationClassifier>,
    ) -> Self {
        Self {
            options,
            dns,
            connector,
            reputation,
        }
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    pub fn validate(&self, address: &str, aggressive: bool) -> ValidationVerdict {
        self.validate_with_cancel(address, aggressive, &CancellationToken::new())
    }

    /// Like [`validate`](Self::validate), but every blocking step is bounded
    /// by `cancel`. Firing the token interrupts in-flight sockets; the verdict
    /// then carries the `cancelled` flag.
    pub fn validate_with_cancel(
        &self,
        address: &str,
        aggressive: bool,
        cancel: &CancellationToken,
    ) -> ValidationVerdict {
        let email = address.trim().to_string();
        let parsed = match parse_address(address) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(email = %email, error = %err, "malformed address");
                let outcome = ProbeOutcome::new(ProbeResult::Invalid, false, err.to_string())
                    .with_flag(flags::INVALID_FORMAT);
                let reputation = ReputationInfo::default();
                return self.assemble(email, outcome, reputation, Parts::default(), aggressive);
            }
        };

        let domain = parsed.ascii_domain.as_str();
        if self.reputation.is_disposable(domain) {
            let outcome = ProbeOutcome::new(
                ProbeResult::Disposable,
                false,
                format!("{domain} is a disposable email provider"),
            )
            .with_flag(flags::DISPOSABLE_EMAIL);
            let reputation = self.reputation.classify(domain);
            return self.assemble(email, outcome, reputation, Parts::default(), aggressive);
        }

        let evidence = self.resolve_hosts(domain, cancel);
        let mut parts = Parts {
            fallback: evidence.fallback,
            ..Parts::default()
        };
        let mut outcome = match evidence.failure {
            Some(failure) => failure,
            None => self.probe_hosts(&parsed, &evidence.hosts, cancel, &mut parts),
        };
        for flag in &evidence.flags {
            outcome.add_flag(flag);
        }

        let mut reputation = self.reputation.classify(domain);
        reputation.risk_factors.extend(evidence.factors);

        self.assemble(email, outcome, reputation, parts, aggressive)
    }

    /// MX lookup with corroboration and fallback.
    fn resolve_hosts(&self, domain: &str, cancel: &CancellationToken) -> DnsEvidence {
        let mut evidence = DnsEvidence::default();
        let Some(mx_timeout) = cancel.bounded(self.options.dns.mx_timeout) else {
            evidence.failure = Some(cancelled_outcome());
            return evidence;
        };
        let dns_options = DnsOptions {
            mx_timeout,
            ..self.options.dns.clone()
        };

        let mut err = match resolve_mx(self.dns.as_ref(), domain, &dns_options) {
            Ok(records) => {
                if records.len() == 1 {
                    evidence.factors.insert(factors::SIMPLE_MX_SETUP.to_string());
                }
                evidence.hosts = records
                    .into_iter()
                    .take(self.options.max_mx_hosts.max(1))
                    .map(|record| record.exchange)
                    .collect();
                return evidence;
            }
            Err(err) => err,
        };

        if err == DnsError::NullMx {
            info!(domain, "domain publishes a null MX");
            evidence.flags.insert(flags::NO_MX_RECORD.to_string());
            evidence.factors.insert(factors::NO_MX_RECORDS.to_string());
            evidence.failure = Some(ProbeOutcome::unknown(format!(
                "domain {domain} declares that it accepts no mail ({})",
                err.code()
            )));
            return evidence;
        }

        if err != DnsError::DomainNotFound {
            if let Some(timeout) = cancel.bounded(self.options.dns.address_timeout) {
                let presence = domain_exists(self.dns.as_ref(), domain, timeout);
                debug!(
                    domain,
                    exists = presence.exists,
                    has_a_record = presence.has_a_record,
                    "existence check finished"
                );
                if !presence.exists {
                    err = DnsError::DomainNotFound;
                }
            }
        }
        warn!(domain, code = err.code(), error = %err, "MX resolution failed");

        if err == DnsError::DomainNotFound {
            evidence.flags.insert(flags::DOMAIN_NOT_FOUND.to_string());
            evidence.factors.insert(factors::DOMAIN_NOT_FOUND.to_string());
            evidence.failure = Some(ProbeOutcome::unknown(format!(
                "domain {domain} does not exist ({})",
                err.code()
            )));
            return evidence;
        }

        if err.is_transient() {
            evidence.factors.insert(factors::DNS_ISSUES.to_string());
        } else if matches!(err, DnsError::Other { .. }) {
            evidence.factors.insert(factors::MX_LOOKUP_FAILED.to_string());
        }

        let report = attempt_fallback_validation(
            self.dns.as_ref(),
            self.connector.as_ref(),
            domain,
            &self.options.dns,
            cancel,
        );
        debug!(
            domain,
            can_receive = report.can_receive_email,
            method = ?report.fallback_method,
            confidence = report.confidence,
            "fallback validation finished"
        );
        evidence.flags.extend(report.flags.iter().cloned());
        match report.host.clone() {
            Some(host) if report.can_receive_email => evidence.hosts.push(host),
            _ => {
                if err == DnsError::NoMxRecords {
                    evidence.flags.insert(flags::NO_MX_RECORD.to_string());
                    evidence.factors.insert(factors::NO_MX_RECORDS.to_string());
                } else {
                    evidence.flags.insert(flags::DNS_FAILURE.to_string());
                }
                let message = format!("{} ({}): {}", err, err.code(), report.message);
                evidence.failure = Some(if cancel.is_cancelled() {
                    cancelled_outcome()
                } else {
                    ProbeOutcome::unknown(message)
                });
            }
        }
        evidence.fallback = Some(report);
        evidence
    }

    /// Probes hosts in order, moving on only when a host could not be
    /// reached. Catch-all detection runs against the host that answered.
    fn probe_hosts(
        &self,
        address: &EmailAddress,
        hosts: &[String],
        cancel: &CancellationToken,
        parts: &mut Parts,
    ) -> ProbeOutcome {
        let prober = SmtpProber::new(self.connector.as_ref(), &self.options.probe, cancel);
        let recipient = address.wire_form();
        let mut outcome = ProbeOutcome::unknown("no mail exchanger to probe");

        for (index, host) in hosts.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome = cancelled_outcome();
                break;
            }
            outcome = prober.probe(host, &recipient);
            parts.transcript.append(&mut outcome.transcript);
            let unreachable = outcome.has_flag(flags::CONNECTION_FAILED);
            if !unreachable || index + 1 == hosts.len() {
                break;
            }
            debug!(host = %host, "exchanger unreachable, trying next");
        }

        if outcome.result == ProbeResult::Valid && self.options.catchall_enabled {
            if let Some(host) = outcome.mx_host.clone() {
                let report = detect_catchall(
                    &prober,
                    &host,
                    &address.ascii_domain,
                    self.options.catchall_pause,
                );
                if report.is_catchall {
                    outcome.result = ProbeResult::Catchall;
                    outcome.is_valid = true;
                    outcome.add_flag(flags::CATCHALL_DOMAIN);
                    outcome.message = format!(
                        "{}; {host} accepted {} of {SYNTHETIC_PROBES} nonexistent recipients (catch-all)",
                        outcome.message, report.accepted
                    );
                }
                parts.catch_all = Some(report);
            }
        }
        outcome
    }

    fn assemble(
        &self,
        email: String,
        outcome: ProbeOutcome,
        reputation: ReputationInfo,
        parts: Parts,
        aggressive: bool,
    ) -> ValidationVerdict {
        let analysis = analyze_confidence(&outcome, &reputation);
        let ProbeOutcome {
            mut is_valid,
            mut result,
            flags: mut tags,
            mut message,
            mx_host,
            ..
        } = outcome;
        let high_risk = reputation.bounce_risk == BounceRisk::High;

        let deliverable = if aggressive && analysis.should_override_to_invalid {
            is_valid = false;
            result = ProbeResult::Invalid;
            tags.insert(flags::AGGRESSIVE_OVERRIDE.to_string());
            message = analysis.reasoning.join("; ");
            false
        } else {
            if result == ProbeResult::Valid && high_risk {
                result = ProbeResult::Risky;
            }
            is_valid && result == ProbeResult::Valid && !high_risk
        };

        info!(
            email = %email,
            result = %result,
            deliverable,
            confidence = analysis.confidence,
            "validation finished"
        );
        ValidationVerdict {
            email,
            is_valid,
            deliverable,
            result,
            flags: tags,
            message,
            confidence: analysis.confidence,
            confidence_level: analysis.confidence_level,
            reasoning: analysis.reasoning,
            bounce_risk: reputation.bounce_risk,
            mx_host,
            fallback: parts.fallback,
            catch_all: parts.catch_all,
            transcript: parts.transcript,
        }
    }
}

/// Side products carried into the verdict.
#[derive(Default)]
struct Parts {
    fallback: Option<FallbackReport>,
    catch_all: Option<CatchAllReport>,
    transcript: Vec<String>,
}

fn cancelled_outcome() -> ProbeOutcome {
    ProbeOutcome::unknown("validation cancelled").with_flag(flags::CANCELLED)
}
