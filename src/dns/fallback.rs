use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use super::{AddressFamily, DnsLookup, DnsOptions, FallbackMethod, FallbackReport};
use crate::cancel::CancellationToken;
use crate::flags;

static MAIL_TXT_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)v=spf1|v=dmarc1|v=dkim1|\bmx\b|\bmail\b|\bsmtp\b")
        .expect("TXT token pattern is valid")
});

/// Plain TCP reachability check used by the last fallback stage. The
/// connection must be closed as soon as it is established.
pub trait PortProbe {
    fn can_connect(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Graduated check for domains whose MX lookup failed: TXT records, then
/// conventional mail subdomains (looked up in parallel), then a direct
/// connection to port 25. Stops at the first stage that succeeds.
pub fn attempt_fallback_validation<D, P>(
    dns: &D,
    probe: &P,
    ascii_domain: &str,
    options: &DnsOptions,
    cancel: &CancellationToken,
) -> FallbackReport
where
    D: DnsLookup + ?Sized,
    P: PortProbe + ?Sized,
{
    if let Some(report) = check_txt_records(dns, ascii_domain, options, cancel) {
        return report;
    }
    if let Some(report) = check_mail_subdomains(dns, ascii_domain, options, cancel) {
        return report;
    }
    if let Some(timeout) = cancel.bounded(options.port_probe_timeout) {
        if probe.can_connect(ascii_domain, 25, timeout) {
            debug!(domain = ascii_domain, "port 25 reachable on bare domain");
            return success(
                FallbackMethod::DirectConnection,
                70,
                ascii_domain.to_string(),
                format!("{ascii_domain} accepts connections on port 25"),
                BTreeSet::new(),
            );
        }
    }
    FallbackReport::failed(format!(
        "{ascii_domain} shows no sign of accepting mail (no MX, no mail TXT records, no mail host)"
    ))
}

fn check_txt_records<D>(
    dns: &D,
    ascii_domain: &str,
    options: &DnsOptions,
    cancel: &CancellationToken,
) -> Option<FallbackReport>
where
    D: DnsLookup + ?Sized,
{
    let mut evidence = BTreeSet::new();
    for name in [ascii_domain.to_string(), format!("_dmarc.{ascii_domain}")] {
        let timeout = cancel.bounded(options.txt_timeout)?;
        let records = match dns.lookup_txt(&name, timeout) {
            Ok(records) => records,
            Err(err) => {
                debug!(name = %name, error = %err, "TXT lookup failed");
                continue;
            }
        };
        for record in &records {
            for token in MAIL_TXT_TOKENS.find_iter(record) {
                evidence.insert(txt_evidence_flag(token.as_str()));
            }
        }
    }
    if evidence.is_empty() {
        return None;
    }
    let message = format!(
        "{ascii_domain} publishes mail-related TXT records ({})",
        evidence.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    Some(success(
        FallbackMethod::TxtRecords,
        50,
        ascii_domain.to_string(),
        message,
        evidence,
    ))
}

fn txt_evidence_flag(token: &str) -> String {
    let lower = token.to_ascii_lowercase();
    let kind = if lower.starts_with("v=spf1") {
        "spf"
    } else if lower.starts_with("v=dmarc1") {
        "dmarc"
    } else if lower.starts_with("v=dkim1") {
        "dkim"
    } else {
        "mail_hint"
    };
    format!("txt_{kind}")
}

fn check_mail_subdomains<D>(
    dns: &D,
    ascii_domain: &str,
    options: &DnsOptions,
    cancel: &CancellationToken,
) -> Option<FallbackReport>
where
    D: DnsLookup + ?Sized,
{
    let timeout = cancel.bounded(options.subdomain_timeout)?;
    let hosts: Vec<String> = options
        .fallback_subdomains
        .iter()
        .map(|label| format!("{label}.{ascii_domain}"))
        .collect();

    let resolved: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = hosts
            .iter()
            .map(|host| {
                scope.spawn(move || {
                    matches!(dns.has_address(host, AddressFamily::V4, timeout), Ok(true))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(false))
            .collect()
    });

    let host = hosts
        .into_iter()
        .zip(resolved)
        .find_map(|(host, ok)| ok.then_some(host))?;
    debug!(domain = ascii_domain, host = %host, "mail subdomain resolved");
    Some(success(
        FallbackMethod::MailSubdomain,
        60,
        host.clone(),
        format!("{host} resolves although {ascii_domain} has no MX"),
        BTreeSet::new(),
    ))
}

fn success(
    method: FallbackMethod,
    confidence: u8,
    host: String,
    message: String,
    mut evidence: BTreeSet<String>,
) -> FallbackReport {
    evidence.insert(flags::MX_FALLBACK.to_string());
    evidence.insert(flags::fallback_method(method.as_str()));
    FallbackReport {
        can_receive_email: true,
        fallback_method: Some(method),
        confidence,
        flags: evidence,
        message,
        host: Some(host),
    }
}
