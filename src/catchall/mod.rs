//! Catch-all detection.
//!
//! A server that accepts any recipient makes a single accepted `RCPT TO`
//! meaningless. The detector probes the same host with synthetic local parts
//! that cannot plausibly exist and reports how many of them were accepted.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, info};

use crate::smtp::SmtpProber;

/// Number of synthetic recipients probed per detection run.
pub const SYNTHETIC_PROBES: usize = 3;

/// Accepted synthetic probes needed to call the domain catch-all.
pub const CATCHALL_THRESHOLD: usize = 2;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CatchAllReport {
    pub is_catchall: bool,
    /// Fraction of synthetic probes accepted, in `[0, 1]`.
    pub confidence: f32,
    pub accepted: usize,
    /// One human-readable line per synthetic probe.
    pub trace: Vec<String>,
}

impl CatchAllReport {
    pub(crate) fn from_counts(accepted: usize, trace: Vec<String>) -> Self {
        let accepted = accepted.min(SYNTHETIC_PROBES);
        Self {
            is_catchall: accepted >= CATCHALL_THRESHOLD,
            confidence: accepted as f32 / SYNTHETIC_PROBES as f32,
            accepted,
            trace,
        }
    }
}

/// Probes `host` with three synthetic addresses on `domain`, pausing
/// `pause` between attempts. Anything but an accepted recipient counts as a
/// rejection, and a cancelled run stops early with the remaining probes
/// counted as rejected.
pub fn detect_catchall(
    prober: &SmtpProber<'_>,
    host: &str,
    domain: &str,
    pause: Duration,
) -> CatchAllReport {
    let mut accepted = 0;
    let mut trace = Vec::with_capacity(SYNTHETIC_PROBES);

    for (index, local) in synthetic_local_parts().into_iter().enumerate() {
        if index > 0 && !prober.cancel_token().sleep(pause) {
            trace.push(format!(
                "probe {}/{SYNTHETIC_PROBES}: skipped, validation cancelled",
                index + 1
            ));
            break;
        }
        let address = format!("{local}@{domain}");
        let outcome = prober.probe(host, &address);
        let verdict = if outcome.is_valid {
            accepted += 1;
            "accepted"
        } else {
            "rejected"
        };
        debug!(host, address = %address, verdict, "catch-all probe");
        trace.push(format!(
            "probe {}/{SYNTHETIC_PROBES} <{address}>: {verdict} ({})",
            index + 1,
            outcome.message
        ));
    }

    let report = CatchAllReport::from_counts(accepted, trace);
    info!(
        host,
        domain,
        accepted = report.accepted,
        catchall = report.is_catchall,
        "catch-all detection finished"
    );
    report
}

/// Timestamp plus random token, unique per call and per index.
fn synthetic_local_parts() -> Vec<String> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let mut rng = rand::thread_rng();
    (0..SYNTHETIC_PROBES)
        .map(|index| {
            let token: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(12)
                .map(|byte| char::from(byte).to_ascii_lowercase())
                .collect();
            format!("nx{stamp}{index}{token}")
        })
        .collect()
}
