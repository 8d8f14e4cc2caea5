//! Confidence scoring.
//!
//! Additive model: start at a neutral 50, let every signal nudge the score,
//! clamp to `[0, 100]`. Each adjustment is written to the reasoning trail,
//! which doubles as the audit output of a validation.

mod types;

use tracing::debug;

pub use types::{ConfidenceAnalysis, ConfidenceLevel};

use crate::flags;
use crate::reputation::{BounceRisk, ReputationInfo, factors};
use crate::smtp::{ProbeOutcome, ProbeResult};

const BASELINE: i32 = 50;
const SMTP_ACCEPTED: i32 = 30;
const SMTP_REJECTED: i32 = -40;

const FLAG_WEIGHTS: &[(&str, i32)] = &[
    (flags::CATCHALL_DOMAIN, -25),
    (flags::DISPOSABLE_EMAIL, -40),
    (flags::USER_UNKNOWN, -30),
    (flags::ANTI_SPAM_POLICY, -20),
    (flags::INVALID_FORMAT, -50),
];

const RISK_FACTOR_WEIGHTS: &[(&str, i32)] = &[
    (factors::HIGH_BOUNCE_PROVIDER, -20),
    (factors::MX_LOOKUP_FAILED, -30),
    (factors::DOMAIN_NOT_FOUND, -50),
    (factors::NO_MX_RECORDS, -40),
    (factors::DNS_ISSUES, -25),
    (factors::SIMPLE_MX_SETUP, -5),
];

fn bounce_weight(risk: BounceRisk) -> i32 {
    match risk {
        BounceRisk::High => -35,
        BounceRisk::Medium => -15,
        BounceRisk::Low => 10,
    }
}

/// Folds a probe outcome and the domain's reputation into a confidence score.
/// Deterministic: the same inputs always give the same analysis.
pub fn analyze_confidence(outcome: &ProbeOutcome, reputation: &ReputationInfo) -> ConfidenceAnalysis {
    let mut score = BASELINE;
    let mut reasoning = vec![format!("baseline confidence {BASELINE}")];
    let mut adjust = |delta: i32, why: String| {
        score += delta;
        reasoning.push(format!("{why} ({delta:+})"));
    };

    if outcome.is_valid {
        adjust(SMTP_ACCEPTED, "SMTP server accepted the recipient".into());
    } else if outcome.result == ProbeResult::Invalid {
        adjust(SMTP_REJECTED, "SMTP server rejected the recipient".into());
    }

    adjust(
        bounce_weight(reputation.bounce_risk),
        format!("{} bounce risk", reputation.bounce_risk),
    );

    for (flag, weight) in FLAG_WEIGHTS {
        if outcome.has_flag(flag) {
            adjust(*weight, format!("flag {flag}"));
        }
    }
    for (factor, weight) in RISK_FACTOR_WEIGHTS {
        if reputation.has_factor(factor) {
            adjust(*weight, format!("risk factor {factor}"));
        }
    }

    let confidence = score.clamp(0, 100) as u8;
    if i32::from(confidence) != score {
        reasoning.push(format!("score {score} clamped to {confidence}"));
    }
    let confidence_level = ConfidenceLevel::from_score(confidence);
    reasoning.push(format!("confidence {confidence} ({confidence_level})"));

    let overrides = override_reasons(outcome, reputation, confidence, confidence_level);
    let should_override_to_invalid = !overrides.is_empty();
    reasoning.extend(overrides.into_iter().map(|why| format!("invalid override: {why}")));

    debug!(
        confidence,
        level = %confidence_level,
        override_to_invalid = should_override_to_invalid,
        "confidence analysed"
    );
    ConfidenceAnalysis {
        confidence,
        confidence_level,
        should_override_to_invalid,
        reasoning,
    }
}

/// True when the evidence is strong enough to report `invalid` in aggressive
/// mode. See [`analyze_confidence`] for the reasons attached to the trail.
pub fn should_override(
    outcome: &ProbeOutcome,
    reputation: &ReputationInfo,
    confidence: u8,
) -> bool {
    !override_reasons(
        outcome,
        reputation,
        confidence,
        ConfidenceLevel::from_score(confidence),
    )
    .is_empty()
}

fn override_reasons(
    outcome: &ProbeOutcome,
    reputation: &ReputationInfo,
    confidence: u8,
    level: ConfidenceLevel,
) -> Vec<&'static str> {
    let mut reasons = Vec::new();
    if confidence <= 15 && level == ConfidenceLevel::Low {
        reasons.push("confidence at or below 15");
    }
    if outcome.has_flag(flags::DISPOSABLE_EMAIL) {
        reasons.push("disposable address");
    }
    if outcome.has_flag(flags::INVALID_FORMAT) {
        reasons.push("malformed address");
    }
    if outcome.has_flag(flags::NO_MX_RECORD) {
        reasons.push("domain has no mail exchanger");
    }
    if outcome.has_flag(flags::DOMAIN_NOT_FOUND) {
        reasons.push("domain does not exist");
    }
    if reputation.bounce_risk == BounceRisk::High
        && outcome.has_flag(flags::CATCHALL_DOMAIN)
        && outcome.is_valid
    {
        reasons.push("catch-all domain with high bounce risk");
    }
    if outcome.has_flag(flags::USER_UNKNOWN) && confidence <= 25 {
        reasons.push("unknown user with confidence at or below 25");
    }
    if reputation.has_factor(factors::DOMAIN_NOT_FOUND) && confidence <= 20 {
        reasons.push("unresolvable domain with confidence at or below 20");
    }
    reasons
}
