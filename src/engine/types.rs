use std::collections::BTreeSet;

use crate::catchall::CatchAllReport;
use crate::dns::FallbackReport;
use crate::reputation::BounceRisk;
use crate::scoring::ConfidenceLevel;
use crate::smtp::ProbeResult;

/// Final answer for one address.
///
/// `is_valid` says whether the address was technically accepted;
/// `deliverable` says whether it is safe to send to. A catch-all domain is
/// valid but not deliverable.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationVerdict {
    pub email: String,
    pub is_valid: bool,
    pub deliverable: bool,
    pub result: ProbeResult,
    pub flags: BTreeSet<String>,
    pub message: String,
    pub confidence: u8,
    pub confidence_level: ConfidenceLevel,
    pub reasoning: Vec<String>,
    pub bounce_risk: BounceRisk,
    pub mx_host: Option<String>,
    pub fallback: Option<FallbackReport>,
    pub catch_all: Option<CatchAllReport>,
    pub transcript: Vec<String>,
}

impl ValidationVerdict {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }
}
