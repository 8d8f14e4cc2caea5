use std::collections::BTreeSet;
use std::fmt;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BounceRisk {
    Low,
    Medium,
    High,
}

impl BounceRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for BounceRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only evidence about a domain, folded into the confidence score.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationInfo {
    pub bounce_risk: BounceRisk,
    pub risk_factors: BTreeSet<String>,
}

impl ReputationInfo {
    pub fn new(bounce_risk: BounceRisk) -> Self {
        Self {
            bounce_risk,
            risk_factors: BTreeSet::new(),
        }
    }

    pub fn with_factor(mut self, factor: impl Into<String>) -> Self {
        self.add_factor(factor);
        self
    }

    pub fn add_factor(&mut self, factor: impl Into<String>) {
        self.risk_factors.insert(factor.into());
    }

    pub fn has_factor(&self, factor: &str) -> bool {
        self.risk_factors.contains(factor)
    }
}

impl Default for ReputationInfo {
    fn default() -> Self {
        Self::new(BounceRisk::Medium)
    }
}
