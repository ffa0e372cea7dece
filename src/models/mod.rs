mod identifiers;

pub use identifiers::ContentId;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::FeedError;

/// Quality tier a piece of content is cached and played at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    /// Unresolved placeholder; must be resolved against the network before use
    Auto,
    Low,
    Medium,
    High,
}

impl QualityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Auto => "auto",
            QualityLevel::Low => "low",
            QualityLevel::Medium => "medium",
            QualityLevel::High => "high",
        }
    }

    /// Maximum vertical resolution for this tier. `None` means unbounded
    /// (`High`) or not yet known (`Auto`).
    pub fn max_resolution(&self) -> Option<u32> {
        match self {
            QualityLevel::Low => Some(480),
            QualityLevel::Medium => Some(720),
            QualityLevel::High | QualityLevel::Auto => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, QualityLevel::Auto)
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(QualityLevel::Auto),
            "low" => Ok(QualityLevel::Low),
            "medium" => Ok(QualityLevel::Medium),
            "high" => Ok(QualityLevel::High),
            other => Err(FeedError::Validation(format!(
                "unknown quality level: {other}"
            ))),
        }
    }
}

/// A feed item as supplied by the upstream metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    pub id: ContentId,
    pub url: String,
}

impl ContentDescriptor {
    pub fn new(id: impl Into<ContentId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Link quality as classified from the latest network path observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkCondition {
    Wifi { speed_bps: u64 },
    Cellular { speed_bps: u64 },
    Poor,
    None,
}

impl NetworkCondition {
    /// Whether speculative downloads are allowed on this link.
    pub fn allows_prefetch(&self) -> bool {
        !matches!(self, NetworkCondition::Poor | NetworkCondition::None)
    }
}

impl fmt::Display for NetworkCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkCondition::Wifi { speed_bps } => {
                write!(f, "wifi({:.1} Mbps)", *speed_bps as f64 / 1_000_000.0)
            }
            NetworkCondition::Cellular { speed_bps } => {
                write!(f, "cellular({:.1} Mbps)", *speed_bps as f64 / 1_000_000.0)
            }
            NetworkCondition::Poor => f.write_str("poor"),
            NetworkCondition::None => f.write_str("none"),
        }
    }
}
