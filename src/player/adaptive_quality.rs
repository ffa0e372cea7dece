use tracing::debug;

use crate::constants::{CELLULAR_MEDIUM_QUALITY_MIN_BPS, WIFI_HIGH_QUALITY_MIN_BPS};
use crate::models::{NetworkCondition, QualityLevel};

/// Pick the quality tier to fetch for the given link.
///
/// Speed thresholds are strict: a wifi link must be faster than 10 Mbps for
/// `High`, a cellular link faster than 5 Mbps for `Medium`.
pub fn determine_optimal_quality(condition: NetworkCondition) -> QualityLevel {
    let quality = match condition {
        NetworkCondition::Wifi { speed_bps } if speed_bps > WIFI_HIGH_QUALITY_MIN_BPS => {
            QualityLevel::High
        }
        NetworkCondition::Wifi { .. } => QualityLevel::Medium,
        NetworkCondition::Cellular { speed_bps } if speed_bps > CELLULAR_MEDIUM_QUALITY_MIN_BPS => {
            QualityLevel::Medium
        }
        NetworkCondition::Cellular { .. } => QualityLevel::Low,
        NetworkCondition::Poor | NetworkCondition::None => QualityLevel::Low,
    };

    debug!("Quality for {}: {}", condition, quality);
    quality
}
