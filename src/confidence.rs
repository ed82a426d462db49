//! Confidence bands used to flag uncertain extractions in the report.

use rust_xlsxwriter::Color;
use serde::Serialize;

/// Band boundaries. LOW is `c <= LOW_MAX`, HIGH is `c >= HIGH_MIN`,
/// MEDIUM is strictly between.
pub mod thresholds {
    pub const LOW_MAX: f64 = 0.8;
    pub const HIGH_MIN: f64 = 0.9;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    pub fn classify(confidence: f64) -> Self {
        if confidence <= thresholds::LOW_MAX {
            ConfidenceBand::Low
        } else if confidence >= thresholds::HIGH_MIN {
            ConfidenceBand::High
        } else {
            ConfidenceBand::Medium
        }
    }

    /// Cell fill for this band.
    pub fn fill(&self) -> Color {
        match self {
            ConfidenceBand::Low => Color::RGB(0xFFC7CE),
            ConfidenceBand::Medium => Color::RGB(0xFFEB9C),
            ConfidenceBand::High => Color::RGB(0xC6EFCE),
        }
    }

    /// Font color for this band.
    pub fn font(&self) -> Color {
        match self {
            ConfidenceBand::Low => Color::RGB(0x9C0006),
            ConfidenceBand::Medium => Color::RGB(0x9C5700),
            ConfidenceBand::High => Color::RGB(0x006100),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::Low => "low",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::High => "high",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_inclusive_on_the_outer_bands() {
        assert_eq!(ConfidenceBand::classify(0.8), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::classify(0.9), ConfidenceBand::High);
    }

    #[test]
    fn values_just_inside_the_medium_band() {
        let eps = 1e-9;
        assert_eq!(ConfidenceBand::classify(0.8 + eps), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::classify(0.9 - eps), ConfidenceBand::Medium);
        assert_eq!(
            ConfidenceBand::classify(f64::from_bits(0.8f64.to_bits() + 1)),
            ConfidenceBand::Medium
        );
    }

    #[test]
    fn extremes() {
        assert_eq!(ConfidenceBand::classify(0.0), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::classify(1.0), ConfidenceBand::High);
    }

    #[test]
    fn every_value_in_unit_interval_has_exactly_one_band() {
        for i in 0..=10_000 {
            let c = i as f64 / 10_000.0;
            let band = ConfidenceBand::classify(c);
            let low = c <= thresholds::LOW_MAX;
            let high = c >= thresholds::HIGH_MIN;
            let medium = !low && !high;
            let expected = [low, medium, high].iter().filter(|b| **b).count();
            assert_eq!(expected, 1, "overlap or gap at {c}");
            match band {
                ConfidenceBand::Low => assert!(low),
                ConfidenceBand::Medium => assert!(medium),
                ConfidenceBand::High => assert!(high),
            }
        }
    }

    #[test]
    fn bands_have_distinct_colors() {
        assert_ne!(ConfidenceBand::Low.fill(), ConfidenceBand::Medium.fill());
        assert_ne!(ConfidenceBand::Medium.fill(), ConfidenceBand::High.fill());
        assert_eq!(ConfidenceBand::Low.font(), Color::RGB(0x9C0006));
    }
}
