//! LOD tier enum.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rendering-fidelity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LodTier {
    /// Full fidelity: every marker, shortest emission gap.
    #[default]
    High = 0,
    /// Reduced marker count and slower emission.
    Medium = 1,
    /// Minimum fidelity for heavily loaded frames.
    Low = 2,
}

impl LodTier {
    /// All tiers from highest to lowest fidelity.
    pub const ALL: [LodTier; 3] = [LodTier::High, LodTier::Medium, LodTier::Low];

    /// Step down one tier. `Low` stays `Low`.
    pub fn downgrade(&self) -> Self {
        match self {
            LodTier::High => LodTier::Medium,
            LodTier::Medium => LodTier::Low,
            LodTier::Low => LodTier::Low,
        }
    }

    /// Step up one tier. `High` stays `High`.
    pub fn upgrade(&self) -> Self {
        match self {
            LodTier::High => LodTier::High,
            LodTier::Medium => LodTier::High,
            LodTier::Low => LodTier::Medium,
        }
    }

    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LodTier::High => "high",
            LodTier::Medium => "medium",
            LodTier::Low => "low",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => LodTier::High,
            1 => LodTier::Medium,
            _ => LodTier::Low,
        }
    }
}

impl fmt::Display for LodTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_high() {
        assert_eq!(LodTier::default(), LodTier::High);
    }

    #[test]
    fn test_downgrade_is_single_step() {
        assert_eq!(LodTier::High.downgrade(), LodTier::Medium);
        assert_eq!(LodTier::Medium.downgrade(), LodTier::Low);
        assert_eq!(LodTier::Low.downgrade(), LodTier::Low);
    }

    #[test]
    fn test_upgrade_is_single_step() {
        assert_eq!(LodTier::Low.upgrade(), LodTier::Medium);
        assert_eq!(LodTier::Medium.upgrade(), LodTier::High);
        assert_eq!(LodTier::High.upgrade(), LodTier::High);
    }

    #[test]
    fn test_u8_round_trip() {
        for tier in LodTier::ALL {
            assert_eq!(LodTier::from_u8(tier as u8), tier);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(LodTier::Medium.to_string(), "medium");
    }
}
