//! # Subscription Tiers
//!
//! The closed set of subscription tiers sold on the platform. Every tier is
//! eligible to request download access; the tier is carried on the access
//! record for the review console, not used for gating.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    /// Entry tier.
    NewTrader,
    /// Mid tier.
    ProTrader,
    /// Top tier.
    EliteTrader,
}

impl SubscriptionTier {
    /// All tiers, in ascending order.
    pub const ALL: [SubscriptionTier; 3] = [
        SubscriptionTier::NewTrader,
        SubscriptionTier::ProTrader,
        SubscriptionTier::EliteTrader,
    ];

    /// The wire representation of this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::NewTrader => "new_trader",
            SubscriptionTier::ProTrader => "pro_trader",
            SubscriptionTier::EliteTrader => "elite_trader",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_trader" => Ok(SubscriptionTier::NewTrader),
            "pro_trader" => Ok(SubscriptionTier::ProTrader),
            "elite_trader" => Ok(SubscriptionTier::EliteTrader),
            other => Err(ValidationError::UnknownTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for tier in SubscriptionTier::ALL {
            assert_eq!(tier.as_str().parse::<SubscriptionTier>(), Ok(tier));
        }
    }

    #[test]
    fn rejects_unknown_tier() {
        assert_eq!(
            "gold".parse::<SubscriptionTier>(),
            Err(ValidationError::UnknownTier("gold".to_string()))
        );
    }

    #[test]
    fn rejects_wrong_case() {
        assert!("ProTrader".parse::<SubscriptionTier>().is_err());
        assert!("PRO_TRADER".parse::<SubscriptionTier>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&SubscriptionTier::EliteTrader).unwrap();
        assert_eq!(json, "\"elite_trader\"");

        let tier: SubscriptionTier = serde_json::from_str("\"new_trader\"").unwrap();
        assert_eq!(tier, SubscriptionTier::NewTrader);
    }

    #[test]
    fn serde_rejects_unknown_tier() {
        assert!(serde_json::from_str::<SubscriptionTier>("\"whale\"").is_err());
    }
}
