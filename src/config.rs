use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::daycount::DayCountConvention;
use crate::decimal::Rate;
use crate::types::RiskClass;

/// engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub day_count: DayCountConvention,
    pub provisions: ProvisionPolicy,
    /// jurisdiction-specific cure period; None = immediate reclassification
    pub cure: Option<CurePolicy>,
    /// net eligible collateral value off the provision base
    pub net_collateral: bool,
}

impl EngineConfig {
    /// standard configuration: actual/365, default provision rates,
    /// immediate reclassification, gross provisioning
    pub fn standard() -> Self {
        Self {
            day_count: DayCountConvention::Actual365,
            provisions: ProvisionPolicy::default(),
            cure: None,
            net_collateral: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// provision rate per risk class
///
/// Watch and Substandard are the configurable bands; Doubtful and Loss are
/// fixed by the classification table but kept here so a jurisdiction can
/// override the whole ladder at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionPolicy {
    pub watch: Rate,
    pub substandard: Rate,
    pub doubtful: Rate,
    pub loss: Rate,
}

impl ProvisionPolicy {
    pub fn rate_for(&self, class: RiskClass) -> Rate {
        match class {
            RiskClass::Current => Rate::ZERO,
            RiskClass::Watch => self.watch,
            RiskClass::Substandard => self.substandard,
            RiskClass::Doubtful => self.doubtful,
            RiskClass::Loss => self.loss,
        }
    }
}

impl Default for ProvisionPolicy {
    fn default() -> Self {
        Self {
            watch: Rate::from_percent(dec!(5)),
            substandard: Rate::from_percent(dec!(25)),
            doubtful: Rate::from_percent(dec!(50)),
            loss: Rate::from_percent(dec!(100)),
        }
    }
}

/// cure period: a grade only improves after this many consecutive
/// classification runs at the better grade
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CurePolicy {
    pub consecutive_runs: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_provision_ladder() {
        let policy = ProvisionPolicy::default();
        assert_eq!(policy.rate_for(RiskClass::Current), Rate::ZERO);
        assert_eq!(policy.rate_for(RiskClass::Watch), Rate::from_percent(dec!(5)));
        assert_eq!(policy.rate_for(RiskClass::Substandard), Rate::from_percent(dec!(25)));
        assert_eq!(policy.rate_for(RiskClass::Doubtful), Rate::from_percent(dec!(50)));
        assert_eq!(policy.rate_for(RiskClass::Loss), Rate::from_percent(dec!(100)));
    }

    #[test]
    fn test_standard_config() {
        let config = EngineConfig::standard();
        assert_eq!(config.day_count, DayCountConvention::Actual365);
        assert!(config.cure.is_none());
        assert!(!config.net_collateral);
    }
}
