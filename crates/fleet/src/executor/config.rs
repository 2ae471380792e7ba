//! Fleet executor configuration

use crate::error::FleetError;
use declarative::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How hosts are rolled out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Every host at once, up to `max_parallel` in flight
    #[default]
    Parallel,
    /// Sequential batches of `max_parallel` hosts
    Rolling,
    /// A canary subset first; the rest only if it succeeds
    Canary,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Rolling => write!(f, "rolling"),
            Self::Canary => write!(f, "canary"),
        }
    }
}

impl FromStr for Strategy {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parallel" => Ok(Self::Parallel),
            "rolling" => Ok(Self::Rolling),
            "canary" => Ok(Self::Canary),
            other => Err(FleetError::InvalidConfig(format!("unknown strategy '{other}'"))),
        }
    }
}

/// Settings for a fleet run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetExecutorConfig {
    pub strategy: Strategy,
    /// Hosts in flight at once; also the rolling batch size
    pub max_parallel: usize,
    /// Per-host budget, connection included
    #[serde(with = "crate::serde_ms")]
    pub timeout: Duration,
    /// Check and plan only; nothing is applied
    pub dry_run: bool,
    /// Stop starting hosts once one has failed
    pub stop_on_error: bool,
    /// What each host does with its remaining steps after a step fails
    pub failure_policy: FailurePolicy,
    /// Share of hosts in the canary batch; `None` means a single host
    pub canary_fraction: Option<f64>,
}

impl Default for FleetExecutorConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Parallel,
            max_parallel: 5,
            timeout: Duration::from_secs(300),
            dry_run: false,
            stop_on_error: false,
            failure_policy: FailurePolicy::Continue,
            canary_fraction: None,
        }
    }
}

impl FleetExecutorConfig {
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.max_parallel == 0 {
            return Err(FleetError::InvalidConfig(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(FleetError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if let Some(fraction) = self.canary_fraction
            && !(fraction > 0.0 && fraction <= 1.0)
        {
            return Err(FleetError::InvalidConfig(format!(
                "canary_fraction must be in (0, 1], got {fraction}"
            )));
        }
        Ok(())
    }

    /// Number of canary hosts out of `total`
    ///
    /// At least one host whenever there is one, rounding the fraction up.
    pub fn canary_count(&self, total: usize) -> usize {
        if total == 0 {
            return 0;
        }
        match self.canary_fraction {
            None => 1,
            Some(fraction) => ((total as f64 * fraction).ceil() as usize).clamp(1, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FleetExecutorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_parallel, 5);
        assert_eq!(config.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = FleetExecutorConfig {
            max_parallel: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let no_time = FleetExecutorConfig {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(no_time.validate().is_err());

        for fraction in [0.0, -0.5, 1.5, f64::NAN] {
            let config = FleetExecutorConfig {
                canary_fraction: Some(fraction),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{fraction} accepted");
        }
    }

    #[test]
    fn test_canary_count() {
        let single = FleetExecutorConfig::default();
        assert_eq!(single.canary_count(0), 0);
        assert_eq!(single.canary_count(10), 1);

        let tenth = FleetExecutorConfig {
            canary_fraction: Some(0.1),
            ..Default::default()
        };
        assert_eq!(tenth.canary_count(3), 1);
        assert_eq!(tenth.canary_count(25), 3);

        let all = FleetExecutorConfig {
            canary_fraction: Some(1.0),
            ..Default::default()
        };
        assert_eq!(all.canary_count(4), 4);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("rolling".parse::<Strategy>().unwrap(), Strategy::Rolling);
        assert_eq!("Canary".parse::<Strategy>().unwrap(), Strategy::Canary);
        assert!("blue-green".parse::<Strategy>().is_err());
    }
}
