use std::path::PathBuf;

use serde::Deserialize;

use crate::types::RiskTier;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// JSON file holding the loan book (array of loan records)
    pub loanbook_path: PathBuf,

    /// JSON file the external price feed writes its latest price sheet to
    pub price_feed_path: PathBuf,

    /// How often the price sheet is re-read, in milliseconds (default: 5000)
    pub poll_interval_ms: u64,

    /// Consecutive price ticks a loan must stay at or above the alert tier before alerting (default: 1)
    pub hysteresis_ticks: u64,

    /// Lowest risk tier that raises an alert (default: high)
    pub alert_min_tier: RiskTier,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the environment, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let hysteresis_ticks: u64 = lookup("MONITOR_HYSTERESIS_TICKS")
            .unwrap_or_else(|| "1".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("MONITOR_HYSTERESIS_TICKS must be a valid u64"))?;
        if hysteresis_ticks == 0 {
            anyhow::bail!("MONITOR_HYSTERESIS_TICKS must be at least 1");
        }

        Ok(Self {
            loanbook_path: lookup("LOANBOOK_PATH")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow::anyhow!("LOANBOOK_PATH environment variable is required"))?,
            price_feed_path: lookup("PRICE_FEED_PATH")
                .map(PathBuf::from)
                .ok_or_else(|| {
                    anyhow::anyhow!("PRICE_FEED_PATH environment variable is required")
                })?,
            poll_interval_ms: lookup("MONITOR_POLL_INTERVAL_MS")
                .unwrap_or_else(|| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MONITOR_POLL_INTERVAL_MS must be a valid u64"))?,
            hysteresis_ticks,
            alert_min_tier: lookup("MONITOR_ALERT_MIN_TIER")
                .unwrap_or_else(|| "high".to_string())
                .parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("LOANBOOK_PATH", "/data/loans.json"),
            ("PRICE_FEED_PATH", "/data/prices.json"),
        ]))
        .unwrap();
        assert_eq!(config.loanbook_path, PathBuf::from("/data/loans.json"));
        assert_eq!(config.poll_interval_ms, 5000);
        assert_eq!(config.hysteresis_ticks, 1);
        assert_eq!(config.alert_min_tier, RiskTier::High);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("LOANBOOK_PATH", "loans.json"),
            ("PRICE_FEED_PATH", "prices.json"),
            ("MONITOR_POLL_INTERVAL_MS", "250"),
            ("MONITOR_HYSTERESIS_TICKS", "3"),
            ("MONITOR_ALERT_MIN_TIER", "medium"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.hysteresis_ticks, 3);
        assert_eq!(config.alert_min_tier, RiskTier::Medium);
    }

    #[test]
    fn test_missing_required_path() {
        let result = AppConfig::from_lookup(lookup_from(&[("LOANBOOK_PATH", "loans.json")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = [
            ("LOANBOOK_PATH", "loans.json"),
            ("PRICE_FEED_PATH", "prices.json"),
        ];
        for (key, value) in [
            ("MONITOR_POLL_INTERVAL_MS", "soon"),
            ("MONITOR_HYSTERESIS_TICKS", "0"),
            ("MONITOR_ALERT_MIN_TIER", "severe"),
        ] {
            let mut pairs = base.to_vec();
            pairs.push((key, value));
            assert!(
                AppConfig::from_lookup(lookup_from(&pairs)).is_err(),
                "{}={} accepted",
                key,
                value
            );
        }
    }
}
