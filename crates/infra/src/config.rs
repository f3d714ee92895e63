//! Configuration loading and representation.

use chrono::Duration;
use thiserror::Error;

use splitter_core::{FeedId, PriceFeeds};
use splitter_ledger::RemovalPolicy;
use splitter_oracle::DEFAULT_MAX_PRICE_AGE_SECS;

pub const VALUE_USD_FEED_VAR: &str = "SPLITTER_VALUE_USD_FEED";
pub const FIAT_USD_FEED_VAR: &str = "SPLITTER_FIAT_USD_FEED";
pub const MAX_PRICE_AGE_VAR: &str = "SPLITTER_MAX_PRICE_AGE_SECS";
pub const REMOVAL_POLICY_VAR: &str = "SPLITTER_REMOVAL_POLICY";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidMaxPriceAge { var: &'static str, value: String },

    #[error("{var} must be 'forfeit' or 'require-settled', got {value:?}")]
    InvalidRemovalPolicy { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    EmptyFeed { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    pub value_usd_feed: FeedId,
    pub fiat_usd_feed: FeedId,
    pub max_price_age: Duration,
    pub removal_policy: RemovalPolicy,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            value_usd_feed: FeedId::from("ETH/USD"),
            fiat_usd_feed: FeedId::from("EUR/USD"),
            max_price_age: Duration::seconds(DEFAULT_MAX_PRICE_AGE_SECS),
            removal_policy: RemovalPolicy::ForfeitBalance,
        }
    }
}

impl SplitterConfig {
    /// Read the process environment. Unset variables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable lookup (the environment, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let value_usd_feed = match lookup(VALUE_USD_FEED_VAR) {
            Some(v) => parse_feed(VALUE_USD_FEED_VAR, &v)?,
            None => {
                tracing::warn!(var = VALUE_USD_FEED_VAR, default = %defaults.value_usd_feed, "not set; using default");
                defaults.value_usd_feed
            }
        };

        let fiat_usd_feed = match lookup(FIAT_USD_FEED_VAR) {
            Some(v) => parse_feed(FIAT_USD_FEED_VAR, &v)?,
            None => {
                tracing::warn!(var = FIAT_USD_FEED_VAR, default = %defaults.fiat_usd_feed, "not set; using default");
                defaults.fiat_usd_feed
            }
        };

        let max_price_age = match lookup(MAX_PRICE_AGE_VAR) {
            Some(v) => parse_max_age(&v)?,
            None => {
                tracing::warn!(
                    var = MAX_PRICE_AGE_VAR,
                    default = defaults.max_price_age.num_seconds(),
                    "not set; using default"
                );
                defaults.max_price_age
            }
        };

        let removal_policy = match lookup(REMOVAL_POLICY_VAR) {
            Some(v) => parse_removal_policy(&v)?,
            None => {
                tracing::warn!(var = REMOVAL_POLICY_VAR, default = "forfeit", "not set; using default");
                defaults.removal_policy
            }
        };

        Ok(Self {
            value_usd_feed,
            fiat_usd_feed,
            max_price_age,
            removal_policy,
        })
    }

    pub fn feeds(&self) -> PriceFeeds {
        PriceFeeds::new(self.value_usd_feed.clone(), self.fiat_usd_feed.clone())
    }
}

fn parse_feed(var: &'static str, raw: &str) -> Result<FeedId, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyFeed { var });
    }
    Ok(FeedId::new(trimmed))
}

fn parse_max_age(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidMaxPriceAge {
        var: MAX_PRICE_AGE_VAR,
        value: raw.to_string(),
    };
    let secs: i64 = raw.trim().parse().map_err(|_| invalid())?;
    if secs <= 0 {
        return Err(invalid());
    }
    Ok(Duration::seconds(secs))
}

fn parse_removal_policy(raw: &str) -> Result<RemovalPolicy, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "forfeit" | "forfeit-balance" => Ok(RemovalPolicy::ForfeitBalance),
        "require-settled" => Ok(RemovalPolicy::RequireSettled),
        _ => Err(ConfigError::InvalidRemovalPolicy {
            var: REMOVAL_POLICY_VAR,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn unset_variables_use_defaults() {
        let config = SplitterConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SplitterConfig::default());
        assert_eq!(config.feeds(), PriceFeeds::new("ETH/USD", "EUR/USD"));
    }

    #[test]
    fn variables_override_defaults() {
        let config = SplitterConfig::from_lookup(lookup(&[
            (VALUE_USD_FEED_VAR, "BTC/USD"),
            (FIAT_USD_FEED_VAR, " GBP/USD "),
            (MAX_PRICE_AGE_VAR, "60"),
            (REMOVAL_POLICY_VAR, "require-settled"),
        ]))
        .unwrap();

        assert_eq!(config.value_usd_feed.as_str(), "BTC/USD");
        assert_eq!(config.fiat_usd_feed.as_str(), "GBP/USD");
        assert_eq!(config.max_price_age, Duration::seconds(60));
        assert_eq!(config.removal_policy, RemovalPolicy::RequireSettled);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(matches!(
            SplitterConfig::from_lookup(lookup(&[(MAX_PRICE_AGE_VAR, "soon")])),
            Err(ConfigError::InvalidMaxPriceAge { .. })
        ));
        assert!(matches!(
            SplitterConfig::from_lookup(lookup(&[(MAX_PRICE_AGE_VAR, "0")])),
            Err(ConfigError::InvalidMaxPriceAge { .. })
        ));
        assert!(matches!(
            SplitterConfig::from_lookup(lookup(&[(REMOVAL_POLICY_VAR, "redistribute")])),
            Err(ConfigError::InvalidRemovalPolicy { .. })
        ));
        assert!(matches!(
            SplitterConfig::from_lookup(lookup(&[(VALUE_USD_FEED_VAR, "")])),
            Err(ConfigError::EmptyFeed { .. })
        ));
    }
}
