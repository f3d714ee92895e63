//! Price feed identifiers.

use serde::{Deserialize, Serialize};

/// Identifier of an oracle price feed (e.g. `ETH/USD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for FeedId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The two feeds a group converts through: settlement asset to USD and
/// expense currency to USD.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceFeeds {
    pub value_usd: FeedId,
    pub fiat_usd: FeedId,
}

impl PriceFeeds {
    pub fn new(value_usd: impl Into<FeedId>, fiat_usd: impl Into<FeedId>) -> Self {
        Self {
            value_usd: value_usd.into(),
            fiat_usd: fiat_usd.into(),
        }
    }
}
