//! Core oracle types

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitter_core::FeedId;

use crate::OracleError;

/// One raw reading of a feed: `value / 10^decimals` USD, as of `updated_at`.
///
/// Ephemeral; never stored by the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    pub value: i128,
    pub decimals: u32,
    pub updated_at: DateTime<Utc>,
}

impl PriceReading {
    pub fn new(value: i128, decimals: u32, updated_at: DateTime<Utc>) -> Self {
        Self {
            value,
            decimals,
            updated_at,
        }
    }

    /// A reading stamped now.
    pub fn fresh(value: i128, decimals: u32) -> Self {
        Self::new(value, decimals, Utc::now())
    }
}

/// Price source port (external oracle).
///
/// Implementations answer with the latest known reading. Validation
/// (positivity, staleness) is done by [`crate::PriceAdapter`], not here.
pub trait PriceSource: Send + Sync {
    fn latest_price(&self, feed: &FeedId) -> Result<PriceReading, OracleError>;
}

impl<T> PriceSource for Arc<T>
where
    T: PriceSource + ?Sized,
{
    fn latest_price(&self, feed: &FeedId) -> Result<PriceReading, OracleError> {
        (**self).latest_price(feed)
    }
}
