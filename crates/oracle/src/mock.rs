//! Mock price source for testing
//!
//! Holds fixed readings that can be replaced at any time, including readings
//! with a timestamp in the past to exercise staleness checks.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};

use splitter_core::FeedId;

use crate::error::OracleError;
use crate::types::{PriceReading, PriceSource};

/// Decimals used by the default feeds.
pub const MOCK_FEED_DECIMALS: u32 = 8;

#[derive(Debug, Default)]
pub struct MockPriceSource {
    readings: RwLock<HashMap<FeedId, PriceReading>>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ETH/USD` at 3000.00 and `EUR/USD` at 1.08, both with 8 decimals.
    pub fn with_defaults() -> Self {
        let source = Self::new();
        source.set_price("ETH/USD", 300_000_000_000, MOCK_FEED_DECIMALS);
        source.set_price("EUR/USD", 108_000_000, MOCK_FEED_DECIMALS);
        source
    }

    /// Set a fresh reading for a feed.
    pub fn set_price(&self, feed: impl Into<FeedId>, value: i128, decimals: u32) {
        self.set_reading(feed, PriceReading::fresh(value, decimals));
    }

    /// Set a reading last updated `age` ago.
    pub fn set_aged_price(&self, feed: impl Into<FeedId>, value: i128, decimals: u32, age: Duration) {
        self.set_reading(feed, PriceReading::new(value, decimals, Utc::now() - age));
    }

    pub fn set_reading(&self, feed: impl Into<FeedId>, reading: PriceReading) {
        if let Ok(mut readings) = self.readings.write() {
            readings.insert(feed.into(), reading);
        }
    }

    pub fn remove_price(&self, feed: &FeedId) {
        if let Ok(mut readings) = self.readings.write() {
            readings.remove(feed);
        }
    }

    pub fn feed_count(&self) -> usize {
        self.readings.read().map(|r| r.len()).unwrap_or(0)
    }
}

impl PriceSource for MockPriceSource {
    fn latest_price(&self, feed: &FeedId) -> Result<PriceReading, OracleError> {
        let readings = self
            .readings
            .read()
            .map_err(|_| OracleError::Unavailable("mock price source lock poisoned".to_string()))?;
        readings
            .get(feed)
            .copied()
            .ok_or_else(|| OracleError::FeedNotFound { feed: feed.clone() })
    }
}
