//! Oracle error types

use thiserror::Error;

use splitter_core::FeedId;

/// Price-feed and conversion errors.
///
/// Any of these aborts the operation that needed a price; nothing is
/// converted with a partially validated pair of readings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("price feed not found: {feed}")]
    FeedNotFound { feed: FeedId },

    /// Reported value is zero or negative.
    #[error("invalid price for {feed}: {value}")]
    InvalidPrice { feed: FeedId, value: i128 },

    /// Reading is older than the configured maximum age.
    #[error("stale price for {feed}: age {age_secs}s exceeds {max_age_secs}s")]
    StalePrice {
        feed: FeedId,
        age_secs: i64,
        max_age_secs: i64,
    },

    /// Fixed-point intermediate or result out of range.
    #[error("conversion overflow")]
    Overflow,

    #[error("negative amount: {0}")]
    NegativeAmount(i64),

    /// The price source itself could not be read.
    #[error("price source unavailable: {0}")]
    Unavailable(String),
}
