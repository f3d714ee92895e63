//! Price adapter: validated feed readings and fixed-point conversion between
//! fiat cents and value units.
//!
//! ```text
//! units = cents * fiat_usd * 10^18 * 10^value_decimals
//!         / (100 * value_usd * 10^fiat_decimals)
//! ```
//!
//! All arithmetic is checked `u128`; results are floored.

use chrono::{Duration, Utc};

use splitter_core::{CENTS_PER_FIAT, Cents, FeedId, PriceFeeds, VALUE_UNIT_DECIMALS, ValueUnits};

use crate::error::OracleError;
use crate::types::{PriceReading, PriceSource};

/// Default maximum age of a price reading.
pub const DEFAULT_MAX_PRICE_AGE_SECS: i64 = 3600;

fn pow10(exp: u32) -> Result<u128, OracleError> {
    10u128.checked_pow(exp).ok_or(OracleError::Overflow)
}

/// Snapshot of both validated readings used for every conversion of one
/// operation.
///
/// Conversions through the same quote are consistent with each other:
/// `cents_to_units(units_to_cents(u)) <= u`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    feeds: PriceFeeds,
    value_usd: PriceReading,
    fiat_usd: PriceReading,
    // units = cents * numerator / denominator
    numerator: u128,
    denominator: u128,
}

impl Quote {
    pub(crate) fn from_readings(
        feeds: PriceFeeds,
        value_usd: PriceReading,
        fiat_usd: PriceReading,
    ) -> Result<Self, OracleError> {
        let value_price = u128::try_from(value_usd.value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| OracleError::InvalidPrice {
                feed: feeds.value_usd.clone(),
                value: value_usd.value,
            })?;
        let fiat_price = u128::try_from(fiat_usd.value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| OracleError::InvalidPrice {
                feed: feeds.fiat_usd.clone(),
                value: fiat_usd.value,
            })?;

        // Only the difference in feed decimals matters; cancel the common part.
        let (num_scale, den_scale) = if value_usd.decimals >= fiat_usd.decimals {
            (pow10(value_usd.decimals - fiat_usd.decimals)?, 1)
        } else {
            (1, pow10(fiat_usd.decimals - value_usd.decimals)?)
        };

        let numerator = fiat_price
            .checked_mul(pow10(VALUE_UNIT_DECIMALS)?)
            .and_then(|n| n.checked_mul(num_scale))
            .ok_or(OracleError::Overflow)?;
        let denominator = CENTS_PER_FIAT
            .checked_mul(value_price)
            .and_then(|d| d.checked_mul(den_scale))
            .ok_or(OracleError::Overflow)?;

        Ok(Self {
            feeds,
            value_usd,
            fiat_usd,
            numerator,
            denominator,
        })
    }

    pub fn feeds(&self) -> &PriceFeeds {
        &self.feeds
    }

    pub fn value_usd(&self) -> PriceReading {
        self.value_usd
    }

    pub fn fiat_usd(&self) -> PriceReading {
        self.fiat_usd
    }

    /// Value units worth `cents` (floor).
    pub fn cents_to_units(&self, cents: Cents) -> Result<ValueUnits, OracleError> {
        let cents = u128::try_from(cents).map_err(|_| OracleError::NegativeAmount(cents))?;
        cents
            .checked_mul(self.numerator)
            .map(|n| n / self.denominator)
            .ok_or(OracleError::Overflow)
    }

    /// Whole cents worth `units` (floor).
    pub fn units_to_cents(&self, units: ValueUnits) -> Result<Cents, OracleError> {
        let cents = units
            .checked_mul(self.denominator)
            .map(|n| n / self.numerator)
            .ok_or(OracleError::Overflow)?;
        Cents::try_from(cents).map_err(|_| OracleError::Overflow)
    }

    /// Value units per cent at this quote.
    pub fn units_per_cent(&self) -> ValueUnits {
        self.numerator / self.denominator
    }
}

/// Reads feeds through a [`PriceSource`] and rejects unusable readings.
///
/// No caching: every call reads the source again.
#[derive(Debug, Clone)]
pub struct PriceAdapter<P> {
    source: P,
    max_age: Duration,
}

impl<P> PriceAdapter<P>
where
    P: PriceSource,
{
    pub fn new(source: P, max_age: Duration) -> Self {
        Self { source, max_age }
    }

    pub fn with_default_max_age(source: P) -> Self {
        Self::new(source, Duration::seconds(DEFAULT_MAX_PRICE_AGE_SECS))
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Latest reading of `feed`, rejected when non-positive or stale.
    pub fn get_price(&self, feed: &FeedId) -> Result<PriceReading, OracleError> {
        let reading = self.source.latest_price(feed)?;

        if reading.value <= 0 {
            tracing::warn!(feed = %feed, value = %reading.value, "invalid price reading");
            return Err(OracleError::InvalidPrice {
                feed: feed.clone(),
                value: reading.value,
            });
        }

        let age = Utc::now().signed_duration_since(reading.updated_at);
        if age > self.max_age {
            tracing::warn!(
                feed = %feed,
                age_secs = age.num_seconds(),
                max_age_secs = self.max_age.num_seconds(),
                "stale price reading"
            );
            return Err(OracleError::StalePrice {
                feed: feed.clone(),
                age_secs: age.num_seconds(),
                max_age_secs: self.max_age.num_seconds(),
            });
        }

        Ok(reading)
    }

    /// Read and validate both feeds, then snapshot them.
    pub fn quote(&self, feeds: &PriceFeeds) -> Result<Quote, OracleError> {
        let value_usd = self.get_price(&feeds.value_usd)?;
        let fiat_usd = self.get_price(&feeds.fiat_usd)?;
        Quote::from_readings(feeds.clone(), value_usd, fiat_usd)
    }

    pub fn convert_cents_to_value_units(
        &self,
        feeds: &PriceFeeds,
        cents: Cents,
    ) -> Result<ValueUnits, OracleError> {
        self.quote(feeds)?.cents_to_units(cents)
    }

    pub fn units_per_cent(&self, feeds: &PriceFeeds) -> Result<ValueUnits, OracleError> {
        self.convert_cents_to_value_units(feeds, 1)
    }

    pub fn value_usd_price(&self, feeds: &PriceFeeds) -> Result<PriceReading, OracleError> {
        self.get_price(&feeds.value_usd)
    }

    pub fn fiat_usd_price(&self, feeds: &PriceFeeds) -> Result<PriceReading, OracleError> {
        self.get_price(&feeds.fiat_usd)
    }
}
