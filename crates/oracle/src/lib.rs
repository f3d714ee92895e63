//! Price oracle port and conversion between expense cents and value units.
//!
//! The oracle itself is external; this crate defines the [`PriceSource`]
//! port, validates readings in [`PriceAdapter`] and provides a mock source
//! for tests and local runs.

mod adapter;
mod error;
mod mock;
mod types;

pub use adapter::{DEFAULT_MAX_PRICE_AGE_SECS, PriceAdapter, Quote};
pub use error::OracleError;
pub use mock::{MOCK_FEED_DECIMALS, MockPriceSource};
pub use types::{PriceReading, PriceSource};
