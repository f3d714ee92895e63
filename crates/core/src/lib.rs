//! `splitter-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod feed;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use feed::{FeedId, PriceFeeds};
pub use id::{Address, AggregateId, GroupId};
pub use money::{CENTS_PER_FIAT, Cents, VALUE_UNIT_DECIMALS, ValueUnits};
