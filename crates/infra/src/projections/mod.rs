//! Projection implementations (read model builders).
//!
//! Projections consume committed group events from the bus (or a replayed
//! stream) and build disposable read models. All are rebuildable from the
//! stream and idempotent under at-least-once delivery.

pub mod activity;

pub use activity::{ActivityEntry, GroupActivity, decode_envelope};
