//! Infrastructure layer: event store, command pipeline, value transfer,
//! settlement, group registry, service facade and configuration.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod registry;
pub mod service;
pub mod settlement;
pub mod transfer;

#[cfg(test)]
mod test_support;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::{ConfigError, SplitterConfig};
pub use registry::{GroupRegistry, GroupSummary};
pub use service::{LedgerError, LedgerService};
pub use settlement::{SettlementEngine, SettlementError, SettlementReceipt};
pub use transfer::{InMemoryValueTransfer, TransferError, TransferKind, TransferReceipt, ValueTransfer};
