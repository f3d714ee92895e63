//! Value-transfer port.
//!
//! A settlement moves value units in three kinds of leg: the debtor's attached
//! value is collected into escrow, the creditor is paid out of escrow, and any
//! excess is refunded to the debtor. Every completed leg yields a receipt that
//! can be reversed to undo it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use splitter_core::{Address, ValueUnits};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// From the counterparty into escrow.
    Collect,
    /// From escrow to the counterparty.
    Payout,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: Uuid,
    pub kind: TransferKind,
    pub counterparty: Address,
    pub units: ValueUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The recipient refused the transfer.
    #[error("transfer to {to} rejected: {reason}")]
    Rejected { to: Address, reason: String },

    #[error("insufficient funds at {address}: requested {requested}, available {available}")]
    InsufficientFunds {
        address: Address,
        requested: ValueUnits,
        available: ValueUnits,
    },

    #[error("insufficient escrow: requested {requested}, available {available}")]
    InsufficientEscrow {
        requested: ValueUnits,
        available: ValueUnits,
    },

    #[error("unknown transfer {0}")]
    UnknownTransfer(Uuid),

    #[error("transfer backend unavailable: {0}")]
    Unavailable(String),
}

/// Moves value units between accounts and the settlement escrow.
pub trait ValueTransfer: Send + Sync {
    /// Take `units` from `from` into escrow.
    fn collect(&self, from: Address, units: ValueUnits) -> Result<TransferReceipt, TransferError>;

    /// Pay `units` out of escrow to `to`.
    fn send(&self, to: Address, units: ValueUnits) -> Result<TransferReceipt, TransferError>;

    /// Undo a completed leg.
    fn reverse(&self, receipt: &TransferReceipt) -> Result<(), TransferError>;
}

impl<T> ValueTransfer for std::sync::Arc<T>
where
    T: ValueTransfer + ?Sized,
{
    fn collect(&self, from: Address, units: ValueUnits) -> Result<TransferReceipt, TransferError> {
        (**self).collect(from, units)
    }

    fn send(&self, to: Address, units: ValueUnits) -> Result<TransferReceipt, TransferError> {
        (**self).send(to, units)
    }

    fn reverse(&self, receipt: &TransferReceipt) -> Result<(), TransferError> {
        (**self).reverse(receipt)
    }
}

#[derive(Debug, Default)]
struct Ledger {
    accounts: HashMap<Address, ValueUnits>,
    escrow: ValueUnits,
    completed: HashMap<Uuid, TransferReceipt>,
    failing: HashSet<Address>,
}

/// In-memory accounts plus one escrow balance.
///
/// Payouts to an address registered with [`InMemoryValueTransfer::fail_for`]
/// are rejected, which models a recipient that refuses incoming value.
#[derive(Debug, Default)]
pub struct InMemoryValueTransfer {
    inner: Mutex<Ledger>,
}

impl InMemoryValueTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Ledger>, TransferError> {
        self.inner
            .lock()
            .map_err(|_| TransferError::Unavailable("transfer ledger lock poisoned".to_string()))
    }

    /// Credit an account out of thin air (test and demo wallets).
    pub fn fund(&self, address: Address, units: ValueUnits) {
        if let Ok(mut ledger) = self.lock() {
            let balance = ledger.accounts.entry(address).or_insert(0);
            *balance = balance.saturating_add(units);
        }
    }

    pub fn balance_of(&self, address: &Address) -> ValueUnits {
        self.lock()
            .map(|l| l.accounts.get(address).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn escrow(&self) -> ValueUnits {
        self.lock().map(|l| l.escrow).unwrap_or(0)
    }

    /// Make every payout to `address` fail.
    pub fn fail_for(&self, address: Address) {
        if let Ok(mut ledger) = self.lock() {
            ledger.failing.insert(address);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut ledger) = self.lock() {
            ledger.failing.clear();
        }
    }

    fn record(ledger: &mut Ledger, kind: TransferKind, counterparty: Address, units: ValueUnits) -> TransferReceipt {
        let receipt = TransferReceipt {
            transfer_id: Uuid::now_v7(),
            kind,
            counterparty,
            units,
        };
        ledger.completed.insert(receipt.transfer_id, receipt);
        receipt
    }
}

impl ValueTransfer for InMemoryValueTransfer {
    fn collect(&self, from: Address, units: ValueUnits) -> Result<TransferReceipt, TransferError> {
        let mut ledger = self.lock()?;
        let available = ledger.accounts.get(&from).copied().unwrap_or(0);
        if available < units {
            return Err(TransferError::InsufficientFunds {
                address: from,
                requested: units,
                available,
            });
        }
        ledger.accounts.insert(from, available - units);
        ledger.escrow += units;
        Ok(Self::record(&mut ledger, TransferKind::Collect, from, units))
    }

    fn send(&self, to: Address, units: ValueUnits) -> Result<TransferReceipt, TransferError> {
        let mut ledger = self.lock()?;
        if ledger.failing.contains(&to) {
            return Err(TransferError::Rejected {
                to,
                reason: "recipient refused value".to_string(),
            });
        }
        if ledger.escrow < units {
            return Err(TransferError::InsufficientEscrow {
                requested: units,
                available: ledger.escrow,
            });
        }
        ledger.escrow -= units;
        *ledger.accounts.entry(to).or_insert(0) += units;
        Ok(Self::record(&mut ledger, TransferKind::Payout, to, units))
    }

    fn reverse(&self, receipt: &TransferReceipt) -> Result<(), TransferError> {
        let mut ledger = self.lock()?;
        if !ledger.completed.contains_key(&receipt.transfer_id) {
            return Err(TransferError::UnknownTransfer(receipt.transfer_id));
        }

        match receipt.kind {
            TransferKind::Collect => {
                if ledger.escrow < receipt.units {
                    return Err(TransferError::InsufficientEscrow {
                        requested: receipt.units,
                        available: ledger.escrow,
                    });
                }
                ledger.escrow -= receipt.units;
                *ledger.accounts.entry(receipt.counterparty).or_insert(0) += receipt.units;
            }
            TransferKind::Payout => {
                let available = ledger.accounts.get(&receipt.counterparty).copied().unwrap_or(0);
                if available < receipt.units {
                    return Err(TransferError::InsufficientFunds {
                        address: receipt.counterparty,
                        requested: receipt.units,
                        available,
                    });
                }
                ledger.accounts.insert(receipt.counterparty, available - receipt.units);
                ledger.escrow += receipt.units;
            }
        }

        ledger.completed.remove(&receipt.transfer_id);
        Ok(())
    }
}
