//! Append-only expense records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitter_core::{Address, Cents};

/// One recorded expense (immutable apart from `settled`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    /// Position in creation order.
    pub index: usize,
    pub payer: Address,
    /// Positive amount in cents.
    pub amount: Cents,
    pub description: String,
    /// Bookkeeping flag only; never affects balances.
    pub settled: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseLedger {
    entries: Vec<Expense>,
}

impl ExpenseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index the next expense will receive.
    pub fn next_index(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<&Expense> {
        self.entries.get(index)
    }

    pub fn as_slice(&self) -> &[Expense] {
        &self.entries
    }

    pub fn push(&mut self, expense: Expense) {
        self.entries.push(expense);
    }

    /// Flip the flag; returns false when it was already set or missing.
    pub fn mark_settled(&mut self, index: usize) -> bool {
        match self.entries.get_mut(index) {
            Some(e) if !e.settled => {
                e.settled = true;
                true
            }
            _ => false,
        }
    }
}
