//! Domain error model.

use thiserror::Error;

use crate::id::Address;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic rejection of a command: the ledger state
/// is unchanged when one is returned. Oracle and transfer failures live in
/// their own crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The caller lacks the required role (owner or member).
    #[error("unauthorized")]
    Unauthorized,

    /// Self-removal where the address at the index is not the caller.
    #[error("can only remove yourself")]
    NotSelf,

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("address {0} is already a member")]
    DuplicateMember(Address),

    /// Expense amount must be a positive number of cents.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Settlement creditor is not a current member.
    #[error("creditor is not a member")]
    InvalidCreditor,

    /// Settlement caller does not owe anything.
    #[error("caller has no debt")]
    NoDebt,

    #[error("creditor is not owed anything")]
    CreditorHasNoCredit,

    /// Attached value is worth less than one cent.
    #[error("payment is worth less than one cent")]
    PaymentTooSmall,

    /// Removal refused because the member still has a non-zero balance.
    #[error("member {address} has unsettled balance {balance}")]
    UnsettledBalance { address: Address, balance: i64 },

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,

    /// A conflict occurred (stale version, group already created).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }
}
