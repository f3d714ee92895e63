//! Group expense ledger: membership, expenses and balances as one
//! event-sourced aggregate.

pub mod balances;
pub mod expenses;
pub mod group;
pub mod members;

pub use balances::{BalanceSheet, Split, split_equally};
pub use expenses::{Expense, ExpenseLedger};
pub use group::{
    AddExpense, AddMember, CreateGroup, DebtSettled, ExpenseAdded, ExpenseSettled,
    GROUP_AGGREGATE_TYPE, Group, GroupCommand, GroupCreated, GroupEvent, MemberAdded,
    MemberRemoved, RecordSettlement, RemovalPolicy, RemoveMember, RemoveSelf, SettleExpense,
};
pub use members::MemberRegistry;
