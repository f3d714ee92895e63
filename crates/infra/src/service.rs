//! Ledger service: the read and write surface over one process's groups.
//!
//! Writes go through the command dispatcher (or the settlement engine for
//! debt settlement). Reads rehydrate the group from its stream each time.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;

use splitter_core::{Address, Cents, DomainError, GroupId, ValueUnits};
use splitter_events::{EventBus, EventEnvelope};
use splitter_ledger::{
    AddExpense, AddMember, Expense, GROUP_AGGREGATE_TYPE, Group, GroupCommand, GroupEvent, RemoveMember,
    RemoveSelf, SettleExpense,
};
use splitter_oracle::{OracleError, PriceAdapter, PriceReading, PriceSource};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::registry::{GroupRegistry, GroupSummary};
use crate::settlement::{SettlementEngine, SettlementError, SettlementReceipt};
use crate::transfer::ValueTransfer;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl LedgerError {
    /// The underlying domain rejection, whichever layer surfaced it.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            LedgerError::Dispatch(e) => e.as_domain(),
            LedgerError::Settlement(e) => e.as_domain(),
            LedgerError::Oracle(_) => None,
        }
    }

    fn not_found() -> Self {
        LedgerError::Dispatch(DispatchError::Domain(DomainError::NotFound))
    }
}

pub struct LedgerService<S, B, P, T> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    registry: GroupRegistry<S, B>,
    prices: Arc<PriceAdapter<P>>,
    settlement: SettlementEngine<S, B, P, T>,
}

impl<S, B, P, T> LedgerService<S, B, P, T>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    P: PriceSource,
    T: ValueTransfer,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        registry: GroupRegistry<S, B>,
        prices: Arc<PriceAdapter<P>>,
        transfers: T,
    ) -> Self {
        let settlement = SettlementEngine::new(dispatcher.clone(), prices.clone(), transfers);
        Self {
            dispatcher,
            registry,
            prices,
            settlement,
        }
    }

    pub fn registry(&self) -> &GroupRegistry<S, B> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn transfers(&self) -> &T {
        self.settlement.transfers()
    }

    fn dispatch(&self, group_id: GroupId, command: GroupCommand) -> Result<Vec<StoredEvent>, LedgerError> {
        Ok(self
            .dispatcher
            .dispatch(group_id.into(), GROUP_AGGREGATE_TYPE, command, |id| Group::empty(id.into()))?)
    }

    /// Current state of a group; `NotFound` when it was never created.
    pub fn group(&self, group_id: GroupId) -> Result<Group, LedgerError> {
        let group: Group = self
            .dispatcher
            .load(group_id.into(), |id| Group::empty(id.into()))?;
        if !group.is_created() {
            return Err(LedgerError::not_found());
        }
        Ok(group)
    }

    // ---- writes ----

    pub fn create_group(&self, name: &str, owner: Address) -> Result<GroupId, LedgerError> {
        Ok(self.registry.create_group(name, owner)?)
    }

    pub fn list_groups(&self) -> Vec<GroupSummary> {
        self.registry.list_groups()
    }

    pub fn add_member(&self, group_id: GroupId, caller: Address, member: Address) -> Result<(), LedgerError> {
        self.dispatch(
            group_id,
            GroupCommand::AddMember(AddMember {
                group_id,
                caller,
                member,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn remove_member(&self, group_id: GroupId, caller: Address, index: usize) -> Result<(), LedgerError> {
        self.dispatch(
            group_id,
            GroupCommand::RemoveMember(RemoveMember {
                group_id,
                caller,
                index,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn remove_self(&self, group_id: GroupId, caller: Address, index: usize) -> Result<(), LedgerError> {
        self.dispatch(
            group_id,
            GroupCommand::RemoveSelf(RemoveSelf {
                group_id,
                caller,
                index,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Record an expense paid by `caller`; returns its index.
    pub fn add_expense(
        &self,
        group_id: GroupId,
        caller: Address,
        amount: Cents,
        description: &str,
    ) -> Result<usize, LedgerError> {
        let committed = self.dispatch(
            group_id,
            GroupCommand::AddExpense(AddExpense {
                group_id,
                caller,
                amount,
                description: description.to_string(),
                occurred_at: Utc::now(),
            }),
        )?;
        let index = committed
            .iter()
            .find_map(|stored| match serde_json::from_value(stored.payload.clone()) {
                Ok(GroupEvent::ExpenseAdded(e)) => Some(e.index),
                _ => None,
            })
            .ok_or_else(|| {
                DispatchError::Deserialize("expense_added payload missing from commit".to_string())
            })?;
        tracing::debug!(group_id = %group_id, index, amount, "expense recorded");
        Ok(index)
    }

    pub fn settle_expense(&self, group_id: GroupId, caller: Address, index: usize) -> Result<(), LedgerError> {
        self.dispatch(
            group_id,
            GroupCommand::SettleExpense(SettleExpense {
                group_id,
                caller,
                index,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn settle_debt(
        &self,
        group_id: GroupId,
        debtor: Address,
        creditor: Address,
        sent_units: ValueUnits,
    ) -> Result<SettlementReceipt, LedgerError> {
        Ok(self.settlement.settle_debt(group_id, debtor, creditor, sent_units)?)
    }

    // ---- reads ----

    pub fn name(&self, group_id: GroupId) -> Result<String, LedgerError> {
        Ok(self.group(group_id)?.name().to_string())
    }

    pub fn owner(&self, group_id: GroupId) -> Result<Address, LedgerError> {
        self.group(group_id)?.owner().ok_or_else(LedgerError::not_found)
    }

    pub fn members(&self, group_id: GroupId) -> Result<Vec<Address>, LedgerError> {
        Ok(self.group(group_id)?.members().to_vec())
    }

    pub fn is_member(&self, group_id: GroupId, address: &Address) -> Result<bool, LedgerError> {
        Ok(self.group(group_id)?.is_member(address))
    }

    pub fn member_index(&self, group_id: GroupId, address: &Address) -> Result<Option<usize>, LedgerError> {
        Ok(self.group(group_id)?.member_index(address))
    }

    pub fn expenses(&self, group_id: GroupId) -> Result<Vec<Expense>, LedgerError> {
        Ok(self.group(group_id)?.expenses().to_vec())
    }

    pub fn balance(&self, group_id: GroupId, address: &Address) -> Result<Cents, LedgerError> {
        Ok(self.group(group_id)?.balance(address))
    }

    pub fn all_balances(&self, group_id: GroupId) -> Result<(Vec<Address>, Vec<Cents>), LedgerError> {
        Ok(self.group(group_id)?.all_balances())
    }

    pub fn value_usd_price(&self, group_id: GroupId) -> Result<PriceReading, LedgerError> {
        let group = self.group(group_id)?;
        let feeds = group.feeds().ok_or_else(LedgerError::not_found)?;
        Ok(self.prices.value_usd_price(feeds)?)
    }

    pub fn fiat_usd_price(&self, group_id: GroupId) -> Result<PriceReading, LedgerError> {
        let group = self.group(group_id)?;
        let feeds = group.feeds().ok_or_else(LedgerError::not_found)?;
        Ok(self.prices.fiat_usd_price(feeds)?)
    }

    pub fn units_per_cent(&self, group_id: GroupId) -> Result<ValueUnits, LedgerError> {
        let group = self.group(group_id)?;
        let feeds = group.feeds().ok_or_else(LedgerError::not_found)?;
        Ok(self.prices.units_per_cent(feeds)?)
    }
}
