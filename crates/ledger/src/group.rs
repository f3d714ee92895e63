use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitter_core::{
    Address, Aggregate, AggregateRoot, Cents, DomainError, GroupId, PriceFeeds, ValueUnits,
};
use splitter_events::Event;

use crate::balances::{BalanceSheet, split_equally};
use crate::expenses::{Expense, ExpenseLedger};
use crate::members::MemberRegistry;

/// Aggregate type of group streams in the event store.
pub const GROUP_AGGREGATE_TYPE: &str = "splitter.group";

/// What happens to a member's balance when they leave the group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Drop the balance; it is accounted as orphaned, never redistributed.
    #[default]
    ForfeitBalance,
    /// Refuse to remove a member whose balance is not zero.
    RequireSettled,
}

/// Aggregate root: one expense-splitting group (the ledger instance).
///
/// Owns the membership registry, the expense ledger and the balance sheet.
/// Nothing outside the command set below can mutate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    id: GroupId,
    name: String,
    owner: Option<Address>,
    feeds: Option<PriceFeeds>,
    removal_policy: RemovalPolicy,
    members: MemberRegistry,
    expenses: ExpenseLedger,
    balances: BalanceSheet,
    version: u64,
    created: bool,
}

impl Group {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: GroupId) -> Self {
        Self {
            id,
            name: String::new(),
            owner: None,
            feeds: None,
            removal_policy: RemovalPolicy::default(),
            members: MemberRegistry::new(),
            expenses: ExpenseLedger::new(),
            balances: BalanceSheet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> GroupId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<Address> {
        self.owner
    }

    pub fn feeds(&self) -> Option<&PriceFeeds> {
        self.feeds.as_ref()
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    /// Members in current registry order. Indices are not stable across removals.
    pub fn members(&self) -> &[Address] {
        self.members.as_slice()
    }

    pub fn is_member(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    pub fn member_index(&self, address: &Address) -> Option<usize> {
        self.members.index_of(address)
    }

    pub fn expenses(&self) -> &[Expense] {
        self.expenses.as_slice()
    }

    pub fn expense(&self, index: usize) -> Option<&Expense> {
        self.expenses.get(index)
    }

    pub fn balance(&self, address: &Address) -> Cents {
        self.balances.balance(address)
    }

    /// Parallel sequences in registry order.
    pub fn all_balances(&self) -> (Vec<Address>, Vec<Cents>) {
        let addresses = self.members.as_slice().to_vec();
        let balances = addresses.iter().map(|a| self.balances.balance(a)).collect();
        (addresses, balances)
    }

    /// Balances forfeited by removals under [`RemovalPolicy::ForfeitBalance`].
    pub fn orphaned_balance(&self) -> Cents {
        self.balances.orphaned()
    }

    /// `Σ balances + orphaned == 0`.
    pub fn is_zero_sum(&self) -> bool {
        self.balances.is_zero_sum()
    }

    /// Settlement preconditions: returns `min(|debtor balance|, creditor balance)`.
    ///
    /// The cap uses each side's total position, not what is owed between this
    /// particular pair.
    pub fn settlement_cap(&self, debtor: &Address, creditor: &Address) -> Result<Cents, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.members.contains(debtor) {
            return Err(DomainError::Unauthorized);
        }
        if !self.members.contains(creditor) {
            return Err(DomainError::InvalidCreditor);
        }
        let owed = self.balances.balance(debtor);
        if owed >= 0 {
            return Err(DomainError::NoDebt);
        }
        let credit = self.balances.balance(creditor);
        if credit <= 0 {
            return Err(DomainError::CreditorHasNoCredit);
        }
        // owed < 0, so -(owed) cannot overflow unless owed == MIN, which the
        // split overflow check prevents.
        Ok(owed.saturating_neg().min(credit))
    }
}

impl AggregateRoot for Group {
    type Id = GroupId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateGroup. The owner becomes the first member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroup {
    pub group_id: GroupId,
    pub name: String,
    pub owner: Address,
    pub feeds: PriceFeeds,
    pub removal_policy: RemovalPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddMember (owner only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMember {
    pub group_id: GroupId,
    pub caller: Address,
    pub member: Address,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveMember (owner only, by current index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMember {
    pub group_id: GroupId,
    pub caller: Address,
    pub index: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveSelf (the address at `index` must be the caller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveSelf {
    pub group_id: GroupId,
    pub caller: Address,
    pub index: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddExpense (members only, paid by the caller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddExpense {
    pub group_id: GroupId,
    pub caller: Address,
    /// Cents; must be positive.
    pub amount: Cents,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SettleExpense. Flags an expense; moves no value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleExpense {
    pub group_id: GroupId,
    pub caller: Address,
    pub index: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordSettlement.
///
/// Issued by the settlement engine once the value transfer has gone through.
/// The cap is re-checked against the current balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSettlement {
    pub group_id: GroupId,
    pub debtor: Address,
    pub creditor: Address,
    pub amount_cents: Cents,
    #[serde(with = "splitter_core::money::units_as_string")]
    pub value_units: ValueUnits,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupCommand {
    CreateGroup(CreateGroup),
    AddMember(AddMember),
    RemoveMember(RemoveMember),
    RemoveSelf(RemoveSelf),
    AddExpense(AddExpense),
    SettleExpense(SettleExpense),
    RecordSettlement(RecordSettlement),
}

impl GroupCommand {
    pub fn group_id(&self) -> GroupId {
        match self {
            GroupCommand::CreateGroup(c) => c.group_id,
            GroupCommand::AddMember(c) => c.group_id,
            GroupCommand::RemoveMember(c) => c.group_id,
            GroupCommand::RemoveSelf(c) => c.group_id,
            GroupCommand::AddExpense(c) => c.group_id,
            GroupCommand::SettleExpense(c) => c.group_id,
            GroupCommand::RecordSettlement(c) => c.group_id,
        }
    }

    /// Short command name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            GroupCommand::CreateGroup(_) => "create_group",
            GroupCommand::AddMember(_) => "add_member",
            GroupCommand::RemoveMember(_) => "remove_member",
            GroupCommand::RemoveSelf(_) => "remove_self",
            GroupCommand::AddExpense(_) => "add_expense",
            GroupCommand::SettleExpense(_) => "settle_expense",
            GroupCommand::RecordSettlement(_) => "record_settlement",
        }
    }
}

/// Event: GroupCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreated {
    pub group_id: GroupId,
    pub name: String,
    pub owner: Address,
    pub feeds: PriceFeeds,
    pub removal_policy: RemovalPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAdded {
    pub group_id: GroupId,
    pub address: Address,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberRemoved.
///
/// `address` is the member that was at `index` before the swap-and-pop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRemoved {
    pub group_id: GroupId,
    pub address: Address,
    pub index: usize,
    /// Balance dropped with the member (zero under `RequireSettled`).
    pub forfeited: Cents,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpenseAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseAdded {
    pub group_id: GroupId,
    pub index: usize,
    pub payer: Address,
    pub amount_cents: Cents,
    pub description: String,
    pub share: Cents,
    pub payer_credit: Cents,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpenseSettled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseSettled {
    pub group_id: GroupId,
    pub index: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DebtSettled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSettled {
    pub group_id: GroupId,
    pub debtor: Address,
    pub creditor: Address,
    pub amount_cents: Cents,
    #[serde(with = "splitter_core::money::units_as_string")]
    pub value_units_transferred: ValueUnits,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEvent {
    GroupCreated(GroupCreated),
    MemberAdded(MemberAdded),
    MemberRemoved(MemberRemoved),
    ExpenseAdded(ExpenseAdded),
    ExpenseSettled(ExpenseSettled),
    DebtSettled(DebtSettled),
}

impl Event for GroupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GroupEvent::GroupCreated(_) => "splitter.group.created",
            GroupEvent::MemberAdded(_) => "splitter.group.member_added",
            GroupEvent::MemberRemoved(_) => "splitter.group.member_removed",
            GroupEvent::ExpenseAdded(_) => "splitter.group.expense_added",
            GroupEvent::ExpenseSettled(_) => "splitter.group.expense_settled",
            GroupEvent::DebtSettled(_) => "splitter.group.debt_settled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GroupEvent::GroupCreated(e) => e.occurred_at,
            GroupEvent::MemberAdded(e) => e.occurred_at,
            GroupEvent::MemberRemoved(e) => e.occurred_at,
            GroupEvent::ExpenseAdded(e) => e.occurred_at,
            GroupEvent::ExpenseSettled(e) => e.occurred_at,
            GroupEvent::DebtSettled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Group {
    type Command = GroupCommand;
    type Event = GroupEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GroupEvent::GroupCreated(e) => {
                self.id = e.group_id;
                self.name = e.name.clone();
                self.owner = Some(e.owner);
                self.feeds = Some(e.feeds.clone());
                self.removal_policy = e.removal_policy;
                let _ = self.members.push(e.owner);
                self.balances.open(e.owner);
                self.created = true;
            }
            GroupEvent::MemberAdded(e) => {
                if self.members.push(e.address).is_ok() {
                    self.balances.open(e.address);
                }
            }
            GroupEvent::MemberRemoved(e) => {
                if let Ok(removed) = self.members.swap_remove(e.index) {
                    self.balances.close(&removed);
                }
            }
            GroupEvent::ExpenseAdded(e) => {
                self.expenses.push(Expense {
                    index: e.index,
                    payer: e.payer,
                    amount: e.amount_cents,
                    description: e.description.clone(),
                    settled: false,
                    recorded_at: e.occurred_at,
                });
                self.balances
                    .apply_split(&e.payer, e.share, e.payer_credit, self.members.as_slice());
            }
            GroupEvent::ExpenseSettled(e) => {
                self.expenses.mark_settled(e.index);
            }
            GroupEvent::DebtSettled(e) => {
                self.balances
                    .record_repayment(&e.debtor, &e.creditor, e.amount_cents);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            GroupCommand::CreateGroup(cmd) => self.handle_create(cmd),
            GroupCommand::AddMember(cmd) => self.handle_add_member(cmd),
            GroupCommand::RemoveMember(cmd) => self.handle_remove_member(cmd),
            GroupCommand::RemoveSelf(cmd) => self.handle_remove_self(cmd),
            GroupCommand::AddExpense(cmd) => self.handle_add_expense(cmd),
            GroupCommand::SettleExpense(cmd) => self.handle_settle_expense(cmd),
            GroupCommand::RecordSettlement(cmd) => self.handle_record_settlement(cmd),
        }
    }
}

impl Group {
    fn ensure_group(&self, group_id: GroupId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != group_id {
            return Err(DomainError::invariant("group_id mismatch"));
        }
        Ok(())
    }

    fn ensure_owner(&self, caller: &Address) -> Result<(), DomainError> {
        if self.owner.as_ref() != Some(caller) {
            return Err(DomainError::Unauthorized);
        }
        Ok(())
    }

    fn ensure_member(&self, caller: &Address) -> Result<(), DomainError> {
        if !self.members.contains(caller) {
            return Err(DomainError::Unauthorized);
        }
        Ok(())
    }

    /// Shared tail of both removal paths.
    fn removal_event(
        &self,
        group_id: GroupId,
        index: usize,
        address: Address,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<GroupEvent>, DomainError> {
        let balance = self.balances.balance(&address);
        if balance != 0 && self.removal_policy == RemovalPolicy::RequireSettled {
            return Err(DomainError::UnsettledBalance { address, balance });
        }
        Ok(vec![GroupEvent::MemberRemoved(MemberRemoved {
            group_id,
            address,
            index,
            forfeited: balance,
            occurred_at,
        })])
    }

    fn handle_create(&self, cmd: &CreateGroup) -> Result<Vec<GroupEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("group already exists"));
        }
        if self.id != cmd.group_id {
            return Err(DomainError::invariant("group_id mismatch"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("group name cannot be empty"));
        }
        Ok(vec![GroupEvent::GroupCreated(GroupCreated {
            group_id: cmd.group_id,
            name: cmd.name.trim().to_string(),
            owner: cmd.owner,
            feeds: cmd.feeds.clone(),
            removal_policy: cmd.removal_policy,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_member(&self, cmd: &AddMember) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_group(cmd.group_id)?;
        self.ensure_owner(&cmd.caller)?;
        if self.members.contains(&cmd.member) {
            return Err(DomainError::DuplicateMember(cmd.member));
        }
        Ok(vec![GroupEvent::MemberAdded(MemberAdded {
            group_id: cmd.group_id,
            address: cmd.member,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_member(&self, cmd: &RemoveMember) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_group(cmd.group_id)?;
        self.ensure_owner(&cmd.caller)?;
        let address = self.members.at(cmd.index)?;
        self.removal_event(cmd.group_id, cmd.index, address, cmd.occurred_at)
    }

    fn handle_remove_self(&self, cmd: &RemoveSelf) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_group(cmd.group_id)?;
        self.ensure_member(&cmd.caller)?;
        let address = self.members.at(cmd.index)?;
        if address != cmd.caller {
            return Err(DomainError::NotSelf);
        }
        self.removal_event(cmd.group_id, cmd.index, address, cmd.occurred_at)
    }

    fn handle_add_expense(&self, cmd: &AddExpense) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_group(cmd.group_id)?;
        self.ensure_member(&cmd.caller)?;

        let split = split_equally(cmd.amount, self.members.len())?;
        self.balances
            .check_split(&cmd.caller, &split, self.members.as_slice())?;

        Ok(vec![GroupEvent::ExpenseAdded(ExpenseAdded {
            group_id: cmd.group_id,
            index: self.expenses.next_index(),
            payer: cmd.caller,
            amount_cents: cmd.amount,
            description: cmd.description.clone(),
            share: split.share,
            payer_credit: split.payer_credit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_settle_expense(&self, cmd: &SettleExpense) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_group(cmd.group_id)?;
        self.ensure_member(&cmd.caller)?;
        let expense = self
            .expenses
            .get(cmd.index)
            .ok_or_else(|| DomainError::index_out_of_range(cmd.index, self.expenses.len()))?;

        // Already settled: no state change, no event.
        if expense.settled {
            return Ok(vec![]);
        }
        Ok(vec![GroupEvent::ExpenseSettled(ExpenseSettled {
            group_id: cmd.group_id,
            index: cmd.index,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_settlement(
        &self,
        cmd: &RecordSettlement,
    ) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_group(cmd.group_id)?;
        let cap = self.settlement_cap(&cmd.debtor, &cmd.creditor)?;
        if cmd.amount_cents <= 0 {
            return Err(DomainError::PaymentTooSmall);
        }
        if cmd.amount_cents > cap {
            return Err(DomainError::invariant(format!(
                "settlement of {} cents exceeds cap of {cap}",
                cmd.amount_cents
            )));
        }
        Ok(vec![GroupEvent::DebtSettled(DebtSettled {
            group_id: cmd.group_id,
            debtor: cmd.debtor,
            creditor: cmd.creditor,
            amount_cents: cmd.amount_cents,
            value_units_transferred: cmd.value_units,
            occurred_at: cmd.occurred_at,
        })])
    }
}
