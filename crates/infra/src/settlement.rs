//! Settlement engine: pays down a debtor's balance with value units.
//!
//! ```text
//! load group (version v) → cap = min(|debtor|, creditor)
//!   → quote both feeds once → size payment and refund
//!   → collect / pay / refund legs → RecordSettlement @ v
//! ```
//!
//! The legs happen before the ledger records anything. If a leg fails, or
//! the record is refused (e.g. another command changed the group meanwhile),
//! every completed leg is reversed and the ledger is left as it was. Once the
//! record is appended the settlement stands, even if publishing it fails.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use splitter_core::{Address, AggregateRoot, Cents, DomainError, ExpectedVersion, GroupId, ValueUnits};
use splitter_events::{EventBus, EventEnvelope};
use splitter_ledger::{GROUP_AGGREGATE_TYPE, Group, GroupCommand, RecordSettlement};
use splitter_oracle::{OracleError, PriceAdapter, PriceSource};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::transfer::{TransferError, TransferReceipt, ValueTransfer};

/// Outcome of a successful settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub group_id: GroupId,
    pub debtor: Address,
    pub creditor: Address,
    /// `min(|debtor balance|, creditor balance)` at the time of settlement.
    pub debt_cents: Cents,
    /// `debt_cents` converted at the settlement quote.
    pub owed_units: ValueUnits,
    /// Cents removed from the debtor's debt.
    pub paid_cents: Cents,
    /// Units paid to the creditor (never more than what was sent).
    pub transferred_units: ValueUnits,
    /// `sent - transferred_units`, returned to the debtor.
    pub refunded_units: ValueUnits,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    /// Settlement preconditions or the ledger record were rejected.
    #[error(transparent)]
    Domain(DomainError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// A value transfer leg failed; completed legs were reversed.
    #[error("value transfer failed: {0}")]
    TransferFailed(TransferError),

    /// A value transfer leg failed and undoing the earlier legs failed too.
    #[error("value transfer failed ({failure}) and reversal failed ({reversal})")]
    CompensationFailed {
        failure: String,
        reversal: TransferError,
    },

    #[error(transparent)]
    Dispatch(DispatchError),
}

impl SettlementError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            SettlementError::Domain(e) => Some(e),
            SettlementError::Dispatch(e) => e.as_domain(),
            _ => None,
        }
    }
}

impl From<DomainError> for SettlementError {
    fn from(value: DomainError) -> Self {
        SettlementError::Domain(value)
    }
}

impl From<DispatchError> for SettlementError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => SettlementError::Domain(e),
            other => SettlementError::Dispatch(other),
        }
    }
}

/// Orchestrates the oracle, the value-transfer port and the ledger for one
/// settlement at a time.
pub struct SettlementEngine<S, B, P, T> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    prices: Arc<PriceAdapter<P>>,
    transfers: T,
}

impl<S, B, P, T> SettlementEngine<S, B, P, T>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    P: PriceSource,
    T: ValueTransfer,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, prices: Arc<PriceAdapter<P>>, transfers: T) -> Self {
        Self {
            dispatcher,
            prices,
            transfers,
        }
    }

    pub fn transfers(&self) -> &T {
        &self.transfers
    }

    /// Settle as much of `debtor`'s debt to `creditor` as `sent_units` covers.
    pub fn settle_debt(
        &self,
        group_id: GroupId,
        debtor: Address,
        creditor: Address,
        sent_units: ValueUnits,
    ) -> Result<SettlementReceipt, SettlementError> {
        let group: Group = self
            .dispatcher
            .load(group_id.into(), |id| Group::empty(id.into()))?;
        let version = group.version();

        let debt_cents = group.settlement_cap(&debtor, &creditor)?;
        let feeds = group
            .feeds()
            .ok_or_else(|| DomainError::invariant("group has no price feeds"))?;

        // One snapshot for every conversion below, so transfer <= sent.
        let quote = self.prices.quote(feeds)?;
        let owed_units = quote.cents_to_units(debt_cents)?;
        let sent_cents = quote.units_to_cents(sent_units)?;
        if sent_cents <= 0 {
            return Err(DomainError::PaymentTooSmall.into());
        }

        let paid_cents = debt_cents.min(sent_cents);
        let transferred_units = quote.cents_to_units(paid_cents)?;
        let refunded_units = sent_units.saturating_sub(transferred_units);

        let mut legs: Vec<TransferReceipt> = Vec::with_capacity(3);
        let moved = self.move_value(
            &mut legs,
            debtor,
            creditor,
            sent_units,
            transferred_units,
            refunded_units,
        );
        if let Err(failure) = moved {
            tracing::warn!(
                group_id = %group_id,
                debtor = %debtor,
                creditor = %creditor,
                error = %failure,
                completed_legs = legs.len(),
                "settlement transfer failed, reversing"
            );
            self.compensate(&legs, failure.to_string())?;
            return Err(SettlementError::TransferFailed(failure));
        }

        let recorded = self.dispatcher.dispatch_expecting(
            group_id.into(),
            GROUP_AGGREGATE_TYPE,
            GroupCommand::RecordSettlement(RecordSettlement {
                group_id,
                debtor,
                creditor,
                amount_cents: paid_cents,
                value_units: transferred_units,
                occurred_at: Utc::now(),
            }),
            |id| Group::empty(id.into()),
            ExpectedVersion::Exact(version),
        );
        match recorded {
            Ok(_) => {}
            // The append committed before delivery failed; the legs stand.
            Err(DispatchError::Publish(reason)) => {
                tracing::warn!(
                    group_id = %group_id,
                    debtor = %debtor,
                    reason = %reason,
                    "settlement recorded but event publication failed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    group_id = %group_id,
                    debtor = %debtor,
                    error = %e,
                    "settlement record refused, reversing transfers"
                );
                self.compensate(&legs, e.to_string())?;
                return Err(e.into());
            }
        }

        tracing::info!(
            group_id = %group_id,
            debtor = %debtor,
            creditor = %creditor,
            paid_cents,
            transferred_units = %transferred_units,
            refunded_units = %refunded_units,
            "debt settled"
        );

        Ok(SettlementReceipt {
            group_id,
            debtor,
            creditor,
            debt_cents,
            owed_units,
            paid_cents,
            transferred_units,
            refunded_units,
        })
    }

    /// Collect the attached value, pay the creditor, refund the rest.
    /// Completed legs are pushed onto `legs` as they happen.
    fn move_value(
        &self,
        legs: &mut Vec<TransferReceipt>,
        debtor: Address,
        creditor: Address,
        sent_units: ValueUnits,
        transferred_units: ValueUnits,
        refunded_units: ValueUnits,
    ) -> Result<(), TransferError> {
        legs.push(self.transfers.collect(debtor, sent_units)?);
        legs.push(self.transfers.send(creditor, transferred_units)?);
        if refunded_units > 0 {
            legs.push(self.transfers.send(debtor, refunded_units)?);
        }
        Ok(())
    }

    /// Reverse completed legs, newest first.
    fn compensate(&self, legs: &[TransferReceipt], failure: String) -> Result<(), SettlementError> {
        for leg in legs.iter().rev() {
            if let Err(reversal) = self.transfers.reverse(leg) {
                tracing::error!(
                    transfer_id = %leg.transfer_id,
                    error = %reversal,
                    "failed to reverse settlement leg"
                );
                return Err(SettlementError::CompensationFailed { failure, reversal });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use proptest::prelude::*;
    use splitter_core::PriceFeeds;
    use splitter_ledger::{AddExpense, AddMember, CreateGroup, RemovalPolicy};
    use splitter_oracle::MockPriceSource;

    use crate::event_store::InMemoryEventStore;
    use crate::test_support::FlakyBus;
    use crate::transfer::InMemoryValueTransfer;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<FlakyBus>>;

    /// Units per cent at the mock defaults.
    const UNITS_PER_CENT: ValueUnits = 3_600_000_000_000;

    const WALLET: ValueUnits = 1_000_000_000_000_000_000;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn run(dispatcher: &Dispatcher, group_id: GroupId, command: GroupCommand) {
        dispatcher
            .dispatch(group_id.into(), GROUP_AGGREGATE_TYPE, command, |id| Group::empty(id.into()))
            .unwrap();
    }

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(FlakyBus::new()),
        ))
    }

    /// Two members, member 2 owes member 1 five units of currency.
    fn group_with_debt(dispatcher: &Dispatcher) -> GroupId {
        group_owing(dispatcher, 500)
    }

    /// Two members, member 2 owes member 1 `debt` cents.
    fn group_owing(dispatcher: &Dispatcher, debt: Cents) -> GroupId {
        let group_id = GroupId::new();
        run(
            dispatcher,
            group_id,
            GroupCommand::CreateGroup(CreateGroup {
                group_id,
                name: "Flat".to_string(),
                owner: addr(1),
                feeds: PriceFeeds::new("ETH/USD", "EUR/USD"),
                removal_policy: RemovalPolicy::ForfeitBalance,
                occurred_at: Utc::now(),
            }),
        );
        run(
            dispatcher,
            group_id,
            GroupCommand::AddMember(AddMember {
                group_id,
                caller: addr(1),
                member: addr(2),
                occurred_at: Utc::now(),
            }),
        );
        run(
            dispatcher,
            group_id,
            GroupCommand::AddExpense(AddExpense {
                group_id,
                caller: addr(1),
                amount: debt * 2,
                description: "Rent".to_string(),
                occurred_at: Utc::now(),
            }),
        );
        group_id
    }

    /// Transfers that let another writer touch the group mid-settlement.
    struct Interleaved {
        inner: InMemoryValueTransfer,
        dispatcher: Arc<Dispatcher>,
        group_id: GroupId,
        fired: AtomicBool,
    }

    impl ValueTransfer for Interleaved {
        fn collect(&self, from: Address, units: ValueUnits) -> Result<TransferReceipt, TransferError> {
            self.inner.collect(from, units)
        }

        fn send(&self, to: Address, units: ValueUnits) -> Result<TransferReceipt, TransferError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                run(
                    &self.dispatcher,
                    self.group_id,
                    GroupCommand::AddExpense(AddExpense {
                        group_id: self.group_id,
                        caller: addr(2),
                        amount: 200,
                        description: "Snacks".to_string(),
                        occurred_at: Utc::now(),
                    }),
                );
            }
            self.inner.send(to, units)
        }

        fn reverse(&self, receipt: &TransferReceipt) -> Result<(), TransferError> {
            self.inner.reverse(receipt)
        }
    }

    #[test]
    fn concurrent_change_during_settlement_reverses_transfers() {
        let dispatcher = dispatcher();
        let group_id = group_with_debt(&dispatcher);
        let prices = Arc::new(PriceAdapter::with_default_max_age(MockPriceSource::with_defaults()));

        let transfers = Interleaved {
            inner: InMemoryValueTransfer::new(),
            dispatcher: dispatcher.clone(),
            group_id,
            fired: AtomicBool::new(false),
        };
        transfers.inner.fund(addr(2), WALLET);
        let engine = SettlementEngine::new(dispatcher.clone(), prices.clone(), transfers);

        let sent = prices
            .convert_cents_to_value_units(&PriceFeeds::new("ETH/USD", "EUR/USD"), 500)
            .unwrap();
        let err = engine.settle_debt(group_id, addr(2), addr(1), sent).unwrap_err();

        assert!(matches!(err, SettlementError::Dispatch(DispatchError::Concurrency(_))));
        assert_eq!(engine.transfers().inner.balance_of(&addr(2)), WALLET);
        assert_eq!(engine.transfers().inner.balance_of(&addr(1)), 0);
        assert_eq!(engine.transfers().inner.escrow(), 0);

        // Only the interleaved expense landed: -500 + 100.
        let group: Group = dispatcher.load(group_id.into(), |id| Group::empty(id.into())).unwrap();
        assert_eq!(group.balance(&addr(2)), -400);
    }

    #[test]
    fn exact_payment_leaves_nothing_to_refund() {
        let dispatcher = dispatcher();
        let group_id = group_with_debt(&dispatcher);
        let prices = Arc::new(PriceAdapter::with_default_max_age(MockPriceSource::with_defaults()));
        let transfers = InMemoryValueTransfer::new();
        transfers.fund(addr(2), WALLET);
        let engine = SettlementEngine::new(dispatcher.clone(), prices.clone(), transfers);

        let owed = prices
            .convert_cents_to_value_units(&PriceFeeds::new("ETH/USD", "EUR/USD"), 500)
            .unwrap();
        let receipt = engine.settle_debt(group_id, addr(2), addr(1), owed).unwrap();

        assert_eq!(receipt.owed_units, owed);
        assert_eq!(receipt.transferred_units, owed);
        assert_eq!(receipt.refunded_units, 0);
        assert_eq!(engine.transfers().balance_of(&addr(1)), owed);
    }

    #[test]
    fn publish_failure_after_record_keeps_the_transfers() {
        let dispatcher = dispatcher();
        let group_id = group_with_debt(&dispatcher);
        dispatcher.bus().fail_publishes(true);

        let prices = Arc::new(PriceAdapter::with_default_max_age(MockPriceSource::with_defaults()));
        let transfers = InMemoryValueTransfer::new();
        transfers.fund(addr(2), WALLET);
        let engine = SettlementEngine::new(dispatcher.clone(), prices, transfers);

        let receipt = engine
            .settle_debt(group_id, addr(2), addr(1), 500 * UNITS_PER_CENT)
            .unwrap();

        assert_eq!(receipt.paid_cents, 500);
        assert_eq!(engine.transfers().balance_of(&addr(1)), 500 * UNITS_PER_CENT);
        assert_eq!(engine.transfers().balance_of(&addr(2)), WALLET - 500 * UNITS_PER_CENT);
        assert_eq!(engine.transfers().escrow(), 0);

        let group: Group = dispatcher.load(group_id.into(), |id| Group::empty(id.into())).unwrap();
        assert_eq!(group.balance(&addr(1)), 0);
        assert_eq!(group.balance(&addr(2)), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        #[test]
        fn settlement_is_capped_and_refunds_the_excess(
            debt in 1i64..100_000,
            sent_cents in 1u128..200_000,
            dust in 0u128..UNITS_PER_CENT,
        ) {
            let dispatcher = dispatcher();
            let group_id = group_owing(&dispatcher, debt);
            let prices = Arc::new(PriceAdapter::with_default_max_age(MockPriceSource::with_defaults()));
            let transfers = InMemoryValueTransfer::new();
            transfers.fund(addr(2), WALLET);
            let engine = SettlementEngine::new(dispatcher.clone(), prices, transfers);

            let sent = sent_cents * UNITS_PER_CENT + dust;
            let receipt = engine.settle_debt(group_id, addr(2), addr(1), sent).unwrap();

            let cap = debt.min(Cents::try_from(sent_cents).unwrap());
            prop_assert_eq!(receipt.debt_cents, debt);
            prop_assert_eq!(receipt.paid_cents, cap);
            prop_assert!(receipt.transferred_units <= receipt.owed_units);
            prop_assert_eq!(receipt.transferred_units, u128::try_from(cap).unwrap() * UNITS_PER_CENT);
            prop_assert_eq!(receipt.transferred_units + receipt.refunded_units, sent);

            let wallets = engine.transfers();
            prop_assert_eq!(wallets.balance_of(&addr(1)), receipt.transferred_units);
            prop_assert_eq!(wallets.balance_of(&addr(2)), WALLET - receipt.transferred_units);
            prop_assert_eq!(wallets.escrow(), 0);

            let group: Group = dispatcher.load(group_id.into(), |id| Group::empty(id.into())).unwrap();
            prop_assert_eq!(group.balance(&addr(2)), cap - debt);
            prop_assert!(group.is_zero_sum());
        }
    }
}
