//! Scripted in-memory session.
//!
//! Wires the full stack (store, bus, mock feeds, in-memory wallets), runs a
//! three-person trip through expenses and settlements, and reports the final
//! state plus the activity feed rebuilt from the published events.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value as JsonValue;

use splitter_core::{Address, Cents, GroupId, ValueUnits};
use splitter_events::{EventBus, EventEnvelope, InMemoryEventBus, ProjectionRunner};
use splitter_infra::event_store::InMemoryEventStore;
use splitter_infra::projections::{ActivityEntry, GroupActivity, decode_envelope};
use splitter_infra::{
    CommandDispatcher, GroupRegistry, InMemoryValueTransfer, LedgerService, SettlementReceipt, SplitterConfig,
};
use splitter_ledger::Expense;
use splitter_oracle::{MOCK_FEED_DECIMALS, MockPriceSource, PriceAdapter};

/// 3000 USD per value unit.
const VALUE_USD_PRICE: i128 = 300_000_000_000;
/// 1.08 USD per fiat unit.
const FIAT_USD_PRICE: i128 = 108_000_000;
/// One whole value unit (10^18 base units) per wallet.
const WALLET: ValueUnits = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Serialize)]
pub struct MemberBalance {
    pub address: Address,
    pub balance: Cents,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub group_id: GroupId,
    pub name: String,
    pub units_per_cent: ValueUnits,
    /// Balances of the members still in the group.
    pub balances: Vec<MemberBalance>,
    pub expenses: Vec<Expense>,
    pub settlements: Vec<SettlementReceipt>,
    pub activity: Vec<ActivityEntry>,
}

pub fn run(config: &SplitterConfig) -> anyhow::Result<SessionReport> {
    let bus = Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new());
    let dispatcher = Arc::new(CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), bus.clone()));

    let prices = Arc::new(MockPriceSource::new());
    prices.set_price(config.value_usd_feed.clone(), VALUE_USD_PRICE, MOCK_FEED_DECIMALS);
    prices.set_price(config.fiat_usd_feed.clone(), FIAT_USD_PRICE, MOCK_FEED_DECIMALS);
    let adapter = Arc::new(PriceAdapter::new(prices, config.max_price_age));

    let transfers = Arc::new(InMemoryValueTransfer::new());
    let registry = GroupRegistry::new(dispatcher.clone(), config.feeds(), config.removal_policy);
    let service = LedgerService::new(dispatcher, registry, adapter, transfers.clone());

    let alice = Address::from_low_u64(0xA11CE);
    let bob = Address::from_low_u64(0xB0B);
    let carol = Address::from_low_u64(0xCA501);

    let feed = bus.subscribe();

    let group = service.create_group("Weekend trip", alice)?;
    service.add_member(group, alice, bob)?;
    service.add_member(group, alice, carol)?;

    let cabin = service.add_expense(group, alice, 9000, "Cabin")?;
    service.add_expense(group, bob, 2400, "Groceries")?;
    service.add_expense(group, carol, 1001, "Fuel")?;
    service.settle_expense(group, alice, cabin)?;

    let units_per_cent = service.units_per_cent(group)?;
    for member in [bob, carol] {
        transfers.fund(member, WALLET);
    }

    let mut settlements = Vec::new();
    // Bob overpays; the excess comes back as a refund.
    settlements.push(service.settle_debt(group, bob, alice, 2000 * units_per_cent)?);
    let carol_debt = service.balance(group, &carol)?.unsigned_abs();
    settlements.push(service.settle_debt(group, carol, alice, u128::from(carol_debt) * units_per_cent)?);

    let carol_index = service
        .member_index(group, &carol)?
        .context("carol is no longer a member")?;
    service.remove_self(group, carol, carol_index)?;

    let envelopes = feed
        .drain()
        .into_iter()
        .map(decode_envelope)
        .collect::<Result<Vec<_>, _>>()?;
    let mut runner = ProjectionRunner::new_for_stream(group.into(), GroupActivity::new());
    runner.run(&envelopes)?;

    let (members, amounts) = service.all_balances(group)?;
    let balances = members
        .into_iter()
        .zip(amounts)
        .map(|(address, balance)| MemberBalance { address, balance })
        .collect();

    tracing::info!(group_id = %group, settlements = settlements.len(), "session finished");

    Ok(SessionReport {
        group_id: group,
        name: service.name(group)?,
        units_per_cent,
        balances,
        expenses: service.expenses(group)?,
        settlements,
        activity: runner.into_projection().entries().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_ends_fully_settled() {
        let report = run(&SplitterConfig::default()).unwrap();

        assert_eq!(report.name, "Weekend trip");
        assert_eq!(report.units_per_cent, 3_600_000_000_000);
        assert_eq!(report.balances.len(), 2);
        assert!(report.balances.iter().all(|b| b.balance == 0));

        let bob = &report.settlements[0];
        assert_eq!(bob.debt_cents, 1733);
        assert_eq!(bob.paid_cents, 1733);
        assert_eq!(bob.refunded_units, 267 * report.units_per_cent);

        let carol = &report.settlements[1];
        assert_eq!(carol.debt_cents, 3134);
        assert_eq!(carol.refunded_units, 0);

        assert!(report.expenses[0].settled);
        assert!(!report.expenses[1].settled);
        // created, 2 joins, 3 expenses, 1 settled flag, 2 settlements, 1 leave
        assert_eq!(report.activity.len(), 10);
        assert_eq!(
            report.activity.last().map(|e| e.event_type.as_str()),
            Some("splitter.group.member_removed")
        );
    }

    #[test]
    fn custom_feed_names_are_priced() {
        let config = SplitterConfig {
            value_usd_feed: "BTC/USD".into(),
            fiat_usd_feed: "GBP/USD".into(),
            ..SplitterConfig::default()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.units_per_cent, 3_600_000_000_000);
    }
}
