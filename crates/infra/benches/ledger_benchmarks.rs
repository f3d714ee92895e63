use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use splitter_core::{Address, GroupId, PriceFeeds};
use splitter_events::{EventEnvelope, InMemoryEventBus, ProjectionRunner};
use splitter_infra::command_dispatcher::CommandDispatcher;
use splitter_infra::event_store::{EventStore, InMemoryEventStore};
use splitter_infra::projections::{GroupActivity, decode_envelope};
use splitter_ledger::{
    AddExpense, AddMember, CreateGroup, GROUP_AGGREGATE_TYPE, Group, GroupCommand, RemovalPolicy,
};

type Dispatcher =
    CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

fn setup(members: u64) -> (Dispatcher, GroupId, Address) {
    let dispatcher = CommandDispatcher::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::new()),
    );
    let group_id = GroupId::new();
    let owner = Address::from_low_u64(1);

    dispatcher
        .dispatch(
            group_id.into(),
            GROUP_AGGREGATE_TYPE,
            GroupCommand::CreateGroup(CreateGroup {
                group_id,
                name: "Bench".to_string(),
                owner,
                feeds: PriceFeeds::new("ETH/USD", "EUR/USD"),
                removal_policy: RemovalPolicy::ForfeitBalance,
                occurred_at: Utc::now(),
            }),
            |id| Group::empty(id.into()),
        )
        .unwrap();

    for n in 2..=members {
        dispatcher
            .dispatch(
                group_id.into(),
                GROUP_AGGREGATE_TYPE,
                GroupCommand::AddMember(AddMember {
                    group_id,
                    caller: owner,
                    member: Address::from_low_u64(n),
                    occurred_at: Utc::now(),
                }),
                |id| Group::empty(id.into()),
            )
            .unwrap();
    }

    (dispatcher, group_id, owner)
}

fn add_expense(dispatcher: &Dispatcher, group_id: GroupId, payer: Address, amount: i64) {
    dispatcher
        .dispatch(
            group_id.into(),
            GROUP_AGGREGATE_TYPE,
            GroupCommand::AddExpense(AddExpense {
                group_id,
                caller: payer,
                amount,
                description: "bench".to_string(),
                occurred_at: Utc::now(),
            }),
            |id| Group::empty(id.into()),
        )
        .unwrap();
}

/// Latency of one add_expense, including load + replay of a stream that
/// grows with every iteration.
fn bench_add_expense_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_expense_latency");
    for members in [2u64, 10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(members), &members, |b, &members| {
            let (dispatcher, group_id, owner) = setup(members);
            b.iter(|| add_expense(&dispatcher, group_id, owner, black_box(1_001)));
        });
    }
    group.finish();
}

/// Rehydrating a group from streams of increasing length.
fn bench_rehydrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("rehydrate_group");
    for expenses in [10usize, 100, 1_000] {
        let (dispatcher, group_id, owner) = setup(5);
        for i in 0..expenses {
            add_expense(&dispatcher, group_id, owner, 100 + i as i64);
        }

        group.throughput(Throughput::Elements(expenses as u64));
        group.bench_with_input(BenchmarkId::from_parameter(expenses), &expenses, |b, _| {
            b.iter(|| {
                let ledger: Group = dispatcher
                    .load(group_id.into(), |id| Group::empty(id.into()))
                    .unwrap();
                black_box(ledger.all_balances())
            });
        });
    }
    group.finish();
}

/// Rebuilding the activity feed from a stored stream.
fn bench_activity_rebuild(c: &mut Criterion) {
    let (dispatcher, group_id, owner) = setup(5);
    for i in 0..500 {
        add_expense(&dispatcher, group_id, owner, 100 + i);
    }
    let envelopes: Vec<_> = dispatcher
        .store()
        .load_stream(group_id.into())
        .unwrap()
        .iter()
        .map(|stored| decode_envelope(stored.to_envelope()).unwrap())
        .collect();

    let mut group = c.benchmark_group("activity_rebuild");
    group.throughput(Throughput::Elements(envelopes.len() as u64));
    group.bench_function("500_expenses", |b| {
        b.iter(|| {
            let (feed, _) =
                ProjectionRunner::rebuild_from_scratch(GroupActivity::new, &envelopes).unwrap();
            black_box(feed.len())
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_add_expense_latency,
    bench_rehydrate,
    bench_activity_rebuild
);
criterion_main!(benches);
