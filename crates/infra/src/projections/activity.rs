//! Group activity feed.
//!
//! A human-readable log of everything that happened in one group, as a
//! client would render it next to the balances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use splitter_events::{Event, EventEnvelope, Projection};
use splitter_ledger::GroupEvent;

/// Decode a bus envelope into a typed group envelope.
pub fn decode_envelope(
    envelope: EventEnvelope<JsonValue>,
) -> Result<EventEnvelope<GroupEvent>, serde_json::Error> {
    envelope.try_map(serde_json::from_value)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub sequence_number: u64,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupActivity {
    entries: Vec<ActivityEntry>,
}

impl GroupActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cents(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn summarize(event: &GroupEvent) -> String {
    match event {
        GroupEvent::GroupCreated(e) => format!("{} created \"{}\"", e.owner, e.name),
        GroupEvent::MemberAdded(e) => format!("{} joined", e.address),
        GroupEvent::MemberRemoved(e) if e.forfeited != 0 => {
            format!("{} left, forfeiting {}", e.address, cents(e.forfeited))
        }
        GroupEvent::MemberRemoved(e) => format!("{} left", e.address),
        GroupEvent::ExpenseAdded(e) => format!(
            "{} paid {} for \"{}\" (#{})",
            e.payer,
            cents(e.amount_cents),
            e.description,
            e.index
        ),
        GroupEvent::ExpenseSettled(e) => format!("expense #{} marked settled", e.index),
        GroupEvent::DebtSettled(e) => format!(
            "{} paid {} to {} ({} units)",
            e.debtor,
            cents(e.amount_cents),
            e.creditor,
            e.value_units_transferred
        ),
    }
}

impl Projection for GroupActivity {
    type Ev = GroupEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        let event = envelope.payload();
        self.entries.push(ActivityEntry {
            sequence_number: envelope.sequence_number(),
            event_type: event.event_type().to_string(),
            occurred_at: event.occurred_at(),
            summary: summarize(event),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitter_core::{Address, AggregateId, GroupId};
    use splitter_events::ProjectionRunner;
    use splitter_ledger::{ExpenseAdded, MemberAdded, MemberRemoved};
    use uuid::Uuid;

    fn envelope(group_id: GroupId, seq: u64, event: GroupEvent) -> EventEnvelope<GroupEvent> {
        EventEnvelope::new(
            Uuid::now_v7(),
            AggregateId::from(group_id),
            "splitter.group",
            seq,
            event.event_type(),
            event,
        )
    }

    #[test]
    fn formats_amounts_in_major_units() {
        assert_eq!(cents(1050), "10.50");
        assert_eq!(cents(-5), "-0.05");
        assert_eq!(cents(0), "0.00");
    }

    #[test]
    fn runner_skips_duplicate_deliveries() {
        let group_id = GroupId::new();
        let alice = Address::from_low_u64(1);
        let joined = envelope(
            group_id,
            1,
            GroupEvent::MemberAdded(MemberAdded {
                group_id,
                address: alice,
                occurred_at: Utc::now(),
            }),
        );
        let paid = envelope(
            group_id,
            2,
            GroupEvent::ExpenseAdded(ExpenseAdded {
                group_id,
                index: 0,
                payer: alice,
                amount_cents: 4250,
                description: "Groceries".to_string(),
                share: 2125,
                payer_credit: 2125,
                occurred_at: Utc::now(),
            }),
        );

        let mut runner = ProjectionRunner::new_for_stream(group_id.into(), GroupActivity::new());
        assert!(runner.apply_at_least_once(&joined).unwrap());
        assert!(runner.apply_at_least_once(&paid).unwrap());
        assert!(!runner.apply_at_least_once(&joined).unwrap());

        let feed = runner.projection();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.entries()[1].event_type, "splitter.group.expense_added");
        assert!(feed.entries()[1].summary.contains("42.50"));
    }

    #[test]
    fn forfeited_balance_is_called_out() {
        let group_id = GroupId::new();
        let left = GroupEvent::MemberRemoved(MemberRemoved {
            group_id,
            address: Address::from_low_u64(2),
            index: 1,
            forfeited: -500,
            occurred_at: Utc::now(),
        });
        assert!(summarize(&left).ends_with("forfeiting -5.00"));
    }

    #[test]
    fn bus_envelopes_decode_into_group_events() {
        let group_id = GroupId::new();
        let event = GroupEvent::MemberAdded(MemberAdded {
            group_id,
            address: Address::from_low_u64(3),
            occurred_at: Utc::now(),
        });
        let raw = EventEnvelope::new(
            Uuid::now_v7(),
            AggregateId::from(group_id),
            "splitter.group",
            4,
            event.event_type(),
            serde_json::to_value(&event).unwrap(),
        );

        let decoded = decode_envelope(raw).unwrap();
        assert_eq!(decoded.sequence_number(), 4);
        assert_eq!(decoded.payload(), &event);
    }
}
