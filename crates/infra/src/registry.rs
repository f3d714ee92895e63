//! Group registry: creates ledger instances and lists them.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use splitter_core::{Address, DomainError, GroupId, PriceFeeds};
use splitter_events::{EventBus, EventEnvelope};
use splitter_ledger::{CreateGroup, GROUP_AGGREGATE_TYPE, Group, GroupCommand, RemovalPolicy};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub name: String,
    pub group_id: GroupId,
}

/// Creates groups with the registry's default feeds (or explicit ones) and
/// keeps them in creation order. Each group is its own stream.
pub struct GroupRegistry<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    default_feeds: PriceFeeds,
    removal_policy: RemovalPolicy,
    groups: RwLock<Vec<GroupSummary>>,
}

impl<S, B> GroupRegistry<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        default_feeds: PriceFeeds,
        removal_policy: RemovalPolicy,
    ) -> Self {
        Self {
            dispatcher,
            default_feeds,
            removal_policy,
            groups: RwLock::new(Vec::new()),
        }
    }

    pub fn default_feeds(&self) -> &PriceFeeds {
        &self.default_feeds
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    pub fn create_group(&self, name: &str, owner: Address) -> Result<GroupId, DispatchError> {
        self.create_group_with_feeds(name, owner, self.default_feeds.clone())
    }

    pub fn create_group_with_feeds(
        &self,
        name: &str,
        owner: Address,
        feeds: PriceFeeds,
    ) -> Result<GroupId, DispatchError> {
        let group_id = GroupId::new();
        let dispatched = self.dispatcher.dispatch(
            group_id.into(),
            GROUP_AGGREGATE_TYPE,
            GroupCommand::CreateGroup(CreateGroup {
                group_id,
                name: name.to_string(),
                owner,
                feeds: feeds.clone(),
                removal_policy: self.removal_policy,
                occurred_at: Utc::now(),
            }),
            |id| Group::empty(id.into()),
        );
        match dispatched {
            Ok(_) => {}
            // The stream is committed; the group exists and must be listed.
            Err(DispatchError::Publish(reason)) => {
                tracing::warn!(group_id = %group_id, reason = %reason, "group created but event publication failed");
            }
            Err(e) => return Err(e),
        }

        let mut groups = self
            .groups
            .write()
            .map_err(|_| DispatchError::Domain(DomainError::invariant("group list lock poisoned")))?;
        groups.push(GroupSummary {
            name: name.trim().to_string(),
            group_id,
        });

        tracing::info!(
            group_id = %group_id,
            owner = %owner,
            value_usd_feed = %feeds.value_usd,
            fiat_usd_feed = %feeds.fiat_usd,
            "group created"
        );
        Ok(group_id)
    }

    /// All groups in creation order.
    pub fn list_groups(&self) -> Vec<GroupSummary> {
        self.groups.read().map(|g| g.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitter_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;
    use crate::test_support::FlakyBus;

    fn registry() -> GroupRegistry<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>> {
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        ));
        GroupRegistry::new(
            dispatcher,
            PriceFeeds::new("ETH/USD", "EUR/USD"),
            RemovalPolicy::ForfeitBalance,
        )
    }

    #[test]
    fn groups_are_listed_in_creation_order() {
        let registry = registry();
        let owner = Address::from_low_u64(1);

        let trip = registry.create_group("Trip", owner).unwrap();
        let flat = registry.create_group("Flat", owner).unwrap();

        let names: Vec<_> = registry.list_groups().into_iter().map(|g| (g.name, g.group_id)).collect();
        assert_eq!(names, vec![("Trip".to_string(), trip), ("Flat".to_string(), flat)]);
    }

    #[test]
    fn explicit_feeds_override_defaults() {
        let registry = registry();
        let feeds = PriceFeeds::new("BTC/USD", "GBP/USD");
        let id = registry
            .create_group_with_feeds("Ski", Address::from_low_u64(1), feeds.clone())
            .unwrap();

        let group: Group = registry
            .dispatcher
            .load(id.into(), |aid| Group::empty(aid.into()))
            .unwrap();
        assert_eq!(group.feeds(), Some(&feeds));
        assert_eq!(registry.default_feeds().value_usd.as_str(), "ETH/USD");
    }

    #[test]
    fn group_is_listed_when_publication_fails() {
        let bus = Arc::new(FlakyBus::new());
        bus.fail_publishes(true);
        let dispatcher = Arc::new(CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), bus));
        let registry = GroupRegistry::new(
            dispatcher,
            PriceFeeds::new("ETH/USD", "EUR/USD"),
            RemovalPolicy::ForfeitBalance,
        );

        let id = registry.create_group("Trip", Address::from_low_u64(1)).unwrap();

        assert_eq!(
            registry.list_groups(),
            vec![GroupSummary {
                name: "Trip".to_string(),
                group_id: id
            }]
        );
        let group: Group = registry
            .dispatcher
            .load(id.into(), |aid| Group::empty(aid.into()))
            .unwrap();
        assert!(group.is_created());
    }

    #[test]
    fn empty_name_is_rejected_and_not_listed() {
        let registry = registry();
        let err = registry.create_group("  ", Address::from_low_u64(1)).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Validation(_))));
        assert!(registry.list_groups().is_empty());
    }
}
