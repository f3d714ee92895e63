//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the group's stream from the store
//!   ↓
//! 2. Rehydrate the aggregate (replay history)
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append the events (optimistic concurrency check)
//!   ↓
//! 5. Publish the committed events on the bus
//! ```
//!
//! A command rejected at step 3 or a concurrency failure at step 4 leaves the
//! stream untouched. This module contains no IO itself; it composes the
//! `EventStore` and `EventBus` traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use splitter_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use splitter_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure: another writer got there first.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// The aggregate rejected the command (deterministic).
    #[error(transparent)]
    Domain(DomainError),

    /// A loaded stream is inconsistent (wrong aggregate, bad ordering).
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// Historical payload does not decode into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; the
    /// events are committed).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl DispatchError {
    /// The domain rejection, if that is what this is.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Domain(other),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// - `S`: event store
/// - `B`: event bus carrying `EventEnvelope<serde_json::Value>`
///
/// Events are appended before they are published: if the append fails
/// nothing is published.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate from its stream without issuing a command.
    ///
    /// A stream that does not exist yields the fresh instance from
    /// `make_aggregate` at version 0.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command against the current stream version.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: splitter_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_expecting(
            aggregate_id,
            aggregate_type,
            command,
            make_aggregate,
            ExpectedVersion::Any,
        )
    }

    /// Dispatch a command that was decided against a specific version.
    ///
    /// With `ExpectedVersion::Exact(v)`, the command fails with `Concurrency`
    /// if the stream has moved past `v` since the caller read it, even when
    /// the command would still be accepted on the newer state.
    pub fn dispatch_expecting<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
        caller_expectation: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: splitter_events::Event + Serialize + DeserializeOwned,
    {
        let aggregate_type = aggregate_type.into();

        // 1) + 2) Load and rehydrate
        let aggregate = self.load(aggregate_id, make_aggregate)?;
        let loaded_version = aggregate.version();
        if !caller_expectation.matches(loaded_version) {
            tracing::warn!(
                aggregate_type = %aggregate_type,
                aggregate_id = %aggregate_id,
                expected = ?caller_expectation,
                actual = loaded_version,
                "stale command rejected"
            );
            return Err(DispatchError::Concurrency(format!(
                "expected {caller_expectation:?}, found {loaded_version}"
            )));
        }

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        tracing::debug!(
            aggregate_type = %aggregate_type,
            aggregate_id = %aggregate_id,
            version = loaded_version,
            events = decided.len(),
            "command handled"
        );
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic against what was loaded)
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, aggregate_type.clone(), Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(loaded_version))
            .map_err(|e| {
                if let EventStoreError::Concurrency(msg) = &e {
                    tracing::warn!(
                        aggregate_type = %aggregate_type,
                        aggregate_id = %aggregate_id,
                        reason = %msg,
                        "concurrent append lost"
                    );
                }
                DispatchError::from(e)
            })?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::CorruptStream(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::CorruptStream(
                "stored event has sequence_number=0".to_string(),
            ));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::CorruptStream(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
