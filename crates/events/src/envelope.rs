use serde::{Deserialize, Serialize};
use uuid::Uuid;

use splitter_core::AggregateId;

/// Envelope for an event, containing stream metadata.
///
/// This is the unit published on the bus once an append has committed.
///
/// Notes:
/// - One stream per aggregate instance (one group ledger = one stream).
/// - **Append-only**: `sequence_number` is monotonically increasing per stream.
/// - `event_type` duplicates the payload's stable name so consumers can route
///   without decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    aggregate_id: AggregateId,
    aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    sequence_number: u64,

    event_type: String,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Convert the payload, keeping the stream metadata.
    pub fn try_map<F, T, Err>(self, f: F) -> Result<EventEnvelope<T>, Err>
    where
        F: FnOnce(E) -> Result<T, Err>,
    {
        Ok(EventEnvelope {
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number,
            event_type: self.event_type,
            payload: f(self.payload)?,
        })
    }
}
