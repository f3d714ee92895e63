use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are disposable: they can be dropped and rebuilt by replaying a
/// group's stream. `apply` must be idempotent because the bus delivers
/// at-least-once; `ProjectionRunner` filters replays by sequence number.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the read model. Irrelevant events are ignored.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
