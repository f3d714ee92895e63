//! Projection runner utilities (read model builders).
//!
//! Deterministic replay and cursor tracking for one aggregate stream, with no
//! storage assumptions.

use thiserror::Error;

use splitter_core::AggregateId;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress for a single stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    aggregate_id: AggregateId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("stream mismatch (expected {expected}, found {found})")]
    StreamMismatch {
        expected: AggregateId,
        found: AggregateId,
    },

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Runs envelopes of one stream through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: None,
        }
    }

    /// Create a runner pinned to one stream, so an envelope from another
    /// group is rejected even if it arrives first.
    pub fn new_for_stream(aggregate_id: AggregateId, projection: P) -> Self {
        Self {
            projection,
            cursor: Some(ProjectionCursor {
                aggregate_id,
                last_sequence_number: 0,
            }),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.cursor
    }

    /// Apply a single envelope, enforcing stream consistency and monotonic
    /// sequencing.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        let found_stream = envelope.aggregate_id();
        let found_seq = envelope.sequence_number();

        match self.cursor {
            None => {
                self.projection.apply(envelope);
                self.cursor = Some(ProjectionCursor {
                    aggregate_id: found_stream,
                    last_sequence_number: found_seq,
                });
                Ok(())
            }
            Some(mut c) => {
                if c.aggregate_id != found_stream {
                    return Err(ProjectionError::StreamMismatch {
                        expected: c.aggregate_id,
                        found: found_stream,
                    });
                }
                if found_seq <= c.last_sequence_number {
                    return Err(ProjectionError::NonMonotonicSequence {
                        last: c.last_sequence_number,
                        found: found_seq,
                    });
                }

                self.projection.apply(envelope);
                c.last_sequence_number = found_seq;
                self.cursor = Some(c);
                Ok(())
            }
        }
    }

    /// Apply an envelope, treating an already-seen sequence number as a
    /// duplicate delivery instead of an error.
    pub fn apply_at_least_once(
        &mut self,
        envelope: &EventEnvelope<P::Ev>,
    ) -> Result<bool, ProjectionError> {
        match self.apply(envelope) {
            Ok(()) => Ok(true),
            Err(ProjectionError::NonMonotonicSequence { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild from scratch by replaying the full stream into a fresh instance.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, Option<ProjectionCursor>), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}
