use splitter_core::Aggregate;

/// Execute an aggregate command in place (no store, no bus).
///
/// 1. **Decide**: `aggregate.handle(command)` (pure, no mutation)
/// 2. **Evolve**: apply each resulting event
///
/// A rejected command leaves the aggregate untouched. Use the infra
/// `CommandDispatcher` for persistence and publication.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
