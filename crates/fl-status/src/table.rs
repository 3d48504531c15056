use std::fmt;

use fl_schemas::CanonicalStatus;
use thiserror::Error;

// ---------------------------------------------------------------------------
// StatusEvent
// ---------------------------------------------------------------------------

/// An event that drives one entity's status machine.
///
/// Every event names exactly one target status. The table decides from which
/// statuses that target is reachable.
pub trait StatusEvent: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    type Status: CanonicalStatus;

    fn target(self) -> Self::Status;

    /// Canonical event name used in errors and logs.
    fn name(self) -> &'static str;
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when `(current, event)` is not an edge of the table.
///
/// The entity keeps its current status; callers must not persist anything
/// derived from the rejected event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {entity} transition: {from} -> {to} on {event}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
    pub event: &'static str,
}

impl TransitionError {
    pub fn new<S: CanonicalStatus>(from: S, to: S, event: &'static str) -> Self {
        Self {
            entity: S::KIND,
            from: from.as_str(),
            to: to.as_str(),
            event,
        }
    }
}

// ---------------------------------------------------------------------------
// Applied
// ---------------------------------------------------------------------------

/// Outcome of a successful `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied<S> {
    Changed { from: S, to: S },
    /// The event targeted the status the entity is already in.
    Unchanged(S),
}

impl<S: Copy> Applied<S> {
    pub fn status(&self) -> S {
        match self {
            Applied::Changed { to, .. } => *to,
            Applied::Unchanged(s) => *s,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Applied::Changed { .. })
    }
}

// ---------------------------------------------------------------------------
// TransitionTable
// ---------------------------------------------------------------------------

/// Static directed graph of legal `(from, event)` edges for one entity type.
pub struct TransitionTable<E: StatusEvent> {
    edges: &'static [(E::Status, E)],
}

impl<E: StatusEvent> TransitionTable<E> {
    pub const fn new(edges: &'static [(E::Status, E)]) -> Self {
        Self { edges }
    }

    pub fn edges(&self) -> &'static [(E::Status, E)] {
        self.edges
    }

    /// Apply `event` to `current`.
    ///
    /// An event whose target equals `current` is a no-op, which makes replay of
    /// an already-applied event safe.
    pub fn apply(
        &self,
        current: E::Status,
        event: E,
    ) -> Result<Applied<E::Status>, TransitionError> {
        let target = event.target();
        if target == current {
            return Ok(Applied::Unchanged(current));
        }
        if self.has_edge(current, event) {
            Ok(Applied::Changed {
                from: current,
                to: target,
            })
        } else {
            Err(TransitionError::new(current, target, event.name()))
        }
    }

    /// Like [`apply`](Self::apply) but writes the new status through `status`.
    /// On error `status` is left untouched.
    pub fn apply_in_place(
        &self,
        status: &mut E::Status,
        event: E,
    ) -> Result<Applied<E::Status>, TransitionError> {
        let applied = self.apply(*status, event)?;
        *status = applied.status();
        Ok(applied)
    }

    pub fn can_transition(&self, current: E::Status, target: E::Status) -> bool {
        current == target || self.event_between(current, target).is_some()
    }

    /// First event that moves `current` to `target`, if the table has one.
    pub fn event_between(&self, current: E::Status, target: E::Status) -> Option<E> {
        self.edges
            .iter()
            .find(|(from, ev)| *from == current && ev.target() == target)
            .map(|(_, ev)| *ev)
    }

    pub fn events_from(&self, current: E::Status) -> impl Iterator<Item = E> + '_ {
        self.edges
            .iter()
            .filter(move |(from, _)| *from == current)
            .map(|(_, ev)| *ev)
    }

    /// True if no edge leaves `status`.
    pub fn is_sink(&self, status: E::Status) -> bool {
        self.events_from(status).next().is_none()
    }

    fn has_edge(&self, current: E::Status, event: E) -> bool {
        self.edges
            .iter()
            .any(|(from, ev)| *from == current && *ev == event)
    }
}
