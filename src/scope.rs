//! Scoped activation of events.
//!
//! A [`ScopedContext`] names a set of events. Entering it returns a
//! [`ScopeGuard`]; the events stay active until the guard is released, either
//! explicitly through [`ScopeGuard::exit`] or by dropping it. Drop runs on
//! every exit path, including `?` returns and unwinding panics, so the active
//! set always mirrors lexical nesting.

use std::fmt;

use crate::error::{LedgerResult, ValidationError};
use crate::event::Event;
use crate::session::Session;

#[derive(Clone)]
struct ScopePart {
    session: Session,
    events: Vec<Event>,
}

impl ScopePart {
    fn enter(&self) -> LedgerResult<()> {
        self.session.add_events(&self.events)?;
        tracing::debug!(
            session = %self.session.id(),
            events = %display_events(&self.events),
            "scope entered"
        );
        Ok(())
    }

    fn exit(&self) -> LedgerResult<()> {
        self.session.remove_events(&self.events)?;
        tracing::debug!(
            session = %self.session.id(),
            events = %display_events(&self.events),
            "scope exited"
        );
        Ok(())
    }
}

fn display_events(events: &[Event]) -> String {
    events
        .iter()
        .map(|e| format!("{}@{}", e.name(), e.experiment()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A reusable description of "these events hold".
///
/// Contexts compose with [`ScopedContext::union`] (or `&a | &b`): the union
/// enters its members in order and releases them in reverse. Members drawn
/// from one experiment merge into their "any of" event, so
/// `rv.event("e1")? | rv.event("e2")?` scopes "e1 or e2".
#[derive(Clone)]
pub struct ScopedContext {
    parts: Vec<ScopePart>,
}

impl fmt::Debug for ScopedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedContext")
            .field("events", &self.events())
            .finish_non_exhaustive()
    }
}

impl ScopedContext {
    /// Creates a context activating `events` in `session`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyEventTable` if `events` is empty.
    pub fn new(session: &Session, events: Vec<Event>) -> Result<Self, ValidationError> {
        if events.is_empty() {
            return Err(ValidationError::EmptyEventTable);
        }
        Ok(Self {
            parts: vec![ScopePart {
                session: session.clone(),
                events,
            }],
        })
    }

    pub(crate) fn single(session: &Session, event: Event) -> Self {
        Self {
            parts: vec![ScopePart {
                session: session.clone(),
                events: vec![event],
            }],
        }
    }

    pub(crate) fn session(&self) -> Session {
        self.parts[0].session.clone()
    }

    /// Every event this context activates, in entry order.
    #[must_use]
    pub fn events(&self) -> Vec<&Event> {
        self.parts.iter().flat_map(|p| p.events.iter()).collect()
    }

    /// Combines two contexts; entering the union enters `self` then `other`.
    ///
    /// An event of `other` whose experiment already appears in `self` is
    /// folded into that event with [`Event::or`] rather than entered next to
    /// it. Events of distinct experiments hold jointly.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut parts = self.parts.clone();
        for part in &other.parts {
            let rest: Vec<Event> = part
                .events
                .iter()
                .filter(|event| !fold_into(&mut parts, event))
                .cloned()
                .collect();
            if !rest.is_empty() {
                parts.push(ScopePart {
                    session: part.session.clone(),
                    events: rest,
                });
            }
        }
        Self { parts }
    }

    /// Activates the events until the returned guard is released.
    ///
    /// If a later member of a union fails to enter, members already entered
    /// are released before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::SessionBusy` if the session is mid-write.
    pub fn enter(&self) -> LedgerResult<ScopeGuard<'_>> {
        for (idx, part) in self.parts.iter().enumerate() {
            if let Err(err) = part.enter() {
                for entered in self.parts[..idx].iter().rev() {
                    if let Err(undo) = entered.exit() {
                        tracing::warn!(error = %undo, "failed to roll back partial scope entry");
                    }
                }
                return Err(err);
            }
        }
        Ok(ScopeGuard {
            context: self,
            released: false,
        })
    }

    /// Runs `f` with the events active, releasing them afterwards.
    ///
    /// # Errors
    ///
    /// Returns the entry error, or `ExecutionError::UnbalancedScope` if `f`
    /// tampered with the active set so the release could not balance.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> LedgerResult<T> {
        let guard = self.enter()?;
        let out = f();
        guard.exit()?;
        Ok(out)
    }

    /// Like [`ScopedContext::run`] for fallible bodies.
    ///
    /// The events are released before the body's error is returned.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or the entry/release error.
    pub fn try_run<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<crate::error::LedgerError>,
    {
        let guard = self.enter()?;
        let out = f();
        guard.exit()?;
        out
    }
}

// Merges `event` into a same-experiment event of `parts`, if there is one.
fn fold_into(parts: &mut [ScopePart], event: &Event) -> bool {
    for part in parts.iter_mut() {
        if let Some(slot) = part
            .events
            .iter_mut()
            .find(|e| e.experiment() == event.experiment())
        {
            if let Some(merged) = slot.or(event) {
                *slot = merged;
            }
            return true;
        }
    }
    false
}

impl std::ops::BitOr for &ScopedContext {
    type Output = ScopedContext;

    fn bitor(self, rhs: Self) -> ScopedContext {
        self.union(rhs)
    }
}

/// Keeps a context's events active; releases them on [`ScopeGuard::exit`] or drop.
#[must_use = "events are released as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    context: &'a ScopedContext,
    released: bool,
}

impl fmt::Debug for ScopeGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("context", self.context)
            .field("released", &self.released)
            .finish()
    }
}

impl ScopeGuard<'_> {
    /// Releases the events and reports any imbalance.
    ///
    /// # Errors
    ///
    /// Returns the first release error; remaining members are still released.
    pub fn exit(mut self) -> LedgerResult<()> {
        self.release()
    }

    fn release(&mut self) -> LedgerResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut first_err = None;
        for part in self.context.parts.iter().rev() {
            if let Err(err) = part.exit() {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(error = %err, "scope release failed on drop");
        }
    }
}
