//! Reference-counted set of events currently in scope.

use std::collections::HashMap;

use crate::error::ExecutionError;
use crate::event::{Event, ExperimentId};

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: usize,
    // Activation stamp; fixes iteration order.
    order: u64,
}

/// Multiset of active events.
///
/// An event is active iff its count is positive. Entering the same scope
/// twice bumps the count; iteration still yields the event once, so nested
/// re-entry never squares its probability. Iteration order is first
/// activation order.
#[derive(Debug, Clone, Default)]
pub struct ActiveEvents {
    slots: HashMap<Event, Slot>,
    next_order: u64,
}

impl ActiveEvents {
    /// Creates an empty multiset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the count of `event`, activating it if needed.
    pub fn add(&mut self, event: &Event) {
        if let Some(slot) = self.slots.get_mut(event) {
            slot.count += 1;
            return;
        }
        self.slots.insert(
            event.clone(),
            Slot {
                count: 1,
                order: self.next_order,
            },
        );
        self.next_order += 1;
    }

    /// Decrements the count of `event`, deactivating it at zero.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::UnbalancedScope` if `event` is not active.
    pub fn remove(&mut self, event: &Event) -> Result<(), ExecutionError> {
        let Some(slot) = self.slots.get_mut(event) else {
            return Err(ExecutionError::UnbalancedScope {
                event: event.name().clone(),
            });
        };

        slot.count -= 1;
        if slot.count == 0 {
            self.slots.remove(event);
        }
        Ok(())
    }

    /// Returns true if `event` is active.
    #[must_use]
    pub fn contains(&self, event: &Event) -> bool {
        self.slots.contains_key(event)
    }

    /// Current count for `event` (0 when inactive).
    #[must_use]
    pub fn count(&self, event: &Event) -> usize {
        self.slots.get(event).map_or(0, |s| s.count)
    }

    /// Returns true if some active event belongs to `experiment`.
    #[must_use]
    pub fn contains_experiment(&self, experiment: ExperimentId) -> bool {
        self.slots.keys().any(|e| e.experiment() == experiment)
    }

    /// The active event of `experiment`.
    ///
    /// If callers broke the one-event-per-experiment rule, the earliest
    /// activated one is returned; the joint probability check reports the
    /// conflict.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::NoActiveEvent` if none is active.
    pub fn current_event_for(&self, experiment: ExperimentId) -> Result<&Event, ExecutionError> {
        self.slots
            .iter()
            .filter(|(e, _)| e.experiment() == experiment)
            .min_by_key(|(_, slot)| slot.order)
            .map(|(e, _)| e)
            .ok_or(ExecutionError::NoActiveEvent { experiment })
    }

    /// Distinct active events, in activation order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        let mut ordered: Vec<(&Event, u64)> =
            self.slots.iter().map(|(e, slot)| (e, slot.order)).collect();
        ordered.sort_unstable_by_key(|&(_, order)| order);
        ordered.into_iter().map(|(e, _)| e)
    }

    /// Distinct active events as an owned tuple.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.iter().cloned().collect()
    }

    /// Number of distinct active events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
