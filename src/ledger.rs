//! Append-only outcome ledger.
//!
//! Every write records the attributed value together with the events that
//! were active at that moment. A query replays the log: the probability of
//! an outcome is the sum of `value * joint_probability(events)` over all of
//! its entries. Nothing is folded eagerly, so outcomes touched under scopes
//! that have long since closed remain queryable.

use std::collections::HashMap;
use std::fmt;
use std::ops::Add;

use crate::active::ActiveEvents;
use crate::error::{ExecutionError, LedgerResult, ValidationError};
use crate::event::{Event, EventName, Experiment, ExperimentId};
use crate::joint::joint_probability;
use crate::probability::{zero, IntoProbability, Probability};

/// One immutable ledger record.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    seq: u64,
    value: Probability,
    events: Vec<Event>,
}

impl LedgerEntry {
    /// Position of this entry in the session-wide write order.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// The attributed value.
    #[must_use]
    pub const fn value(&self) -> &Probability {
        &self.value
    }

    /// Events active when the value was written.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// `value * joint_probability(events)`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::ConflictingEvents` if the recorded events
    /// share an experiment.
    pub fn weighted(&self) -> Result<Probability, ExecutionError> {
        Ok(&self.value * joint_probability(&self.events)?)
    }
}

/// Handle to a random variable's experiment, used as a key or contribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableRef {
    experiment: Experiment,
}

impl VariableRef {
    /// Wraps an experiment.
    #[must_use]
    pub const fn new(experiment: Experiment) -> Self {
        Self { experiment }
    }

    /// The wrapped experiment.
    #[must_use]
    pub const fn experiment(&self) -> &Experiment {
        &self.experiment
    }
}

/// Where a write lands: a plain outcome name or a whole random variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutcomeKey {
    /// A named outcome.
    Name(String),
    /// A random variable; writes fan out to its event names.
    Variable(VariableRef),
}

impl OutcomeKey {
    /// The outcome name, for plain keys.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Variable(_) => None,
        }
    }
}

impl fmt::Display for OutcomeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Variable(var) => write!(f, "<variable {}>", var.experiment.id()),
        }
    }
}

impl From<&str> for OutcomeKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for OutcomeKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&EventName> for OutcomeKey {
    fn from(name: &EventName) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<VariableRef> for OutcomeKey {
    fn from(var: VariableRef) -> Self {
        Self::Variable(var)
    }
}

/// What a pending write attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    /// A fixed exact value.
    Scalar(Probability),
    /// The numeric label of whichever event of the variable holds.
    Variable(VariableRef),
}

/// Lazy view of an outcome produced by a read.
///
/// It remembers only the key and a zero unit; adding to it yields a
/// [`PendingWrite`] that the session applies. The ledger is never consulted.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRead {
    key: OutcomeKey,
    unit: Probability,
}

impl OutcomeRead {
    pub(crate) fn new(key: OutcomeKey) -> Self {
        Self { key, unit: zero() }
    }

    /// The key this read came from.
    #[must_use]
    pub const fn key(&self) -> &OutcomeKey {
        &self.key
    }

    /// The arithmetic unit carried by the read (always zero).
    #[must_use]
    pub const fn unit(&self) -> &Probability {
        &self.unit
    }

    /// Attributes `value` to this outcome.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if `value` has no exact rational form.
    pub fn plus(self, value: impl IntoProbability) -> Result<PendingWrite, ValidationError> {
        let value = value.into_probability()?;
        Ok(PendingWrite {
            contribution: Contribution::Scalar(self.unit + value),
            key: self.key,
        })
    }

    /// Attributes the numeric value of `variable` to this outcome.
    #[must_use]
    pub fn plus_variable(self, variable: VariableRef) -> PendingWrite {
        PendingWrite {
            key: self.key,
            contribution: Contribution::Variable(variable),
        }
    }
}

impl Add<Probability> for OutcomeRead {
    type Output = PendingWrite;

    fn add(self, rhs: Probability) -> PendingWrite {
        PendingWrite {
            contribution: Contribution::Scalar(self.unit + rhs),
            key: self.key,
        }
    }
}

impl Add<OutcomeRead> for Probability {
    type Output = PendingWrite;

    fn add(self, rhs: OutcomeRead) -> PendingWrite {
        rhs + self
    }
}

macro_rules! impl_integer_add {
    ($($ty:ty),*) => {$(
        impl Add<$ty> for OutcomeRead {
            type Output = PendingWrite;

            fn add(self, rhs: $ty) -> PendingWrite {
                self + Probability::from_integer(rhs.into())
            }
        }

        impl Add<OutcomeRead> for $ty {
            type Output = PendingWrite;

            fn add(self, rhs: OutcomeRead) -> PendingWrite {
                rhs + self
            }
        }
    )*};
}

impl_integer_add!(i32, i64, u64);

/// A write composed from a read, waiting to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    key: OutcomeKey,
    contribution: Contribution,
}

impl PendingWrite {
    /// Target of the write.
    #[must_use]
    pub const fn key(&self) -> &OutcomeKey {
        &self.key
    }

    /// What the write attributes.
    #[must_use]
    pub const fn contribution(&self) -> &Contribution {
        &self.contribution
    }
}

// An entry built by a write but not yet appended.
struct Staged {
    name: String,
    value: Probability,
    events: Vec<Event>,
}

/// The outcome log plus the active event multiset of one session.
#[derive(Debug, Default)]
pub struct Ledger {
    outcomes: HashMap<String, Vec<LedgerEntry>>,
    active: ActiveEvents,
    next_seq: u64,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(&self, staged: &mut Vec<Staged>, name: String, value: Probability) {
        staged.push(Staged {
            name,
            value,
            events: self.active.snapshot(),
        });
    }

    // Appends only once the whole write has succeeded, so a failed write
    // leaves no entries behind.
    fn commit(&mut self, staged: Vec<Staged>) {
        for Staged {
            name,
            value,
            events,
        } in staged
        {
            self.append(name, value, events);
        }
    }

    fn append(&mut self, name: String, value: Probability, events: Vec<Event>) {
        tracing::debug!(
            outcome = %name,
            value = %value,
            active = events.len(),
            "ledger append"
        );
        let entry = LedgerEntry {
            seq: self.next_seq,
            value,
            events,
        };
        self.next_seq += 1;
        self.outcomes.entry(name).or_default().push(entry);
    }

    /// Writes `value` under `key`.
    ///
    /// A plain name gets one entry tagged with the current active events. A
    /// variable key routes to its active event's name if one is active, and
    /// otherwise fans out: each event is activated in turn and `value` is
    /// written under that event's name.
    ///
    /// A write either appends all of its entries or none of them.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::UnbalancedScope` only if the active set was
    /// corrupted while fanning out.
    pub fn write(&mut self, key: &OutcomeKey, value: Probability) -> LedgerResult<()> {
        self.apply_contribution(key, &Contribution::Scalar(value))
    }

    /// Applies a write composed from a read.
    ///
    /// A variable contribution writes the numeric label of the variable's
    /// active event, or fans out over all of its events when none is active.
    /// Like [`Ledger::write`], nothing is appended if any branch fails.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonNumericEvent` if a variable contribution
    /// reaches an event whose label is not an integer.
    pub fn apply(&mut self, pending: &PendingWrite) -> LedgerResult<()> {
        self.apply_contribution(&pending.key, &pending.contribution)
    }

    fn apply_contribution(
        &mut self,
        key: &OutcomeKey,
        contribution: &Contribution,
    ) -> LedgerResult<()> {
        let mut staged = Vec::new();
        self.stage_parts(key, contribution, &mut staged)?;
        self.commit(staged);
        Ok(())
    }

    fn stage_parts(
        &mut self,
        key: &OutcomeKey,
        contribution: &Contribution,
        staged: &mut Vec<Staged>,
    ) -> LedgerResult<()> {
        match (key, contribution) {
            (OutcomeKey::Name(name), Contribution::Scalar(value)) => {
                self.stage(staged, name.clone(), value.clone());
                Ok(())
            }
            (OutcomeKey::Name(name), Contribution::Variable(var)) => {
                self.for_each_branch(var.experiment(), |ledger, event| {
                    let n = event.name().as_number().ok_or_else(|| {
                        ValidationError::NonNumericEvent {
                            name: event.name().clone(),
                        }
                    })?;
                    ledger.stage(staged, name.clone(), Probability::from_integer(n.into()));
                    Ok(())
                })
            }
            (OutcomeKey::Variable(var), _) => {
                self.for_each_branch(var.experiment(), |ledger, event| {
                    ledger.stage_parts(&OutcomeKey::from(event.name()), contribution, staged)
                })
            }
        }
    }

    fn for_each_branch<F>(&mut self, experiment: &Experiment, mut f: F) -> LedgerResult<()>
    where
        F: FnMut(&mut Self, &Event) -> LedgerResult<()>,
    {
        let current = self.active.current_event_for(experiment.id()).ok().cloned();
        if let Some(current) = current {
            return f(self, &current);
        }

        tracing::debug!(experiment = %experiment.id(), branches = experiment.len(), "fan-out write");
        for event in experiment.events() {
            self.active.add(event);
            let result = f(self, event);
            self.active.remove(event)?;
            result?;
        }
        Ok(())
    }

    /// Marginal probability of `name`.
    ///
    /// Unseen names yield exactly 0.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::ConflictingEvents` if an entry was recorded
    /// with two events of one experiment active.
    pub fn probability_of(&self, name: &str) -> LedgerResult<Probability> {
        let Some(entries) = self.outcomes.get(name) else {
            return Ok(zero());
        };

        let mut total = zero();
        for entry in entries {
            total += entry.weighted()?;
        }
        Ok(total)
    }

    /// All entries recorded for `name`, oldest first.
    #[must_use]
    pub fn entries(&self, name: &str) -> &[LedgerEntry] {
        self.outcomes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every outcome name with at least one entry, sorted.
    #[must_use]
    pub fn outcome_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.outcomes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Total number of entries across all outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.values().map(Vec::len).sum()
    }

    /// Returns true if nothing was ever written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Activates every event in `events`.
    pub fn add_events(&mut self, events: &[Event]) {
        for event in events {
            self.active.add(event);
        }
    }

    /// Deactivates every event in `events`.
    ///
    /// Either all events are released or none is.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::UnbalancedScope` naming the first event that
    /// is not active often enough.
    pub fn remove_events(&mut self, events: &[Event]) -> Result<(), ExecutionError> {
        for (idx, event) in events.iter().enumerate() {
            let needed = events[..=idx].iter().filter(|e| *e == event).count();
            if self.active.count(event) < needed {
                return Err(ExecutionError::UnbalancedScope {
                    event: event.name().clone(),
                });
            }
        }
        for event in events {
            self.active.remove(event)?;
        }
        Ok(())
    }

    /// The active event multiset.
    #[must_use]
    pub const fn active(&self) -> &ActiveEvents {
        &self.active
    }

    /// Returns true if some event of `experiment` is active.
    #[must_use]
    pub fn contains_experiment(&self, experiment: ExperimentId) -> bool {
        self.active.contains_experiment(experiment)
    }

    /// The active event of `experiment`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::NoActiveEvent` if none is active.
    pub fn current_event_for(&self, experiment: ExperimentId) -> Result<&Event, ExecutionError> {
        self.active.current_event_for(experiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probability::{one, ratio};

    fn coin() -> Experiment {
        Experiment::new([("heads", ratio(1, 2)), ("tails", ratio(1, 2))]).unwrap()
    }

    fn event(exp: &Experiment, name: impl Into<EventName>) -> Event {
        exp.event(&name.into()).unwrap().clone()
    }

    #[test]
    fn unseen_outcome_is_zero() {
        let ledger = Ledger::new();
        assert_eq!(ledger.probability_of("never_written").unwrap(), zero());
        assert!(ledger.entries("never_written").is_empty());
    }

    #[test]
    fn unconditioned_write_counts_fully() {
        let mut ledger = Ledger::new();
        ledger.write(&"hit".into(), ratio(3, 2)).unwrap();
        ledger.write(&"hit".into(), one()).unwrap();
        assert_eq!(ledger.probability_of("hit").unwrap(), ratio(5, 2));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn entries_snapshot_active_events() {
        let exp = coin();
        let heads = event(&exp, "heads");
        let mut ledger = Ledger::new();

        ledger.add_events(std::slice::from_ref(&heads));
        ledger.write(&"heads".into(), one()).unwrap();
        ledger.remove_events(std::slice::from_ref(&heads)).unwrap();

        let entries = ledger.entries("heads");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].events(), std::slice::from_ref(&heads));
        assert_eq!(entries[0].seq(), 0);
        assert!(ledger.active().is_empty());
        // Still queryable after the scope closed.
        assert_eq!(ledger.probability_of("heads").unwrap(), ratio(1, 2));
    }

    #[test]
    fn conflicting_entry_surfaces_on_query() {
        let exp = coin();
        let both = vec![event(&exp, "heads"), event(&exp, "tails")];
        let mut ledger = Ledger::new();

        ledger.add_events(&both);
        ledger.write(&"impossible".into(), one()).unwrap();
        ledger.remove_events(&both).unwrap();

        let err = ledger.probability_of("impossible").unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn remove_events_is_all_or_nothing() {
        let a = coin();
        let b = coin();
        let heads = event(&a, "heads");
        let tails = event(&b, "tails");
        let mut ledger = Ledger::new();

        ledger.add_events(std::slice::from_ref(&heads));
        let err = ledger
            .remove_events(&[heads.clone(), tails.clone()])
            .unwrap_err();
        assert_eq!(err, ExecutionError::UnbalancedScope { event: "tails".into() });
        assert!(ledger.contains_experiment(a.id()));

        let err = ledger
            .remove_events(&[heads.clone(), heads.clone()])
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnbalancedScope { .. }));
        assert!(ledger.contains_experiment(a.id()));
    }

    #[test]
    fn variable_key_fans_out_over_events() {
        let exp = Experiment::new([(1, ratio(1, 2)), (2, ratio(1, 2))]).unwrap();
        let mut ledger = Ledger::new();

        ledger
            .write(&OutcomeKey::Variable(VariableRef::new(exp.clone())), one())
            .unwrap();

        assert_eq!(ledger.probability_of("1").unwrap(), ratio(1, 2));
        assert_eq!(ledger.probability_of("2").unwrap(), ratio(1, 2));
        assert!(!ledger.contains_experiment(exp.id()));
    }

    #[test]
    fn variable_key_routes_to_active_event() {
        let exp = Experiment::new([("a", ratio(1, 2)), ("b", ratio(1, 2))]).unwrap();
        let b = event(&exp, "b");
        let mut ledger = Ledger::new();

        ledger.add_events(std::slice::from_ref(&b));
        ledger
            .write(&OutcomeKey::Variable(VariableRef::new(exp.clone())), one())
            .unwrap();
        ledger.remove_events(std::slice::from_ref(&b)).unwrap();

        assert_eq!(ledger.probability_of("a").unwrap(), zero());
        assert_eq!(ledger.probability_of("b").unwrap(), ratio(1, 2));
    }

    #[test]
    fn variable_contribution_accumulates_expectation() {
        let exp = Experiment::new([(1, ratio(1, 2)), (2, ratio(1, 2))]).unwrap();
        let mut ledger = Ledger::new();

        let pending = OutcomeRead::new("hit".into()).plus_variable(VariableRef::new(exp));
        ledger.apply(&pending).unwrap();

        assert_eq!(ledger.probability_of("hit").unwrap(), ratio(3, 2));
    }

    #[test]
    fn non_numeric_contribution_is_rejected_and_scopes_restored() {
        let exp = coin();
        let mut ledger = Ledger::new();

        let pending = OutcomeRead::new("hit".into()).plus_variable(VariableRef::new(exp.clone()));
        let err = ledger.apply(&pending).unwrap_err();
        assert!(err.is_validation());
        assert!(!ledger.contains_experiment(exp.id()));
    }

    #[test]
    fn read_composes_pending_writes() {
        let read = OutcomeRead::new("x".into());
        assert_eq!(read.unit(), &zero());

        let pending: PendingWrite = read.clone() + 2;
        assert_eq!(pending.key(), &OutcomeKey::from("x"));
        assert_eq!(pending.contribution(), &Contribution::Scalar(ratio(2, 1)));

        let pending = ratio(1, 3) + read.clone();
        assert_eq!(pending.contribution(), &Contribution::Scalar(ratio(1, 3)));

        let pending = read.plus("0.5").unwrap();
        assert_eq!(pending.contribution(), &Contribution::Scalar(ratio(1, 2)));
    }

    #[test]
    fn outcome_names_are_sorted() {
        let mut ledger = Ledger::new();
        ledger.write(&"b".into(), one()).unwrap();
        ledger.write(&"a".into(), one()).unwrap();
        assert_eq!(ledger.outcome_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn failed_variable_contribution_appends_nothing() {
        let exp = Experiment::new([
            (EventName::from(1), ratio(1, 2)),
            (EventName::from("x"), ratio(1, 2)),
        ])
        .unwrap();
        let mut ledger = Ledger::new();

        let pending = OutcomeRead::new("hit".into()).plus_variable(VariableRef::new(exp.clone()));
        let err = ledger.apply(&pending).unwrap_err();
        assert!(matches!(
            err,
            crate::error::LedgerError::Validation(ValidationError::NonNumericEvent { .. })
        ));
        assert!(ledger.entries("hit").is_empty());
        assert!(ledger.is_empty());
        assert!(!ledger.contains_experiment(exp.id()));

        ledger.write(&"hit".into(), one()).unwrap();
        assert_eq!(ledger.entries("hit")[0].seq(), 0);
        assert_eq!(ledger.probability_of("hit").unwrap(), one());
    }

    #[test]
    fn failed_nested_fan_out_appends_nothing() {
        let key = Experiment::new([("a", ratio(1, 2)), ("b", ratio(1, 2))]).unwrap();
        let amount = Experiment::new([
            (EventName::from(2), ratio(1, 2)),
            (EventName::from("many"), ratio(1, 2)),
        ])
        .unwrap();
        let mut ledger = Ledger::new();

        let pending = OutcomeRead::new(OutcomeKey::Variable(VariableRef::new(key)))
            .plus_variable(VariableRef::new(amount));
        assert!(ledger.apply(&pending).is_err());
        assert!(ledger.entries("a").is_empty());
        assert!(ledger.entries("b").is_empty());
        assert!(ledger.active().is_empty());
    }
}
