//! The accounting session: one ledger plus its active event multiset.
//!
//! A [`Session`] is a cheap handle; clones share the same ledger. Random
//! variables and scoped contexts keep a handle to the session they were built
//! against, so several sessions can coexist without interfering. A session is
//! deliberately `!Send`: run one per logical accounting job.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{ExecutionError, LedgerResult, ValidationError};
use crate::event::{Event, EventName, ExperimentId};
use crate::ledger::{Ledger, LedgerEntry, OutcomeKey, OutcomeRead, PendingWrite};
use crate::probability::{ratio, IntoProbability, Probability};
use crate::scope::ScopedContext;
use crate::variable::{CoinFlip, NumericRandomVariable, RandomVariable};

/// Stable identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SessionInner {
    id: SessionId,
    config: SessionConfig,
    ledger: RefCell<Ledger>,
}

/// Handle to one probability-accounting session.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a session with the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::build(SessionConfig::default())
    }

    /// Creates a session with `config`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if the config does not validate.
    pub fn with_config(config: SessionConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SessionConfig) -> Self {
        let id = SessionId::new();
        tracing::info!(
            session = %id,
            require_normalized = config.require_normalized,
            allow_zero_probability = config.allow_zero_probability,
            "session created"
        );
        Self {
            inner: Rc::new(SessionInner {
                id,
                config,
                ledger: RefCell::new(Ledger::new()),
            }),
        }
    }

    /// Session identity.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// The session's config.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Returns true if both handles refer to the same session.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // The ledger is only borrowed for the duration of one call and no user
    // code runs inside it, so from outside the crate `SessionBusy` never
    // surfaces. The read-only getters below fall back to an empty answer
    // instead of returning it.

    fn ledger(&self) -> LedgerResult<Ref<'_, Ledger>> {
        self.inner
            .ledger
            .try_borrow()
            .map_err(|_| ExecutionError::SessionBusy.into())
    }

    fn ledger_mut(&self) -> LedgerResult<RefMut<'_, Ledger>> {
        self.inner
            .ledger
            .try_borrow_mut()
            .map_err(|_| ExecutionError::SessionBusy.into())
    }

    // Ledger

    /// Attributes `value` to `key` under the currently active events.
    ///
    /// A random variable used as the key fans out over its events; see
    /// [`Ledger::write`].
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if `value` is not an exact rational.
    pub fn write(&self, key: impl Into<OutcomeKey>, value: impl IntoProbability) -> LedgerResult<()> {
        let value = value.into_probability()?;
        self.ledger_mut()?.write(&key.into(), value)
    }

    /// Lazy read of `key`, for composing `read(key) + x` writes.
    #[must_use]
    pub fn read(&self, key: impl Into<OutcomeKey>) -> OutcomeRead {
        OutcomeRead::new(key.into())
    }

    /// Applies a write composed from [`Session::read`].
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonNumericEvent` if a variable contribution
    /// lands on a non-integer event.
    pub fn apply(&self, pending: &PendingWrite) -> LedgerResult<()> {
        self.ledger_mut()?.apply(pending)
    }

    /// Marginal probability of outcome `name`; 0 if never written.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::ConflictingEvents` if some entry of `name`
    /// was recorded with two events of one experiment active.
    pub fn probability_of(&self, name: &str) -> LedgerResult<Probability> {
        self.ledger()?.probability_of(name)
    }

    /// Copies of every entry recorded under `name`.
    ///
    /// Empty if the ledger is mid-write.
    #[must_use]
    pub fn entries(&self, name: &str) -> Vec<LedgerEntry> {
        self.ledger()
            .map(|ledger| ledger.entries(name).to_vec())
            .unwrap_or_default()
    }

    /// Every outcome name with at least one entry, sorted.
    ///
    /// Empty if the ledger is mid-write.
    #[must_use]
    pub fn outcome_names(&self) -> Vec<String> {
        self.ledger()
            .map(|ledger| ledger.outcome_names())
            .unwrap_or_default()
    }

    // Active events

    /// Activates `events`. Used by scoped contexts.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::SessionBusy` if the ledger is borrowed.
    pub fn add_events(&self, events: &[Event]) -> LedgerResult<()> {
        self.ledger_mut()?.add_events(events);
        Ok(())
    }

    /// Deactivates `events`. Used by scoped contexts.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::UnbalancedScope` if an event is not active.
    pub fn remove_events(&self, events: &[Event]) -> LedgerResult<()> {
        self.ledger_mut()?.remove_events(events)?;
        Ok(())
    }

    /// Returns true if some event of `experiment` is active.
    ///
    /// False if the ledger is mid-write.
    #[must_use]
    pub fn contains_experiment(&self, experiment: ExperimentId) -> bool {
        self.ledger()
            .map(|ledger| ledger.contains_experiment(experiment))
            .unwrap_or(false)
    }

    /// Returns true if `event` is active.
    ///
    /// False if the ledger is mid-write.
    #[must_use]
    pub fn is_active(&self, event: &Event) -> bool {
        self.ledger()
            .map(|ledger| ledger.active().contains(event))
            .unwrap_or(false)
    }

    /// The active event of `experiment`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::NoActiveEvent` if none is active.
    pub fn current_event_for(&self, experiment: ExperimentId) -> LedgerResult<Event> {
        Ok(self.ledger()?.current_event_for(experiment)?.clone())
    }

    /// Distinct active events, in activation order.
    ///
    /// Empty if the ledger is mid-write.
    #[must_use]
    pub fn active_events(&self) -> Vec<Event> {
        self.ledger()
            .map(|ledger| ledger.active().snapshot())
            .unwrap_or_default()
    }

    /// A context activating `events` in this session.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyEventTable` if `events` is empty.
    pub fn scope(&self, events: Vec<Event>) -> Result<ScopedContext, ValidationError> {
        ScopedContext::new(self, events)
    }

    // Builders

    /// A random variable over `table`.
    ///
    /// # Errors
    ///
    /// See [`RandomVariable::new`].
    pub fn random_variable<N, P, I>(&self, table: I) -> LedgerResult<RandomVariable>
    where
        N: Into<EventName>,
        P: IntoProbability,
        I: IntoIterator<Item = (N, P)>,
    {
        RandomVariable::new(self, table)
    }

    /// A random variable with integer labels.
    ///
    /// # Errors
    ///
    /// See [`NumericRandomVariable::new`].
    pub fn numeric_variable<P, I>(&self, table: I) -> LedgerResult<NumericRandomVariable>
    where
        P: IntoProbability,
        I: IntoIterator<Item = (i64, P)>,
    {
        NumericRandomVariable::new(self, table)
    }

    /// A coin landing heads with probability `p`.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if `p` is not an exact rational in `[0, 1]`.
    pub fn coin_flip(&self, p: impl IntoProbability) -> LedgerResult<CoinFlip> {
        CoinFlip::new(self, p)
    }

    /// A fair die with faces `1..=sides`, each with probability `1/sides`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidDieSides` if `sides < 1` and
    /// `ValidationError::DieTooLarge` past the configured limit.
    pub fn dice(&self, sides: i64) -> LedgerResult<NumericRandomVariable> {
        if sides < 1 {
            return Err(ValidationError::InvalidDieSides { sides }.into());
        }
        let max = self.config().max_die_sides;
        if usize::try_from(sides).map_or(true, |n| n > max) {
            return Err(ValidationError::DieTooLarge { sides, max }.into());
        }
        NumericRandomVariable::new(self, (1..=sides).map(|face| (face, ratio(1, sides))))
    }

    /// A uniform draw from `samples`; each distinct label gets `count / len`.
    ///
    /// Labels keep the order of their first appearance.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptySelection` for no samples and
    /// `ValidationError::SelectionTooLarge` past the configured limit.
    pub fn selection<N, I>(&self, samples: I) -> LedgerResult<RandomVariable>
    where
        N: Into<EventName>,
        I: IntoIterator<Item = N>,
    {
        let mut counts: Vec<(EventName, i64)> = Vec::new();
        let mut index: HashMap<EventName, usize> = HashMap::new();
        let mut total: usize = 0;
        let max = self.config().max_selection_samples;

        for sample in samples {
            total += 1;
            if total > max {
                return Err(ValidationError::SelectionTooLarge { actual: total, max }.into());
            }
            let name = sample.into();
            match index.get(&name) {
                Some(&idx) => counts[idx].1 += 1,
                None => {
                    index.insert(name.clone(), counts.len());
                    counts.push((name, 1));
                }
            }
        }
        if total == 0 {
            return Err(ValidationError::EmptySelection.into());
        }

        let len = i64::try_from(total).map_err(|_| ValidationError::SelectionTooLarge {
            actual: total,
            max,
        })?;
        RandomVariable::new(
            self,
            counts.into_iter().map(|(name, count)| (name, ratio(count, len))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::probability::{one, zero};

    #[test]
    fn sessions_are_independent() {
        let a = Session::new();
        let b = Session::new();
        a.write("x", 1).unwrap();

        assert_eq!(a.probability_of("x").unwrap(), one());
        assert_eq!(b.probability_of("x").unwrap(), zero());
        assert!(!a.same_session(&b));
        assert!(a.same_session(&a.clone()));
    }

    #[test]
    fn with_config_validates() {
        let bad = SessionConfig {
            max_selection_samples: 0,
            ..SessionConfig::default()
        };
        assert!(Session::with_config(bad).is_err());
        assert!(Session::with_config(SessionConfig::lenient()).is_ok());
    }

    #[test]
    fn write_accepts_text_and_float_values() {
        let session = Session::new();
        session.write("x", "1/4").unwrap();
        session.write("x", 0.25).unwrap();
        assert_eq!(session.probability_of("x").unwrap(), ratio(1, 2));

        let err = session.write("x", "nope").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(session.entries("x").len(), 2);
    }

    #[test]
    fn read_plus_value_applies() {
        let session = Session::new();
        let pending = session.read("hits") + 3;
        session.apply(&pending).unwrap();
        let pending = 2i64 + session.read("hits");
        session.apply(&pending).unwrap();
        assert_eq!(session.probability_of("hits").unwrap(), ratio(5, 1));
    }

    #[test]
    fn current_event_reports_missing() {
        let session = Session::new();
        let coin = session.coin_flip(ratio(1, 2)).unwrap();
        let err = session.current_event_for(coin.experiment().id()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Execution(ExecutionError::NoActiveEvent { .. })
        ));

        let _guard = coin.tails().enter().unwrap();
        let current = session.current_event_for(coin.experiment().id()).unwrap();
        assert_eq!(current.name(), &EventName::from("tails"));
        assert!(session.is_active(&current));
        assert_eq!(session.active_events(), vec![current]);
    }

    #[test]
    fn dice_rejects_non_positive_sides() {
        let session = Session::new();
        for sides in [0, -1] {
            let err = session.dice(sides).unwrap_err();
            assert_eq!(err, LedgerError::from(ValidationError::InvalidDieSides { sides }));
        }
        let d1 = session.dice(1).unwrap();
        assert_eq!(d1.variable().probability(1).unwrap(), &one());
    }

    #[test]
    fn selection_limits() {
        let session = Session::with_config(SessionConfig {
            max_selection_samples: 3,
            ..SessionConfig::default()
        })
        .unwrap();

        assert_eq!(
            session.selection(Vec::<&str>::new()).unwrap_err(),
            LedgerError::from(ValidationError::EmptySelection)
        );
        assert!(matches!(
            session.selection(["a", "b", "c", "d"]).unwrap_err(),
            LedgerError::Validation(ValidationError::SelectionTooLarge { .. })
        ));
        let pick = session.selection(["a", "b", "a"]).unwrap();
        assert_eq!(pick.probability("a").unwrap(), &ratio(2, 3));
    }

    #[test]
    fn selection_of_many_distinct_labels() {
        let session = Session::new();
        let n: i64 = 50_000;
        let pick = session.selection((0..n).chain([7])).unwrap();

        assert_eq!(pick.experiment().len(), 50_000);
        assert_eq!(pick.probability(7).unwrap(), &ratio(2, n + 1));
        assert_eq!(pick.probability(8).unwrap(), &ratio(1, n + 1));
        assert_eq!(pick.names().next(), Some(&EventName::Number(0)));
    }

    #[test]
    fn dice_respects_configured_limit() {
        let session = Session::with_config(SessionConfig {
            max_die_sides: 20,
            ..SessionConfig::default()
        })
        .unwrap();

        assert_eq!(session.dice(20).unwrap().experiment().len(), 20);
        assert_eq!(
            session.dice(21).unwrap_err(),
            LedgerError::from(ValidationError::DieTooLarge { sides: 21, max: 20 })
        );
    }

    #[test]
    fn getters_fall_back_while_ledger_is_borrowed() {
        let session = Session::new();
        let coin = session.coin_flip(ratio(1, 2)).unwrap();
        let _heads = coin.heads().enter().unwrap();
        session.write("x", 1).unwrap();

        let busy = session.ledger_mut().unwrap();
        assert!(session.entries("x").is_empty());
        assert!(session.outcome_names().is_empty());
        assert!(session.active_events().is_empty());
        assert!(!session.contains_experiment(coin.experiment().id()));
        assert_eq!(
            session.probability_of("x").unwrap_err(),
            LedgerError::from(ExecutionError::SessionBusy)
        );
        drop(busy);

        assert_eq!(session.entries("x").len(), 1);
        assert!(session.contains_experiment(coin.experiment().id()));
    }
}
