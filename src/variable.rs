//! Random variables: an experiment bound to one scoped context per event.

use std::ops::Add;

use crate::error::{LedgerResult, ValidationError};
use crate::event::{EventName, Experiment};
use crate::ledger::{OutcomeKey, OutcomeRead, PendingWrite, VariableRef};
use crate::probability::{one, zero, IntoProbability, Probability};
use crate::scope::ScopedContext;
use crate::session::Session;

/// A discrete random variable.
///
/// Owns one [`Experiment`] and a [`ScopedContext`] per event. Used as an
/// outcome key it fans a write out over its events.
#[derive(Debug, Clone)]
pub struct RandomVariable {
    experiment: Experiment,
    contexts: Vec<ScopedContext>,
}

impl RandomVariable {
    /// Builds a variable from a `name -> probability` table in `session`.
    ///
    /// # Errors
    ///
    /// - `ValidationError::EmptyEventTable` if the table is empty
    /// - `ValidationError::DuplicateEventName` if a name repeats
    /// - `ValidationError::NegativeProbability` for a negative entry
    /// - `ValidationError::NotNormalized` if the session requires tables to
    ///   sum to 1 and this one does not
    /// - `ValidationError::InvalidProbabilityLiteral` if a probability cannot
    ///   be coerced
    pub fn new<N, P, I>(session: &Session, table: I) -> LedgerResult<Self>
    where
        N: Into<EventName>,
        P: IntoProbability,
        I: IntoIterator<Item = (N, P)>,
    {
        let mut rows: Vec<(EventName, Probability)> = Vec::new();
        for (name, p) in table {
            rows.push((name.into(), p.into_probability()?));
        }
        let experiment = Experiment::new(rows)?;
        session.config().check_experiment(&experiment)?;

        let contexts = experiment
            .events()
            .iter()
            .map(|event| ScopedContext::single(session, event.clone()))
            .collect();

        tracing::debug!(
            session = %session.id(),
            experiment = %experiment.id(),
            events = experiment.len(),
            "random variable created"
        );
        Ok(Self {
            experiment,
            contexts,
        })
    }

    /// The underlying experiment.
    #[must_use]
    pub const fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// Event labels in table order.
    pub fn names(&self) -> impl Iterator<Item = &EventName> {
        self.experiment.events().iter().map(|e| e.name())
    }

    fn index_of(&self, name: &EventName) -> Result<usize, ValidationError> {
        self.experiment
            .position(name)
            .ok_or_else(|| ValidationError::UnknownEvent { name: name.clone() })
    }

    /// The context that activates event `name`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownEvent` if the variable has no such event.
    pub fn event(&self, name: impl Into<EventName>) -> LedgerResult<&ScopedContext> {
        let idx = self.index_of(&name.into())?;
        Ok(&self.contexts[idx])
    }

    pub(crate) fn context_at(&self, idx: usize) -> &ScopedContext {
        &self.contexts[idx]
    }

    /// A context activating the compound event "any of `names`".
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownEvent` for a name not in the variable,
    /// `ValidationError::EmptyEventTable` for no names.
    pub fn any_of<N: Into<EventName>>(
        &self,
        names: impl IntoIterator<Item = N>,
    ) -> LedgerResult<ScopedContext> {
        let compound = self.experiment.any_of(names)?;
        let session = self.session();
        Ok(ScopedContext::new(&session, vec![compound])?)
    }

    fn session(&self) -> Session {
        // Every context was built against the same session.
        self.contexts[0].session()
    }

    /// Probability of event `name`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownEvent` if the variable has no such event.
    pub fn probability(&self, name: impl Into<EventName>) -> LedgerResult<&Probability> {
        let idx = self.index_of(&name.into())?;
        Ok(self.experiment.events()[idx].probability())
    }

    /// Handle usable as an outcome key.
    #[must_use]
    pub fn handle(&self) -> VariableRef {
        VariableRef::new(self.experiment.clone())
    }
}

impl From<&RandomVariable> for OutcomeKey {
    fn from(var: &RandomVariable) -> Self {
        Self::Variable(var.handle())
    }
}

/// A random variable whose labels are integers.
///
/// Besides acting as an outcome key, it can be added to an outcome read:
/// `session.read("hit") + &rv` attributes the value of whichever event holds.
#[derive(Debug, Clone)]
pub struct NumericRandomVariable {
    variable: RandomVariable,
}

impl NumericRandomVariable {
    /// Builds a numeric variable from a `value -> probability` table.
    ///
    /// # Errors
    ///
    /// See [`RandomVariable::new`].
    pub fn new<P, I>(session: &Session, table: I) -> LedgerResult<Self>
    where
        P: IntoProbability,
        I: IntoIterator<Item = (i64, P)>,
    {
        Ok(Self {
            variable: RandomVariable::new(session, table)?,
        })
    }

    /// Wraps a variable whose labels are all integers.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonNumericEvent` naming the first text label.
    pub fn try_from_variable(variable: RandomVariable) -> Result<Self, ValidationError> {
        if let Some(name) = variable.names().find(|n| !n.is_number()) {
            return Err(ValidationError::NonNumericEvent { name: name.clone() });
        }
        Ok(Self { variable })
    }

    /// The context that activates the event labelled `value`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownEvent` if there is no such event.
    pub fn event(&self, value: i64) -> LedgerResult<&ScopedContext> {
        self.variable.event(value)
    }

    /// The underlying random variable.
    #[must_use]
    pub const fn variable(&self) -> &RandomVariable {
        &self.variable
    }

    /// The underlying experiment.
    #[must_use]
    pub const fn experiment(&self) -> &Experiment {
        self.variable.experiment()
    }

    /// `sum(value * probability)` over the events.
    #[must_use]
    pub fn expected_value(&self) -> Probability {
        self.variable
            .experiment()
            .events()
            .iter()
            .filter_map(|e| e.name().as_number().map(|n| (n, e.probability())))
            .fold(zero(), |acc, (n, p)| acc + Probability::from_integer(n.into()) * p)
    }

    /// Handle usable as an outcome key or read contribution.
    #[must_use]
    pub fn handle(&self) -> VariableRef {
        self.variable.handle()
    }
}

impl From<&NumericRandomVariable> for OutcomeKey {
    fn from(var: &NumericRandomVariable) -> Self {
        Self::Variable(var.handle())
    }
}

impl Add<&NumericRandomVariable> for OutcomeRead {
    type Output = PendingWrite;

    fn add(self, rhs: &NumericRandomVariable) -> PendingWrite {
        self.plus_variable(rhs.handle())
    }
}

impl Add<OutcomeRead> for &NumericRandomVariable {
    type Output = PendingWrite;

    fn add(self, rhs: OutcomeRead) -> PendingWrite {
        rhs.plus_variable(self.handle())
    }
}

/// A two-sided coin with events `"heads"` and `"tails"`.
#[derive(Debug, Clone)]
pub struct CoinFlip {
    variable: RandomVariable,
}

impl CoinFlip {
    /// Label of the heads event.
    pub const HEADS: &'static str = "heads";
    /// Label of the tails event.
    pub const TAILS: &'static str = "tails";

    /// A coin landing heads with probability `p` and tails with `1 - p`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NegativeProbability` if `p` lies outside
    /// `[0, 1]`, or a coercion error if `p` is not an exact rational.
    pub fn new(session: &Session, p: impl IntoProbability) -> LedgerResult<Self> {
        let heads = p.into_probability()?;
        let tails = one() - &heads;
        Ok(Self {
            variable: RandomVariable::new(session, [(Self::HEADS, heads), (Self::TAILS, tails)])?,
        })
    }

    /// Context activating heads.
    #[must_use]
    pub fn heads(&self) -> &ScopedContext {
        self.variable.context_at(0)
    }

    /// Context activating tails.
    #[must_use]
    pub fn tails(&self) -> &ScopedContext {
        self.variable.context_at(1)
    }

    /// Probability of heads.
    #[must_use]
    pub fn p_heads(&self) -> &Probability {
        self.variable.experiment().events()[0].probability()
    }

    /// The underlying random variable.
    #[must_use]
    pub const fn variable(&self) -> &RandomVariable {
        &self.variable
    }

    /// The underlying experiment.
    #[must_use]
    pub const fn experiment(&self) -> &Experiment {
        self.variable.experiment()
    }
}

impl From<&CoinFlip> for OutcomeKey {
    fn from(coin: &CoinFlip) -> Self {
        Self::Variable(coin.variable.handle())
    }
}
