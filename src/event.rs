//! Experiments and the events they partition the sample space into.
//!
//! An [`Experiment`] gets a fresh [`ExperimentId`] on every construction, so
//! two experiments with identical tables stay distinct. An [`Event`] is one
//! outcome of exactly one experiment; its identity is its name plus the id of
//! the experiment that produced it.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use num_traits::Zero;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::probability::Probability;

/// Globally unique experiment identifier.
///
/// Never derived from content: two coin flips with the same bias get
/// different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(Uuid);

impl ExperimentId {
    /// Creates a new random experiment ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Label of an event: text, an integer, or the members of a compound event.
///
/// The ledger keys fan-out writes by the rendered label, so `Number(1)` and
/// `Text("1")` land on the same outcome name. A compound label renders as
/// `"e1 OR e2"` but never equals a plain label with that text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventName {
    /// Integer label, as used by dice and numeric variables.
    Number(i64),
    /// Free-form text label.
    Text(String),
    /// Label of "any of these events" within one experiment.
    AnyOf(Vec<EventName>),
}

impl EventName {
    /// Returns the numeric label, if this is one.
    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) | Self::AnyOf(_) => None,
        }
    }

    /// Returns true for integer labels.
    #[must_use]
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::AnyOf(members) => {
                for (idx, member) in members.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" OR ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for EventName {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for EventName {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<i64> for EventName {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for EventName {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

impl From<&EventName> for EventName {
    fn from(name: &EventName) -> Self {
        name.clone()
    }
}

/// One outcome of exactly one experiment, with a fixed exact probability.
///
/// Equality and hashing use the owning experiment and the name only.
#[derive(Debug, Clone)]
pub struct Event {
    experiment: ExperimentId,
    name: EventName,
    probability: Probability,
    // Simple events of a compound event; empty for simple events.
    members: Vec<Event>,
}

impl Event {
    /// The experiment this event belongs to.
    #[must_use]
    pub const fn experiment(&self) -> ExperimentId {
        self.experiment
    }

    /// The event label.
    #[must_use]
    pub const fn name(&self) -> &EventName {
        &self.name
    }

    /// The exact probability of this event.
    #[must_use]
    pub const fn probability(&self) -> &Probability {
        &self.probability
    }

    /// Returns true for an "any of" event built from several simple events.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        !self.members.is_empty()
    }

    /// The simple events this event covers: itself, or a compound's members.
    #[must_use]
    pub fn members(&self) -> &[Event] {
        if self.members.is_empty() {
            std::slice::from_ref(self)
        } else {
            &self.members
        }
    }

    /// The event "`self` or `other`".
    ///
    /// Shared members are counted once, so `(e1 OR e2) or (e2 OR e3)` covers
    /// `e1`, `e2` and `e3`. Returns `None` if the events belong to different
    /// experiments, where "or" is not an event of either.
    #[must_use]
    pub fn or(&self, other: &Self) -> Option<Self> {
        if self.experiment != other.experiment {
            return None;
        }
        let mut members: Vec<Self> = self.members().to_vec();
        for member in other.members() {
            if !members.contains(member) {
                members.push(member.clone());
            }
        }
        Some(Self::compound(self.experiment, members))
    }

    fn simple(experiment: ExperimentId, name: EventName, probability: Probability) -> Self {
        Self {
            experiment,
            name,
            probability,
            members: Vec::new(),
        }
    }

    // `members` are distinct simple events of `experiment`, at least one.
    fn compound(experiment: ExperimentId, mut members: Vec<Self>) -> Self {
        if members.len() == 1 {
            return members.remove(0);
        }
        let probability = members
            .iter()
            .fold(Probability::zero(), |acc, m| acc + &m.probability);
        Self {
            experiment,
            name: EventName::AnyOf(members.iter().map(|m| m.name.clone()).collect()),
            probability,
            members,
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.experiment == other.experiment && self.name == other.name
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.experiment.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A partition of the sample space into named events.
///
/// Immutable once built. Cloning shares the event table.
#[derive(Debug, Clone)]
pub struct Experiment {
    id: ExperimentId,
    events: Arc<[Event]>,
    index: Arc<HashMap<EventName, usize>>,
}

impl Experiment {
    /// Builds an experiment from an ordered `name -> probability` table.
    ///
    /// Probabilities are taken as given; normalization is checked by the
    /// random-variable layer according to the session config.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyEventTable` for an empty table and
    /// `ValidationError::DuplicateEventName` if a name repeats.
    pub fn new<N, I>(table: I) -> Result<Self, ValidationError>
    where
        N: Into<EventName>,
        I: IntoIterator<Item = (N, Probability)>,
    {
        let id = ExperimentId::new();
        let mut events: Vec<Event> = Vec::new();
        let mut index: HashMap<EventName, usize> = HashMap::new();
        for (name, probability) in table {
            let name = name.into();
            if index.contains_key(&name) {
                return Err(ValidationError::DuplicateEventName { name });
            }
            index.insert(name.clone(), events.len());
            events.push(Event::simple(id, name, probability));
        }
        if events.is_empty() {
            return Err(ValidationError::EmptyEventTable);
        }

        Ok(Self {
            id,
            events: events.into(),
            index: Arc::new(index),
        })
    }

    /// The experiment identity.
    #[must_use]
    pub const fn id(&self) -> ExperimentId {
        self.id
    }

    /// Events in table order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Always false; an experiment has at least one event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Looks up an event by name.
    #[must_use]
    pub fn event(&self, name: &EventName) -> Option<&Event> {
        self.position(name).map(|idx| &self.events[idx])
    }

    /// Table position of event `name`.
    #[must_use]
    pub fn position(&self, name: &EventName) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Sum of all event probabilities.
    #[must_use]
    pub fn total_probability(&self) -> Probability {
        self.events
            .iter()
            .fold(Probability::zero(), |acc, e| acc + &e.probability)
    }

    /// Builds the compound event "any of `names`".
    ///
    /// Its probability is the sum of the members and its label is
    /// [`EventName::AnyOf`]. Members of one experiment are mutually
    /// exclusive, so the sum is exact. A single name yields that event.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyEventTable` for no names,
    /// `ValidationError::UnknownEvent` for a name not in this experiment and
    /// `ValidationError::DuplicateEventName` if a name is listed twice.
    pub fn any_of<N: Into<EventName>>(
        &self,
        names: impl IntoIterator<Item = N>,
    ) -> Result<Event, ValidationError> {
        let mut members: Vec<Event> = Vec::new();
        for name in names {
            let name = name.into();
            let event = self
                .event(&name)
                .ok_or_else(|| ValidationError::UnknownEvent { name: name.clone() })?;
            if members.contains(event) {
                return Err(ValidationError::DuplicateEventName { name });
            }
            members.push(event.clone());
        }
        if members.is_empty() {
            return Err(ValidationError::EmptyEventTable);
        }
        Ok(Event::compound(self.id, members))
    }
}

impl PartialEq for Experiment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Experiment {}

impl Hash for Experiment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
