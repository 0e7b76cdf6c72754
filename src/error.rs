//! Error types for probledger.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the exact failure. Construction problems surface as [`ValidationError`],
//! accounting problems as [`ExecutionError`].

use thiserror::Error;

use crate::event::{EventName, ExperimentId};

/// Validation errors raised while building experiments, variables or configs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A table, selection of names or scope had no events.
    #[error("Event table cannot be empty")]
    EmptyEventTable,

    /// The same label was given twice.
    #[error("Event '{name}' appears more than once")]
    DuplicateEventName {
        /// The repeated label.
        name: EventName,
    },

    /// An event was given a probability below zero.
    #[error("Event '{name}' has negative probability {probability}")]
    NegativeProbability {
        /// The offending event.
        name: EventName,
        /// The probability, rendered as `n/d`.
        probability: String,
    },

    /// An event has probability zero and the session forbids that.
    #[error("Event '{name}' has zero probability, which this session forbids")]
    ZeroProbability {
        /// The offending event.
        name: EventName,
    },

    /// The table does not sum to exactly 1.
    #[error("Event probabilities sum to {sum}, expected exactly 1")]
    NotNormalized {
        /// The actual sum, rendered as `n/d`.
        sum: String,
    },

    /// A lookup named an event the experiment does not have.
    #[error("Unknown event: '{name}'")]
    UnknownEvent {
        /// The label that was looked up.
        name: EventName,
    },

    /// A numeric contribution reached an event without an integer label.
    #[error("Event '{name}' is not numeric")]
    NonNumericEvent {
        /// The non-numeric label.
        name: EventName,
    },

    /// A die was asked for fewer than one side.
    #[error("A die needs at least one side, got {sides}")]
    InvalidDieSides {
        /// The requested side count.
        sides: i64,
    },

    /// A die was asked for more sides than the session allows.
    #[error("A die with {sides} sides exceeds the maximum of {max}")]
    DieTooLarge {
        /// The requested side count.
        sides: i64,
        /// The configured limit.
        max: usize,
    },

    /// A selection was built from no samples.
    #[error("Selection needs at least one sample")]
    EmptySelection,

    /// A selection had more samples than the session allows.
    #[error("Selection has {actual} samples, maximum is {max}")]
    SelectionTooLarge {
        /// Samples seen before giving up.
        actual: usize,
        /// The configured limit.
        max: usize,
    },

    /// A value could not be read as an exact rational.
    #[error("Cannot read '{input}' as a probability: {reason}")]
    InvalidProbabilityLiteral {
        /// The input as given.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The session config is malformed or out of range.
    #[error("Invalid session config: {reason}")]
    InvalidConfig {
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors raised while scoping events or querying the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Two different events of one experiment were combined.
    #[error("Events '{first}' and '{second}' both belong to experiment {experiment}")]
    ConflictingEvents {
        /// The shared experiment.
        experiment: ExperimentId,
        /// The event seen first.
        first: EventName,
        /// The event that conflicts with it.
        second: EventName,
    },

    /// A scope tried to release an event that is not active.
    #[error("Event '{event}' is not active and cannot be released")]
    UnbalancedScope {
        /// The event that could not be released.
        event: EventName,
    },

    /// No event of the experiment is active.
    #[error("No event of experiment {experiment} is active")]
    NoActiveEvent {
        /// The experiment that was asked about.
        experiment: ExperimentId,
    },

    /// The session ledger was already borrowed.
    #[error("Session is already borrowed; ledger calls cannot be nested")]
    SessionBusy,
}

/// Top-level error type for probledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Bad input to a constructor or builder.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Failure while scoping, writing or querying.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl LedgerError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if two events of one experiment were combined.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::ConflictingEvents { .. })
        )
    }

    /// Returns true if a scope tried to release an inactive event.
    #[must_use]
    pub const fn is_unbalanced_scope(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::UnbalancedScope { .. }))
    }
}

/// Result type alias for probledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
