//! Serializable summary of every outcome in a session.

use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;
use crate::probability::render;
use crate::session::{Session, SessionId};

/// One outcome's marginal probability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    /// Outcome name.
    pub name: String,
    /// Exact probability rendered as `n/d` (or `n`).
    pub probability: String,
    /// Number of ledger entries behind it.
    pub entries: usize,
}

/// Snapshot of all outcomes of a session, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeReport {
    /// Session the report was taken from.
    pub session: SessionId,
    /// One summary per outcome name.
    pub outcomes: Vec<OutcomeSummary>,
}

impl OutcomeReport {
    /// Looks up an outcome by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OutcomeSummary> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

impl Session {
    /// Computes the probability of every outcome written so far.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::ConflictingEvents` if any outcome has an
    /// entry recorded under conflicting events.
    pub fn report(&self) -> LedgerResult<OutcomeReport> {
        let mut outcomes = Vec::new();
        for name in self.outcome_names() {
            let probability = self.probability_of(&name)?;
            let entries = self.entries(&name).len();
            outcomes.push(OutcomeSummary {
                probability: render(&probability),
                entries,
                name,
            });
        }
        Ok(OutcomeReport {
            session: self.id(),
            outcomes,
        })
    }
}
