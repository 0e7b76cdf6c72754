//! # probledger - exact probability accounting over nested event scopes
//!
//! Declare independent experiments (coin flips, dice, weighted selections),
//! enter nested scopes in which some of their events hold, attribute values
//! to named outcomes, and query the exact marginal probability of any
//! outcome afterwards.
//!
//! ## Core Concepts
//!
//! - **Experiment**: a partition of the sample space into exclusive events
//! - **Event**: one outcome of one experiment, with an exact probability
//! - **Scope**: a guard that keeps a set of events active
//! - **Ledger**: append-only log of `(value, active events)` per outcome;
//!   a query sums `value * joint_probability(events)`
//!
//! ## Usage
//!
//! ```
//! use probledger::{ratio, Session};
//!
//! let session = Session::new();
//! let first = session.coin_flip("1/2")?;
//! let second = session.coin_flip("1/2")?;
//!
//! {
//!     let _h = first.heads().enter()?;
//!     let _t = second.tails().enter()?;
//!     session.write("HT", 1)?;
//! }
//!
//! assert_eq!(session.probability_of("HT")?, ratio(1, 4));
//! assert_eq!(session.probability_of("never_written")?, ratio(0, 1));
//! # Ok::<(), probledger::LedgerError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod active;
pub mod config;
pub mod error;
pub mod event;
pub mod joint;
pub mod ledger;
pub mod probability;
pub mod report;
pub mod scope;
pub mod session;
pub mod variable;

// Re-export primary types at crate root for convenience
pub use active::ActiveEvents;
pub use config::SessionConfig;
pub use error::{ExecutionError, LedgerError, LedgerResult, ValidationError};
pub use event::{Event, EventName, Experiment, ExperimentId};
pub use joint::joint_probability;
pub use ledger::{
    Contribution, Ledger, LedgerEntry, OutcomeKey, OutcomeRead, PendingWrite, VariableRef,
};
pub use probability::{parse_probability, ratio, IntoProbability, Probability};
pub use report::{OutcomeReport, OutcomeSummary};
pub use scope::{ScopeGuard, ScopedContext};
pub use session::{Session, SessionId};
pub use variable::{CoinFlip, NumericRandomVariable, RandomVariable};
