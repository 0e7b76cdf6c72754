//! Session configuration.

use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::Experiment;
use crate::probability::render;

/// Rules a session applies when random variables are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reject event tables whose probabilities do not sum to exactly 1.
    pub require_normalized: bool,
    /// Accept events with probability exactly 0.
    pub allow_zero_probability: bool,
    /// Maximum number of samples accepted by a categorical selection.
    pub max_selection_samples: usize,
    /// Maximum number of faces accepted by a die.
    pub max_die_sides: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            require_normalized: true,
            allow_zero_probability: true,
            max_selection_samples: 1_000_000,
            max_die_sides: 1_000_000,
        }
    }
}

impl SessionConfig {
    /// A config that accepts any non-negative table, normalized or not.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            require_normalized: false,
            ..Self::default()
        }
    }

    /// Parses a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` on malformed JSON or values
    /// rejected by [`SessionConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config.
    ///
    /// This is called when a session is created.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_selection_samples == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_selection_samples must be > 0".to_string(),
            });
        }
        if self.max_die_sides == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_die_sides must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Checks an experiment's table against these rules.
    ///
    /// Negative probabilities are always rejected.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NegativeProbability`,
    /// `ValidationError::ZeroProbability` or `ValidationError::NotNormalized`.
    pub fn check_experiment(&self, experiment: &Experiment) -> Result<(), ValidationError> {
        for event in experiment.events() {
            let p = event.probability();
            if p.is_negative() {
                return Err(ValidationError::NegativeProbability {
                    name: event.name().clone(),
                    probability: render(p),
                });
            }
            if !self.allow_zero_probability && p.is_zero() {
                return Err(ValidationError::ZeroProbability {
                    name: event.name().clone(),
                });
            }
        }

        if self.require_normalized {
            let sum = experiment.total_probability();
            if !sum.is_one() {
                return Err(ValidationError::NotNormalized { sum: render(&sum) });
            }
        }
        Ok(())
    }
}
