//! The accept/reject rule applied to every non-failed proposal.

use crate::{error::ConfigError, random::RandomSource};

/// Decides whether a proposed state replaces the current one.
pub trait Acceptor {
    /// Log of the acceptance ratio for a move from `old_score` to `new_score`.
    fn log_acceptance(&self, old_score: f64, new_score: f64, log_hastings_ratio: f64) -> f64;

    /// Accept if the log ratio is non-negative, otherwise with probability
    /// `exp(log_ratio)`. No random number is drawn for sure acceptances.
    fn accept(
        &self,
        old_score: f64,
        new_score: f64,
        log_hastings_ratio: f64,
        rng: &mut dyn RandomSource,
    ) -> bool {
        let log_ratio = self.log_acceptance(old_score, new_score, log_hastings_ratio);
        if log_ratio >= 0.0 {
            return true;
        }
        if log_ratio == f64::NEG_INFINITY {
            return false;
        }
        rng.uniform().ln() < log_ratio
    }
}

/// The Metropolis-Hastings rule with an optional temperature.
///
/// A temperature above one flattens the posterior, as used by heated chains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetropolisHastings {
    temperature: f64,
}

impl Default for MetropolisHastings {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

impl MetropolisHastings {
    pub fn new(temperature: f64) -> Result<Self, ConfigError> {
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(ConfigError::InvalidSetting(format!(
                "temperature {} must be positive and finite",
                temperature
            )));
        }
        Ok(Self { temperature })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }
}

impl Acceptor for MetropolisHastings {
    fn log_acceptance(&self, old_score: f64, new_score: f64, log_hastings_ratio: f64) -> f64 {
        (new_score - old_score) / self.temperature + log_hastings_ratio
    }
}
