use serde::{Deserialize, Serialize};

use crate::{coercion::OptimizationSchedule, error::ConfigError};

/// Settings for a Markov chain run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    /// Number of iterations `run` performs.
    pub chain_length: u64,
    pub seed: u64,
    /// Tune coercible operators whose mode is `Default`.
    pub use_coercion: bool,
    /// No operator is tuned before this iteration.
    pub coercion_delay: u64,
    pub optimization_schedule: OptimizationSchedule,
    /// Visit operators in order instead of drawing them by weight.
    pub sequential: bool,
    pub temperature: f64,
    /// Length of the test phase in which every score is checked against a
    /// full recomputation. Zero disables the check.
    pub full_evaluation_count: u64,
    /// The test phase also lasts until every operator was accepted or
    /// rejected this many times.
    pub min_operator_count_for_full_evaluation: u64,
    pub num_chains: usize,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            chain_length: 10_000,
            seed: 0,
            use_coercion: true,
            coercion_delay: 0,
            optimization_schedule: OptimizationSchedule::Default,
            sequential: false,
            temperature: 1.0,
            full_evaluation_count: 0,
            min_operator_count_for_full_evaluation: 1,
            num_chains: 1,
        }
    }
}

impl ChainSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(ConfigError::InvalidSetting(format!(
                "temperature must be positive and finite, got {}",
                self.temperature
            )));
        }
        if self.num_chains == 0 {
            return Err(ConfigError::InvalidSetting(
                "at least one chain is required".to_string(),
            ));
        }
        Ok(())
    }
}
