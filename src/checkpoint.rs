//! Serializable snapshot of everything the chain itself owns.
//!
//! The model state is not part of it; whoever writes a checkpoint stores the
//! model alongside.

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, operator::Operator, random::RngSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoercionCheckpoint {
    pub raw: f64,
    pub updates: u64,
    pub accepted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorCheckpoint {
    pub name: String,
    pub weight: f64,
    pub accept_count: u64,
    pub reject_count: u64,
    pub fail_count: u64,
    pub sum_deviation: f64,
    pub coercion: Option<CoercionCheckpoint>,
}

impl OperatorCheckpoint {
    pub fn capture<S: ?Sized>(operator: &dyn Operator<S>) -> Self {
        let core = operator.core();
        Self {
            name: core.name().to_string(),
            weight: core.weight(),
            accept_count: core.accept_count(),
            reject_count: core.reject_count(),
            fail_count: core.fail_count(),
            sum_deviation: core.sum_deviation(),
            coercion: operator.coercion().map(|c| CoercionCheckpoint {
                raw: c.raw(),
                updates: c.update_count(),
                accepted: c.accepted_count(),
            }),
        }
    }

    /// Write the saved counters and tuning back into `operator`.
    ///
    /// The weight is not applied here, the schedule has to recompute its
    /// totals when weights change.
    pub fn apply<S: ?Sized>(&self, operator: &mut dyn Operator<S>) -> Result<(), ConfigError> {
        if operator.name() != self.name {
            return Err(ConfigError::InvalidSetting(format!(
                "checkpoint holds operator '{}' where the schedule has '{}'",
                self.name,
                operator.name()
            )));
        }
        operator.core_mut().restore_counts(
            self.accept_count,
            self.reject_count,
            self.fail_count,
            self.sum_deviation,
        );
        match (operator.coercion_mut(), &self.coercion) {
            (Some(controller), Some(saved)) => {
                controller.restore(saved.raw, saved.updates, saved.accepted)
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::InvalidSetting(format!(
                    "coercion state of operator '{}' does not match the checkpoint",
                    self.name
                )))
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    /// Number of iterations completed.
    pub iteration: u64,
    pub current_score: f64,
    pub best_score: f64,
    pub initial_score: f64,
    pub schedule_cursor: u64,
    pub rng: Option<RngSnapshot>,
    pub operators: Vec<OperatorCheckpoint>,
}
