//! The contract every Metropolis-Hastings move satisfies.

use std::time::Duration;

use thiserror::Error;

use crate::{coercion::CoercionController, error::ConfigError, random::RandomSource};

/// Why an operator could not produce a proposal this iteration.
///
/// This is an expected outcome, not an error of the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorFailure {
    #[error("proposed value {value} is outside the bounds of '{parameter}'")]
    OutOfBounds { parameter: String, value: f64 },
    #[error("parameter '{0}' has no dimensions to operate on")]
    EmptyParameter(String),
    #[error("tree has {tips} tips, at least {needed} are needed")]
    TreeTooSmall { tips: usize, needed: usize },
    #[error("no valid move found: {0}")]
    NoValidMove(String),
}

/// Outcome of a single proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    /// The state was changed in place. Carries the log Hastings ratio.
    Proposed(f64),
    /// No legal move existed, the state must be as it was before.
    Failed(OperatorFailure),
}

impl Proposal {
    pub fn log_hastings_ratio(&self) -> Option<f64> {
        match self {
            Proposal::Proposed(ratio) => Some(*ratio),
            Proposal::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Proposal::Failed(_))
    }
}

/// Acceptance probability bands used to judge how well an operator is tuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceDiagnosis {
    Low,
    SlightlyLow,
    Good,
    SlightlyHigh,
    High,
}

pub const MINIMUM_ACCEPTANCE_LEVEL: f64 = 0.05;
pub const MINIMUM_GOOD_ACCEPTANCE_LEVEL: f64 = 0.10;
pub const MAXIMUM_GOOD_ACCEPTANCE_LEVEL: f64 = 0.40;
pub const MAXIMUM_ACCEPTANCE_LEVEL: f64 = 0.50;

impl AcceptanceDiagnosis {
    pub fn from_probability(p: f64) -> Self {
        if p < MINIMUM_ACCEPTANCE_LEVEL {
            AcceptanceDiagnosis::Low
        } else if p < MINIMUM_GOOD_ACCEPTANCE_LEVEL {
            AcceptanceDiagnosis::SlightlyLow
        } else if p > MAXIMUM_ACCEPTANCE_LEVEL {
            AcceptanceDiagnosis::High
        } else if p > MAXIMUM_GOOD_ACCEPTANCE_LEVEL {
            AcceptanceDiagnosis::SlightlyHigh
        } else {
            AcceptanceDiagnosis::Good
        }
    }
}

/// Bookkeeping shared by every operator: identity, weight and counters.
///
/// Counters only grow, except through [`OperatorCore::reset`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorCore {
    name: String,
    weight: f64,
    accept_count: u64,
    reject_count: u64,
    fail_count: u64,
    sum_deviation: f64,
    evaluation_time: Duration,
}

impl OperatorCore {
    pub fn new(name: impl Into<String>, weight: f64) -> Result<Self, ConfigError> {
        let name = name.into();
        check_weight(&name, weight)?;
        Ok(Self {
            name,
            weight,
            accept_count: 0,
            reject_count: 0,
            fail_count: 0,
            sum_deviation: 0.0,
            evaluation_time: Duration::ZERO,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) -> Result<(), ConfigError> {
        check_weight(&self.name, weight)?;
        self.weight = weight;
        Ok(())
    }

    pub fn accept_count(&self) -> u64 {
        self.accept_count
    }

    pub fn reject_count(&self) -> u64 {
        self.reject_count
    }

    pub fn fail_count(&self) -> u64 {
        self.fail_count
    }

    /// Accepted plus rejected proposals. Failures do not count.
    pub fn operation_count(&self) -> u64 {
        self.accept_count + self.reject_count
    }

    /// Mean change in posterior over accepted moves.
    pub fn mean_deviation(&self) -> f64 {
        if self.accept_count == 0 {
            0.0
        } else {
            self.sum_deviation / self.accept_count as f64
        }
    }

    pub fn evaluation_time(&self) -> Duration {
        self.evaluation_time
    }

    pub fn acceptance_probability(&self) -> f64 {
        let total = self.operation_count();
        if total == 0 {
            0.0
        } else {
            self.accept_count as f64 / total as f64
        }
    }

    pub fn diagnosis(&self) -> AcceptanceDiagnosis {
        AcceptanceDiagnosis::from_probability(self.acceptance_probability())
    }

    pub fn record_accept(&mut self, deviation: f64) {
        self.accept_count += 1;
        self.sum_deviation += deviation;
    }

    pub fn record_reject(&mut self) {
        self.reject_count += 1;
    }

    pub fn record_failure(&mut self) {
        self.fail_count += 1;
    }

    pub fn add_evaluation_time(&mut self, elapsed: Duration) {
        self.evaluation_time += elapsed;
    }

    pub fn sum_deviation(&self) -> f64 {
        self.sum_deviation
    }

    pub(crate) fn restore_counts(&mut self, accept: u64, reject: u64, fail: u64, sum_deviation: f64) {
        self.accept_count = accept;
        self.reject_count = reject;
        self.fail_count = fail;
        self.sum_deviation = sum_deviation;
    }

    pub fn reset(&mut self) {
        self.accept_count = 0;
        self.reject_count = 0;
        self.fail_count = 0;
        self.sum_deviation = 0.0;
        self.evaluation_time = Duration::ZERO;
    }
}

fn check_weight(name: &str, weight: f64) -> Result<(), ConfigError> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight {
            operator: name.to_string(),
            weight,
        })
    }
}

/// A single Metropolis-Hastings move over the state `S`.
///
/// `propose` changes the state in place and returns the log Hastings ratio,
/// or reports a failure without touching the state. The chain takes care of
/// storing, restoring and counting.
pub trait Operator<S: ?Sized> {
    fn core(&self) -> &OperatorCore;

    fn core_mut(&mut self) -> &mut OperatorCore;

    fn propose(&mut self, state: &mut S, rng: &mut dyn RandomSource) -> Proposal;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn weight(&self) -> f64 {
        self.core().weight()
    }

    /// The adaptive step-size controller, for coercible operators.
    fn coercion(&self) -> Option<&CoercionController> {
        None
    }

    fn coercion_mut(&mut self) -> Option<&mut CoercionController> {
        None
    }

    /// Name and current value of the tuned quantity, in the operator's own units.
    fn tuning(&self) -> Option<(&'static str, f64)> {
        None
    }

    /// Gibbs moves are always accepted.
    fn is_gibbs(&self) -> bool {
        false
    }

    fn reset(&mut self) {
        self.core_mut().reset();
    }
}
