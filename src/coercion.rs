//! Online tuning of operator step sizes toward a target acceptance rate.
//!
//! Each coercible operator owns a [`CoercionController`] holding a raw,
//! unconstrained-ish value. The operator decides how the raw value maps onto
//! its step size (a scale factor is tuned as its logarithm, for example); the
//! controller only nudges it after every accepted or rejected proposal.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How fast the coercion step shrinks with the number of observed outcomes.
///
/// The step after `n` outcomes is `1 / (1 + t(n))` with `t(n)` equal to `n`,
/// `ln(n)` or `sqrt(n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationSchedule {
    #[default]
    Default,
    Log,
    Sqrt,
}

impl OptimizationSchedule {
    pub fn transform(&self, count: u64) -> f64 {
        let count = count as f64;
        match self {
            OptimizationSchedule::Default => count,
            OptimizationSchedule::Log => count.ln(),
            OptimizationSchedule::Sqrt => count.sqrt(),
        }
    }

    /// Step size for the `count`-th outcome, counting from one.
    pub fn step_size(&self, count: u64) -> f64 {
        1.0 / (1.0 + self.transform(count.max(1)))
    }
}

/// Whether an operator takes part in coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionMode {
    /// Follow the chain's setting.
    #[default]
    Default,
    On,
    Off,
}

impl CoercionMode {
    pub fn is_active(&self, chain_uses_coercion: bool) -> bool {
        match self {
            CoercionMode::On => true,
            CoercionMode::Off => false,
            CoercionMode::Default => chain_uses_coercion,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoercionController {
    raw: f64,
    lower: f64,
    upper: f64,
    target: f64,
    mode: CoercionMode,
    updates: u64,
    accepted: u64,
}

pub const DEFAULT_TARGET_ACCEPTANCE: f64 = 0.234;

impl CoercionController {
    /// A controller whose raw value is confined to `[lower, upper]`.
    pub fn new(raw: f64, lower: f64, upper: f64, target: f64) -> Result<Self, ConfigError> {
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(ConfigError::MalformedBounds {
                name: "coercion domain".to_string(),
                lower,
                upper,
            });
        }
        if !(target > 0.0 && target < 1.0) {
            return Err(ConfigError::InvalidSetting(format!(
                "target acceptance probability {} is not in (0, 1)",
                target
            )));
        }
        if !(lower..=upper).contains(&raw) {
            return Err(ConfigError::OutOfBounds {
                name: "coercion raw parameter".to_string(),
                dim: 0,
                value: raw,
            });
        }
        Ok(Self {
            raw,
            lower,
            upper,
            target,
            mode: CoercionMode::Default,
            updates: 0,
            accepted: 0,
        })
    }

    pub fn with_mode(mut self, mode: CoercionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn raw(&self) -> f64 {
        self.raw
    }

    /// Set the raw value, clamped into the legal domain.
    pub fn set_raw(&mut self, raw: f64) {
        if !raw.is_nan() {
            self.raw = raw.clamp(self.lower, self.upper);
        }
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn mode(&self) -> CoercionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CoercionMode) {
        self.mode = mode;
    }

    /// Number of outcomes this controller has been fed.
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    /// Acceptance rate over the outcomes fed so far.
    pub fn acceptance_rate(&self) -> f64 {
        if self.updates == 0 {
            0.0
        } else {
            self.accepted as f64 / self.updates as f64
        }
    }

    /// Feed the outcome of one non-failed proposal.
    pub fn update(&mut self, accepted: bool, schedule: OptimizationSchedule) {
        self.updates += 1;
        if accepted {
            self.accepted += 1;
        }
        let step = schedule.step_size(self.updates);
        let delta = if accepted {
            step * (1.0 - self.target)
        } else {
            -step * self.target
        };
        let proposed = self.raw + delta;
        if proposed.is_finite() {
            self.raw = proposed.clamp(self.lower, self.upper);
        } else if proposed.is_infinite() {
            self.raw = if proposed > 0.0 { self.upper } else { self.lower };
        }
        log::trace!(
            "coercion update {}: accepted={} raw={}",
            self.updates,
            accepted,
            self.raw
        );
    }

    pub(crate) fn restore(&mut self, raw: f64, updates: u64, accepted: u64) {
        self.set_raw(raw);
        self.updates = updates;
        self.accepted = accepted.min(updates);
    }

    pub(crate) fn accepted_count(&self) -> u64 {
        self.accepted
    }
}
