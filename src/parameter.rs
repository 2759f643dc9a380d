use crate::{error::ConfigError, model::Model};

/// A named, possibly multi-dimensional real parameter with bounds.
///
/// Operators mutate the values in place; the stored copy taken in
/// [`Model::store_state`] is what a rejected move is rolled back to.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    values: Vec<f64>,
    stored: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    dirty: bool,
}

impl Parameter {
    /// An unbounded parameter.
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        let dim = values.len();
        Self {
            name: name.into(),
            stored: values.clone(),
            values,
            lower: vec![f64::NEG_INFINITY; dim],
            upper: vec![f64::INFINITY; dim],
            dirty: false,
        }
    }

    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, vec![value])
    }

    /// Apply the same bounds to every dimension.
    pub fn with_bounds(self, lower: f64, upper: f64) -> Result<Self, ConfigError> {
        let dim = self.values.len();
        self.with_bounds_per_dim(vec![lower; dim], vec![upper; dim])
    }

    pub fn with_bounds_per_dim(
        mut self,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> Result<Self, ConfigError> {
        for bounds in [&lower, &upper] {
            if bounds.len() != self.values.len() {
                return Err(ConfigError::DimensionMismatch {
                    name: self.name.clone(),
                    expected: self.values.len(),
                    found: bounds.len(),
                });
            }
        }
        for (&lo, &hi) in lower.iter().zip(upper.iter()) {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(ConfigError::MalformedBounds {
                    name: self.name.clone(),
                    lower: lo,
                    upper: hi,
                });
            }
        }
        for (dim, &value) in self.values.iter().enumerate() {
            if !(lower[dim]..=upper[dim]).contains(&value) {
                return Err(ConfigError::OutOfBounds {
                    name: self.name.clone(),
                    dim,
                    value,
                });
            }
        }
        self.lower = lower;
        self.upper = upper;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, dim: usize) -> f64 {
        self.values[dim]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn set_value(&mut self, dim: usize, value: f64) {
        self.values[dim] = value;
        self.dirty = true;
    }

    pub fn bounds(&self, dim: usize) -> (f64, f64) {
        (self.lower[dim], self.upper[dim])
    }

    pub fn in_bounds(&self, dim: usize, value: f64) -> bool {
        value >= self.lower[dim] && value <= self.upper[dim]
    }

    /// Whether the parameter changed since the last store.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Model for Parameter {
    fn store_state(&mut self) {
        self.stored.copy_from_slice(&self.values);
    }

    fn restore_state(&mut self) {
        if self.dirty {
            self.values.copy_from_slice(&self.stored);
            self.dirty = false;
        }
    }

    fn accept_state(&mut self) {
        self.dirty = false;
    }
}
