//! Interfaces between the chain and the model it samples.
//!
//! The chain never looks inside the model. It only needs a way to snapshot and
//! roll back mutable state, and densities that score the current state.

use itertools::Itertools;

/// Mutable model state that operators change in place.
///
/// `store_state` is called before every proposal. After the chain decided,
/// exactly one of `accept_state` or `restore_state` follows. A component that
/// does not store everything it mutates corrupts the chain silently.
pub trait Model {
    fn store_state(&mut self);
    fn restore_state(&mut self);
    fn accept_state(&mut self);
}

/// A log density over the model state.
///
/// Used both for the likelihood and the prior of a chain. Implementations may
/// cache intermediate results, in which case they take part in store/restore.
pub trait Likelihood<S: ?Sized> {
    fn log_likelihood(&mut self, state: &S) -> f64;

    /// Forget every cached value so the next call recomputes from scratch.
    fn make_dirty(&mut self) {}

    fn store_state(&mut self) {}
    fn restore_state(&mut self) {}
    fn accept_state(&mut self) {}

    /// Human readable breakdown used in error messages.
    fn diagnosis(&mut self, state: &S) -> String {
        format!("{}", self.log_likelihood(state))
    }
}

/// Adapter turning a closure into a [`Likelihood`].
pub struct FnLikelihood<F> {
    func: F,
}

impl<F> FnLikelihood<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<S: ?Sized, F: FnMut(&S) -> f64> Likelihood<S> for FnLikelihood<F> {
    fn log_likelihood(&mut self, state: &S) -> f64 {
        (self.func)(state)
    }
}

/// Sum of several named densities.
pub struct CompoundLikelihood<S: ?Sized> {
    components: Vec<(String, Box<dyn Likelihood<S>>)>,
}

impl<S: ?Sized> Default for CompoundLikelihood<S> {
    fn default() -> Self {
        Self {
            components: Vec::new(),
        }
    }
}

impl<S: ?Sized> CompoundLikelihood<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, likelihood: Box<dyn Likelihood<S>>) {
        self.components.push((name.into(), likelihood));
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl<S: ?Sized> Likelihood<S> for CompoundLikelihood<S> {
    fn log_likelihood(&mut self, state: &S) -> f64 {
        let mut total = 0.0;
        for (_, component) in self.components.iter_mut() {
            let value = component.log_likelihood(state);
            if value == f64::NEG_INFINITY {
                return f64::NEG_INFINITY;
            }
            total += value;
        }
        total
    }

    fn make_dirty(&mut self) {
        self.components.iter_mut().for_each(|(_, c)| c.make_dirty());
    }

    fn store_state(&mut self) {
        self.components.iter_mut().for_each(|(_, c)| c.store_state());
    }

    fn restore_state(&mut self) {
        self.components.iter_mut().for_each(|(_, c)| c.restore_state());
    }

    fn accept_state(&mut self) {
        self.components.iter_mut().for_each(|(_, c)| c.accept_state());
    }

    fn diagnosis(&mut self, state: &S) -> String {
        self.components
            .iter_mut()
            .map(|(name, c)| format!("{}={}", name, c.log_likelihood(state)))
            .join(", ")
    }
}
