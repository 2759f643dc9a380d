use std::collections::VecDeque;

use crate::random::RandomSource;

/// Replays fixed draws so operator tests can pin down every move.
pub struct ScriptedRng {
    uniforms: VecDeque<f64>,
    ints: VecDeque<usize>,
}

impl ScriptedRng {
    pub fn new(uniforms: Vec<f64>, ints: Vec<usize>) -> Self {
        Self {
            uniforms: uniforms.into(),
            ints: ints.into(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.uniforms.is_empty() && self.ints.is_empty()
    }
}

impl RandomSource for ScriptedRng {
    fn uniform(&mut self) -> f64 {
        self.uniforms.pop_front().expect("ran out of scripted uniforms")
    }

    fn uniform_int(&mut self, n: usize) -> usize {
        let value = self.ints.pop_front().expect("ran out of scripted integers");
        assert!(value < n, "scripted integer {} is not below {}", value, n);
        value
    }

    fn gaussian(&mut self) -> f64 {
        0.0
    }

    fn exponential(&mut self, rate: f64) -> f64 {
        1.0 / rate
    }
}
