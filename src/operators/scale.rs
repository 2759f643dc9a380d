use crate::{
    coercion::{CoercionController, CoercionMode, DEFAULT_TARGET_ACCEPTANCE},
    error::ConfigError,
    graph::{ModelGraph, ParameterId},
    operator::{Operator, OperatorCore, OperatorFailure, Proposal},
    random::RandomSource,
};

/// Smallest scale factor coercion may shrink to.
pub const MIN_SCALE_FACTOR: f64 = 1e-8;

/// Which dimensions of the parameter a scale move touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleMode {
    /// One randomly chosen dimension.
    #[default]
    One,
    /// Every dimension by the same factor.
    All,
    /// Every dimension by its own factor.
    Independent,
}

/// Multiplicative move `x -> s x` with `s = exp(f (u - 1/2))`, `u ~ U(0, 1)`.
///
/// The scale factor `f` lies in `(0, 1]` and is tuned as `ln f`. The log
/// Hastings ratio is the log Jacobian, `ln s` per scaled dimension.
pub struct ScaleOperator {
    core: OperatorCore,
    parameter: ParameterId,
    parameter_name: String,
    mode: ScaleMode,
    tuning: CoercionController,
    factors: Vec<f64>,
}

impl ScaleOperator {
    pub fn new(
        graph: &ModelGraph,
        parameter: ParameterId,
        scale_factor: f64,
        weight: f64,
    ) -> Result<Self, ConfigError> {
        if !(scale_factor > 0.0 && scale_factor <= 1.0) {
            return Err(ConfigError::InvalidSetting(format!(
                "scale factor {} is not in (0, 1]",
                scale_factor
            )));
        }
        let parameter_name = graph.try_parameter(parameter)?.name().to_string();
        let core = OperatorCore::new(format!("scale({})", parameter_name), weight)?;
        let tuning = CoercionController::new(
            scale_factor.ln(),
            MIN_SCALE_FACTOR.ln(),
            0.0,
            DEFAULT_TARGET_ACCEPTANCE,
        )?;
        Ok(Self {
            core,
            parameter,
            parameter_name,
            mode: ScaleMode::One,
            tuning,
            factors: Vec::new(),
        })
    }

    pub fn with_mode(mut self, mode: ScaleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_coercion_mode(mut self, mode: CoercionMode) -> Self {
        self.tuning.set_mode(mode);
        self
    }

    pub fn scale_factor(&self) -> f64 {
        self.tuning.raw().exp()
    }

    fn out_of_bounds(&self, value: f64) -> Proposal {
        Proposal::Failed(OperatorFailure::OutOfBounds {
            parameter: self.parameter_name.clone(),
            value,
        })
    }
}

impl Operator<ModelGraph> for ScaleOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn propose(&mut self, state: &mut ModelGraph, rng: &mut dyn RandomSource) -> Proposal {
        let scale_factor = self.scale_factor();
        let dim = state.parameter(self.parameter).dim();
        if dim == 0 {
            return Proposal::Failed(OperatorFailure::EmptyParameter(
                self.parameter_name.clone(),
            ));
        }

        match self.mode {
            ScaleMode::One => {
                let index = if dim == 1 { 0 } else { rng.uniform_int(dim) };
                let log_scale = scale_factor * (rng.uniform() - 0.5);
                let param = state.parameter_mut(self.parameter);
                let value = param.value(index) * log_scale.exp();
                if !param.in_bounds(index, value) {
                    return self.out_of_bounds(value);
                }
                param.set_value(index, value);
                Proposal::Proposed(log_scale)
            }
            ScaleMode::All => {
                let log_scale = scale_factor * (rng.uniform() - 0.5);
                let scale = log_scale.exp();
                let param = state.parameter(self.parameter);
                if let Some(value) = (0..dim)
                    .map(|i| param.value(i) * scale)
                    .enumerate()
                    .find(|&(i, v)| !param.in_bounds(i, v))
                    .map(|(_, v)| v)
                {
                    return self.out_of_bounds(value);
                }
                let param = state.parameter_mut(self.parameter);
                for i in 0..dim {
                    param.set_value(i, param.value(i) * scale);
                }
                Proposal::Proposed(dim as f64 * log_scale)
            }
            ScaleMode::Independent => {
                self.factors.clear();
                self.factors
                    .extend((0..dim).map(|_| scale_factor * (rng.uniform() - 0.5)));
                let param = state.parameter(self.parameter);
                for (i, log_scale) in self.factors.iter().enumerate() {
                    let value = param.value(i) * log_scale.exp();
                    if !param.in_bounds(i, value) {
                        return self.out_of_bounds(value);
                    }
                }
                let param = state.parameter_mut(self.parameter);
                for (i, log_scale) in self.factors.iter().enumerate() {
                    param.set_value(i, param.value(i) * log_scale.exp());
                }
                Proposal::Proposed(self.factors.iter().sum())
            }
        }
    }

    fn coercion(&self) -> Option<&CoercionController> {
        Some(&self.tuning)
    }

    fn coercion_mut(&mut self) -> Option<&mut CoercionController> {
        Some(&mut self.tuning)
    }

    fn tuning(&self) -> Option<(&'static str, f64)> {
        Some(("scaleFactor", self.scale_factor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        operators::test_rng::ScriptedRng,
        parameter::Parameter,
    };
    use approx::assert_abs_diff_eq;

    fn graph(values: Vec<f64>, lower: f64, upper: f64) -> (ModelGraph, ParameterId) {
        let mut graph = ModelGraph::new();
        let id = graph.add_parameter(
            Parameter::new("theta", values)
                .with_bounds(lower, upper)
                .unwrap(),
        );
        (graph, id)
    }

    #[test]
    fn known_draw_gives_known_ratio() {
        let (mut graph, id) = graph(vec![2.0], 0.0, f64::INFINITY);
        let mut op = ScaleOperator::new(&graph, id, 0.5, 1.0).unwrap();
        let mut rng = ScriptedRng::new(vec![0.75], vec![]);
        let ratio = op.propose(&mut graph, &mut rng).log_hastings_ratio().unwrap();
        let s = (0.5f64 * (0.75 - 0.5)).exp();
        assert_abs_diff_eq!(s, 0.125f64.exp());
        assert_abs_diff_eq!(ratio, s.ln(), epsilon = 1e-15);
        assert_abs_diff_eq!(graph.parameter(id).value(0), 2.0 * s, epsilon = 1e-15);
        assert_eq!(op.name(), "scale(theta)");
    }

    #[test]
    fn all_mode_sums_jacobians() {
        let (mut graph, id) = graph(vec![1.0, 2.0, 3.0], 0.0, 100.0);
        let mut op = ScaleOperator::new(&graph, id, 1.0, 1.0)
            .unwrap()
            .with_mode(ScaleMode::All);
        let mut rng = ScriptedRng::new(vec![0.9], vec![]);
        let ratio = op.propose(&mut graph, &mut rng).log_hastings_ratio().unwrap();
        assert_abs_diff_eq!(ratio, 3.0 * 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(graph.parameter(id).value(2), 3.0 * 0.4f64.exp(), epsilon = 1e-12);

        let mut op = op.with_mode(ScaleMode::Independent);
        let mut rng = ScriptedRng::new(vec![0.6, 0.4, 0.9], vec![]);
        let ratio = op.propose(&mut graph, &mut rng).log_hastings_ratio().unwrap();
        assert_abs_diff_eq!(ratio, 0.1 - 0.1 + 0.4, epsilon = 1e-12);
    }

    #[test]
    fn out_of_bounds_fails_without_mutation() {
        let (mut graph, id) = graph(vec![0.99, 0.5], 0.0, 1.0);
        let mut op = ScaleOperator::new(&graph, id, 1.0, 1.0)
            .unwrap()
            .with_mode(ScaleMode::All);
        let before = graph.clone();
        let mut rng = ScriptedRng::new(vec![0.99], vec![]);
        let proposal = op.propose(&mut graph, &mut rng);
        assert!(matches!(
            proposal,
            Proposal::Failed(OperatorFailure::OutOfBounds { .. })
        ));
        assert_eq!(graph, before);
    }

    #[test]
    fn tuned_in_log_space() {
        let (graph, id) = graph(vec![1.0], 0.0, 10.0);
        let mut op = ScaleOperator::new(&graph, id, 1.0, 1.0).unwrap();
        assert!(ScaleOperator::new(&graph, id, 1.5, 1.0).is_err());
        assert!(ScaleOperator::new(&graph, id, 0.5, 0.0).is_err());
        let controller = op.coercion_mut().unwrap();
        controller.update(true, crate::coercion::OptimizationSchedule::Default);
        // already at the upper bound of ln(1) = 0
        assert_eq!(op.scale_factor(), 1.0);
        assert_eq!(op.tuning(), Some(("scaleFactor", 1.0)));
    }
}
