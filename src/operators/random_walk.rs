use crate::{
    coercion::{CoercionController, CoercionMode, DEFAULT_TARGET_ACCEPTANCE},
    error::ConfigError,
    graph::{ModelGraph, ParameterId},
    operator::{Operator, OperatorCore, OperatorFailure, Proposal},
    random::RandomSource,
};

/// What happens when a random walk step leaves the parameter's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryCondition {
    /// Mirror the step back into the bounds.
    #[default]
    Reflecting,
    /// Report a failed proposal.
    Absorbing,
}

/// Symmetric window move `x -> x + w (2u - 1)` on one random dimension.
///
/// The window `w` is tuned as `ln w`.
pub struct RandomWalkOperator {
    core: OperatorCore,
    parameter: ParameterId,
    parameter_name: String,
    boundary: BoundaryCondition,
    tuning: CoercionController,
}

impl RandomWalkOperator {
    pub fn new(
        graph: &ModelGraph,
        parameter: ParameterId,
        window: f64,
        weight: f64,
    ) -> Result<Self, ConfigError> {
        if !(window > 0.0 && window.is_finite()) {
            return Err(ConfigError::InvalidSetting(format!(
                "random walk window {} must be positive",
                window
            )));
        }
        let parameter_name = graph.try_parameter(parameter)?.name().to_string();
        Ok(Self {
            core: OperatorCore::new(format!("randomWalk({})", parameter_name), weight)?,
            parameter,
            parameter_name,
            boundary: BoundaryCondition::Reflecting,
            tuning: CoercionController::new(
                window.ln(),
                f64::MIN_POSITIVE.ln(),
                f64::MAX.ln(),
                DEFAULT_TARGET_ACCEPTANCE,
            )?,
        })
    }

    pub fn with_boundary(mut self, boundary: BoundaryCondition) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_coercion_mode(mut self, mode: CoercionMode) -> Self {
        self.tuning.set_mode(mode);
        self
    }

    pub fn window(&self) -> f64 {
        self.tuning.raw().exp()
    }
}

/// Fold `value` back into `[lower, upper]` by mirroring at the bounds.
pub(crate) fn reflect(value: f64, lower: f64, upper: f64) -> f64 {
    if lower.is_finite() && upper.is_finite() {
        let width = upper - lower;
        if width == 0.0 {
            return lower;
        }
        let offset = (value - lower).rem_euclid(2.0 * width);
        if offset > width {
            lower + 2.0 * width - offset
        } else {
            lower + offset
        }
    } else if value < lower {
        2.0 * lower - value
    } else if value > upper {
        2.0 * upper - value
    } else {
        value
    }
}

impl Operator<ModelGraph> for RandomWalkOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn propose(&mut self, state: &mut ModelGraph, rng: &mut dyn RandomSource) -> Proposal {
        let window = self.window();
        let param = state.parameter_mut(self.parameter);
        let dim = param.dim();
        if dim == 0 {
            return Proposal::Failed(OperatorFailure::EmptyParameter(
                self.parameter_name.clone(),
            ));
        }
        let index = if dim == 1 { 0 } else { rng.uniform_int(dim) };
        let mut value = param.value(index) + window * (2.0 * rng.uniform() - 1.0);
        if !param.in_bounds(index, value) {
            match self.boundary {
                BoundaryCondition::Absorbing => {
                    return Proposal::Failed(OperatorFailure::OutOfBounds {
                        parameter: self.parameter_name.clone(),
                        value,
                    })
                }
                BoundaryCondition::Reflecting => {
                    let (lower, upper) = param.bounds(index);
                    value = reflect(value, lower, upper);
                }
            }
        }
        param.set_value(index, value);
        Proposal::Proposed(0.0)
    }

    fn coercion(&self) -> Option<&CoercionController> {
        Some(&self.tuning)
    }

    fn coercion_mut(&mut self) -> Option<&mut CoercionController> {
        Some(&mut self.tuning)
    }

    fn tuning(&self) -> Option<(&'static str, f64)> {
        Some(("windowSize", self.window()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{operators::test_rng::ScriptedRng, parameter::Parameter};
    use approx::assert_abs_diff_eq;

    #[test]
    fn reflection() {
        assert_abs_diff_eq!(reflect(1.2, 0.0, 1.0), 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(reflect(-0.3, 0.0, 1.0), 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(reflect(2.5, 0.0, 1.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(reflect(-1.0, 0.0, f64::INFINITY), 1.0);
        assert_abs_diff_eq!(reflect(0.5, 0.0, 1.0), 0.5);
    }

    #[test]
    fn window_step_and_boundaries() {
        let mut graph = ModelGraph::new();
        let id = graph.add_parameter(
            Parameter::scalar("p", 0.9)
                .with_bounds(0.0, 1.0)
                .unwrap(),
        );
        let mut op = RandomWalkOperator::new(&graph, id, 0.5, 1.0).unwrap();
        let mut rng = ScriptedRng::new(vec![0.9], vec![]);
        assert_eq!(op.propose(&mut graph, &mut rng), Proposal::Proposed(0.0));
        // 0.9 + 0.4 reflected at 1.0
        assert_abs_diff_eq!(graph.parameter(id).value(0), 0.7, epsilon = 1e-12);

        let mut op = op.with_boundary(BoundaryCondition::Absorbing);
        let mut rng = ScriptedRng::new(vec![1.0 - 1e-9], vec![]);
        assert!(op.propose(&mut graph, &mut rng).is_failed());
        assert_abs_diff_eq!(op.window(), 0.5, epsilon = 1e-12);
        assert!(RandomWalkOperator::new(&graph, id, 0.0, 1.0).is_err());
    }
}
