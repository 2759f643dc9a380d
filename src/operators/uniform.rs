use crate::{
    error::ConfigError,
    graph::{ModelGraph, ParameterId},
    operator::{Operator, OperatorCore, OperatorFailure, Proposal},
    random::RandomSource,
};

/// Redraws one dimension uniformly between fixed bounds.
///
/// The proposal does not depend on the current value, so the Hastings ratio
/// is zero.
pub struct UniformOperator {
    core: OperatorCore,
    parameter: ParameterId,
    parameter_name: String,
    bounds: Option<(f64, f64)>,
}

impl UniformOperator {
    /// Draw within the parameter's own bounds, which must be finite.
    pub fn new(graph: &ModelGraph, parameter: ParameterId, weight: f64) -> Result<Self, ConfigError> {
        let param = graph.try_parameter(parameter)?;
        let name = param.name().to_string();
        for dim in 0..param.dim() {
            let (lower, upper) = param.bounds(dim);
            if !(lower.is_finite() && upper.is_finite()) {
                return Err(ConfigError::MalformedBounds {
                    name,
                    lower,
                    upper,
                });
            }
        }
        Ok(Self {
            core: OperatorCore::new(format!("uniform({})", name), weight)?,
            parameter,
            parameter_name: name,
            bounds: None,
        })
    }

    /// Draw within explicit bounds instead of the parameter's.
    pub fn with_bounds(
        graph: &ModelGraph,
        parameter: ParameterId,
        lower: f64,
        upper: f64,
        weight: f64,
    ) -> Result<Self, ConfigError> {
        let name = graph.try_parameter(parameter)?.name().to_string();
        if !(lower.is_finite() && upper.is_finite()) || lower > upper {
            return Err(ConfigError::MalformedBounds {
                name,
                lower,
                upper,
            });
        }
        Ok(Self {
            core: OperatorCore::new(format!("uniform({})", name), weight)?,
            parameter,
            parameter_name: name,
            bounds: Some((lower, upper)),
        })
    }
}

impl Operator<ModelGraph> for UniformOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn propose(&mut self, state: &mut ModelGraph, rng: &mut dyn RandomSource) -> Proposal {
        let param = state.parameter_mut(self.parameter);
        let dim = param.dim();
        if dim == 0 {
            return Proposal::Failed(OperatorFailure::EmptyParameter(
                self.parameter_name.clone(),
            ));
        }
        let index = if dim == 1 { 0 } else { rng.uniform_int(dim) };
        let (lower, upper) = self.bounds.unwrap_or_else(|| param.bounds(index));
        let value = lower + rng.uniform() * (upper - lower);
        if !param.in_bounds(index, value) {
            return Proposal::Failed(OperatorFailure::OutOfBounds {
                parameter: self.parameter_name.clone(),
                value,
            });
        }
        param.set_value(index, value);
        Proposal::Proposed(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{operators::test_rng::ScriptedRng, parameter::Parameter};
    use approx::assert_abs_diff_eq;

    #[test]
    fn redraws_within_bounds() {
        let mut graph = ModelGraph::new();
        let id = graph.add_parameter(
            Parameter::new("freqs", vec![0.2, 0.3])
                .with_bounds(0.0, 2.0)
                .unwrap(),
        );
        let mut op = UniformOperator::new(&graph, id, 1.0).unwrap();
        let mut rng = ScriptedRng::new(vec![0.25], vec![1]);
        assert_eq!(op.propose(&mut graph, &mut rng), Proposal::Proposed(0.0));
        assert_abs_diff_eq!(graph.parameter(id).value(1), 0.5);
        assert_abs_diff_eq!(graph.parameter(id).value(0), 0.2);
    }

    #[test]
    fn explicit_bounds_and_failures() {
        let mut graph = ModelGraph::new();
        let unbounded = graph.add_parameter(Parameter::scalar("mu", 0.0));
        let empty = graph.add_parameter(Parameter::new("none", vec![]));
        assert!(UniformOperator::new(&graph, unbounded, 1.0).is_err());
        assert!(UniformOperator::with_bounds(&graph, unbounded, 1.0, -1.0, 1.0).is_err());

        let mut op = UniformOperator::with_bounds(&graph, unbounded, -1.0, 1.0, 1.0).unwrap();
        let mut rng = ScriptedRng::new(vec![1.0 - 1e-12], vec![]);
        assert_eq!(op.propose(&mut graph, &mut rng), Proposal::Proposed(0.0));
        assert!(graph.parameter(unbounded).value(0) < 1.0);

        let mut op = UniformOperator::with_bounds(&graph, empty, 0.0, 1.0, 1.0).unwrap();
        assert!(op.propose(&mut graph, &mut rng).is_failed());
    }
}
