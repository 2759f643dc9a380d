//! Choosing which operator fires next.

use crate::{
    coercion::OptimizationSchedule,
    error::{ConfigError, Result},
    operator::Operator,
    random::RandomSource,
};

/// Weighted collection of operators.
///
/// In random mode an operator is chosen with probability proportional to its
/// weight. In sequential mode the operators are visited in insertion order,
/// each one `weight` times in a row, so weights must be whole numbers.
pub struct OperatorSchedule<S: ?Sized> {
    operators: Vec<Box<dyn Operator<S>>>,
    cumulative: Vec<f64>,
    total_weight: f64,
    sequential: bool,
    sequential_index: u64,
    optimization: OptimizationSchedule,
}

impl<S: ?Sized> Default for OperatorSchedule<S> {
    fn default() -> Self {
        Self {
            operators: Vec::new(),
            cumulative: Vec::new(),
            total_weight: 0.0,
            sequential: false,
            sequential_index: 0,
            optimization: OptimizationSchedule::Default,
        }
    }
}

impl<S: ?Sized> OperatorSchedule<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operator(&mut self, operator: Box<dyn Operator<S>>) -> Result<usize> {
        if self.sequential {
            check_integer_weight(operator.as_ref())?;
        }
        self.total_weight += operator.weight();
        self.cumulative.push(self.total_weight);
        self.operators.push(operator);
        Ok(self.operators.len() - 1)
    }

    /// Change an operator's weight, keeping the total in sync.
    pub fn set_weight(&mut self, index: usize, weight: f64) -> Result<()> {
        let operator = &mut self.operators[index];
        let old = operator.weight();
        operator.core_mut().set_weight(weight)?;
        if self.sequential {
            if let Err(err) = check_integer_weight(operator.as_ref()) {
                operator.core_mut().set_weight(old)?;
                return Err(err);
            }
        }
        self.operators_updated();
        Ok(())
    }

    /// Recompute cumulative weights after operators changed.
    pub fn operators_updated(&mut self) {
        self.cumulative.clear();
        self.total_weight = 0.0;
        for operator in &self.operators {
            self.total_weight += operator.weight();
            self.cumulative.push(self.total_weight);
        }
        if self.total_weight > 0.0 {
            self.sequential_index %= self.total_weight as u64;
        }
    }

    pub fn set_sequential(&mut self, sequential: bool) -> Result<()> {
        if sequential {
            for operator in &self.operators {
                check_integer_weight(operator.as_ref())?;
            }
        }
        self.sequential = sequential;
        self.sequential_index = 0;
        Ok(())
    }

    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    pub fn set_optimization_schedule(&mut self, schedule: OptimizationSchedule) {
        self.optimization = schedule;
    }

    pub fn optimization_schedule(&self) -> OptimizationSchedule {
        self.optimization
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    pub fn operator(&self, index: usize) -> &dyn Operator<S> {
        self.operators[index].as_ref()
    }

    pub fn operators(&self) -> impl Iterator<Item = &(dyn Operator<S> + 'static)> {
        self.operators.iter().map(|op| op.as_ref())
    }

    pub(crate) fn operator_mut(&mut self, index: usize) -> &mut dyn Operator<S> {
        self.operators[index].as_mut()
    }

    pub(crate) fn operators_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Operator<S>>> {
        self.operators.iter_mut()
    }

    pub(crate) fn sequential_index(&self) -> u64 {
        self.sequential_index
    }

    pub(crate) fn set_sequential_index(&mut self, index: u64) {
        self.sequential_index = if self.total_weight >= 1.0 {
            index % self.total_weight as u64
        } else {
            0
        };
    }

    /// Fail if the schedule cannot pick an operator.
    pub fn validate(&self) -> Result<()> {
        if self.operators.is_empty() {
            return Err(ConfigError::EmptySchedule.into());
        }
        if !(self.total_weight.is_finite() && self.total_weight > 0.0) {
            return Err(ConfigError::ZeroTotalWeight(self.total_weight).into());
        }
        Ok(())
    }

    pub fn next_operator_index(&mut self, rng: &mut dyn RandomSource) -> Result<usize> {
        self.validate()?;
        if self.sequential {
            let position = self.sequential_index as f64;
            self.sequential_index = (self.sequential_index + 1) % self.total_weight as u64;
            Ok(self.weighted_index(position))
        } else {
            Ok(self.weighted_index(rng.uniform() * self.total_weight))
        }
    }

    /// First operator whose cumulative weight strictly exceeds `draw`.
    fn weighted_index(&self, draw: f64) -> usize {
        let index = self.cumulative.partition_point(|&c| c <= draw);
        index.min(self.operators.len() - 1)
    }

    /// The smallest accept+reject count over all operators.
    pub fn minimum_accept_and_reject_count(&self) -> u64 {
        self.operators
            .iter()
            .map(|op| op.core().operation_count())
            .min()
            .unwrap_or(0)
    }
}

fn check_integer_weight<S: ?Sized>(operator: &dyn Operator<S>) -> Result<()> {
    let weight = operator.weight();
    if weight.fract() != 0.0 {
        return Err(ConfigError::NonIntegerWeight {
            operator: operator.name().to_string(),
            weight,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_operators {
    use crate::{
        operator::{Operator, OperatorCore, Proposal},
        random::RandomSource,
    };

    /// Does nothing, always proposes a symmetric move.
    pub struct NullOperator {
        core: OperatorCore,
    }

    impl NullOperator {
        pub fn boxed<S: ?Sized>(name: &str, weight: f64) -> Box<dyn Operator<S>> {
            Box::new(NullOperator {
                core: OperatorCore::new(name, weight).unwrap(),
            })
        }
    }

    impl<S: ?Sized> Operator<S> for NullOperator {
        fn core(&self) -> &OperatorCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut OperatorCore {
            &mut self.core
        }

        fn propose(&mut self, _state: &mut S, _rng: &mut dyn RandomSource) -> Proposal {
            Proposal::Proposed(0.0)
        }
    }
}
