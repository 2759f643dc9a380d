use crate::{
    error::ConfigError,
    operator::{Operator, OperatorCore, Proposal},
    random::RandomSource,
};

/// Applies several operators as a single move.
///
/// The log Hastings ratios add up. If any part fails the whole move fails,
/// and the chain's restore undoes what earlier parts already changed.
///
/// The joint move has no coercion of its own and the chain never reaches
/// the controllers of its parts, so parts keep the tuning they were built
/// with.
pub struct JointOperator<S: ?Sized> {
    core: OperatorCore,
    parts: Vec<Box<dyn Operator<S>>>,
}

impl<S: ?Sized> JointOperator<S> {
    pub fn new(parts: Vec<Box<dyn Operator<S>>>, weight: f64) -> Result<Self, ConfigError> {
        if parts.is_empty() {
            return Err(ConfigError::InvalidSetting(
                "a joint operator needs at least one part".to_string(),
            ));
        }
        let name = format!("joint({})", parts.iter().map(|p| p.name()).collect::<Vec<_>>().join(","));
        Ok(Self {
            core: OperatorCore::new(name, weight)?,
            parts,
        })
    }

    pub fn parts(&self) -> impl Iterator<Item = &(dyn Operator<S> + 'static)> {
        self.parts.iter().map(|p| p.as_ref())
    }
}

impl<S: ?Sized> Operator<S> for JointOperator<S> {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn propose(&mut self, state: &mut S, rng: &mut dyn RandomSource) -> Proposal {
        let mut total = 0.0;
        for part in self.parts.iter_mut() {
            match part.propose(state, rng) {
                Proposal::Proposed(ratio) => total += ratio,
                failed @ Proposal::Failed(_) => return failed,
            }
        }
        Proposal::Proposed(total)
    }

    fn is_gibbs(&self) -> bool {
        self.parts.iter().all(|p| p.is_gibbs())
    }

    fn reset(&mut self) {
        self.core.reset();
        self.parts.iter_mut().for_each(|p| p.reset());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::ModelGraph,
        model::Model,
        operators::{test_rng::ScriptedRng, ScaleOperator, UniformOperator},
        parameter::Parameter,
    };
    use approx::assert_abs_diff_eq;

    #[test]
    fn ratios_add_up() {
        let mut graph = ModelGraph::new();
        let a = graph.add_parameter(Parameter::scalar("a", 1.0).with_bounds(0.0, 10.0).unwrap());
        let b = graph.add_parameter(Parameter::scalar("b", 2.0).with_bounds(0.0, 10.0).unwrap());
        let parts: Vec<Box<dyn Operator<ModelGraph>>> = vec![
            Box::new(ScaleOperator::new(&graph, a, 1.0, 1.0).unwrap()),
            Box::new(ScaleOperator::new(&graph, b, 1.0, 1.0).unwrap()),
        ];
        let mut joint = JointOperator::new(parts, 2.0).unwrap();
        assert_eq!(joint.name(), "joint(scale(a),scale(b))");
        let mut rng = ScriptedRng::new(vec![0.7, 0.4], vec![]);
        let ratio = joint.propose(&mut graph, &mut rng).log_hastings_ratio().unwrap();
        assert_abs_diff_eq!(ratio, 0.2 - 0.1, epsilon = 1e-12);
        assert!(rng.is_exhausted());
    }

    #[test]
    fn failure_of_a_part_fails_the_move() {
        let mut graph = ModelGraph::new();
        let a = graph.add_parameter(Parameter::scalar("a", 0.5).with_bounds(0.0, 1.0).unwrap());
        let b = graph.add_parameter(Parameter::scalar("b", 0.99).with_bounds(0.0, 1.0).unwrap());
        let parts: Vec<Box<dyn Operator<ModelGraph>>> = vec![
            Box::new(UniformOperator::new(&graph, a, 1.0).unwrap()),
            Box::new(ScaleOperator::new(&graph, b, 1.0, 1.0).unwrap()),
        ];
        let mut joint = JointOperator::new(parts, 1.0).unwrap();
        graph.store_state();
        let before = graph.clone();
        let mut rng = ScriptedRng::new(vec![0.1, 0.99], vec![]);
        assert!(joint.propose(&mut graph, &mut rng).is_failed());
        // the first part already moved, restore undoes it
        assert_abs_diff_eq!(graph.parameter(a).value(0), 0.1);
        graph.restore_state();
        assert_eq!(graph, before);

        assert!(JointOperator::<ModelGraph>::new(Vec::new(), 1.0).is_err());
    }

    #[test]
    fn parts_are_not_tuned() {
        use crate::{
            chain::MarkovChain, model::FnLikelihood, random::ChainRng,
            schedule::OperatorSchedule, settings::ChainSettings,
        };

        let mut graph = ModelGraph::new();
        let a = graph.add_parameter(
            Parameter::scalar("a", 1.0)
                .with_bounds(0.0, f64::INFINITY)
                .unwrap(),
        );
        let parts: Vec<Box<dyn Operator<ModelGraph>>> =
            vec![Box::new(ScaleOperator::new(&graph, a, 0.5, 1.0).unwrap())];
        let joint = JointOperator::new(parts, 1.0).unwrap();
        assert!(joint.coercion().is_none());

        let mut schedule = OperatorSchedule::new();
        schedule.add_operator(Box::new(joint)).unwrap();
        let mut chain = MarkovChain::new(
            graph,
            Box::new(FnLikelihood::new(|_: &ModelGraph| 0.0)),
            schedule,
            ChainRng::new(2, 0),
            ChainSettings::default(),
        )
        .unwrap();
        chain.run_chain(50, false).unwrap();

        let op = chain.schedule().operator(0);
        assert_eq!(op.core().operation_count(), 50);
        assert!(op.coercion().is_none());
    }
}
