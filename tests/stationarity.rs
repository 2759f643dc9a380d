//! Long runs against posteriors with known moments.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use beast_mcmc::{
    ChainListener, ChainRng, ChainSettings, ExchangeOperator, FnLikelihood, MarkovChain,
    ModelGraph, OperatorSchedule, Parameter, RandomWalkOperator, ScaleOperator, Tree, TreeId,
    UniformOperator,
};

/// Collects one parameter dimension after a burn-in.
struct Samples {
    burn_in: u64,
    values: Arc<Mutex<Vec<f64>>>,
}

impl ChainListener<ModelGraph> for Samples {
    fn current_state(&mut self, iteration: u64, state: &ModelGraph, _score: f64) {
        if iteration >= self.burn_in {
            let value = state.parameters().next().unwrap().value(0);
            self.values.lock().unwrap().push(value);
        }
    }
}

fn moments(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

fn run_single_parameter(
    graph: ModelGraph,
    schedule: OperatorSchedule<ModelGraph>,
    log_density: impl FnMut(&ModelGraph) -> f64 + 'static,
    length: u64,
    seed: u64,
) -> Vec<f64> {
    let settings = ChainSettings {
        chain_length: length,
        ..Default::default()
    };
    let mut chain = MarkovChain::new(
        graph,
        Box::new(FnLikelihood::new(log_density)),
        schedule,
        ChainRng::new(seed, 0),
        settings,
    )
    .unwrap();
    let values = Arc::new(Mutex::new(Vec::new()));
    chain.add_listener(Box::new(Samples {
        burn_in: 1_000,
        values: values.clone(),
    }));
    chain.run().unwrap();
    let values = values.lock().unwrap().clone();
    values
}

#[test]
fn uniform_operator_recovers_uniform_moments() {
    let mut graph = ModelGraph::new();
    let x = graph.add_parameter(Parameter::scalar("x", 0.5).with_bounds(0.0, 1.0).unwrap());
    let mut schedule = OperatorSchedule::new();
    schedule
        .add_operator(Box::new(UniformOperator::new(&graph, x, 1.0).unwrap()))
        .unwrap();

    let values = run_single_parameter(graph, schedule, |_| 0.0, 101_000, 1);
    let (mean, var) = moments(&values);
    assert!((mean - 0.5).abs() < 0.01, "mean {}", mean);
    assert!((var - 1.0 / 12.0).abs() < 0.005, "variance {}", var);
}

#[test]
fn scale_operator_recovers_exponential_mean() {
    let mut graph = ModelGraph::new();
    let rate = graph.add_parameter(
        Parameter::scalar("rate", 1.0)
            .with_bounds(0.0, f64::INFINITY)
            .unwrap(),
    );
    let mut schedule = OperatorSchedule::new();
    schedule
        .add_operator(Box::new(ScaleOperator::new(&graph, rate, 1.0, 1.0).unwrap()))
        .unwrap();

    let values = run_single_parameter(
        graph,
        schedule,
        move |g| -g.parameter(rate).value(0),
        401_000,
        2,
    );
    let (mean, _) = moments(&values);
    assert!((mean - 1.0).abs() < 0.08, "mean {}", mean);
}

#[test]
fn random_walk_recovers_normal_moments() {
    let mut graph = ModelGraph::new();
    let mu = graph.add_parameter(Parameter::scalar("mu", 3.0));
    let mut schedule = OperatorSchedule::new();
    schedule
        .add_operator(Box::new(RandomWalkOperator::new(&graph, mu, 1.0, 1.0).unwrap()))
        .unwrap();

    let values = run_single_parameter(
        graph,
        schedule,
        move |g| -0.5 * g.parameter(mu).value(0).powi(2),
        201_000,
        3,
    );
    let (mean, var) = moments(&values);
    assert!(mean.abs() < 0.05, "mean {}", mean);
    assert!((var - 1.0).abs() < 0.08, "variance {}", var);
}

/// Counts how often each rooted topology is visited.
struct TopologyCounts {
    tree: TreeId,
    counts: Arc<Mutex<HashMap<String, u64>>>,
}

impl ChainListener<ModelGraph> for TopologyCounts {
    fn current_state(&mut self, _iteration: u64, state: &ModelGraph, _score: f64) {
        let key = state.tree(self.tree).topology_key();
        *self.counts.lock().unwrap().entry(key).or_insert(0) += 1;
    }
}

#[test]
fn exchange_moves_sample_ranked_histories_uniformly() {
    // internal heights 1, 2 and 3 stay fixed, so the chain walks over the 18
    // ranked histories of four tips: 12 caterpillars and 6 balanced trees,
    // where each balanced topology has two rankings
    let mut graph = ModelGraph::new();
    let tree = graph.add_tree(Tree::from_newick("(((A:1,B:1):1,C:2):1,D:3);").unwrap());
    let mut schedule = OperatorSchedule::new();
    schedule
        .add_operator(Box::new(ExchangeOperator::narrow(&graph, tree, 2.0).unwrap()))
        .unwrap();
    schedule
        .add_operator(Box::new(ExchangeOperator::wide(&graph, tree, 1.0).unwrap()))
        .unwrap();
    let settings = ChainSettings {
        chain_length: 180_000,
        seed: 4,
        ..Default::default()
    };
    let mut chain = MarkovChain::new(
        graph,
        Box::new(FnLikelihood::new(|_: &ModelGraph| 0.0)),
        schedule,
        ChainRng::new(settings.seed, 0),
        settings,
    )
    .unwrap();
    let counts = Arc::new(Mutex::new(HashMap::new()));
    chain.add_listener(Box::new(TopologyCounts {
        tree,
        counts: counts.clone(),
    }));
    chain.run().unwrap();

    let counts = counts.lock().unwrap();
    assert_eq!(counts.len(), 15);
    let total: u64 = counts.values().sum();
    for (key, &count) in counts.iter() {
        let expected = if key.starts_with("(((") {
            1.0 / 18.0
        } else {
            2.0 / 18.0
        };
        let found = count as f64 / total as f64;
        assert!(
            (found - expected).abs() < 0.01,
            "{}: {} vs {}",
            key,
            found,
            expected
        );
    }
    assert!(chain.schedule().operator(1).core().fail_count() > 0);
}
