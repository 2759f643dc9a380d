//! Running several independent chains in parallel.

use std::sync::mpsc::channel;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;
use rayon::ThreadPoolBuilder;

use crate::{
    analysis::OperatorAnalysis,
    chain::{MarkovChain, StopHandle},
    checkpoint::ChainCheckpoint,
    model::Model,
    random::ChainRng,
    settings::ChainSettings,
};

/// What a finished chain reports back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSummary {
    pub chain: u64,
    pub iterations: u64,
    pub initial_score: f64,
    pub best_score: f64,
    pub final_score: f64,
    pub analysis: OperatorAnalysis,
    pub checkpoint: ChainCheckpoint,
}

impl ChainSummary {
    pub fn new<S: Model>(chain_id: u64, chain: &MarkovChain<S>) -> Self {
        Self {
            chain: chain_id,
            iterations: chain.current_length(),
            initial_score: chain.initial_score(),
            best_score: chain.best_score(),
            final_score: chain.current_score(),
            analysis: OperatorAnalysis::new(chain.schedule()),
            checkpoint: chain.checkpoint(),
        }
    }
}

/// Run `settings.num_chains` chains, one per worker thread.
///
/// `build` is called on the worker with the chain id and that chain's random
/// stream, and must create a chain that owns its own model state. All chains
/// share `stop`. Summaries come back ordered by chain id; if any chain fails
/// the first error is returned.
pub fn run_chains<S, F>(settings: &ChainSettings, stop: &StopHandle, build: F) -> Result<Vec<ChainSummary>>
where
    S: Model,
    F: Fn(u64, ChainRng) -> crate::Result<MarkovChain<S>> + Sync,
{
    settings.validate()?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(settings.num_chains)
        .thread_name(|i| format!("mcmc-chain-{}", i))
        .build()
        .context("Could not start thread pool")?;

    let (results_tx, results_rx) = channel();
    let build = &build;
    pool.scope_fifo(|scope| {
        for chain_id in 0..settings.num_chains as u64 {
            let results = results_tx.clone();
            let stop = stop.clone();
            scope.spawn_fifo(move |_| {
                let result = run_single(chain_id, settings.seed, stop, build);
                // the receiver outlives the scope
                let _ = results.send((chain_id, result));
            });
        }
    });
    drop(results_tx);

    let (summaries, errors): (Vec<_>, Vec<_>) = results_rx
        .into_iter()
        .sorted_by_key(|(chain_id, _)| *chain_id)
        .map(|(_, result)| result)
        .partition_result();
    if let Some(error) = errors.into_iter().next() {
        return Err(error);
    }
    info!("{} chains finished", summaries.len());
    Ok(summaries)
}

fn run_single<S, F>(chain_id: u64, seed: u64, stop: StopHandle, build: &F) -> Result<ChainSummary>
where
    S: Model,
    F: Fn(u64, ChainRng) -> crate::Result<MarkovChain<S>>,
{
    let rng = ChainRng::new(seed, chain_id);
    let mut chain = build(chain_id, rng).with_context(|| format!("Could not build chain {}", chain_id))?;
    chain.set_stop_handle(stop);
    chain
        .run()
        .with_context(|| format!("Chain {} failed", chain_id))?;
    chain.terminate_chain();
    Ok(ChainSummary::new(chain_id, &chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::McmcError,
        graph::ModelGraph,
        model::FnLikelihood,
        operators::UniformOperator,
        parameter::Parameter,
        schedule::OperatorSchedule,
    };

    fn build(settings: ChainSettings) -> impl Fn(u64, ChainRng) -> crate::Result<MarkovChain<ModelGraph>> + Sync {
        move |chain_id, rng| {
            let mut graph = ModelGraph::new();
            let x = graph.add_parameter(Parameter::scalar("x", 0.5).with_bounds(0.0, 1.0)?);
            let mut schedule = OperatorSchedule::new();
            schedule.add_operator(Box::new(UniformOperator::new(&graph, x, 1.0)?))?;
            if chain_id == 7 {
                return Err(McmcError::InvalidInitialState("chain 7 is cursed".to_string()));
            }
            let likelihood = Box::new(FnLikelihood::new(|g: &ModelGraph| -g.parameters().next().map_or(0.0, |p| p.value(0))));
            MarkovChain::new(graph, likelihood, schedule, rng, settings)
        }
    }

    #[test]
    fn chains_use_their_own_streams() {
        let settings = ChainSettings {
            chain_length: 200,
            num_chains: 3,
            seed: 17,
            ..Default::default()
        };
        let summaries = run_chains(&settings, &StopHandle::new(), build(settings)).unwrap();
        assert_eq!(summaries.len(), 3);
        for (i, summary) in summaries.iter().enumerate() {
            assert_eq!(summary.chain, i as u64);
            assert_eq!(summary.iterations, 200);
            assert_eq!(summary.checkpoint.rng.unwrap().stream, i as u64);
        }
        assert!(summaries[0].final_score != summaries[1].final_score);
    }

    #[test]
    fn failing_chain_reports_its_id() {
        let settings = ChainSettings {
            chain_length: 10,
            num_chains: 8,
            ..Default::default()
        };
        let err = run_chains(&settings, &StopHandle::new(), build(settings)).unwrap_err();
        assert!(format!("{:#}", err).contains("Could not build chain 7"));
    }

    #[test]
    fn stopped_chains_end_early() {
        let settings = ChainSettings {
            chain_length: 1_000,
            num_chains: 2,
            ..Default::default()
        };
        let stop = StopHandle::new();
        stop.stop();
        let summaries = run_chains(&settings, &stop, build(settings)).unwrap();
        assert!(summaries.iter().all(|s| s.iterations == 0));
    }
}
