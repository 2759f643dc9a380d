//! Operator scheduling and Metropolis-Hastings acceptance for Bayesian MCMC.
//!
//! A [`MarkovChain`] owns a mutable model state, a likelihood and an
//! [`OperatorSchedule`] of weighted moves. Each iteration it picks one
//! [`Operator`], lets it change the state in place, scores the result and
//! either keeps it or rolls the state back through the [`Model`]
//! store/restore hooks. Coercible operators tune their step size toward a
//! target acceptance rate while the chain runs.
//!
//! ```
//! use beast_mcmc::{
//!     ChainRng, ChainSettings, FnLikelihood, MarkovChain, ModelGraph, OperatorSchedule,
//!     Parameter, ScaleOperator,
//! };
//!
//! # fn main() -> beast_mcmc::Result<()> {
//! let mut graph = ModelGraph::new();
//! let rate = graph.add_parameter(Parameter::scalar("rate", 1.0).with_bounds(0.0, f64::INFINITY)?);
//!
//! let mut schedule = OperatorSchedule::new();
//! schedule.add_operator(Box::new(ScaleOperator::new(&graph, rate, 0.75, 1.0)?))?;
//!
//! // an exponential(1) density on the rate
//! let likelihood = Box::new(FnLikelihood::new(move |g: &ModelGraph| -g.parameter(rate).value(0)));
//!
//! let settings = ChainSettings { chain_length: 1000, ..Default::default() };
//! let mut chain = MarkovChain::new(graph, likelihood, schedule, ChainRng::new(42, 0), settings)?;
//! assert_eq!(chain.run()?, 1000);
//! println!("{}", beast_mcmc::OperatorAnalysis::new(chain.schedule()));
//! # Ok(())
//! # }
//! ```

mod acceptor;
mod analysis;
mod chain;
mod checkpoint;
mod coercion;
mod error;
mod graph;
mod model;
mod operator;
pub mod operators;
mod parameter;
mod random;
mod sampler;
mod schedule;
mod settings;
mod trace;
mod tree;

pub use acceptor::{Acceptor, MetropolisHastings};
pub use analysis::{OperatorAnalysis, OperatorRow};
pub use chain::{ChainListener, MarkovChain, StopHandle, EVALUATION_TEST_THRESHOLD};
pub use checkpoint::{ChainCheckpoint, CoercionCheckpoint, OperatorCheckpoint};
pub use coercion::{CoercionController, CoercionMode, OptimizationSchedule, DEFAULT_TARGET_ACCEPTANCE};
pub use error::{ConfigError, McmcError, Result};
pub use graph::{ModelGraph, ParameterId, TreeId};
pub use model::{CompoundLikelihood, FnLikelihood, Likelihood, Model};
pub use operator::{
    AcceptanceDiagnosis, Operator, OperatorCore, OperatorFailure, Proposal,
    MAXIMUM_ACCEPTANCE_LEVEL, MAXIMUM_GOOD_ACCEPTANCE_LEVEL, MINIMUM_ACCEPTANCE_LEVEL,
    MINIMUM_GOOD_ACCEPTANCE_LEVEL,
};
pub use operators::{
    BoundaryCondition, ExchangeOperator, ExchangeVariant, JointOperator, RandomWalkOperator,
    ScaleMode, ScaleOperator, UniformOperator,
};
pub use parameter::Parameter;
pub use random::{ChainRng, RandomSource, RngSnapshot};
pub use sampler::{run_chains, ChainSummary};
pub use schedule::OperatorSchedule;
pub use settings::ChainSettings;
pub use trace::TraceRecorder;
pub use tree::Tree;
