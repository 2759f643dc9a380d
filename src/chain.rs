//! The Metropolis-Hastings driver.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use log::{debug, error, info, trace};

use crate::{
    acceptor::{Acceptor, MetropolisHastings},
    checkpoint::{ChainCheckpoint, OperatorCheckpoint},
    error::{ConfigError, McmcError, Result},
    model::{Likelihood, Model},
    operator::Proposal,
    random::{ChainRng, RandomSource},
    schedule::OperatorSchedule,
    settings::ChainSettings,
};

/// Largest difference tolerated between an incrementally maintained score
/// and a full recomputation during the test phase.
pub const EVALUATION_TEST_THRESHOLD: f64 = 1e-6;

/// Observer of a running chain.
///
/// Listeners run synchronously on the chain's thread, between iterations.
pub trait ChainListener<S: ?Sized> {
    /// Called once at the end of every iteration with the state the chain is in.
    fn current_state(&mut self, _iteration: u64, _state: &S, _score: f64) {}

    /// Called whenever a proposal beats the best score seen so far, and once
    /// with the initial state.
    fn best_state(&mut self, _iteration: u64, _state: &S, _score: f64) {}

    /// Called by [`MarkovChain::terminate_chain`].
    fn finished(&mut self, _length: u64) {}
}

/// Requests a chain to stop after the iteration it is running.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// A single Markov chain over the model state `S`.
///
/// The chain owns the state, the densities, the operators and the random
/// source. Every iteration stores the model, lets one operator change it, and
/// either accepts the change or restores the stored copy.
pub struct MarkovChain<S: Model, R: RandomSource = ChainRng> {
    state: S,
    likelihood: Box<dyn Likelihood<S>>,
    prior: Option<Box<dyn Likelihood<S>>>,
    schedule: OperatorSchedule<S>,
    acceptor: Box<dyn Acceptor>,
    rng: R,
    listeners: Vec<Box<dyn ChainListener<S>>>,
    settings: ChainSettings,
    current_score: f64,
    best_score: f64,
    initial_score: f64,
    current_length: u64,
    stop: StopHandle,
}

impl<S: Model, R: RandomSource> MarkovChain<S, R> {
    pub fn new(
        state: S,
        likelihood: Box<dyn Likelihood<S>>,
        mut schedule: OperatorSchedule<S>,
        rng: R,
        settings: ChainSettings,
    ) -> Result<Self> {
        settings.validate()?;
        schedule.validate()?;
        schedule.set_sequential(settings.sequential)?;
        schedule.set_optimization_schedule(settings.optimization_schedule);
        let acceptor = MetropolisHastings::new(settings.temperature)?;
        Ok(Self {
            state,
            likelihood,
            prior: None,
            schedule,
            acceptor: Box::new(acceptor),
            rng,
            listeners: Vec::new(),
            settings,
            current_score: f64::NEG_INFINITY,
            best_score: f64::NEG_INFINITY,
            initial_score: f64::NEG_INFINITY,
            current_length: 0,
            stop: StopHandle::new(),
        })
    }

    /// Score the state with a separate prior. A zero prior short-circuits
    /// the likelihood.
    pub fn with_prior(mut self, prior: Box<dyn Likelihood<S>>) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn with_acceptor(mut self, acceptor: Box<dyn Acceptor>) -> Self {
        self.acceptor = acceptor;
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn ChainListener<S>>) {
        self.listeners.push(listener);
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Share a stop flag with other chains.
    pub fn set_stop_handle(&mut self, stop: StopHandle) {
        self.stop = stop;
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    pub fn schedule(&self) -> &OperatorSchedule<S> {
        &self.schedule
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    pub fn rng(&self) -> &R {
        &self.rng
    }

    pub fn current_score(&self) -> f64 {
        self.current_score
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn initial_score(&self) -> f64 {
        self.initial_score
    }

    /// Number of iterations completed since construction or the last reset.
    pub fn current_length(&self) -> u64 {
        self.current_length
    }

    /// Run until the configured chain length is reached.
    pub fn run(&mut self) -> Result<u64> {
        let remaining = self.settings.chain_length.saturating_sub(self.current_length);
        self.run_chain(remaining, false)
    }

    /// Run `length` more iterations. Returns the total number of iterations
    /// completed, which is smaller than requested if the chain was stopped.
    pub fn run_chain(&mut self, length: u64, disable_coercion: bool) -> Result<u64> {
        self.make_dirty();
        self.current_score = self.evaluate();

        if self.current_length == 0 {
            self.initial_score = self.current_score;
            self.best_score = self.current_score;
            self.fire_best_state(0);
        }
        self.check_initial_score()?;

        let end = self.current_length + length;
        let mut full_evaluation = self.settings.full_evaluation_count > 0;
        debug!(
            "running chain from iteration {} to {}, coercion {}",
            self.current_length,
            end,
            if disable_coercion { "disabled" } else { "enabled" }
        );

        while self.current_length < end {
            if self.stop.is_stopped() {
                info!("chain stopped at iteration {}", self.current_length);
                break;
            }
            self.step(self.current_length, disable_coercion, &mut full_evaluation)?;
            self.current_length += 1;
        }
        Ok(self.current_length)
    }

    /// Tell every listener the chain is done.
    pub fn terminate_chain(&mut self) {
        let length = self.current_length;
        for listener in self.listeners.iter_mut() {
            listener.finished(length);
        }
    }

    /// Forget the iteration count, the scores and every operator's counters.
    pub fn reset(&mut self) {
        self.current_length = 0;
        self.current_score = f64::NEG_INFINITY;
        self.best_score = f64::NEG_INFINITY;
        self.initial_score = f64::NEG_INFINITY;
        self.schedule.operators_mut().for_each(|op| op.reset());
    }

    pub fn checkpoint(&self) -> ChainCheckpoint {
        ChainCheckpoint {
            iteration: self.current_length,
            current_score: self.current_score,
            best_score: self.best_score,
            initial_score: self.initial_score,
            schedule_cursor: self.schedule.sequential_index(),
            rng: self.rng.snapshot(),
            operators: self
                .schedule
                .operators()
                .map(|op| OperatorCheckpoint::capture(op))
                .collect(),
        }
    }

    /// Restore everything but the random source from a checkpoint.
    fn restore_counters(&mut self, checkpoint: &ChainCheckpoint) -> Result<()> {
        if checkpoint.operators.len() != self.schedule.operator_count() {
            return Err(ConfigError::DimensionMismatch {
                name: "checkpoint operators".to_string(),
                expected: self.schedule.operator_count(),
                found: checkpoint.operators.len(),
            }
            .into());
        }
        for (index, saved) in checkpoint.operators.iter().enumerate() {
            saved.apply(self.schedule.operator_mut(index))?;
            if self.schedule.operator(index).weight() != saved.weight {
                self.schedule.set_weight(index, saved.weight)?;
            }
        }
        self.schedule.set_sequential_index(checkpoint.schedule_cursor);
        self.current_length = checkpoint.iteration;
        self.current_score = checkpoint.current_score;
        self.best_score = checkpoint.best_score;
        self.initial_score = checkpoint.initial_score;
        Ok(())
    }

    fn step(&mut self, iteration: u64, disable_coercion: bool, full_evaluation: &mut bool) -> Result<()> {
        let index = self.schedule.next_operator_index(&mut self.rng)?;
        let old_score = self.current_score;

        self.store_all();
        let proposal = self
            .schedule
            .operator_mut(index)
            .propose(&mut self.state, &mut self.rng);

        let accepted = match proposal {
            Proposal::Failed(reason) => {
                let operator = self.schedule.operator_mut(index);
                trace!(
                    "operator {} failed at iteration {}: {}",
                    operator.name(),
                    iteration,
                    reason
                );
                operator.core_mut().record_failure();
                // joint moves may have changed part of the state before failing
                self.restore_all();
                None
            }
            Proposal::Proposed(log_hastings_ratio) => {
                if log_hastings_ratio.is_nan() || log_hastings_ratio == f64::INFINITY {
                    return Err(self.abort_iteration(
                        iteration,
                        index,
                        format!("log Hastings ratio is {}", log_hastings_ratio),
                    ));
                }

                let start = Instant::now();
                let score = self.evaluate();
                self.schedule
                    .operator_mut(index)
                    .core_mut()
                    .add_evaluation_time(start.elapsed());

                if score.is_nan() || score == f64::INFINITY {
                    let detail = format!(
                        "posterior score is {} ({})",
                        score,
                        self.likelihood.diagnosis(&self.state)
                    );
                    return Err(self.abort_iteration(iteration, index, detail));
                }

                if *full_evaluation {
                    if let Err(err) = self.check_full_evaluation(iteration, index, score, "calculated")
                    {
                        self.restore_all();
                        return Err(err);
                    }
                }

                if score > self.best_score {
                    self.best_score = score;
                    self.fire_best_state(iteration);
                }

                let accept = self.schedule.operator(index).is_gibbs()
                    || self
                        .acceptor
                        .accept(old_score, score, log_hastings_ratio, &mut self.rng);

                let core = self.schedule.operator_mut(index).core_mut();
                if accept {
                    core.record_accept(score - old_score);
                    self.accept_all();
                    self.current_score = score;
                } else {
                    core.record_reject();
                    self.restore_all();
                }

                if *full_evaluation {
                    self.check_full_evaluation(iteration, index, self.current_score, "restored")?;
                }
                Some(accept)
            }
        };

        if let Some(accepted) = accepted {
            if !disable_coercion && iteration >= self.settings.coercion_delay {
                let use_coercion = self.settings.use_coercion;
                let schedule = self.schedule.optimization_schedule();
                if let Some(controller) = self.schedule.operator_mut(index).coercion_mut() {
                    if controller.mode().is_active(use_coercion) {
                        controller.update(accepted, schedule);
                    }
                }
            }
        }

        if *full_evaluation
            && self.schedule.minimum_accept_and_reject_count()
                >= self.settings.min_operator_count_for_full_evaluation
            && iteration >= self.settings.full_evaluation_count
        {
            debug!("full evaluation test phase ended at iteration {}", iteration);
            *full_evaluation = false;
        }

        for listener in self.listeners.iter_mut() {
            listener.current_state(iteration, &self.state, self.current_score);
        }
        Ok(())
    }

    /// Recompute the score from scratch and compare with `expected`.
    fn check_full_evaluation(
        &mut self,
        iteration: u64,
        index: usize,
        expected: f64,
        phase: &'static str,
    ) -> Result<()> {
        self.make_dirty();
        let full = self.evaluate();
        if (full - expected).abs() > EVALUATION_TEST_THRESHOLD
            || (full.is_infinite() != expected.is_infinite())
        {
            let operator = self.schedule.operator(index).name().to_string();
            error!(
                "state was not correctly {} after operator {}: {} vs full evaluation {}",
                phase, operator, expected, full
            );
            return Err(McmcError::InvariantViolation {
                iteration,
                operator,
                phase,
                incremental: expected,
                full,
            });
        }
        Ok(())
    }

    fn check_initial_score(&mut self) -> Result<()> {
        let score = self.current_score;
        if score == f64::NEG_INFINITY {
            if let Some(prior) = self.prior.as_mut() {
                if prior.log_likelihood(&self.state) == f64::NEG_INFINITY {
                    return Err(McmcError::InvalidInitialState(
                        "one of the priors has zero probability".to_string(),
                    ));
                }
            }
            return Err(McmcError::InvalidInitialState(format!(
                "the initial likelihood is zero: {}",
                self.likelihood.diagnosis(&self.state)
            )));
        }
        if score.is_nan() || score == f64::INFINITY {
            return Err(McmcError::InvalidInitialState(format!(
                "a likelihood returned with a numerical error: {}",
                self.likelihood.diagnosis(&self.state)
            )));
        }
        Ok(())
    }

    /// Roll back the proposal in flight and describe why the run stops.
    fn abort_iteration(&mut self, iteration: u64, index: usize, detail: String) -> McmcError {
        self.restore_all();
        let operator = self.schedule.operator(index).name().to_string();
        error!(
            "numerical error at iteration {} in operator {}: {}",
            iteration, operator, detail
        );
        McmcError::Numerical {
            iteration,
            operator,
            seed: self.rng.seed(),
            detail,
        }
    }

    fn evaluate(&mut self) -> f64 {
        let log_prior = match self.prior.as_mut() {
            Some(prior) => prior.log_likelihood(&self.state),
            None => 0.0,
        };
        if log_prior == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        log_prior + self.likelihood.log_likelihood(&self.state)
    }

    fn make_dirty(&mut self) {
        self.likelihood.make_dirty();
        if let Some(prior) = self.prior.as_mut() {
            prior.make_dirty();
        }
    }

    fn store_all(&mut self) {
        self.state.store_state();
        self.likelihood.store_state();
        if let Some(prior) = self.prior.as_mut() {
            prior.store_state();
        }
    }

    fn restore_all(&mut self) {
        self.state.restore_state();
        self.likelihood.restore_state();
        if let Some(prior) = self.prior.as_mut() {
            prior.restore_state();
        }
    }

    fn accept_all(&mut self) {
        self.state.accept_state();
        self.likelihood.accept_state();
        if let Some(prior) = self.prior.as_mut() {
            prior.accept_state();
        }
    }

    fn fire_best_state(&mut self, iteration: u64) {
        for listener in self.listeners.iter_mut() {
            listener.best_state(iteration, &self.state, self.best_score);
        }
    }
}

impl<S: Model> MarkovChain<S, ChainRng> {
    /// Resume counters, tuning and the random stream from a checkpoint.
    ///
    /// The model state has to be restored separately.
    pub fn restore_checkpoint(&mut self, checkpoint: &ChainCheckpoint) -> Result<()> {
        self.restore_counters(checkpoint)?;
        if let Some(snapshot) = &checkpoint.rng {
            self.rng = ChainRng::from_snapshot(snapshot);
        }
        Ok(())
    }
}
