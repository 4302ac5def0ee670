use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use super::{
    checkpoint::Checkpoint,
    options::{GenerationConfig, LogLevel},
};
use crate::{
    breeding::Breeder,
    engine::EngineFactory,
    error::{OptimizerError, OptionExt, Result},
    individual::Individual,
    rng::RandomNumberGenerator,
    scheduler::{GenerationOutcome, StopHandle, TrialScheduler},
    selection::rank_generation,
};

/// Where the optimizer is in its generational loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizerState {
    Idle,
    GeneratingPopulation,
    Scheduling,
    AwaitingCompletion,
    Ranking,
    Checkpointing,
    Done,
    Failed(String),
}

impl fmt::Display for OptimizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::GeneratingPopulation => f.write_str("generating population"),
            Self::Scheduling => f.write_str("scheduling"),
            Self::AwaitingCompletion => f.write_str("awaiting completion"),
            Self::Ranking => f.write_str("ranking"),
            Self::Checkpointing => f.write_str("checkpointing"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// The outcome of a completed optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    /// Top-ranked individual of the final generation.
    pub best: Individual,
    /// One checkpoint per generation, in generation order.
    pub checkpoints: Vec<Checkpoint>,
}

/// Runs the generational loop: build or breed a population, evaluate it on
/// the worker pool, rank it, checkpoint it, repeat.
pub struct Optimizer {
    config: GenerationConfig,
    factory: Arc<dyn EngineFactory>,
    scheduler: TrialScheduler,
    breeder: Breeder,
    rng: RandomNumberGenerator,
    state: OptimizerState,
}

impl fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("run_name", &self.config.get_run_name())
            .field("scheduler", &self.scheduler)
            .field("state", &self.state)
            .finish()
    }
}

impl Optimizer {
    /// Creates an optimizer with its own worker pool.
    ///
    /// The random source is seeded from the config's `seed` when present.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::Breeding` for an invalid configuration and
    /// `OptimizerError::Scheduler` if the worker pool cannot be built.
    pub fn new(config: GenerationConfig, factory: Arc<dyn EngineFactory>) -> Result<Self> {
        config.validate()?;
        let scheduler = TrialScheduler::new(config.get_concurrency())?;
        let rng = match config.get_seed() {
            Some(seed) => RandomNumberGenerator::from_seed(seed),
            None => RandomNumberGenerator::new(),
        };

        Ok(Self {
            config,
            factory,
            scheduler,
            breeder: Breeder::default(),
            rng,
            state: OptimizerState::Idle,
        })
    }

    /// Replaces the random source.
    pub fn with_rng(mut self, rng: RandomNumberGenerator) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &OptimizerState {
        &self.state
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &TrialScheduler {
        &self.scheduler
    }

    /// A handle for stopping in-flight trials while [`Optimizer::run`] blocks.
    ///
    /// Take it before calling `run` and move it to another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    /// Runs `generation_count` generations.
    ///
    /// # Errors
    ///
    /// - `OptimizerError::Breeding` if the configuration is invalid; nothing
    ///   is scheduled.
    /// - `OptimizerError::Scheduler` if the worker pool cannot be rebuilt.
    /// - `OptimizerError::FatalRun` wrapping the first error raised while a
    ///   generation was being built, scheduled, ranked or checkpointed. Trials
    ///   still in flight are asked to stop first and no later generation runs.
    ///
    /// Individual trial failures are not errors; they show up as sentinel
    /// fitness records.
    pub fn run(&mut self) -> Result<OptimizationResult> {
        if let Err(e) = self.config.validate() {
            self.state = OptimizerState::Failed(e.to_string());
            return Err(e);
        }
        if let Err(e) = self.scheduler.reset() {
            self.state = OptimizerState::Failed(e.to_string());
            return Err(e);
        }

        info!(
            run = %self.config.get_run_name(),
            population = self.config.get_population_size(),
            generations = self.config.get_generation_count(),
            concurrency = self.config.get_concurrency(),
            environments = self.config.get_environments().len(),
            "Starting optimization"
        );

        let mut ranked: Option<Vec<Individual>> = None;
        let mut checkpoints = Vec::with_capacity(self.config.get_generation_count());

        for generation in 0..self.config.get_generation_count() {
            match self.run_generation(generation, ranked.take()) {
                Ok((next, checkpoint)) => {
                    ranked = Some(next);
                    checkpoints.push(checkpoint);
                }
                Err(e) => return Err(self.fail(generation, e)),
            }
        }

        self.state = OptimizerState::Done;

        let best = ranked
            .and_then(|generation| generation.into_iter().next())
            .ok_or_else_optimizer(|| OptimizerError::EmptyPopulation)?;

        info!(
            best = %best.name,
            fitness = best.aggregate_fitness(),
            "Optimization finished"
        );

        Ok(OptimizationResult { best, checkpoints })
    }

    fn run_generation(
        &mut self,
        generation: usize,
        previous: Option<Vec<Individual>>,
    ) -> Result<(Vec<Individual>, Checkpoint)> {
        self.state = OptimizerState::GeneratingPopulation;
        let population = match previous {
            None => self
                .breeder
                .make_generation(&self.config, generation, &mut self.rng)?,
            Some(previous) => self.breeder.breed_new_generation(
                previous,
                &self.config,
                generation,
                &mut self.rng,
            )?,
        };
        let expected = population.len();

        self.state = OptimizerState::Scheduling;
        let pending = self.scheduler.submit(
            population,
            self.config.get_environments(),
            Arc::clone(&self.factory),
        )?;

        self.state = OptimizerState::AwaitingCompletion;
        let outcome = pending.wait()?;
        if outcome.individuals.len() != expected {
            return Err(OptimizerError::Scheduler(format!(
                "Generation {} settled {} of {} individuals",
                generation,
                outcome.individuals.len(),
                expected
            )));
        }

        self.state = OptimizerState::Ranking;
        let checkpoint = Checkpoint::from_generation(&outcome.individuals)?;
        self.log_generation(generation, &outcome, &checkpoint);
        let ranked = rank_generation(outcome.individuals);

        self.state = OptimizerState::Checkpointing;
        if let Some(dir) = self.config.get_checkpoint_dir() {
            let path = Checkpoint::path_for(dir, self.config.get_run_name(), generation);
            checkpoint.write(&path)?;
        }

        Ok((ranked, checkpoint))
    }

    fn fail(&mut self, generation: usize, cause: OptimizerError) -> OptimizerError {
        self.state = OptimizerState::Failed(cause.to_string());
        let stopped = self.scheduler.stop_all();
        error!(generation, stopped, error = %cause, "Optimization run failed");

        OptimizerError::FatalRun {
            generation,
            source: Box::new(cause),
        }
    }

    fn log_generation(
        &self,
        generation: usize,
        outcome: &GenerationOutcome,
        checkpoint: &Checkpoint,
    ) {
        let summary = checkpoint.result;
        let failed = outcome.failures().count();
        let skipped = outcome.skipped();

        match self.config.get_log_level() {
            LogLevel::None => {}
            LogLevel::Minimal => info!(
                generation,
                mean = summary.mean,
                min = summary.min,
                max = summary.max,
                failed,
                skipped,
                "Generation evaluated"
            ),
            LogLevel::Verbose => {
                let individuals = outcome
                    .individuals
                    .iter()
                    .map(|ind| {
                        let r = ind.aggregate_record();
                        format!(
                            "{} profit={:.4} win={:.4} sharpe={:.4} freq={:.4} total={:.4}",
                            ind.name,
                            r.current_profit,
                            r.percent_trade_win,
                            r.sharpe_ratio,
                            r.trade_frequency,
                            r.total
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; ");

                info!(
                    generation,
                    mean = summary.mean,
                    min = summary.min,
                    max = summary.max,
                    failed,
                    skipped,
                    individuals = %individuals,
                    "Generation evaluated"
                );
            }
        }
    }
}
