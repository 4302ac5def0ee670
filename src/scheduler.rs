//! # Trial Scheduler
//!
//! A bounded worker pool that evaluates a generation. Each individual becomes
//! one task owning that individual exclusively; the task runs the individual
//! through every environment in order and reports back a [`TaskReport`].
//!
//! - At most `concurrency` tasks run at once (one per pool thread).
//! - A failing or panicking trial never escapes its task. The individual gets
//!   a sentinel fitness record and the rest of the generation carries on.
//! - Individuals whose trials already ran (`has_run`) are not submitted.
//! - Engines in flight are tracked so [`TrialScheduler::stop_all`] can ask
//!   them to stop gracefully.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{unbounded, Receiver};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, warn};

use crate::engine::{EngineFactory, EngineStatus, Environment, SimulationEngine, TrialSpec};
use crate::error::{OptimizerError, Result};
use crate::fitness::{self, FitnessRecord};
use crate::individual::Individual;

/// How one individual's task settled.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The individual had already run; its records were reused.
    Skipped,
    /// Every environment produced a fitness record.
    Completed { environments: usize },
    /// A trial failed; the individual received a sentinel record.
    Failed { environment: usize, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub name: String,
    pub outcome: TaskOutcome,
}

/// A fully settled generation, in submission order.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub individuals: Vec<Individual>,
    pub reports: Vec<TaskReport>,
}

impl GenerationOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == TaskOutcome::Skipped)
            .count()
    }
}

/// Engines currently running a trial, keyed by instance name.
#[derive(Clone, Default)]
struct EngineRegistry {
    engines: Arc<Mutex<HashMap<String, Arc<dyn SimulationEngine>>>>,
}

impl EngineRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn SimulationEngine>>> {
        self.engines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, name: &str, engine: Arc<dyn SimulationEngine>) -> RegistryGuard {
        self.lock().insert(name.to_string(), engine);
        RegistryGuard {
            registry: self.clone(),
            name: name.to_string(),
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn drain(&self) -> Vec<(String, Arc<dyn SimulationEngine>)> {
        self.lock().drain().collect()
    }
}

/// Removes an engine from the registry when its trial ends, even by panic.
struct RegistryGuard {
    registry: EngineRegistry,
    name: String,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.name);
    }
}

struct TaskContext {
    factory: Arc<dyn EngineFactory>,
    environments: Arc<[Environment]>,
    registry: EngineRegistry,
}

struct Settled {
    index: usize,
    individual: Individual,
    outcome: TaskOutcome,
}

/// A submitted generation whose tasks are still running.
pub struct PendingGeneration {
    receiver: Receiver<Settled>,
    submitted: usize,
    slots: Vec<Option<(Individual, TaskOutcome)>>,
}

impl PendingGeneration {
    /// Number of tasks handed to the pool.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Blocks until every submitted task has settled.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::Scheduler` if a task vanished without
    /// reporting back.
    pub fn wait(mut self) -> Result<GenerationOutcome> {
        for received in 0..self.submitted {
            let settled = self.receiver.recv().map_err(|_| {
                OptimizerError::Scheduler(format!(
                    "Worker pool lost {} of {} tasks before they settled",
                    self.submitted - received,
                    self.submitted
                ))
            })?;
            self.slots[settled.index] = Some((settled.individual, settled.outcome));
        }

        let mut individuals = Vec::with_capacity(self.slots.len());
        let mut reports = Vec::with_capacity(self.slots.len());

        for (index, slot) in self.slots.into_iter().enumerate() {
            let (individual, outcome) = slot.ok_or_else(|| {
                OptimizerError::Scheduler(format!("Task {} never settled", index))
            })?;
            reports.push(TaskReport {
                name: individual.name.clone(),
                outcome,
            });
            individuals.push(individual);
        }

        Ok(GenerationOutcome {
            individuals,
            reports,
        })
    }
}

/// Cloneable handle that can stop in-flight trials from any thread, including
/// while the owning optimizer is blocked waiting on a generation.
#[derive(Clone)]
pub struct StopHandle {
    registry: EngineRegistry,
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl StopHandle {
    /// Number of engines currently running a trial.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Asks every engine still in flight to stop. Errors raised while
    /// stopping are logged, not returned. Returns how many engines were asked.
    ///
    /// Stopped engines still settle normally; their tasks record whatever the
    /// engine reports once `start` returns.
    pub fn stop_all(&self) -> usize {
        let engines = self.registry.drain();
        let mut requested = 0;

        for (name, engine) in engines {
            if engine.status() == EngineStatus::Stopped {
                continue;
            }
            requested += 1;
            if let Err(e) = engine.stop() {
                error!(name = %name, error = %e, "Failed to stop trial");
            }
        }

        if requested > 0 {
            warn!(requested, "Requested stop of in-flight trials");
        }
        requested
    }
}

/// Bounded worker pool owned by one optimizer.
pub struct TrialScheduler {
    concurrency: usize,
    pool: ThreadPool,
    registry: EngineRegistry,
}

impl fmt::Debug for TrialScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrialScheduler")
            .field("concurrency", &self.concurrency)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl TrialScheduler {
    /// Creates a pool of `concurrency` worker threads.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::Scheduler` if `concurrency` is zero or the
    /// pool cannot be built.
    pub fn new(concurrency: usize) -> Result<Self> {
        Ok(Self {
            concurrency,
            pool: build_pool(concurrency)?,
            registry: EngineRegistry::default(),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// A handle sharing this scheduler's engine registry. It stays valid
    /// across [`TrialScheduler::reset`].
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            registry: self.registry.clone(),
        }
    }

    /// Number of engines currently running a trial.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Stops anything still running and replaces the pool with a fresh one.
    pub fn reset(&mut self) -> Result<()> {
        self.stop_all();
        self.pool = build_pool(self.concurrency)?;
        Ok(())
    }

    /// Hands every individual that has not run yet to the pool.
    ///
    /// Individuals with `has_run` set are settled immediately as
    /// [`TaskOutcome::Skipped`].
    pub fn submit(
        &self,
        population: Vec<Individual>,
        environments: &[Environment],
        factory: Arc<dyn EngineFactory>,
    ) -> Result<PendingGeneration> {
        if environments.is_empty() {
            return Err(OptimizerError::Scheduler(
                "Cannot schedule trials without environments".to_string(),
            ));
        }

        let context = Arc::new(TaskContext {
            factory,
            environments: environments.into(),
            registry: self.registry.clone(),
        });
        let (sender, receiver) = unbounded();
        let mut slots = Vec::with_capacity(population.len());
        let mut submitted = 0;

        for (index, individual) in population.into_iter().enumerate() {
            if individual.has_run {
                debug!(name = %individual.name, "Reusing fitness of evaluated individual");
                slots.push(Some((individual, TaskOutcome::Skipped)));
                continue;
            }

            slots.push(None);
            submitted += 1;

            let context = Arc::clone(&context);
            let sender = sender.clone();
            self.pool.spawn(move || {
                let mut individual = individual;
                let outcome = run_task(&mut individual, &context);
                individual.has_run = true;
                // The receiver only goes away if the optimizer gave up waiting.
                let _ = sender.send(Settled {
                    index,
                    individual,
                    outcome,
                });
            });
        }

        debug!(submitted, total = slots.len(), "Submitted generation to worker pool");

        Ok(PendingGeneration {
            receiver,
            submitted,
            slots,
        })
    }

    /// Submits a generation and waits for it to settle.
    pub fn run_generation(
        &self,
        population: Vec<Individual>,
        environments: &[Environment],
        factory: Arc<dyn EngineFactory>,
    ) -> Result<GenerationOutcome> {
        self.submit(population, environments, factory)?.wait()
    }

    /// Asks every engine still in flight to stop. See [`StopHandle::stop_all`].
    pub fn stop_all(&self) -> usize {
        self.stop_handle().stop_all()
    }
}

fn build_pool(concurrency: usize) -> Result<ThreadPool> {
    if concurrency == 0 {
        return Err(OptimizerError::Scheduler(
            "Worker pool needs at least one thread".to_string(),
        ));
    }

    ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|i| format!("trial-worker-{}", i))
        .panic_handler(|payload| {
            error!(panic = %panic_message(payload.as_ref()), "Worker task panicked");
        })
        .build()
        .map_err(|e| OptimizerError::Scheduler(format!("Failed to build worker pool: {}", e)))
}

/// Runs one individual through every environment, in order. Never panics.
fn run_task(individual: &mut Individual, context: &TaskContext) -> TaskOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_environments(individual, context)));

    match result {
        Ok(Ok(environments)) => TaskOutcome::Completed { environments },
        Ok(Err((environment, e))) => {
            if e.is_trial_failure() {
                warn!(name = %individual.name, environment, error = %e, "Trial failed");
            } else {
                error!(name = %individual.name, environment, error = %e, "Trial aborted");
            }
            individual.record(FitnessRecord::sentinel());
            TaskOutcome::Failed {
                environment,
                error: e.to_string(),
            }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let e = OptimizerError::Trial(format!("panicked: {}", message));
            // Environments completed before the panic keep their records.
            let environment = individual.fitness.len();
            warn!(name = %individual.name, environment, error = %e, "Trial panicked");
            individual.record(FitnessRecord::sentinel());
            TaskOutcome::Failed {
                environment,
                error: e.to_string(),
            }
        }
    }
}

fn run_environments(
    individual: &mut Individual,
    context: &TaskContext,
) -> std::result::Result<usize, (usize, OptimizerError)> {
    for (index, environment) in context.environments.iter().enumerate() {
        let spec = TrialSpec {
            name: individual.name.clone(),
            genome: individual.genome.clone(),
            environment: *environment,
            flush: index == 0,
        };
        let record = run_trial(&spec, context).map_err(|e| (index, e))?;
        individual.record(record);
    }
    Ok(context.environments.len())
}

fn run_trial(spec: &TrialSpec, context: &TaskContext) -> Result<FitnessRecord> {
    let engine = context.factory.create(spec)?;
    let _guard = context.registry.register(&spec.name, Arc::clone(&engine));

    let result = drive(engine.as_ref(), &spec.environment);

    if result.is_err() && engine.status() != EngineStatus::Stopped {
        if let Err(e) = engine.stop() {
            error!(name = %spec.name, error = %e, "Failed to stop faulted trial");
        }
    }

    result
}

fn drive(engine: &dyn SimulationEngine, environment: &Environment) -> Result<FitnessRecord> {
    engine.initialize()?;
    engine.start()?;
    engine.stop()?;
    Ok(fitness::evaluate(&engine.portfolio(), environment))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
