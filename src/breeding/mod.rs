//! # Breeding
//!
//! The `Breeder` builds populations: the first generation from the baseline
//! and random sampling, every later one from the ranked previous generation
//! through elitism, crossover, mutation and fresh sampling.
pub mod operators;

pub use operators::{crossover, mutate};

use tracing::debug;

use crate::{
    error::{OptimizerError, Result},
    evolution::options::GenerationConfig,
    gene::sample_genome,
    individual::Individual,
    rng::RandomNumberGenerator,
    selection::{rank_generation, TournamentSelection},
};

/// Share of non-elite offspring produced by crossover.
pub const CROSSOVER_SHARE: f64 = 0.6;

/// Share of non-elite offspring produced by mutating an existing individual.
/// The rest are sampled fresh.
pub const MUTATION_SHARE: f64 = 0.3;

/// The operator that produces one offspring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreedingOperator {
    Crossover,
    Mutation,
    Fresh,
}

impl BreedingOperator {
    pub fn pick(rng: &mut RandomNumberGenerator) -> Self {
        let roll = rng.unit();
        if roll < CROSSOVER_SHARE {
            Self::Crossover
        } else if roll < CROSSOVER_SHARE + MUTATION_SHARE {
            Self::Mutation
        } else {
            Self::Fresh
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Breeder {
    tournament: TournamentSelection,
}

impl Breeder {
    pub fn new(tournament: TournamentSelection) -> Self {
        Self { tournament }
    }

    /// Synthesizes the first population.
    ///
    /// Individual 0 carries the configured baseline genome unchanged (or a
    /// sampled one when no baseline is set); the others sample every gene
    /// independently.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::Breeding` if the configuration is invalid.
    pub fn make_generation(
        &self,
        config: &GenerationConfig,
        generation: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<Individual>> {
        config.validate()?;

        let run_name = config.get_run_name();
        let mut population = Vec::with_capacity(config.get_population_size());

        let baseline = match config.get_baseline() {
            Some(genome) => genome.clone(),
            None => sample_genome(config.get_genes(), rng),
        };
        population.push(Individual::new(
            Individual::name_for(run_name, generation, 0),
            baseline,
        ));

        for index in 1..config.get_population_size() {
            population.push(Individual::new(
                Individual::name_for(run_name, generation, index),
                sample_genome(config.get_genes(), rng),
            ));
        }

        debug!(generation, size = population.len(), "Synthesized initial population");
        Ok(population)
    }

    /// Breeds generation `generation` from the evaluated `previous` one.
    ///
    /// The first `elitism_count` individuals of the ranked previous generation
    /// are carried over verbatim, fitness records and `has_run` included, so
    /// the scheduler does not evaluate them again.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or `previous` is empty.
    pub fn breed_new_generation(
        &self,
        previous: Vec<Individual>,
        config: &GenerationConfig,
        generation: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<Individual>> {
        config.validate()?;

        if previous.is_empty() {
            return Err(OptimizerError::EmptyPopulation);
        }

        let ranked = rank_generation(previous);
        let size = config.get_population_size();
        let run_name = config.get_run_name();

        let mut population: Vec<Individual> = ranked
            .iter()
            .take(config.get_elitism_count())
            .cloned()
            .collect();
        let elites = population.len();

        let mut counts = [0usize; 3];
        while population.len() < size {
            let name = Individual::name_for(run_name, generation, population.len());

            let child = match BreedingOperator::pick(rng) {
                BreedingOperator::Crossover => {
                    counts[0] += 1;
                    let (a, b) = self.tournament.select(&ranked, rng)?;
                    crossover(name, a, b, config, rng)
                }
                BreedingOperator::Mutation => {
                    counts[1] += 1;
                    let parent = &ranked[rng.index(ranked.len())];
                    mutate(parent, config, name, rng)
                }
                BreedingOperator::Fresh => {
                    counts[2] += 1;
                    Individual::new(name, sample_genome(config.get_genes(), rng))
                }
            };
            population.push(child);
        }

        debug!(
            generation,
            elites,
            crossovers = counts[0],
            mutations = counts[1],
            fresh = counts[2],
            "Bred new generation"
        );
        Ok(population)
    }
}
