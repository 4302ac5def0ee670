use crate::error::{OptimizerError, Result};
use crate::individual::Individual;
use crate::rng::RandomNumberGenerator;

use super::rank::descending;

/// Picks two parents by tournament.
///
/// A tournament draws `participants` individuals at random. A draw whose
/// aggregate fitness exactly equals one already in the tournament is rejected
/// and redrawn, up to one attempt per member of the generation; after that the
/// draw is accepted regardless, so a generation full of clones still
/// terminates. The two fittest participants win.
///
/// # Examples
///
/// ```
/// use genoptim::error::Result;
/// use genoptim::fitness::FitnessRecord;
/// use genoptim::gene::Genome;
/// use genoptim::individual::Individual;
/// use genoptim::rng::RandomNumberGenerator;
/// use genoptim::selection::TournamentSelection;
///
/// fn main() -> Result<()> {
///     let generation: Vec<Individual> = [0.5, 0.8, 0.3, 0.9, 0.1]
///         .iter()
///         .enumerate()
///         .map(|(i, p)| {
///             let mut ind = Individual::new(format!("ind{}", i), Genome::new());
///             ind.record(FitnessRecord::new(Some(*p), 0.0, 0.0, 0.0));
///             ind
///         })
///         .collect();
///
///     let mut rng = RandomNumberGenerator::from_seed(42);
///     let (first, second) = TournamentSelection::default().select(&generation, &mut rng)?;
///
///     assert!(first.aggregate_fitness() >= second.aggregate_fitness());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TournamentSelection {
    participants: usize,
}

impl TournamentSelection {
    /// Creates a tournament with `participants` draws. Must be at least 2.
    pub fn new(participants: usize) -> Result<Self> {
        if participants < 2 {
            return Err(OptimizerError::Breeding(
                "Tournament needs at least 2 participants".to_string(),
            ));
        }
        Ok(Self { participants })
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Runs one tournament and returns the winners as indices into
    /// `generation`, fittest first.
    pub fn select_indices(
        &self,
        generation: &[Individual],
        rng: &mut RandomNumberGenerator,
    ) -> Result<(usize, usize)> {
        if generation.is_empty() {
            return Err(OptimizerError::EmptyPopulation);
        }

        let fitness: Vec<f64> = generation.iter().map(Individual::aggregate_fitness).collect();
        let max_attempts = generation.len();
        let mut chosen: Vec<usize> = Vec::with_capacity(self.participants);

        for _ in 0..self.participants {
            let mut attempts = 0;
            loop {
                let idx = rng.index(generation.len());
                attempts += 1;

                let duplicate = chosen.iter().any(|&c| fitness[c] == fitness[idx]);
                if !duplicate || attempts >= max_attempts {
                    chosen.push(idx);
                    break;
                }
            }
        }

        chosen.sort_by(|&a, &b| descending(fitness[a], fitness[b]));
        Ok((chosen[0], chosen[1]))
    }

    /// Runs one tournament and returns the two winners, fittest first.
    pub fn select<'a>(
        &self,
        generation: &'a [Individual],
        rng: &mut RandomNumberGenerator,
    ) -> Result<(&'a Individual, &'a Individual)> {
        let (a, b) = self.select_indices(generation, rng)?;
        Ok((&generation[a], &generation[b]))
    }
}

impl Default for TournamentSelection {
    fn default() -> Self {
        Self { participants: 4 }
    }
}
