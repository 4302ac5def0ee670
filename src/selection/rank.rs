use std::cmp::Ordering;

use crate::individual::Individual;

/// Orders a generation for breeding so that clusters of identical fitness
/// (usually clones of one configuration) sink toward the back.
///
/// Ranking runs in two passes:
///
/// 1. a stable sort by descending aggregate fitness, then
/// 2. a single linear rebuild: the first individual and every individual
///    whose fitness differs from its predecessor form the front, in rank
///    order; every individual tied with its predecessor is appended behind
///    them, also in rank order.
///
/// Re-ranking an already ranked generation returns the same order.
///
/// # Examples
///
/// ```
/// use genoptim::fitness::FitnessRecord;
/// use genoptim::gene::Genome;
/// use genoptim::individual::Individual;
/// use genoptim::selection::rank_generation;
///
/// fn scored(name: &str, profit: f64) -> Individual {
///     let mut ind = Individual::new(name, Genome::new());
///     ind.record(FitnessRecord::new(Some(profit), 0.0, 0.0, 0.0));
///     ind
/// }
///
/// let ranked = rank_generation(vec![
///     scored("a", 0.5),
///     scored("b", 0.9),
///     scored("c", 0.5),
///     scored("d", 0.1),
/// ]);
///
/// let names: Vec<_> = ranked.iter().map(|i| i.name.as_str()).collect();
/// assert_eq!(names, ["b", "a", "d", "c"]);
/// ```
pub fn rank_generation(generation: Vec<Individual>) -> Vec<Individual> {
    let mut scored: Vec<(f64, Individual)> = generation
        .into_iter()
        .map(|ind| (ind.aggregate_fitness(), ind))
        .collect();
    scored.sort_by(|a, b| descending(a.0, b.0));

    let mut front = Vec::with_capacity(scored.len());
    let mut back = Vec::new();
    let mut previous: Option<f64> = None;

    for (fitness, individual) in scored {
        match previous {
            Some(p) if p == fitness => back.push(individual),
            _ => front.push(individual),
        }
        previous = Some(fitness);
    }

    front.extend(back);
    front
}

/// Stable sort by descending aggregate fitness. Used for checkpoints and
/// display, where ties keep their input order.
pub fn sort_by_fitness(generation: &mut [Individual]) {
    generation.sort_by(|a, b| descending(a.aggregate_fitness(), b.aggregate_fitness()));
}

/// Higher fitness first. `NaN` sorts last.
pub(crate) fn descending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
