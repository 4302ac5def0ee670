//! # Crossover and mutation
//!
//! Both operators build a new [`Individual`] and leave their parents
//! untouched. Every value they produce lies in its gene's domain: categorical
//! genes only ever take values from their list, numeric genes are clamped to
//! `[min, max]` and floored when integral.

use crate::evolution::options::GenerationConfig;
use crate::gene::{Gene, GeneValue, Genome};
use crate::individual::Individual;
use crate::rng::RandomNumberGenerator;

/// Chance that a gene is taken from the first parent during crossover.
pub const CROSSOVER_GENE_RATE: f64 = 0.5;

/// Chance that a crossover child gets one extra mutation pass.
pub const CROSSOVER_MUTATION_RATE: f64 = 0.25;

/// Bounds of the relative step a numeric mutation takes, as a share of the
/// gene's range.
pub const MUTATION_STEP_MIN: f64 = 0.005;
pub const MUTATION_STEP_MAX: f64 = 0.5;

/// Combines two parents into a child named `name`.
///
/// The child starts from `parent_b`'s genome. Each gene is replaced with
/// `parent_a`'s value with probability [`CROSSOVER_GENE_RATE`]; categorical
/// genes selected this way are re-sampled from their list instead. With
/// probability [`CROSSOVER_MUTATION_RATE`] the child is then mutated once.
pub fn crossover(
    name: impl Into<String>,
    parent_a: &Individual,
    parent_b: &Individual,
    config: &GenerationConfig,
    rng: &mut RandomNumberGenerator,
) -> Individual {
    let mut genome = parent_b.genome.clone();

    for gene in config.get_genes() {
        if !rng.chance(CROSSOVER_GENE_RATE) {
            continue;
        }

        let value = if gene.is_categorical() {
            gene.sample(rng)
        } else {
            match parent_a.genome.get(&gene.key) {
                Some(value) => value.clone(),
                None => gene.sample(rng),
            }
        };
        genome.insert(gene.key.clone(), value);
    }

    for gene in config.get_genes().iter().filter(|g| !g.is_categorical()) {
        if let Some(GeneValue::Number(n)) = genome.get_mut(&gene.key) {
            *n = gene.constrain(*n);
        }
    }

    let child = Individual::new(name, genome);

    if rng.chance(CROSSOVER_MUTATION_RATE) {
        let name = child.name.clone();
        mutate(&child, config, name, rng)
    } else {
        child
    }
}

/// Produces a mutated copy of `parent` named `name`.
///
/// Each gene mutates with probability `mutation_rate`; the rest are copied.
pub fn mutate(
    parent: &Individual,
    config: &GenerationConfig,
    name: impl Into<String>,
    rng: &mut RandomNumberGenerator,
) -> Individual {
    let rate = config.get_mutation_rate();

    let genome: Genome = config
        .get_genes()
        .iter()
        .map(|gene| {
            let current = parent.genome.get(&gene.key);
            let value = if rng.chance(rate) {
                mutate_gene(gene, current, rng)
            } else {
                match current {
                    Some(value) => value.clone(),
                    None => gene.sample(rng),
                }
            };
            (gene.key.clone(), value)
        })
        .collect();

    Individual::new(name, genome)
}

/// Perturbs a single value. Numeric genes move by
/// `range · uniform(MUTATION_STEP_MIN, MUTATION_STEP_MAX) · ±1`.
pub fn mutate_gene(
    gene: &Gene,
    current: Option<&GeneValue>,
    rng: &mut RandomNumberGenerator,
) -> GeneValue {
    if gene.is_categorical() {
        return gene.sample(rng);
    }

    match current.and_then(GeneValue::as_number) {
        Some(value) => {
            let step = gene.range() * rng.uniform(MUTATION_STEP_MIN, MUTATION_STEP_MAX);
            GeneValue::Number(gene.constrain(value + step * rng.sign()))
        }
        None => gene.sample(rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::engine::Environment;
    use crate::gene::sample_genome;

    fn config(mutation_rate: f64) -> GenerationConfig {
        GenerationConfig::builder()
            .population_size(10)
            .mutation_rate(mutation_rate)
            .environment(Environment::new(
                Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap(),
            ))
            .gene(Gene::numeric("period", 2.0, 40.0, true))
            .gene(Gene::numeric("threshold", -1.0, 1.0, false))
            .gene(Gene::categorical("candle", vec!["5m", "15m", "1h"]))
            .build()
    }

    fn in_domain(config: &GenerationConfig, ind: &Individual) -> bool {
        config.get_genes().len() == ind.genome.len()
            && config
                .get_genes()
                .iter()
                .all(|g| ind.genome.get(&g.key).map_or(false, |v| g.contains(v)))
    }

    #[test]
    fn test_mutation_rate_zero_copies_genome() {
        let config = config(0.0);
        let mut rng = RandomNumberGenerator::from_seed(3);
        let parent = Individual::new("p", sample_genome(config.get_genes(), &mut rng));

        let child = mutate(&parent, &config, "c", &mut rng);
        assert_eq!(child.genome, parent.genome);
        assert_eq!(child.name, "c");
        assert!(!child.has_run);
    }

    #[test]
    fn test_mutation_stays_in_domain() {
        let config = config(1.0);
        let mut rng = RandomNumberGenerator::from_seed(4);
        let mut current = Individual::new("p", sample_genome(config.get_genes(), &mut rng));

        for i in 0..500 {
            current = mutate(&current, &config, format!("c{}", i), &mut rng);
            assert!(in_domain(&config, &current), "{:?}", current.genome);
        }
    }

    #[test]
    fn test_mutation_does_not_touch_parent() {
        let config = config(1.0);
        let mut rng = RandomNumberGenerator::from_seed(8);
        let mut parent = Individual::new("p", sample_genome(config.get_genes(), &mut rng));
        parent.has_run = true;
        let snapshot = parent.clone();

        let _ = mutate(&parent, &config, "c", &mut rng);
        assert_eq!(parent, snapshot);
    }

    #[test]
    fn test_numeric_step_bounds() {
        let gene = Gene::numeric("x", 0.0, 100.0, false);
        let mut rng = RandomNumberGenerator::from_seed(12);

        for _ in 0..500 {
            let next = mutate_gene(&gene, Some(&GeneValue::Number(50.0)), &mut rng)
                .as_number()
                .unwrap();
            let delta = (next - 50.0).abs();
            assert!((0.5..=50.0).contains(&delta), "step {}", delta);
        }
    }

    #[test]
    fn test_crossover_takes_genes_from_parents() {
        let config = config(0.0);
        let mut rng = RandomNumberGenerator::from_seed(21);
        let a = Individual::new("a", sample_genome(config.get_genes(), &mut rng));
        let b = Individual::new("b", sample_genome(config.get_genes(), &mut rng));

        for i in 0..200 {
            let child = crossover(format!("c{}", i), &a, &b, &config, &mut rng);
            assert!(in_domain(&config, &child));
            assert!(!child.has_run);

            for key in ["period", "threshold"] {
                let value = &child.genome[key];
                assert!(value == &a.genome[key] || value == &b.genome[key]);
            }
        }
    }

    #[test]
    fn test_crossover_constrains_out_of_range_parents() {
        let config = config(0.0);
        let mut rng = RandomNumberGenerator::from_seed(23);

        let mut wild = Genome::new();
        wild.insert("period".to_string(), GeneValue::Number(500.0));
        wild.insert("threshold".to_string(), GeneValue::Number(-7.5));
        wild.insert("candle".to_string(), GeneValue::from("15m"));
        let a = Individual::new("a", wild.clone());
        let b = Individual::new("b", wild);

        for i in 0..100 {
            let child = crossover(format!("c{}", i), &a, &b, &config, &mut rng);
            assert!(in_domain(&config, &child), "{:?}", child.genome);
            assert_eq!(child.genome["period"], GeneValue::Number(40.0));
            assert_eq!(child.genome["threshold"], GeneValue::Number(-1.0));
        }
    }

    #[test]
    fn test_crossover_with_full_mutation_stays_in_domain() {
        let config = config(1.0);
        let mut rng = RandomNumberGenerator::from_seed(22);
        let a = Individual::new("a", sample_genome(config.get_genes(), &mut rng));
        let b = Individual::new("b", sample_genome(config.get_genes(), &mut rng));

        for i in 0..300 {
            let child = crossover(format!("c{}", i), &a, &b, &config, &mut rng);
            assert_eq!(child.name, format!("c{}", i));
            assert!(in_domain(&config, &child));
        }
    }
}
