mod common;

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{environment, MockFactory};
use genoptim::{
    evolution::Checkpoint, Gene, GeneValue, GenerationConfig, Genome, LogLevel, OptimizerError,
    Optimizer, OptimizerState,
};

fn baseline(x: f64) -> Genome {
    let mut genome = Genome::new();
    genome.insert("x".to_string(), GeneValue::Number(x));
    genome
}

fn scenario() -> GenerationConfig {
    GenerationConfig::builder()
        .run_name("e2e")
        .population_size(4)
        .elitism_count(1)
        .mutation_rate(1.0)
        .generation_count(2)
        .concurrency(2)
        .environment(environment())
        .gene(Gene::numeric("x", 0.0, 10.0, true))
        .baseline(baseline(3.0))
        .log_level(LogLevel::Verbose)
        .seed(17)
        .build()
}

#[test]
fn test_end_to_end_scenario() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let factory = Arc::new(MockFactory::new());
    let mut optimizer = Optimizer::new(scenario(), factory.clone()).unwrap();
    assert_eq!(optimizer.state(), &OptimizerState::Idle);

    let result = optimizer.run().unwrap();
    assert_eq!(optimizer.state(), &OptimizerState::Done);
    assert_eq!(result.checkpoints.len(), 2);

    // Individual 0 of generation 0 is the untouched baseline.
    let gen0 = &result.checkpoints[0];
    let baseline_entry = gen0
        .individuals
        .iter()
        .find(|e| e.name == "e2e-gen0-ind0")
        .unwrap();
    assert_eq!(baseline_entry.config, baseline(3.0));

    // Generation 1 carries generation 0's top individual unchanged.
    let top = gen0.best().unwrap();
    let gen1 = &result.checkpoints[1];
    let elite = gen1
        .individuals
        .iter()
        .find(|e| e.name == top.name)
        .expect("elite missing from generation 1");
    assert_eq!(elite.config, top.config);
    assert_eq!(elite.fitness, top.fitness);

    // ...and was simulated exactly once.
    assert_eq!(factory.tracker.trials_for(&top.name).len(), 1);
    assert_eq!(factory.tracker.trials().len(), 4 + 3);

    // Every produced value respects the gene domain.
    let gene = Gene::numeric("x", 0.0, 10.0, true);
    for checkpoint in &result.checkpoints {
        assert_eq!(checkpoint.individuals.len(), 4);
        for entry in &checkpoint.individuals {
            assert!(gene.contains(&entry.config["x"]), "{:?}", entry.config);
        }
    }

    assert!(result.best.aggregate_fitness() >= top.aggregate_fitness());
}

#[test]
fn test_checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = scenario();
    config.set_checkpoint_dir(Some(dir.path().join("checkpoints")));
    config.set_log_level(LogLevel::None);

    let mut optimizer = Optimizer::new(config, Arc::new(MockFactory::new())).unwrap();
    let result = optimizer.run().unwrap();

    for (generation, expected) in result.checkpoints.iter().enumerate() {
        let path = Checkpoint::path_for(&dir.path().join("checkpoints"), "e2e", generation);
        let loaded = Checkpoint::load(&path).unwrap();

        let names = |c: &Checkpoint| {
            c.individuals
                .iter()
                .map(|e| e.name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&loaded), names(expected));

        let scores = loaded.scores();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!((loaded.result.mean - mean).abs() < 1e-9);
        assert!((loaded.result.min - min).abs() < 1e-9);
        assert!((loaded.result.max - max).abs() < 1e-9);
        assert!((loaded.result.mean - expected.result.mean).abs() < 1e-9);
    }
}

#[test]
fn test_trial_failures_do_not_abort_the_run() {
    let factory = Arc::new(MockFactory::new().failing("e2e-gen0-ind2"));
    let mut config = scenario();
    config.set_log_level(LogLevel::Minimal);

    let mut optimizer = Optimizer::new(config, factory).unwrap();
    let result = optimizer.run().unwrap();

    let failed = result.checkpoints[0]
        .individuals
        .iter()
        .find(|e| e.name == "e2e-gen0-ind2")
        .unwrap();
    assert!(failed.fitness[0].is_sentinel());
    assert_eq!(result.checkpoints[0].result.min, -1.0);
    assert_eq!(optimizer.state(), &OptimizerState::Done);
}

#[test]
fn test_invalid_config_fails_before_scheduling() {
    let config = GenerationConfig::builder()
        .population_size(3)
        .elitism_count(3)
        .environment(environment())
        .gene(Gene::numeric("x", 0.0, 1.0, false))
        .build();

    let factory = Arc::new(MockFactory::new());
    let result = Optimizer::new(config, factory.clone());

    assert!(matches!(result, Err(OptimizerError::Breeding(_))));
    assert!(factory.tracker.trials().is_empty());
}

#[test]
fn test_fatal_checkpoint_error_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    fs::write(&blocker, "occupied").unwrap();

    let mut config = scenario();
    config.set_checkpoint_dir(Some(blocker.join("nested")));
    config.set_log_level(LogLevel::None);

    let factory = Arc::new(MockFactory::new());
    let mut optimizer = Optimizer::new(config, factory.clone()).unwrap();
    let err = optimizer.run().unwrap_err();

    match err {
        OptimizerError::FatalRun { generation, .. } => assert_eq!(generation, 0),
        other => panic!("Expected FatalRun, got {:?}", other),
    }
    assert!(matches!(optimizer.state(), OptimizerState::Failed(_)));

    // Generation 1 was never attempted.
    assert_eq!(factory.tracker.trials().len(), 4);
    assert_eq!(optimizer.scheduler().in_flight(), 0);
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let run = || {
        let mut config = scenario();
        config.set_log_level(LogLevel::None);
        let mut optimizer = Optimizer::new(config, Arc::new(MockFactory::new())).unwrap();
        optimizer.run().unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.best.genome, second.best.genome);
    for (a, b) in first.checkpoints.iter().zip(&second.checkpoints) {
        let configs = |c: &Checkpoint| {
            c.individuals
                .iter()
                .map(|e| e.config.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(configs(a), configs(b));
    }
}

#[test]
fn test_stop_handle_reaches_running_trials() {
    let factory = Arc::new(MockFactory::new().with_delay(Duration::from_millis(300)));
    let mut config = scenario();
    config.set_generation_count(1);
    config.set_log_level(LogLevel::None);

    let mut optimizer = Optimizer::new(config, factory.clone()).unwrap();
    let handle = optimizer.stop_handle();

    let stopper = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            let requested = handle.stop_all();
            if requested > 0 {
                return requested;
            }
            thread::sleep(Duration::from_millis(5));
        }
        0
    });

    let result = optimizer.run().unwrap();
    let requested = stopper.join().unwrap();

    assert!(requested >= 1);
    // Every trial still stops itself once; the handle adds one per engine it reached.
    assert_eq!(factory.tracker.stops(), 4 + requested);
    assert_eq!(factory.tracker.trials().len(), 4);
    assert_eq!(result.checkpoints[0].individuals.len(), 4);
    assert_eq!(optimizer.stop_handle().in_flight(), 0);
    assert_eq!(optimizer.state(), &OptimizerState::Done);
}
