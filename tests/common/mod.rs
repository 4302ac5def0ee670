#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use genoptim::{
    engine::CURRENT_PROFIT, EngineFactory, EngineStatus, Environment, OptimizerError, Portfolio,
    Result, SimulationEngine, Trade, TrialSpec,
};

pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn environment() -> Environment {
    Environment::new(date(2023, 1, 1), date(2023, 3, 1))
}

/// Shared bookkeeping across every engine a factory creates.
#[derive(Default)]
pub struct Tracker {
    active: AtomicUsize,
    peak: AtomicUsize,
    stops: AtomicUsize,
    trials: Mutex<Vec<TrialSpec>>,
}

impl Tracker {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn trials(&self) -> Vec<TrialSpec> {
        self.trials.lock().unwrap().clone()
    }

    pub fn trials_for(&self, name: &str) -> Vec<TrialSpec> {
        self.trials()
            .into_iter()
            .filter(|spec| spec.name == name)
            .collect()
    }
}

/// An engine whose results are a pure function of the genome's `x` gene.
pub struct MockEngine {
    spec: TrialSpec,
    delay: Duration,
    fail_on_start: bool,
    status: Mutex<EngineStatus>,
    tracker: Arc<Tracker>,
}

impl MockEngine {
    fn x(&self) -> f64 {
        self.spec
            .genome
            .get("x")
            .and_then(|v| v.as_number())
            .unwrap_or(1.0)
    }
}

impl SimulationEngine for MockEngine {
    fn initialize(&self) -> Result<()> {
        *self.status.lock().unwrap() = EngineStatus::Initialized;
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if self.fail_on_start {
            *self.status.lock().unwrap() = EngineStatus::Faulted;
            return Err(OptimizerError::Simulation(format!(
                "{} ran out of candles",
                self.spec.name
            )));
        }

        *self.status.lock().unwrap() = EngineStatus::Running;
        let now = self.tracker.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.tracker.stops.fetch_add(1, Ordering::SeqCst);
        *self.status.lock().unwrap() = EngineStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> EngineStatus {
        *self.status.lock().unwrap()
    }

    fn portfolio(&self) -> Portfolio {
        let x = self.x();
        let mut portfolio = Portfolio {
            trade_history: vec![
                Trade::new(0.01 * x),
                Trade::new(-0.004),
                Trade::new(0.003 * x),
            ],
            ..Default::default()
        };
        portfolio
            .indicators
            .insert(CURRENT_PROFIT.to_string(), (x + 1.0) / 100.0);
        portfolio
    }
}

pub struct MockFactory {
    pub tracker: Arc<Tracker>,
    delay: Duration,
    failing: HashSet<String>,
    panicking: HashSet<String>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            tracker: Arc::new(Tracker::default()),
            delay: Duration::from_millis(1),
            failing: HashSet::new(),
            panicking: HashSet::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn panicking(mut self, name: &str) -> Self {
        self.panicking.insert(name.to_string());
        self
    }
}

impl EngineFactory for MockFactory {
    fn create(&self, spec: &TrialSpec) -> Result<Arc<dyn SimulationEngine>> {
        self.tracker.trials.lock().unwrap().push(spec.clone());

        if self.panicking.contains(&spec.name) {
            panic!("engine for {} blew up", spec.name);
        }

        Ok(Arc::new(MockEngine {
            spec: spec.clone(),
            delay: self.delay,
            fail_on_start: self.failing.contains(&spec.name),
            status: Mutex::new(EngineStatus::Created),
            tracker: Arc::clone(&self.tracker),
        }))
    }
}
