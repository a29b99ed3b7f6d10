//! Parallel execution of independent seeded runs
//!
//! A single run is strictly sequential, but runs with different seeds share
//! nothing mutable: each one builds its own `IncidentSimulation` (state and
//! generator) and only reads the shared `Arc<SimulationInputs>`.
//!
//! # Example
//!
//! ```rust
//! use incident_sim::parallel::{BatchRunner, simple_progress_reporter};
//! use incident_sim::{Calibration, SimulationConfig, SimulationInputs};
//! use std::sync::Arc;
//!
//! let inputs = Arc::new(SimulationInputs::numbered(10, Arc::new(Calibration::baseline())));
//! let config = SimulationConfig::calibration(30, 0);
//!
//! let results = BatchRunner::new(config, inputs, vec![42, 123, 456])
//!     .progress(simple_progress_reporter(1))
//!     .num_threads(2)
//!     .run();
//!
//! assert_eq!(results.len(), 3);
//! assert!(results.iter().all(|r| r.is_ok()));
//! ```
//!
//! # Determinism
//!
//! Results come back in seed order, and a given (config, inputs, seed)
//! always produces the same stats regardless of thread count.
//!
//! # Error Handling
//!
//! A run that fails to build (invalid config or inputs) or panics is
//! returned as `Err(String)`; the other runs continue.

use crate::SimulationStats;
use crate::config::SimulationConfig;
use crate::simulation::{IncidentSimulation, SimulationInputs};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

pub struct BatchRunner {
    config: SimulationConfig,
    inputs: Arc<SimulationInputs>,
    seeds: Vec<u64>,
    num_threads: Option<usize>,
    progress_callback: Option<ProgressCallback>,
}

impl BatchRunner {
    /// One run of `config` per seed, each for `config.num_days` days
    pub fn new(config: SimulationConfig, inputs: Arc<SimulationInputs>, seeds: Vec<u64>) -> Self {
        BatchRunner {
            config,
            inputs,
            seeds,
            num_threads: None,
            progress_callback: None,
        }
    }

    /// Set number of threads (defaults to rayon's global pool)
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Called with `(completed, total)` after each run finishes
    pub fn progress<P>(mut self, callback: P) -> Self
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    fn run_one(&self, seed: u64) -> Result<SimulationStats, String> {
        let config = self.config.clone().with_seed(seed);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            IncidentSimulation::new(config, Arc::clone(&self.inputs))
                .map(|mut sim| sim.run_to_end())
                .map_err(|e| e.to_string())
        }));

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }),
        }
    }

    /// Execute every seed and return the results in seed order
    pub fn run(self) -> Vec<Result<SimulationStats, String>> {
        let total = self.seeds.len();
        let progress_counter = AtomicUsize::new(0);

        let pool = self.num_threads.and_then(|n| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| log::warn!("falling back to the global pool: {e}"))
                .ok()
        });

        let execute = || {
            self.seeds
                .par_iter()
                .map(|&seed| {
                    let result = self.run_one(seed);

                    let completed = progress_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(callback) = &self.progress_callback {
                        callback(completed, total);
                    }
                    if let Err(e) = &result {
                        log::warn!("run with seed {seed} failed: {e}");
                    }
                    result
                })
                .collect()
        };

        match pool {
            Some(pool) => pool.install(execute),
            None => execute(),
        }
    }

    /// Run seeds in chunks of `batch_size` to bound the number of live
    /// simulation states
    pub fn run_batched(self, batch_size: usize) -> Vec<Result<SimulationStats, String>> {
        let batch_size = batch_size.max(1);
        let mut all_results = Vec::with_capacity(self.seeds.len());

        for chunk in self.seeds.chunks(batch_size) {
            let mut batch = BatchRunner::new(
                self.config.clone(),
                Arc::clone(&self.inputs),
                chunk.to_vec(),
            );
            batch.num_threads = self.num_threads;
            all_results.extend(batch.run());
        }

        all_results
    }
}

/// Run `config` once per seed on the global pool
pub fn run_seeds(
    config: &SimulationConfig,
    inputs: Arc<SimulationInputs>,
    seeds: &[u64],
) -> Vec<Result<SimulationStats, String>> {
    BatchRunner::new(config.clone(), inputs, seeds.to_vec()).run()
}

/// Progress callback logging every `interval` completed runs
pub fn simple_progress_reporter(interval: usize) -> impl Fn(usize, usize) + Send + Sync {
    let interval = interval.max(1);
    move |completed, total| {
        if completed % interval == 0 || completed == total {
            log::info!("completed {completed}/{total} runs");
        }
    }
}
