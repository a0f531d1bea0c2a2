use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "parallel")]
use std::sync::atomic::AtomicUsize;

use crate::config::FundConfig;
use crate::error::RuntimeError;
use crate::simulation::fund::{Fund, ScenarioResult};

/// Cooperative controls consulted between scenarios. Execution inside one
/// scenario always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub cancel: Option<Arc<AtomicBool>>,
    pub time_budget: Option<Duration>,
}

/// Runs N independent scenarios. Each scenario owns an RNG stream keyed by
/// its index, so the full result set is bit-identical for a given
/// `(config, seed)` at any parallelization degree.
pub struct ScenarioEngine;

impl ScenarioEngine {
    pub fn run(config: &FundConfig) -> Result<Vec<ScenarioResult>, RuntimeError> {
        Self::run_with_options(config, &RunOptions::default())
    }

    pub fn run_with_options(
        config: &FundConfig,
        options: &RunOptions,
    ) -> Result<Vec<ScenarioResult>, RuntimeError> {
        if config.total_initial_companies() == 0 {
            return Err(RuntimeError::NoDeployableCapital);
        }

        let deadline = options.time_budget.map(|budget| Instant::now() + budget);
        let cancel = options.cancel.clone();
        let stopped = move || {
            cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
                || deadline.is_some_and(|d| Instant::now() >= d)
        };

        let n = config.num_iterations() as usize;

        #[cfg(feature = "parallel")]
        {
            let completed = AtomicUsize::new(0);
            let slots: Vec<Option<ScenarioResult>> = (0..n)
                .into_par_iter()
                .map(|index| {
                    if stopped() {
                        return None;
                    }
                    let result = run_scenario(config, index as u64);
                    completed.fetch_add(1, Ordering::Relaxed);
                    Some(result)
                })
                .collect();

            if slots.iter().any(Option::is_none) {
                return Err(RuntimeError::Cancelled {
                    completed_scenarios: completed.load(Ordering::Relaxed),
                });
            }
            Ok(slots.into_iter().flatten().collect())
        }

        #[cfg(not(feature = "parallel"))]
        {
            let mut results = Vec::with_capacity(n);
            for index in 0..n {
                if stopped() {
                    return Err(RuntimeError::Cancelled {
                        completed_scenarios: results.len(),
                    });
                }
                results.push(run_scenario(config, index as u64));
            }
            Ok(results)
        }
    }
}

/// One scenario: all checks written at t=0, then the fixed period-outer,
/// company-inner loop. The order is observable through the RNG stream.
fn run_scenario(config: &FundConfig, scenario_index: u64) -> ScenarioResult {
    let mut rng = StdRng::seed_from_u64(stream_seed(config.seed(), scenario_index));
    let market = config.effective_market();
    let mut fund = Fund::initialize(config);
    for _ in 0..config.num_periods() {
        fund.step_period(market, &mut rng);
    }
    fund.close(config)
}

/// SplitMix64 finalizer. Decorrelates per-scenario streams from a single
/// request seed without any shared RNG state.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

pub(crate) fn stream_seed(seed: u64, scenario_index: u64) -> u64 {
    splitmix64(seed ^ splitmix64(scenario_index))
}
