//! Monte Carlo engine for venture fund construction analysis.
//!
//! The caller submits one [`SimulationRequest`]; the engine validates it into
//! a [`config::FundConfig`], runs N independent scenarios over P periods, and
//! reduces the observations into a [`simulation::FundReport`]. The contract
//! is pure request → report: transport, persistence, and rendering live with
//! the caller.

pub mod config;
pub mod error;
pub mod market;
pub mod simulation;
pub mod types;

use std::time::Instant;

pub use config::{FundConfig, SimulationRequest};
pub use error::{ConfigError, EngineError, ErrorEnvelope, RuntimeError};
pub use simulation::{FundReport, RunOptions, ScenarioEngine};
pub use types::{ComputationOutput, Stage};

pub type CoreResult<T> = Result<T, EngineError>;

/// Validate, simulate, and aggregate one request.
///
/// Deterministic for a fixed `(request, seed)` at any parallelization degree.
pub fn run_fund_simulation(
    request: &SimulationRequest,
) -> CoreResult<ComputationOutput<FundReport>> {
    run_fund_simulation_with_options(request, &RunOptions::default())
}

/// As [`run_fund_simulation`], with cooperative cancellation and a wall-clock
/// budget consulted between scenarios.
pub fn run_fund_simulation_with_options(
    request: &SimulationRequest,
    options: &RunOptions,
) -> CoreResult<ComputationOutput<FundReport>> {
    let start = Instant::now();
    let config = FundConfig::new(request)?;
    let results = ScenarioEngine::run_with_options(&config, options)?;
    let report = simulation::summarize(&results, &config)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(types::with_metadata(
        "Venture Fund Construction Monte Carlo",
        &config.assumptions(),
        config.warnings().to_vec(),
        elapsed,
        report,
    ))
}

/// Validate a request and report the derived fund construction without
/// simulating anything.
pub fn validate_fund_construction(
    request: &SimulationRequest,
) -> CoreResult<ComputationOutput<config::FundConstruction>> {
    let start = Instant::now();
    let config = FundConfig::new(request)?;
    let construction = config.construction();
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(types::with_metadata(
        "Venture Fund Construction Validation",
        &config.assumptions(),
        config.warnings().to_vec(),
        elapsed,
        construction,
    ))
}
