use clap::Args;
use serde_json::{json, Value};
use std::fs;
use std::io::{self, Read};

use fundcast_core::market::{MarketModel, MarketScenario};
use fundcast_core::types::Stage;
use fundcast_core::{run_fund_simulation, validate_fund_construction, SimulationRequest};

use crate::CliError;

/// Arguments for the full Monte Carlo simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to a JSON request file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for request validation
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to a JSON request file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the preset table printer
#[derive(Args)]
pub struct PresetsArgs {
    /// Preset name: MARKET, BELOW_MARKET, or ABOVE_MARKET
    #[arg(long, default_value = "MARKET")]
    pub scenario: String,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, CliError> {
    let request = read_request(args.input.as_deref())?;
    let output = run_fund_simulation(&request)?;
    Ok(serde_json::to_value(output)?)
}

pub fn run_validate(args: ValidateArgs) -> Result<Value, CliError> {
    let request = read_request(args.input.as_deref())?;
    let output = validate_fund_construction(&request)?;
    Ok(serde_json::to_value(output)?)
}

pub fn run_presets(args: PresetsArgs) -> Result<Value, CliError> {
    let scenario = MarketScenario::ALL
        .into_iter()
        .find(|s| s.label() == args.scenario)
        .ok_or_else(|| {
            CliError::Other(format!(
                "unknown scenario '{}'; expected MARKET, BELOW_MARKET, or ABOVE_MARKET",
                args.scenario
            ))
        })?;
    let model = MarketModel::from_preset(scenario);

    let stages: Vec<Value> = Stage::ALL
        .iter()
        .map(|&stage| {
            let transition = model.transition(stage);
            json!({
                "stage": stage.name(),
                "valuation_m": model.valuation(stage),
                "dilution": model.dilution(stage),
                "p_promote": transition.p_promote,
                "p_fail": transition.p_fail,
                "p_mna": transition.p_mna,
            })
        })
        .collect();

    Ok(json!({
        "scenario": scenario.label(),
        "stages": stages,
        "m_and_a_outcomes": model.mna_mixture(),
    }))
}

/// Resolve the fund request for a command: an explicit `--input` path, else
/// piped stdin JSON. Interactive use with neither is an error.
fn read_request(path: Option<&str>) -> Result<SimulationRequest, CliError> {
    // Only touch stdin when no file was named, so `--input` never blocks on
    // an open pipe.
    let piped = if path.is_none() { piped_stdin()? } else { None };
    request_from_sources(path, piped)
}

/// Pure precedence rule: a named file always wins over piped data.
fn request_from_sources(
    path: Option<&str>,
    piped: Option<Value>,
) -> Result<SimulationRequest, CliError> {
    if let Some(path) = path {
        return read_request_file(path);
    }
    if let Some(value) = piped {
        return Ok(serde_json::from_value(value)?);
    }
    Err(CliError::Other(
        "--input <request.json> or piped stdin JSON required".into(),
    ))
}

fn read_request_file(path: &str) -> Result<SimulationRequest, CliError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| CliError::Other(format!("failed to read request '{path}': {e}")))?;
    serde_json::from_str(&contents)
        .map_err(|e| CliError::Other(format!("failed to parse request '{path}': {e}")))
}

/// Piped JSON on stdin. None when stdin is an interactive TTY or the pipe
/// is empty.
fn piped_stdin() -> Result<Option<Value>, CliError> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| CliError::Other(format!("failed to read stdin: {e}")))?;

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_request_json() -> Value {
        json!({
            "fund_size_m": 100.0,
            "pro_rata_max_valuation": 500.0,
            "stage_allocations": [{"stage": "Seed", "pct": 100, "check_size": 2.0}],
            "num_iterations": 1000
        })
    }

    #[test]
    fn test_named_file_wins_over_piped_stdin() {
        let path = std::env::temp_dir().join("fundcast-request-precedence.json");
        let mut file_request = minimal_request_json();
        file_request["fund_size_m"] = json!(75.0);
        std::fs::write(&path, serde_json::to_string(&file_request).unwrap()).unwrap();

        let request =
            request_from_sources(path.to_str(), Some(minimal_request_json())).unwrap();
        assert_eq!(request.fund_size_m, 75.0);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_piped_stdin_used_without_a_file() {
        let request = request_from_sources(None, Some(minimal_request_json())).unwrap();
        assert_eq!(request.fund_size_m, 100.0);
        assert_eq!(request.num_iterations, 1000);
    }

    #[test]
    fn test_interactive_tty_with_no_input_is_an_error() {
        // On a TTY piped_stdin yields None; with no file either, the command
        // has nothing to run.
        let err = request_from_sources(None, None).unwrap_err();
        assert!(err.to_string().contains("--input"));
    }

    #[test]
    fn test_missing_file_reports_its_path() {
        let err =
            request_from_sources(Some("/nonexistent/fundcast-request.json"), None).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fundcast-request.json"));
    }

    #[test]
    fn test_unknown_request_keys_rejected_from_stdin_value() {
        let mut bad = minimal_request_json();
        bad["irr_hurdle"] = json!(0.08);
        assert!(request_from_sources(None, Some(bad)).is_err());
    }
}
