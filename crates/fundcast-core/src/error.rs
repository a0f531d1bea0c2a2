use serde::Serialize;
use thiserror::Error;

/// Request-time validation failures. Fatal to the request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} out of range: {reason}")]
    FieldRange { field: String, reason: String },

    #[error("stage allocation percentages must sum to 100, got {got}")]
    AllocationSum { got: u32 },

    #[error("unknown stage '{name}' at {path}")]
    UnknownStage { name: String, path: String },

    #[error("invalid transition probabilities at {path}: {reason}")]
    Probabilities { path: String, reason: String },

    #[error("invalid M&A outcome mixture: {reason}")]
    MnaMixture { reason: String },
}

/// Execution-time failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("run cancelled after {completed_scenarios} completed scenarios")]
    Cancelled { completed_scenarios: usize },

    #[error("fund construction yields zero whole checks at every stage")]
    NoDeployableCapital,
}

/// Unified error type for the public entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl EngineError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Config(ConfigError::FieldRange { .. }) => "config.field_range",
            EngineError::Config(ConfigError::AllocationSum { .. }) => "config.allocation_sum",
            EngineError::Config(ConfigError::UnknownStage { .. }) => "config.unknown_stage",
            EngineError::Config(ConfigError::Probabilities { .. }) => "config.probabilities",
            EngineError::Config(ConfigError::MnaMixture { .. }) => "config.mna_mixture",
            EngineError::Runtime(RuntimeError::Cancelled { .. }) => "runtime.cancelled",
            EngineError::Runtime(RuntimeError::NoDeployableCapital) => {
                "runtime.no_deployable_capital"
            }
        }
    }

    /// Path into the offending request field, where one exists.
    pub fn path(&self) -> Option<&str> {
        match self {
            EngineError::Config(ConfigError::FieldRange { field, .. }) => Some(field),
            EngineError::Config(ConfigError::UnknownStage { path, .. }) => Some(path),
            EngineError::Config(ConfigError::Probabilities { path, .. }) => Some(path),
            EngineError::Config(ConfigError::AllocationSum { .. }) => Some("stage_allocations"),
            EngineError::Config(ConfigError::MnaMixture { .. }) => Some("m_and_a_outcomes"),
            EngineError::Runtime(_) => None,
        }
    }
}

/// Serializable error shape handed to transports.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<&EngineError> for ErrorEnvelope {
    fn from(err: &EngineError) -> Self {
        ErrorEnvelope {
            kind: err.kind().to_string(),
            message: err.to_string(),
            path: err.path().map(str::to_string),
        }
    }
}
