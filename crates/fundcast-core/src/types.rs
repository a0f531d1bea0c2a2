use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Config-time monetary values, in $M. Wraps Decimal so fee drag, pool
/// carve-outs, and whole-check division are exact.
pub type Money = Decimal;

/// Funding stages in canonical order. Index 0 is the earliest stage; the
/// last stage is terminal and never promotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "Pre-seed")]
    PreSeed,
    Seed,
    #[serde(rename = "Series A")]
    SeriesA,
    #[serde(rename = "Series B")]
    SeriesB,
    #[serde(rename = "Series C")]
    SeriesC,
    #[serde(rename = "Series D")]
    SeriesD,
    #[serde(rename = "Series E")]
    SeriesE,
    #[serde(rename = "Series F")]
    SeriesF,
    #[serde(rename = "Series G")]
    SeriesG,
}

impl Stage {
    pub const COUNT: usize = 9;

    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::PreSeed,
        Stage::Seed,
        Stage::SeriesA,
        Stage::SeriesB,
        Stage::SeriesC,
        Stage::SeriesD,
        Stage::SeriesE,
        Stage::SeriesF,
        Stage::SeriesG,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Stage::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::PreSeed => "Pre-seed",
            Stage::Seed => "Seed",
            Stage::SeriesA => "Series A",
            Stage::SeriesB => "Series B",
            Stage::SeriesC => "Series C",
            Stage::SeriesD => "Series D",
            Stage::SeriesE => "Series E",
            Stage::SeriesF => "Series F",
            Stage::SeriesG => "Series G",
        }
    }

    pub fn from_name(name: &str) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|s| s.name() == name)
    }

    /// The next stage up, or None at the terminal stage.
    pub fn next(self) -> Option<Stage> {
        Stage::from_index(self.index() + 1)
    }

    pub fn is_terminal(self) -> bool {
        self.index() == Stage::COUNT - 1
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Final outcome class of a portfolio position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Alive,
    Acquired,
    Failed,
}

/// Standard computation output envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata attached to every computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Wrap a simulation result with metadata. Simulation arithmetic is IEEE 754
/// double precision; config-time capital accounting is exact decimal.
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
