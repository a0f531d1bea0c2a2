pub mod model;
pub mod presets;

pub use model::{MarketModel, MnaOutcome, StageParams, Transition};
pub use presets::MarketScenario;
