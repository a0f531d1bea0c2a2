pub mod aggregate;
pub mod company;
pub mod engine;
pub mod fund;

pub use aggregate::{summarize, FundReport, PercentileSummary, PortfolioBreakdown};
pub use company::{Company, CompanyState};
pub use engine::{RunOptions, ScenarioEngine};
pub use fund::{Fund, ScenarioResult, SegmentObservation};
