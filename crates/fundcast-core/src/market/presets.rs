use serde::{Deserialize, Serialize};

use crate::market::model::{MnaOutcome, StageParams, Transition};
use crate::types::Stage;

/// Which preset transition table a request starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketScenario {
    #[serde(rename = "BELOW_MARKET")]
    BelowMarket,
    #[default]
    #[serde(rename = "MARKET")]
    Market,
    #[serde(rename = "ABOVE_MARKET")]
    AboveMarket,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 3] = [
        MarketScenario::BelowMarket,
        MarketScenario::Market,
        MarketScenario::AboveMarket,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MarketScenario::BelowMarket => "BELOW_MARKET",
            MarketScenario::Market => "MARKET",
            MarketScenario::AboveMarket => "ABOVE_MARKET",
        }
    }
}

/// Post-money valuations, $M, in canonical stage order.
pub const STAGE_VALUATIONS_M: [f64; Stage::COUNT] = [
    15.0, 30.0, 70.0, 200.0, 500.0, 750.0, 1500.0, 5000.0, 10000.0,
];

/// Dilution suffered on promotion into each stage. Entry into the earliest
/// stage dilutes nothing.
pub const STAGE_DILUTION: [f64; Stage::COUNT] =
    [0.0, 0.20, 0.22, 0.20, 0.15, 0.10, 0.08, 0.08, 0.08];

/// Baseline MARKET transitions `(p_promote, p_fail, p_mna)` per stage.
const MARKET_TRANSITIONS: [(f64, f64, f64); Stage::COUNT] = [
    (0.50, 0.35, 0.15), // Pre-seed
    (0.50, 0.35, 0.15), // Seed
    (0.50, 0.30, 0.20), // Series A
    (0.50, 0.25, 0.25), // Series B
    (0.50, 0.25, 0.25), // Series C
    (0.50, 0.25, 0.25), // Series D
    (0.40, 0.30, 0.30), // Series E
    (0.30, 0.30, 0.30), // Series F
    (0.00, 0.00, 0.00), // Series G (terminal)
];

/// Probability mass moved between promote and fail to derive the bear and
/// bull presets from the baseline.
const SCENARIO_SHIFT: f64 = 0.10;

/// Shared M&A outcome mixture.
const MNA_MIXTURE: [MnaOutcome; 4] = [
    MnaOutcome {
        weight: 0.01,
        multiplier: 10.0,
    },
    MnaOutcome {
        weight: 0.05,
        multiplier: 5.0,
    },
    MnaOutcome {
        weight: 0.60,
        multiplier: 1.0,
    },
    MnaOutcome {
        weight: 0.34,
        multiplier: 0.1,
    },
];

/// Per-stage parameters for a preset scenario.
pub fn stage_params(scenario: MarketScenario) -> [StageParams; Stage::COUNT] {
    let mut params = [StageParams {
        valuation_m: 0.0,
        dilution: 0.0,
        transition: Transition::ZERO,
    }; Stage::COUNT];

    for (i, entry) in params.iter_mut().enumerate() {
        let (p_promote, p_fail, p_mna) = MARKET_TRANSITIONS[i];
        let (p_promote, p_fail) = match scenario {
            MarketScenario::Market => (p_promote, p_fail),
            MarketScenario::BelowMarket => {
                let shift = SCENARIO_SHIFT.min(p_promote);
                (p_promote - shift, p_fail + shift)
            }
            MarketScenario::AboveMarket => {
                let shift = SCENARIO_SHIFT.min(p_fail);
                (p_promote + shift, p_fail - shift)
            }
        };
        *entry = StageParams {
            valuation_m: STAGE_VALUATIONS_M[i],
            dilution: STAGE_DILUTION[i],
            transition: Transition {
                p_promote,
                p_fail,
                p_mna,
            },
        };
    }
    params
}

/// The M&A mixture shared by every preset.
pub fn mna_mixture() -> Vec<MnaOutcome> {
    MNA_MIXTURE.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::model::MarketModel;

    #[test]
    fn test_every_preset_passes_validation() {
        for scenario in MarketScenario::ALL {
            let model = MarketModel::new(
                scenario,
                stage_params(scenario).to_vec(),
                mna_mixture(),
            );
            assert!(model.is_ok(), "{scenario:?} preset failed validation");
        }
    }

    #[test]
    fn test_terminal_stage_is_inert_in_every_preset() {
        for scenario in MarketScenario::ALL {
            let params = stage_params(scenario);
            assert_eq!(params[Stage::COUNT - 1].transition, Transition::ZERO);
        }
    }

    #[test]
    fn test_below_market_fails_more_and_promotes_less() {
        let market = stage_params(MarketScenario::Market);
        let below = stage_params(MarketScenario::BelowMarket);
        for (m, b) in market.iter().zip(&below).take(Stage::COUNT - 1) {
            assert!(b.transition.p_promote < m.transition.p_promote);
            assert!(b.transition.p_fail > m.transition.p_fail);
            assert_eq!(b.transition.p_mna, m.transition.p_mna);
        }
    }

    #[test]
    fn test_above_market_promotes_more() {
        let market = stage_params(MarketScenario::Market);
        let above = stage_params(MarketScenario::AboveMarket);
        for (m, a) in market.iter().zip(&above).take(Stage::COUNT - 1) {
            assert!(a.transition.p_promote > m.transition.p_promote);
            assert!(a.transition.p_fail < m.transition.p_fail);
        }
    }

    #[test]
    fn test_scenario_serde_uses_screaming_names() {
        let json = serde_json::to_string(&MarketScenario::BelowMarket).unwrap();
        assert_eq!(json, "\"BELOW_MARKET\"");
        let back: MarketScenario = serde_json::from_str("\"ABOVE_MARKET\"").unwrap();
        assert_eq!(back, MarketScenario::AboveMarket);
    }

    #[test]
    fn test_mixture_expected_multiplier_is_near_one() {
        let mean: f64 = mna_mixture()
            .iter()
            .map(|o| o.weight * o.multiplier)
            .sum();
        assert!((mean - 0.984).abs() < 1e-12, "mean={mean}");
    }
}
