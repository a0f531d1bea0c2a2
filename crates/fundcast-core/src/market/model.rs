use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::market::presets::MarketScenario;
use crate::types::Stage;

/// Tolerance for transition triples summing above 1.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// Tolerance for M&A mixture weights summing away from 1.
pub const MIXTURE_WEIGHT_TOLERANCE: f64 = 1e-6;

/// Per-period transition distribution for one stage. Residual mass
/// (`1 - p_promote - p_fail - p_mna`) means the company holds in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transition {
    pub p_promote: f64,
    pub p_fail: f64,
    pub p_mna: f64,
}

impl Transition {
    pub const ZERO: Transition = Transition {
        p_promote: 0.0,
        p_fail: 0.0,
        p_mna: 0.0,
    };

    pub fn sum(&self) -> f64 {
        self.p_promote + self.p_fail + self.p_mna
    }

    fn validate(&self, path: &str) -> Result<(), ConfigError> {
        let components = [
            ("p_promote", self.p_promote),
            ("p_fail", self.p_fail),
            ("p_mna", self.p_mna),
        ];
        for (name, value) in components {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probabilities {
                    path: path.to_string(),
                    reason: format!("{name} must be in [0, 1], got {value}"),
                });
            }
        }
        if self.sum() > 1.0 + PROBABILITY_EPSILON {
            return Err(ConfigError::Probabilities {
                path: path.to_string(),
                reason: format!("components sum to {} which exceeds 1", self.sum()),
            });
        }
        Ok(())
    }
}

/// One branch of the M&A outcome mixture: with probability `weight` the exit
/// valuation is `current_valuation * multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MnaOutcome {
    pub weight: f64,
    pub multiplier: f64,
}

/// Immutable per-stage market parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageParams {
    /// Post-money valuation of a round at this stage, $M.
    pub valuation_m: f64,
    /// Dilution suffered on promotion *into* this stage.
    pub dilution: f64,
    pub transition: Transition,
}

/// Validated market assumptions: one `StageParams` per canonical stage plus
/// the shared M&A outcome mixture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketModel {
    scenario: MarketScenario,
    stages: Vec<StageParams>,
    mna_mixture: Vec<MnaOutcome>,
}

impl MarketModel {
    /// Validate and construct. `stages` must follow the canonical stage order.
    pub fn new(
        scenario: MarketScenario,
        stages: Vec<StageParams>,
        mna_mixture: Vec<MnaOutcome>,
    ) -> Result<MarketModel, ConfigError> {
        debug_assert_eq!(stages.len(), Stage::COUNT);

        for (stage, params) in Stage::ALL.iter().zip(&stages) {
            if !params.valuation_m.is_finite() || params.valuation_m <= 0.0 {
                return Err(ConfigError::FieldRange {
                    field: format!("stage_valuations.{stage}"),
                    reason: format!("valuation must be positive, got {}", params.valuation_m),
                });
            }
            if !(0.0..1.0).contains(&params.dilution) {
                return Err(ConfigError::FieldRange {
                    field: format!("dilution.{stage}"),
                    reason: format!("dilution must be in [0, 1), got {}", params.dilution),
                });
            }
            params
                .transition
                .validate(&format!("graduation_rates.{stage}"))?;
        }

        // Terminal stage never promotes; the engine relies on this.
        let terminal = &stages[Stage::COUNT - 1];
        if terminal.transition.p_promote != 0.0 {
            return Err(ConfigError::Probabilities {
                path: format!("graduation_rates.{}", Stage::SeriesG),
                reason: "terminal stage must have p_promote = 0".to_string(),
            });
        }

        if mna_mixture.is_empty() {
            return Err(ConfigError::MnaMixture {
                reason: "mixture must contain at least one outcome".to_string(),
            });
        }
        let mut weight_sum = 0.0;
        for (i, outcome) in mna_mixture.iter().enumerate() {
            if !outcome.weight.is_finite() || outcome.weight < 0.0 {
                return Err(ConfigError::MnaMixture {
                    reason: format!("weight at index {i} must be non-negative"),
                });
            }
            if !outcome.multiplier.is_finite() || outcome.multiplier < 0.0 {
                return Err(ConfigError::MnaMixture {
                    reason: format!("multiplier at index {i} must be non-negative"),
                });
            }
            weight_sum += outcome.weight;
        }
        if (weight_sum - 1.0).abs() > MIXTURE_WEIGHT_TOLERANCE {
            return Err(ConfigError::MnaMixture {
                reason: format!("weights must sum to 1, got {weight_sum}"),
            });
        }

        Ok(MarketModel {
            scenario,
            stages,
            mna_mixture,
        })
    }

    /// Construct from a preset table. The tables are compile-time constants
    /// covered by validation tests, so this cannot fail.
    pub fn from_preset(scenario: MarketScenario) -> MarketModel {
        MarketModel {
            scenario,
            stages: crate::market::presets::stage_params(scenario).to_vec(),
            mna_mixture: crate::market::presets::mna_mixture(),
        }
    }

    pub fn scenario(&self) -> MarketScenario {
        self.scenario
    }

    pub fn valuation(&self, stage: Stage) -> f64 {
        self.stages[stage.index()].valuation_m
    }

    pub fn dilution(&self, stage: Stage) -> f64 {
        self.stages[stage.index()].dilution
    }

    pub fn transition(&self, stage: Stage) -> Transition {
        self.stages[stage.index()].transition
    }

    pub fn stage_params(&self) -> &[StageParams] {
        &self.stages
    }

    pub fn mna_mixture(&self) -> &[MnaOutcome] {
        &self.mna_mixture
    }

    /// Draw an exit multiplier from the M&A mixture: walk the cumulative
    /// weights with a single uniform draw, tie-breaking toward lower index.
    pub fn sample_mna_multiplier(&self, rng: &mut StdRng) -> f64 {
        let u: f64 = rng.gen();
        let mut cumulative = 0.0;
        for outcome in &self.mna_mixture {
            cumulative += outcome.weight;
            if u < cumulative {
                return outcome.multiplier;
            }
        }
        // u landed in the float slop above the cumulative total.
        self.mna_mixture
            .last()
            .map(|o| o.multiplier)
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::presets;
    use rand::SeedableRng;

    fn market() -> MarketModel {
        MarketModel::from_preset(MarketScenario::Market)
    }

    #[test]
    fn test_lookup_matches_canonical_tables() {
        let m = market();
        assert_eq!(m.valuation(Stage::PreSeed), 15.0);
        assert_eq!(m.valuation(Stage::SeriesG), 10_000.0);
        assert_eq!(m.dilution(Stage::PreSeed), 0.0);
        assert_eq!(m.dilution(Stage::SeriesA), 0.22);
        let t = m.transition(Stage::Seed);
        assert_eq!((t.p_promote, t.p_fail, t.p_mna), (0.50, 0.35, 0.15));
    }

    #[test]
    fn test_terminal_stage_has_no_promotion_mass() {
        let t = market().transition(Stage::SeriesG);
        assert_eq!(t, Transition::ZERO);
    }

    #[test]
    fn test_negative_probability_rejected() {
        let mut stages = presets::stage_params(MarketScenario::Market).to_vec();
        stages[1].transition.p_fail = -0.1;
        let err = MarketModel::new(MarketScenario::Market, stages, presets::mna_mixture())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Probabilities { ref path, .. } if path.contains("Seed")));
    }

    #[test]
    fn test_oversubscribed_triple_rejected() {
        let mut stages = presets::stage_params(MarketScenario::Market).to_vec();
        stages[2].transition = Transition {
            p_promote: 0.6,
            p_fail: 0.3,
            p_mna: 0.2,
        };
        let err = MarketModel::new(MarketScenario::Market, stages, presets::mna_mixture())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Probabilities { .. }));
    }

    #[test]
    fn test_triple_summing_exactly_to_one_accepted() {
        let mut stages = presets::stage_params(MarketScenario::Market).to_vec();
        stages[0].transition = Transition {
            p_promote: 0.5,
            p_fail: 0.35,
            p_mna: 0.15,
        };
        assert!(MarketModel::new(MarketScenario::Market, stages, presets::mna_mixture()).is_ok());
    }

    #[test]
    fn test_terminal_promotion_rejected() {
        let mut stages = presets::stage_params(MarketScenario::Market).to_vec();
        stages[Stage::COUNT - 1].transition.p_promote = 0.1;
        let err = MarketModel::new(MarketScenario::Market, stages, presets::mna_mixture())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Probabilities { ref path, .. } if path.contains("Series G")));
    }

    #[test]
    fn test_mixture_weights_must_sum_to_one() {
        let stages = presets::stage_params(MarketScenario::Market).to_vec();
        let mixture = vec![
            MnaOutcome {
                weight: 0.5,
                multiplier: 1.0,
            },
            MnaOutcome {
                weight: 0.4,
                multiplier: 2.0,
            },
        ];
        let err = MarketModel::new(MarketScenario::Market, stages, mixture).unwrap_err();
        assert!(matches!(err, ConfigError::MnaMixture { .. }));
    }

    #[test]
    fn test_mixture_negative_multiplier_rejected() {
        let stages = presets::stage_params(MarketScenario::Market).to_vec();
        let mixture = vec![MnaOutcome {
            weight: 1.0,
            multiplier: -0.5,
        }];
        let err = MarketModel::new(MarketScenario::Market, stages, mixture).unwrap_err();
        assert!(matches!(err, ConfigError::MnaMixture { .. }));
    }

    #[test]
    fn test_mixture_sampling_respects_cumulative_bins() {
        // Degenerate mixture: a single certain outcome.
        let stages = presets::stage_params(MarketScenario::Market).to_vec();
        let m = MarketModel::new(
            MarketScenario::Market,
            stages,
            vec![MnaOutcome {
                weight: 1.0,
                multiplier: 3.0,
            }],
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(m.sample_mna_multiplier(&mut rng), 3.0);
        }
    }

    #[test]
    fn test_mixture_sampling_frequencies_track_weights() {
        let m = market();
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        let mut ones = 0u32;
        let n = 20_000;
        for _ in 0..n {
            if m.sample_mna_multiplier(&mut rng) == 1.0 {
                ones += 1;
            }
        }
        // The 1.0x branch carries 60% of the mass.
        let freq = f64::from(ones) / f64::from(n);
        assert!((freq - 0.60).abs() < 0.02, "freq={freq}");
    }
}
