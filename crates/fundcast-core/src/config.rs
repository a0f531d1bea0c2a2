use std::collections::BTreeMap;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::market::{presets, MarketModel, MarketScenario, MnaOutcome, Transition};
use crate::types::{Money, Stage};

/// Fewer iterations than this produce unusable percentile estimates.
pub const MIN_ITERATIONS: u32 = 100;

/// Seed used when the request does not supply one. Wall-clock seeding is
/// forbidden by the determinism contract.
pub const DEFAULT_SEED: u64 = 0xC0FFEE;

fn default_management_fee_pct() -> f64 {
    0.02
}

fn default_fee_duration_years() -> u32 {
    10
}

fn default_num_periods() -> u32 {
    8
}

/// One row of the requested stage allocation. `pct` is an integer share of
/// the primary pool; duplicate stages merge into a share-weighted row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationRow {
    pub stage: String,
    pub pct: u32,
    /// Initial check size, $M.
    pub check_size: f64,
}

/// The full request payload. Rates are decimals (0.02 = 2%), dollar amounts
/// are $M. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationRequest {
    #[serde(default)]
    pub market_scenario: MarketScenario,

    /// Per-stage transition overrides applied on top of the preset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graduation_rates: Option<BTreeMap<String, Transition>>,

    /// Per-stage post-money valuation overrides, $M.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_valuations: Option<BTreeMap<String, f64>>,

    /// Replacement M&A outcome mixture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m_and_a_outcomes: Option<Vec<MnaOutcome>>,

    pub fund_size_m: f64,

    /// Annual management fee, charged over `fee_duration_years`.
    #[serde(default = "default_management_fee_pct")]
    pub management_fee_pct: f64,

    #[serde(default = "default_fee_duration_years")]
    pub fee_duration_years: u32,

    /// Fraction of fund size recycled back into deployable capital.
    #[serde(default)]
    pub recycled_capital_pct: f64,

    /// Fraction of fund size carved out of deployable capital for follow-ons.
    #[serde(default)]
    pub dry_powder_reserve_for_pro_rata: f64,

    /// Whether the primary-pool remainder folds into the follow-on reserve.
    #[serde(default)]
    pub reinvest_unused_reserve: bool,

    /// Post-money cap above which the fund declines to follow on, $M.
    pub pro_rata_max_valuation: f64,

    pub stage_allocations: Vec<AllocationRow>,

    #[serde(default = "default_num_periods")]
    pub num_periods: u32,

    pub num_iterations: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// One merged allocation row resolved to whole checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InitialCheck {
    pub stage: Stage,
    pub count: u32,
    pub check_size_m: f64,
    pub ownership_at_entry: f64,
}

/// Derived fund construction, reported by the validation entry point.
#[derive(Debug, Clone, Serialize)]
pub struct FundConstruction {
    pub market_scenario: String,
    pub fund_size_m: Money,
    pub management_fees_m: Money,
    pub recycled_capital_m: Money,
    pub deployable_capital_m: Money,
    pub reserve_m: Money,
    pub primary_pool_m: Money,
    pub total_companies: u32,
    pub checks: Vec<CheckSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub stage: Stage,
    pub pct: u32,
    pub count: u32,
    pub check_size_m: f64,
    pub allocated_m: Money,
    pub ownership_at_entry_pct: f64,
}

struct MergedAllocation {
    stage: Stage,
    pct: u32,
    weighted_check: Decimal,
    first_check: Decimal,
}

impl MergedAllocation {
    fn check_size(&self) -> Decimal {
        if self.pct > 0 {
            self.weighted_check / Decimal::from(self.pct)
        } else {
            self.first_check
        }
    }
}

/// Validated fund construction plus the effective market model. Immutable
/// for the lifetime of a request; per-scenario code never re-derives dollars.
#[derive(Debug, Clone)]
pub struct FundConfig {
    market: MarketModel,
    fund_size_m: Money,
    management_fees_m: Money,
    recycled_capital_m: Money,
    deployable_capital_m: Money,
    reserve_m: Money,
    primary_pool_m: Money,
    checks: Vec<InitialCheck>,
    check_pcts: Vec<u32>,
    pro_rata_max_valuation_m: f64,
    reinvest_unused_reserve: bool,
    num_periods: u32,
    num_iterations: u32,
    seed: u64,
    warnings: Vec<String>,
}

impl FundConfig {
    pub fn new(request: &SimulationRequest) -> Result<FundConfig, ConfigError> {
        let mut warnings: Vec<String> = Vec::new();

        // --- Scalar ranges ---
        let fund_size = positive_money("fund_size_m", request.fund_size_m)?;
        let fee_rate = fraction_money("management_fee_pct", request.management_fee_pct, 1.0)?;
        let recycled_rate =
            fraction_money("recycled_capital_pct", request.recycled_capital_pct, 1.0)?;
        let reserve_rate = fraction_money(
            "dry_powder_reserve_for_pro_rata",
            request.dry_powder_reserve_for_pro_rata,
            0.9,
        )?;
        if !request.pro_rata_max_valuation.is_finite() || request.pro_rata_max_valuation < 0.0 {
            return Err(ConfigError::FieldRange {
                field: "pro_rata_max_valuation".into(),
                reason: format!(
                    "must be a non-negative dollar amount, got {}",
                    request.pro_rata_max_valuation
                ),
            });
        }
        if request.num_iterations < MIN_ITERATIONS {
            return Err(ConfigError::FieldRange {
                field: "num_iterations".into(),
                reason: format!("must be at least {MIN_ITERATIONS}"),
            });
        }
        if request.num_periods < 1 {
            return Err(ConfigError::FieldRange {
                field: "num_periods".into(),
                reason: "must be at least 1".into(),
            });
        }

        // --- Allocation rows ---
        let pct_sum: u32 = request.stage_allocations.iter().map(|r| r.pct).sum();
        if pct_sum != 100 {
            return Err(ConfigError::AllocationSum { got: pct_sum });
        }

        let mut merged: Vec<MergedAllocation> = Vec::new();
        let mut duplicates = 0u32;
        for (i, row) in request.stage_allocations.iter().enumerate() {
            let stage = Stage::from_name(&row.stage).ok_or_else(|| ConfigError::UnknownStage {
                name: row.stage.clone(),
                path: format!("stage_allocations[{i}].stage"),
            })?;
            if !row.check_size.is_finite() || row.check_size <= 0.0 {
                return Err(ConfigError::FieldRange {
                    field: format!("stage_allocations[{i}].check_size"),
                    reason: format!("must be positive, got {}", row.check_size),
                });
            }
            let check = to_money(&format!("stage_allocations[{i}].check_size"), row.check_size)?;
            match merged.iter_mut().find(|m| m.stage == stage) {
                Some(entry) => {
                    entry.pct += row.pct;
                    entry.weighted_check += Decimal::from(row.pct) * check;
                    duplicates += 1;
                }
                None => merged.push(MergedAllocation {
                    stage,
                    pct: row.pct,
                    weighted_check: Decimal::from(row.pct) * check,
                    first_check: check,
                }),
            }
        }
        if duplicates > 0 {
            warnings.push(format!(
                "{duplicates} duplicate stage allocation row(s) merged into share-weighted checks"
            ));
        }

        // --- Effective market ---
        let market = effective_market(request, &mut warnings)?;

        // --- Capital derivation (exact decimal) ---
        let fees = fund_size * fee_rate * Decimal::from(request.fee_duration_years);
        let recycled = fund_size * recycled_rate;
        let deployable = fund_size - fees + recycled;
        if deployable <= Decimal::ZERO {
            return Err(ConfigError::FieldRange {
                field: "management_fee_pct".into(),
                reason: "fee drag leaves no deployable capital".into(),
            });
        }
        let reserve = fund_size * reserve_rate;
        let primary_pool = deployable - reserve;
        if primary_pool < Decimal::ZERO {
            return Err(ConfigError::FieldRange {
                field: "dry_powder_reserve_for_pro_rata".into(),
                reason: "reserve exceeds deployable capital".into(),
            });
        }

        // --- Whole checks + remainder policy ---
        let mut checks = Vec::with_capacity(merged.len());
        let mut check_pcts = Vec::with_capacity(merged.len());
        let mut remainder = Decimal::ZERO;
        for m in &merged {
            let allocated = primary_pool * Decimal::from(m.pct) / dec!(100);
            let check = m.check_size();
            let count_dec = (allocated / check).floor();
            let count = count_dec.to_u32().ok_or_else(|| ConfigError::FieldRange {
                field: "stage_allocations".into(),
                reason: format!("check size {check} yields an implausible check count"),
            })?;
            remainder += allocated - count_dec * check;

            let check_f = check.to_f64().unwrap_or(0.0);
            let valuation = market.valuation(m.stage);
            let ownership = check_f / valuation;
            if ownership > 1.0 {
                return Err(ConfigError::FieldRange {
                    field: format!("stage_allocations.{}", m.stage),
                    reason: format!(
                        "check size {check_f} exceeds the {} post-money valuation {valuation}",
                        m.stage
                    ),
                });
            }
            checks.push(InitialCheck {
                stage: m.stage,
                count,
                check_size_m: check_f,
                ownership_at_entry: ownership,
            });
            check_pcts.push(m.pct);
        }

        let reserve = if request.reinvest_unused_reserve {
            reserve + remainder
        } else {
            if remainder > Decimal::ZERO {
                warnings.push(format!(
                    "primary pool remainder of {remainder:.4} $M discarded \
                     (reinvest_unused_reserve is off)"
                ));
            }
            reserve
        };

        Ok(FundConfig {
            market,
            fund_size_m: fund_size,
            management_fees_m: fees,
            recycled_capital_m: recycled,
            deployable_capital_m: deployable,
            reserve_m: reserve,
            primary_pool_m: primary_pool,
            checks,
            check_pcts,
            pro_rata_max_valuation_m: request.pro_rata_max_valuation,
            reinvest_unused_reserve: request.reinvest_unused_reserve,
            num_periods: request.num_periods,
            num_iterations: request.num_iterations,
            seed: request.seed.unwrap_or(DEFAULT_SEED),
            warnings,
        })
    }

    pub fn effective_market(&self) -> &MarketModel {
        &self.market
    }

    /// Whole checks written at t=0, one entry per merged allocation stage.
    pub fn initial_checks(&self) -> &[InitialCheck] {
        &self.checks
    }

    pub fn total_initial_companies(&self) -> u32 {
        self.checks.iter().map(|c| c.count).sum()
    }

    /// Dollar-weighted mean entry ownership across all initial checks.
    pub fn avg_entry_ownership_pct(&self) -> f64 {
        let mut dollars = 0.0;
        let mut weighted = 0.0;
        for c in &self.checks {
            let invested = f64::from(c.count) * c.check_size_m;
            dollars += invested;
            weighted += invested * c.ownership_at_entry;
        }
        if dollars > 0.0 {
            weighted / dollars * 100.0
        } else {
            0.0
        }
    }

    pub fn fund_size(&self) -> Money {
        self.fund_size_m
    }

    pub fn committed_capital_f64(&self) -> f64 {
        self.fund_size_m.to_f64().unwrap_or(0.0)
    }

    pub fn deployable_capital_f64(&self) -> f64 {
        self.deployable_capital_m.to_f64().unwrap_or(0.0)
    }

    pub fn primary_pool_f64(&self) -> f64 {
        self.primary_pool_m.to_f64().unwrap_or(0.0)
    }

    pub fn reserve_f64(&self) -> f64 {
        self.reserve_m.to_f64().unwrap_or(0.0)
    }

    pub fn pro_rata_max_valuation(&self) -> f64 {
        self.pro_rata_max_valuation_m
    }

    pub fn reinvest_unused_reserve(&self) -> bool {
        self.reinvest_unused_reserve
    }

    pub fn num_periods(&self) -> u32 {
        self.num_periods
    }

    pub fn num_iterations(&self) -> u32 {
        self.num_iterations
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Construction summary for the validation entry point.
    pub fn construction(&self) -> FundConstruction {
        FundConstruction {
            market_scenario: self.market.scenario().label().to_string(),
            fund_size_m: self.fund_size_m,
            management_fees_m: self.management_fees_m,
            recycled_capital_m: self.recycled_capital_m,
            deployable_capital_m: self.deployable_capital_m,
            reserve_m: self.reserve_m,
            primary_pool_m: self.primary_pool_m,
            total_companies: self.total_initial_companies(),
            checks: self
                .checks
                .iter()
                .zip(&self.check_pcts)
                .map(|(c, pct)| CheckSummary {
                    stage: c.stage,
                    pct: *pct,
                    count: c.count,
                    check_size_m: c.check_size_m,
                    allocated_m: self.primary_pool_m * Decimal::from(*pct) / dec!(100),
                    ownership_at_entry_pct: c.ownership_at_entry * 100.0,
                })
                .collect(),
        }
    }

    /// Scalar assumptions echoed into the output envelope.
    pub fn assumptions(&self) -> serde_json::Value {
        serde_json::json!({
            "market_scenario": self.market.scenario().label(),
            "fund_size_m": self.fund_size_m.to_string(),
            "management_fees_m": self.management_fees_m.to_string(),
            "recycled_capital_m": self.recycled_capital_m.to_string(),
            "deployable_capital_m": self.deployable_capital_m.to_string(),
            "reserve_m": self.reserve_m.to_string(),
            "primary_pool_m": self.primary_pool_m.to_string(),
            "pro_rata_max_valuation_m": self.pro_rata_max_valuation_m,
            "num_periods": self.num_periods,
            "num_iterations": self.num_iterations,
            "seed": self.seed,
        })
    }
}

fn effective_market(
    request: &SimulationRequest,
    warnings: &mut Vec<String>,
) -> Result<MarketModel, ConfigError> {
    let mut params = presets::stage_params(request.market_scenario).to_vec();

    if let Some(overrides) = &request.stage_valuations {
        for (name, valuation) in overrides {
            let stage = Stage::from_name(name).ok_or_else(|| ConfigError::UnknownStage {
                name: name.clone(),
                path: "stage_valuations".into(),
            })?;
            params[stage.index()].valuation_m = *valuation;
        }
        warnings.push(format!(
            "stage valuation overrides applied to {} stage(s)",
            overrides.len()
        ));
    }

    if let Some(overrides) = &request.graduation_rates {
        for (name, transition) in overrides {
            let stage = Stage::from_name(name).ok_or_else(|| ConfigError::UnknownStage {
                name: name.clone(),
                path: "graduation_rates".into(),
            })?;
            params[stage.index()].transition = *transition;
        }
        warnings.push(format!(
            "graduation rate overrides applied to {} stage(s)",
            overrides.len()
        ));
    }

    let mixture = match &request.m_and_a_outcomes {
        Some(mixture) => {
            warnings.push("M&A outcome mixture overridden".into());
            mixture.clone()
        }
        None => presets::mna_mixture(),
    };

    MarketModel::new(request.market_scenario, params, mixture)
}

fn positive_money(field: &str, value: f64) -> Result<Money, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::FieldRange {
            field: field.into(),
            reason: format!("must be positive, got {value}"),
        });
    }
    to_money(field, value)
}

fn fraction_money(field: &str, value: f64, max: f64) -> Result<Money, ConfigError> {
    if !value.is_finite() || !(0.0..=max).contains(&value) {
        return Err(ConfigError::FieldRange {
            field: field.into(),
            reason: format!("must be in [0, {max}], got {value}"),
        });
    }
    to_money(field, value)
}

fn to_money(field: &str, value: f64) -> Result<Money, ConfigError> {
    Decimal::from_f64(value).ok_or_else(|| ConfigError::FieldRange {
        field: field.into(),
        reason: format!("not representable as a decimal amount: {value}"),
    })
}
