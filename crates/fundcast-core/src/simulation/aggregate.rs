use serde::Serialize;

use crate::config::FundConfig;
use crate::error::RuntimeError;
use crate::simulation::fund::ScenarioResult;
use crate::types::{OutcomeKind, Stage};

/// Uniform histogram bins over `[0, HISTOGRAM_MAX]`; overflow lands in the
/// last bin.
pub const HISTOGRAM_BINS: usize = 24;
pub const HISTOGRAM_MAX: f64 = 10.0;

/// Distribution summary of one observable across scenarios.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSummary {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub median: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Mean portfolio cell for one `(outcome, stage)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownSegment {
    #[serde(rename = "type")]
    pub kind: OutcomeKind,
    pub stage: Stage,
    pub count_mean: f64,
    pub value_mean: f64,
}

/// Aggregated portfolio composition for a set of scenarios.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioBreakdown {
    pub segments: Vec<BreakdownSegment>,
    pub total_scenarios: u32,
}

impl PortfolioBreakdown {
    fn empty() -> PortfolioBreakdown {
        PortfolioBreakdown {
            segments: Vec::new(),
            total_scenarios: 0,
        }
    }
}

/// Verbatim compositions of the scenarios nearest each headline percentile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileBreakdowns {
    pub p25: PortfolioBreakdown,
    pub p50: PortfolioBreakdown,
    pub p75: PortfolioBreakdown,
    pub p90: PortfolioBreakdown,
    pub p95: PortfolioBreakdown,
}

/// The full report for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundReport {
    pub fund_size_m: f64,
    pub committed_capital_m: f64,
    pub num_iterations: u32,
    pub avg_primary_invested_m: f64,
    pub avg_follow_on_invested_m: f64,
    pub avg_total_companies: f64,
    pub avg_active_companies: f64,
    pub avg_acquired_companies: f64,
    pub avg_failed_companies: f64,
    pub avg_entry_ownership_pct: f64,
    pub total_pro_rata_events_mean: f64,
    pub pro_rata_skipped_stage_too_late_mean: f64,
    pub pro_rata_skipped_reserve_exhausted_mean: f64,
    pub moic: PercentileSummary,
    pub tvpi: PercentileSummary,
    /// Full ascending observation list.
    pub moic_distribution: Vec<f64>,
    pub bin_breakdowns: Vec<PortfolioBreakdown>,
    pub portfolio_breakdown: PercentileBreakdowns,
}

struct BinAccumulator {
    scenarios: u32,
    counts: [[u64; 3]; Stage::COUNT],
    values: [[f64; 3]; Stage::COUNT],
}

impl BinAccumulator {
    fn new() -> BinAccumulator {
        BinAccumulator {
            scenarios: 0,
            counts: [[0; 3]; Stage::COUNT],
            values: [[0.0; 3]; Stage::COUNT],
        }
    }

    fn absorb(&mut self, result: &ScenarioResult) {
        self.scenarios += 1;
        for segment in &result.composition {
            let k = kind_index(segment.kind);
            self.counts[segment.stage.index()][k] += u64::from(segment.count);
            self.values[segment.stage.index()][k] += segment.value_m;
        }
    }

    fn into_breakdown(self) -> PortfolioBreakdown {
        if self.scenarios == 0 {
            return PortfolioBreakdown::empty();
        }
        let n = f64::from(self.scenarios);
        let mut segments = Vec::new();
        for stage in Stage::ALL {
            for kind in [OutcomeKind::Alive, OutcomeKind::Acquired, OutcomeKind::Failed] {
                let k = kind_index(kind);
                let count = self.counts[stage.index()][k];
                if count > 0 {
                    segments.push(BreakdownSegment {
                        kind,
                        stage,
                        count_mean: count as f64 / n,
                        value_mean: self.values[stage.index()][k] / n,
                    });
                }
            }
        }
        PortfolioBreakdown {
            segments,
            total_scenarios: self.scenarios,
        }
    }
}

fn kind_index(kind: OutcomeKind) -> usize {
    match kind {
        OutcomeKind::Alive => 0,
        OutcomeKind::Acquired => 1,
        OutcomeKind::Failed => 2,
    }
}

/// `sorted[floor(p * len)]`, clamped to the last element.
fn percentile_from_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let index = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

fn median_from_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

fn summary_from_sorted(sorted: &[f64]) -> PercentileSummary {
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    PercentileSummary {
        p25: percentile_from_sorted(sorted, 0.25),
        p50: percentile_from_sorted(sorted, 0.50),
        p75: percentile_from_sorted(sorted, 0.75),
        p90: percentile_from_sorted(sorted, 0.90),
        median: median_from_sorted(sorted),
        mean,
        std_dev: variance.sqrt(),
    }
}

fn bin_index(moic: f64) -> usize {
    let width = HISTOGRAM_MAX / HISTOGRAM_BINS as f64;
    ((moic / width).floor() as usize).min(HISTOGRAM_BINS - 1)
}

/// Verbatim composition of one scenario, shaped like a bin breakdown.
fn scenario_breakdown(result: &ScenarioResult) -> PortfolioBreakdown {
    PortfolioBreakdown {
        segments: result
            .composition
            .iter()
            .map(|segment| BreakdownSegment {
                kind: segment.kind,
                stage: segment.stage,
                count_mean: f64::from(segment.count),
                value_mean: segment.value_m,
            })
            .collect(),
        total_scenarios: 1,
    }
}

/// Scenario nearest the percentile target, tie-broken toward the first
/// occurrence in sort order.
fn nearest_breakdown(
    sorted_observations: &[(f64, usize)],
    results: &[ScenarioResult],
    target: f64,
) -> PortfolioBreakdown {
    let mut best: Option<(f64, usize)> = None;
    for (value, index) in sorted_observations {
        let distance = (value - target).abs();
        if best.is_none_or(|(best_distance, _)| distance < best_distance) {
            best = Some((distance, *index));
        }
    }
    match best {
        Some((_, index)) => scenario_breakdown(&results[index]),
        None => PortfolioBreakdown::empty(),
    }
}

/// Reduce N scenario observations into the full report. Observations with an
/// undefined MOIC are excluded from percentile and mean computations; if
/// every observation is undefined the run has no deployable capital.
pub fn summarize(
    results: &[ScenarioResult],
    config: &FundConfig,
) -> Result<FundReport, RuntimeError> {
    // (moic, original scenario index), stably sorted ascending.
    let mut observations: Vec<(f64, usize)> = results
        .iter()
        .enumerate()
        .filter_map(|(index, r)| r.moic.map(|m| (m, index)))
        .collect();
    if observations.is_empty() {
        return Err(RuntimeError::NoDeployableCapital);
    }
    observations.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let sorted_moic: Vec<f64> = observations.iter().map(|(m, _)| *m).collect();

    let mut sorted_tvpi: Vec<f64> = results.iter().map(|r| r.tvpi).collect();
    sorted_tvpi.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    // Histogram bins, accumulated in sorted order so the reduction does not
    // depend on scenario arrival order.
    let mut bins: Vec<BinAccumulator> = (0..HISTOGRAM_BINS).map(|_| BinAccumulator::new()).collect();
    for (moic, index) in &observations {
        bins[bin_index(*moic)].absorb(&results[*index]);
    }

    let portfolio_breakdown = PercentileBreakdowns {
        p25: nearest_breakdown(
            &observations,
            results,
            percentile_from_sorted(&sorted_moic, 0.25),
        ),
        p50: nearest_breakdown(
            &observations,
            results,
            percentile_from_sorted(&sorted_moic, 0.50),
        ),
        p75: nearest_breakdown(
            &observations,
            results,
            percentile_from_sorted(&sorted_moic, 0.75),
        ),
        p90: nearest_breakdown(
            &observations,
            results,
            percentile_from_sorted(&sorted_moic, 0.90),
        ),
        p95: nearest_breakdown(
            &observations,
            results,
            percentile_from_sorted(&sorted_moic, 0.95),
        ),
    };

    let n = results.len() as f64;
    let mean_of = |f: &dyn Fn(&ScenarioResult) -> f64| -> f64 {
        results.iter().map(|r| f(r)).sum::<f64>() / n
    };

    Ok(FundReport {
        fund_size_m: config.committed_capital_f64(),
        committed_capital_m: config.committed_capital_f64(),
        num_iterations: config.num_iterations(),
        avg_primary_invested_m: mean_of(&|r| r.primary_invested_m),
        avg_follow_on_invested_m: mean_of(&|r| r.follow_on_invested_m),
        avg_total_companies: mean_of(&|r| f64::from(r.total_companies)),
        avg_active_companies: mean_of(&|r| f64::from(r.alive)),
        avg_acquired_companies: mean_of(&|r| f64::from(r.acquired)),
        avg_failed_companies: mean_of(&|r| f64::from(r.failed)),
        avg_entry_ownership_pct: config.avg_entry_ownership_pct(),
        total_pro_rata_events_mean: mean_of(&|r| f64::from(r.pro_rata_events_total)),
        pro_rata_skipped_stage_too_late_mean: mean_of(&|r| {
            f64::from(r.pro_rata_skipped_stage_too_late)
        }),
        pro_rata_skipped_reserve_exhausted_mean: mean_of(&|r| {
            f64::from(r.pro_rata_skipped_reserve_exhausted)
        }),
        moic: summary_from_sorted(&sorted_moic),
        tvpi: summary_from_sorted(&sorted_tvpi),
        moic_distribution: sorted_moic,
        bin_breakdowns: bins.into_iter().map(BinAccumulator::into_breakdown).collect(),
        portfolio_breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AllocationRow, SimulationRequest};
    use crate::market::MarketScenario;
    use crate::simulation::engine::ScenarioEngine;

    fn request(
        fund_size_m: f64,
        reserve: f64,
        allocations: Vec<AllocationRow>,
        iterations: u32,
    ) -> SimulationRequest {
        SimulationRequest {
            market_scenario: MarketScenario::Market,
            graduation_rates: None,
            stage_valuations: None,
            m_and_a_outcomes: None,
            fund_size_m,
            management_fee_pct: 0.02,
            fee_duration_years: 10,
            recycled_capital_pct: 0.20,
            dry_powder_reserve_for_pro_rata: reserve,
            reinvest_unused_reserve: false,
            pro_rata_max_valuation: 500.0,
            stage_allocations: allocations,
            num_periods: 8,
            num_iterations: iterations,
            seed: Some(0xC0FFEE),
        }
    }

    fn seed_fund(iterations: u32) -> SimulationRequest {
        request(
            50.0,
            0.0,
            vec![AllocationRow {
                stage: "Seed".into(),
                pct: 100,
                check_size: 2.0,
            }],
            iterations,
        )
    }

    fn two_stage_fund(iterations: u32) -> SimulationRequest {
        request(
            150.0,
            0.30,
            vec![
                AllocationRow {
                    stage: "Pre-seed".into(),
                    pct: 50,
                    check_size: 1.75,
                },
                AllocationRow {
                    stage: "Seed".into(),
                    pct: 50,
                    check_size: 3.5,
                },
            ],
            iterations,
        )
    }

    fn run_report(req: &SimulationRequest) -> FundReport {
        let config = FundConfig::new(req).unwrap();
        let results = ScenarioEngine::run(&config).unwrap();
        summarize(&results, &config).unwrap()
    }

    #[test]
    fn test_percentile_is_floor_indexed_and_clamped() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_from_sorted(&sorted, 0.25), 2.0);
        assert_eq!(percentile_from_sorted(&sorted, 0.50), 3.0);
        assert_eq!(percentile_from_sorted(&sorted, 0.99), 4.0);
        assert_eq!(percentile_from_sorted(&sorted, 1.0), 4.0);
        assert_eq!(percentile_from_sorted(&[7.0], 0.5), 7.0);
    }

    #[test]
    fn test_median_averages_even_lengths() {
        assert_eq!(median_from_sorted(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median_from_sorted(&[1.0, 2.0, 3.0]), 2.0);
    }

    #[test]
    fn test_bin_index_bounds() {
        let width = HISTOGRAM_MAX / HISTOGRAM_BINS as f64;
        assert_eq!(bin_index(0.0), 0);
        assert_eq!(bin_index(width - 1e-12), 0);
        assert_eq!(bin_index(width), 1);
        assert_eq!(bin_index(9.999), HISTOGRAM_BINS - 1);
        assert_eq!(bin_index(10.0), HISTOGRAM_BINS - 1);
        assert_eq!(bin_index(250.0), HISTOGRAM_BINS - 1);
    }

    #[test]
    fn test_report_shape() {
        let report = run_report(&seed_fund(200));
        assert_eq!(report.bin_breakdowns.len(), HISTOGRAM_BINS);
        assert_eq!(report.moic_distribution.len(), 200);
        assert!(report
            .moic_distribution
            .windows(2)
            .all(|pair| pair[0] <= pair[1]));
        let binned: u32 = report
            .bin_breakdowns
            .iter()
            .map(|b| b.total_scenarios)
            .sum();
        assert_eq!(binned, 200);
        assert_eq!(report.portfolio_breakdown.p50.total_scenarios, 1);
    }

    #[test]
    fn test_summary_orderings() {
        let report = run_report(&seed_fund(500));
        let m = &report.moic;
        assert!(m.p25 <= m.p50);
        assert!(m.p50 <= m.p75);
        assert!(m.p75 <= m.p90);
        assert!(m.std_dev > 0.0);
        let t = &report.tvpi;
        assert!(t.p25 <= t.p50 && t.p50 <= t.p75 && t.p75 <= t.p90);
    }

    #[test]
    fn test_aggregation_is_permutation_invariant() {
        let config = FundConfig::new(&seed_fund(300)).unwrap();
        let results = ScenarioEngine::run(&config).unwrap();
        let report = summarize(&results, &config).unwrap();

        let mut shuffled = results.clone();
        shuffled.reverse();
        shuffled.rotate_left(17);
        let report_shuffled = summarize(&shuffled, &config).unwrap();

        assert_eq!(report.moic, report_shuffled.moic);
        assert_eq!(report.tvpi, report_shuffled.tvpi);
        assert_eq!(report.moic_distribution, report_shuffled.moic_distribution);
        assert_eq!(report.bin_breakdowns, report_shuffled.bin_breakdowns);
        assert!(
            (report.avg_follow_on_invested_m - report_shuffled.avg_follow_on_invested_m).abs()
                < 1e-9
        );
        assert!((report.avg_failed_companies - report_shuffled.avg_failed_companies).abs() < 1e-9);
    }

    #[test]
    fn test_all_undefined_observations_is_an_error() {
        let config = FundConfig::new(&seed_fund(200)).unwrap();
        let results = ScenarioEngine::run(&config).unwrap();
        let gutted: Vec<ScenarioResult> = results
            .into_iter()
            .map(|mut r| {
                r.moic = None;
                r
            })
            .collect();
        assert_eq!(
            summarize(&gutted, &config).unwrap_err(),
            RuntimeError::NoDeployableCapital
        );
    }

    #[test]
    fn test_single_stage_seed_fund_profile() {
        let report = run_report(&seed_fund(10_000));
        assert_eq!(report.avg_total_companies, 25.0);
        assert!(
            report.moic.p50 >= 1.2 && report.moic.p50 <= 2.4,
            "P50 MOIC {} outside expected band",
            report.moic.p50
        );
        // No reserve: nothing to follow on with.
        assert_eq!(report.avg_follow_on_invested_m, 0.0);
        assert_eq!(report.total_pro_rata_events_mean, 0.0);
    }

    #[test]
    fn test_two_stage_fund_follows_on() {
        let config = FundConfig::new(&two_stage_fund(10_000)).unwrap();
        let results = ScenarioEngine::run(&config).unwrap();
        let report = summarize(&results, &config).unwrap();

        assert!(report.avg_follow_on_invested_m > 0.0);
        assert!(report.total_pro_rata_events_mean > 0.0);
        let with_events = results
            .iter()
            .filter(|r| r.pro_rata_events_total > 0)
            .count();
        assert!(
            with_events * 2 > results.len(),
            "pro-rata fired in only {with_events} of {} scenarios",
            results.len()
        );
    }

    #[test]
    fn test_below_market_underperforms_baseline() {
        let baseline = run_report(&two_stage_fund(10_000));
        let mut bear_req = two_stage_fund(10_000);
        bear_req.market_scenario = MarketScenario::BelowMarket;
        let bear = run_report(&bear_req);

        assert!(
            bear.moic.p50 < baseline.moic.p50,
            "bear P50 {} should trail baseline {}",
            bear.moic.p50,
            baseline.moic.p50
        );
        assert!(bear.avg_failed_companies > baseline.avg_failed_companies);
    }

    #[test]
    fn test_zero_cap_disables_follow_ons() {
        let mut req = two_stage_fund(10_000);
        req.pro_rata_max_valuation = 0.0;
        let report = run_report(&req);
        assert_eq!(report.avg_follow_on_invested_m, 0.0);
        assert_eq!(report.total_pro_rata_events_mean, 0.0);
    }

    #[test]
    fn test_percentile_breakdowns_are_verbatim_scenarios() {
        let config = FundConfig::new(&seed_fund(200)).unwrap();
        let results = ScenarioEngine::run(&config).unwrap();
        let report = summarize(&results, &config).unwrap();
        // The selected scenario's composition is reported verbatim: integral
        // counts, one scenario.
        for breakdown in [
            &report.portfolio_breakdown.p25,
            &report.portfolio_breakdown.p50,
            &report.portfolio_breakdown.p95,
        ] {
            assert_eq!(breakdown.total_scenarios, 1);
            for segment in &breakdown.segments {
                assert_eq!(segment.count_mean.fract(), 0.0);
            }
        }
    }
}
