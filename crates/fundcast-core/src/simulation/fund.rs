use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use crate::config::FundConfig;
use crate::market::MarketModel;
use crate::simulation::company::{classify_draw, Company, StepOutcome};
use crate::types::{OutcomeKind, Stage};

/// Count of companies entering or ending at one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageCount {
    pub stage: Stage,
    pub count: u32,
}

/// One `(outcome, stage)` cell of a scenario's terminal portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentObservation {
    #[serde(rename = "type")]
    pub kind: OutcomeKind,
    pub stage: Stage,
    pub count: u32,
    pub value_m: f64,
}

/// Terminal observation of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    /// Portfolio value over deployed capital. None when nothing deployed.
    pub moic: Option<f64>,
    /// Portfolio value over committed fund size.
    pub tvpi: f64,
    pub total_companies: u32,
    pub entry_stage_counts: Vec<StageCount>,
    pub final_stage_counts: Vec<StageCount>,
    pub alive: u32,
    pub acquired: u32,
    pub failed: u32,
    pub value_from_alive_m: f64,
    pub value_from_acquired_m: f64,
    pub total_value_m: f64,
    pub primary_invested_m: f64,
    pub follow_on_invested_m: f64,
    pub avg_entry_ownership_pct: f64,
    pub pro_rata_events_total: u32,
    pub pro_rata_skipped_stage_too_late: u32,
    pub pro_rata_skipped_reserve_exhausted: u32,
    /// Terminal composition by stage and outcome, stable order.
    pub composition: Vec<SegmentObservation>,
}

/// Portfolio container for one scenario. Writes all initial checks at t=0,
/// then steps each company once per period in insertion order.
#[derive(Debug, Clone)]
pub struct Fund {
    portfolio: Vec<Company>,
    primary_deployed_m: f64,
    follow_on_deployed_m: f64,
    reserve_remaining_m: f64,
    pro_rata_max_valuation_m: f64,
    pro_rata_skipped_stage_too_late: u32,
    pro_rata_skipped_reserve_exhausted: u32,
}

impl Fund {
    pub fn initialize(config: &FundConfig) -> Fund {
        let market = config.effective_market();
        let mut portfolio = Vec::with_capacity(config.total_initial_companies() as usize);
        let mut primary_deployed = 0.0;
        let mut id = 0u32;
        for check in config.initial_checks() {
            let valuation = market.valuation(check.stage);
            for _ in 0..check.count {
                portfolio.push(Company::new(
                    id,
                    check.stage,
                    valuation,
                    check.ownership_at_entry,
                    check.check_size_m,
                ));
                id += 1;
                primary_deployed += check.check_size_m;
            }
        }
        debug_assert!(primary_deployed <= config.primary_pool_f64() + 1e-9);

        Fund {
            portfolio,
            primary_deployed_m: primary_deployed,
            follow_on_deployed_m: 0.0,
            reserve_remaining_m: config.reserve_f64(),
            pro_rata_max_valuation_m: config.pro_rata_max_valuation(),
            pro_rata_skipped_stage_too_late: 0,
            pro_rata_skipped_reserve_exhausted: 0,
        }
    }

    pub fn portfolio(&self) -> &[Company] {
        &self.portfolio
    }

    pub fn reserve_remaining_m(&self) -> f64 {
        self.reserve_remaining_m
    }

    pub fn follow_on_deployed_m(&self) -> f64 {
        self.follow_on_deployed_m
    }

    /// Advance every live company by one period, in insertion order. The
    /// draw order is observable through the RNG stream and must not change.
    pub fn step_period(&mut self, market: &MarketModel, rng: &mut StdRng) {
        for i in 0..self.portfolio.len() {
            if !self.portfolio[i].is_alive() {
                continue;
            }
            let u: f64 = rng.gen();
            let transition = market.transition(self.portfolio[i].stage);
            match classify_draw(u, transition) {
                StepOutcome::Hold => {}
                StepOutcome::Fail => self.portfolio[i].fail(),
                StepOutcome::MnA => {
                    let multiplier = market.sample_mna_multiplier(rng);
                    let exit = self.portfolio[i].valuation_m * multiplier;
                    self.portfolio[i].acquire(exit);
                }
                StepOutcome::Promote => self.promote_company(i, market),
            }
            self.portfolio[i].age_periods += 1;
        }
    }

    /// Promotion plus the pro-rata decision: the fund tops up to its
    /// pre-dilution share when the new post-money is under the cap and
    /// reserve remains, spending at most what is left in the reserve.
    fn promote_company(&mut self, i: usize, market: &MarketModel) {
        let Some(next) = self.portfolio[i].stage.next() else {
            debug_assert!(false, "promotion drawn at the terminal stage");
            return;
        };
        let new_valuation = market.valuation(next);
        let dilution = market.dilution(next);
        let target_ownership = self.portfolio[i].ownership_frac;

        self.portfolio[i].promote_to(next, new_valuation, dilution);

        let diluted = self.portfolio[i].ownership_frac;
        let desired = (target_ownership - diluted) * new_valuation;
        if new_valuation > self.pro_rata_max_valuation_m {
            self.pro_rata_skipped_stage_too_late += 1;
            return;
        }
        if desired <= 0.0 {
            return;
        }
        if self.reserve_remaining_m <= 0.0 {
            self.pro_rata_skipped_reserve_exhausted += 1;
            return;
        }

        let purchase = desired.min(self.reserve_remaining_m);
        self.reserve_remaining_m -= purchase;
        self.follow_on_deployed_m += purchase;

        let company = &mut self.portfolio[i];
        company.ownership_frac = (diluted + purchase / new_valuation).min(1.0);
        company.invested_follow_on_m += purchase;
        company.pro_rata_events += 1;

        debug_assert!(self.reserve_remaining_m >= 0.0);
        debug_assert!(company.ownership_frac <= target_ownership + 1e-12);
    }

    /// Terminal accounting after the last period.
    pub fn close(&self, config: &FundConfig) -> ScenarioResult {
        let mut entry_counts = [0u32; Stage::COUNT];
        let mut final_counts = [0u32; Stage::COUNT];
        // Per (stage, outcome) cells: count and value.
        let mut cell_counts = [[0u32; 3]; Stage::COUNT];
        let mut cell_values = [[0.0f64; 3]; Stage::COUNT];

        let mut alive = 0u32;
        let mut acquired = 0u32;
        let mut failed = 0u32;
        let mut value_from_alive = 0.0;
        let mut value_from_acquired = 0.0;
        let mut pro_rata_events = 0u32;

        for company in &self.portfolio {
            entry_counts[company.entry_stage.index()] += 1;
            final_counts[company.stage.index()] += 1;
            pro_rata_events += company.pro_rata_events;

            let kind = company.outcome_kind();
            let contribution = company.contribution_m();
            match kind {
                OutcomeKind::Alive => {
                    alive += 1;
                    value_from_alive += contribution;
                }
                OutcomeKind::Acquired => {
                    acquired += 1;
                    value_from_acquired += contribution;
                }
                OutcomeKind::Failed => failed += 1,
            }
            let k = kind_index(kind);
            cell_counts[company.stage.index()][k] += 1;
            cell_values[company.stage.index()][k] += contribution;
        }

        let total_value = value_from_alive + value_from_acquired;
        let capital_deployed = self.primary_deployed_m + self.follow_on_deployed_m;
        let moic = if capital_deployed > 0.0 {
            Some(total_value / capital_deployed)
        } else {
            None
        };
        let tvpi = total_value / config.committed_capital_f64();

        let mut composition = Vec::new();
        for stage in Stage::ALL {
            for kind in [OutcomeKind::Alive, OutcomeKind::Acquired, OutcomeKind::Failed] {
                let k = kind_index(kind);
                let count = cell_counts[stage.index()][k];
                if count > 0 {
                    composition.push(SegmentObservation {
                        kind,
                        stage,
                        count,
                        value_m: cell_values[stage.index()][k],
                    });
                }
            }
        }

        ScenarioResult {
            moic,
            tvpi,
            total_companies: self.portfolio.len() as u32,
            entry_stage_counts: stage_counts(&entry_counts),
            final_stage_counts: stage_counts(&final_counts),
            alive,
            acquired,
            failed,
            value_from_alive_m: value_from_alive,
            value_from_acquired_m: value_from_acquired,
            total_value_m: total_value,
            primary_invested_m: self.primary_deployed_m,
            follow_on_invested_m: self.follow_on_deployed_m,
            avg_entry_ownership_pct: config.avg_entry_ownership_pct(),
            pro_rata_events_total: pro_rata_events,
            pro_rata_skipped_stage_too_late: self.pro_rata_skipped_stage_too_late,
            pro_rata_skipped_reserve_exhausted: self.pro_rata_skipped_reserve_exhausted,
            composition,
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

fn stage_counts(counts: &[u32; Stage::COUNT]) -> Vec<StageCount> {
    Stage::ALL
        .iter()
        .zip(counts)
        .filter(|(_, count)| **count > 0)
        .map(|(stage, count)| StageCount {
            stage: *stage,
            count: *count,
        })
        .collect()
}
