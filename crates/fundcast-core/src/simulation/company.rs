use serde::Serialize;

use crate::market::Transition;
use crate::types::{OutcomeKind, Stage};

/// Lifecycle state of one portfolio position. `Acquired` and `Failed` are
/// terminal; a company that leaves `Alive` is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CompanyState {
    Alive,
    Acquired { exit_valuation_m: f64 },
    Failed,
}

/// Outcome class selected by one period's uniform draw, in the fixed
/// evaluation order: fail, then M&A, then promote, else hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Hold,
    Fail,
    MnA,
    Promote,
}

/// Map a uniform draw onto the stage's transition distribution.
pub fn classify_draw(u: f64, t: Transition) -> StepOutcome {
    if u < t.p_fail {
        StepOutcome::Fail
    } else if u < t.p_fail + t.p_mna {
        StepOutcome::MnA
    } else if u < t.p_fail + t.p_mna + t.p_promote {
        StepOutcome::Promote
    } else {
        StepOutcome::Hold
    }
}

/// One portfolio position. Owned exclusively by its Fund.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Company {
    pub id: u32,
    pub entry_stage: Stage,
    pub stage: Stage,
    pub state: CompanyState,
    pub valuation_m: f64,
    pub ownership_frac: f64,
    pub invested_primary_m: f64,
    pub invested_follow_on_m: f64,
    pub age_periods: u32,
    pub pro_rata_events: u32,
}

impl Company {
    pub fn new(
        id: u32,
        stage: Stage,
        valuation_m: f64,
        ownership_frac: f64,
        check_size_m: f64,
    ) -> Company {
        Company {
            id,
            entry_stage: stage,
            stage,
            state: CompanyState::Alive,
            valuation_m,
            ownership_frac,
            invested_primary_m: check_size_m,
            invested_follow_on_m: 0.0,
            age_periods: 0,
            pro_rata_events: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state == CompanyState::Alive
    }

    pub fn outcome_kind(&self) -> OutcomeKind {
        match self.state {
            CompanyState::Alive => OutcomeKind::Alive,
            CompanyState::Acquired { .. } => OutcomeKind::Acquired,
            CompanyState::Failed => OutcomeKind::Failed,
        }
    }

    pub(crate) fn fail(&mut self) {
        debug_assert!(self.is_alive());
        self.state = CompanyState::Failed;
        self.valuation_m = 0.0;
    }

    pub(crate) fn acquire(&mut self, exit_valuation_m: f64) {
        debug_assert!(self.is_alive());
        debug_assert!(exit_valuation_m >= 0.0);
        self.state = CompanyState::Acquired { exit_valuation_m };
    }

    /// Move to the next stage: take the new post-money and suffer its
    /// dilution. Any pro-rata purchase is applied afterwards by the fund.
    pub(crate) fn promote_to(&mut self, next: Stage, valuation_m: f64, dilution: f64) {
        debug_assert!(self.is_alive());
        debug_assert_eq!(self.stage.next(), Some(next));
        self.stage = next;
        self.valuation_m = valuation_m;
        self.ownership_frac *= 1.0 - dilution;
    }

    /// Terminal value attributable to the fund.
    pub fn contribution_m(&self) -> f64 {
        match self.state {
            CompanyState::Alive => self.valuation_m * self.ownership_frac,
            CompanyState::Acquired { exit_valuation_m } => {
                exit_valuation_m * self.ownership_frac
            }
            CompanyState::Failed => 0.0,
        }
    }
}
