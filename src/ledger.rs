//! Ledger rows, run diagnostics and the simulation result envelope.
//!
//! One `LedgerRow` per simulated month. Columns that only exist in some
//! modes (Monte Carlo bands, budget accounting, liquidation view, present
//! value) are `Option` so exporters can tell "not applicable" apart from
//! zero.

use serde::Serialize;

/// One month of the simulation ledger.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerRow {
    pub month: u32,
    /// Fractional years elapsed (month / 12).
    pub year: f64,

    // Ownership side.
    pub home_value: f64,
    pub mortgage_balance: f64,
    pub payment: f64,
    pub interest: f64,
    pub principal: f64,
    pub property_tax: f64,
    /// Assessment base the property tax was levied on.
    pub assessed_value: f64,
    pub maintenance: f64,
    pub repairs: f64,
    pub condo_fee: f64,
    pub home_insurance: f64,
    pub owner_utilities: f64,
    pub special_assessment: f64,
    pub owner_outflow: f64,

    // Renting side.
    pub rent: f64,
    pub renter_insurance: f64,
    pub renter_utilities: f64,
    pub moving_cost: f64,
    pub renter_outflow: f64,

    /// Owner outflow minus renter outflow. Positive means renting is
    /// cheaper this month.
    pub surplus: f64,

    // Net worth.
    pub buyer_equity: f64,
    pub buyer_investments: f64,
    pub buyer_cash: f64,
    pub buyer_net_worth: f64,
    pub renter_investments: f64,
    pub renter_cash: f64,
    pub renter_net_worth: f64,
    /// Buyer minus renter net worth.
    pub delta: f64,

    pub buyer_unrecoverable_cum: f64,
    pub renter_unrecoverable_cum: f64,

    // Budget mode only.
    pub net_income: Option<f64>,
    pub buyer_contribution: Option<f64>,
    pub renter_contribution: Option<f64>,
    pub buyer_shortfall_cum: Option<f64>,
    pub renter_shortfall_cum: Option<f64>,

    // Monte Carlo bands across trials (median path in the main columns).
    pub buyer_nw_p5: Option<f64>,
    pub buyer_nw_p95: Option<f64>,
    pub buyer_nw_mean: Option<f64>,
    pub renter_nw_p5: Option<f64>,
    pub renter_nw_p95: Option<f64>,
    pub renter_nw_mean: Option<f64>,

    // Present value.
    pub delta_pv: Option<f64>,
}

/// Which engine produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EngineKind {
    #[default]
    Deterministic,
    Vectorized,
    PerTrial,
}

/// Result of comparing the sigma=0 stochastic run against the closed-form
/// deterministic path.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DegenerateCheck {
    pub max_rel_err: f64,
    pub max_abs_err: f64,
    pub passed: bool,
}

/// Structured per-run diagnostics. Exporters render these; the engine never
/// prints them itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub engine: EngineKind,
    pub trials: u32,
    pub seed: Option<u64>,
    /// Config fields rescaled by the unit guards.
    pub autonormalized: Vec<String>,
    /// Free-form notes, deduplicated in insertion order.
    pub notes: Vec<String>,
    pub degenerate_check: Option<DegenerateCheck>,
    /// Estimated path-array bytes for the vectorized engine.
    pub mem_estimate_bytes: u64,
    pub summary_only: bool,
}

impl Diagnostics {
    pub fn note(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        if !self.notes.contains(&msg) {
            self.notes.push(msg);
        }
    }
}

/// After-tax terminal comparison. Present only when the liquidation view is
/// requested.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LiquidationSummary {
    /// Median across trials (or the single path).
    pub buyer_after_tax: f64,
    pub renter_after_tax: f64,
    pub buyer_tax: f64,
    pub renter_tax: f64,
    /// Selling costs plus legal fee on the home sale, when sold.
    pub sale_costs: f64,
    /// Win rate on after-tax terminal values, when trials > 1.
    pub win_rate_pct: Option<f64>,
}

/// Everything a single scenario evaluation produces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationResult {
    /// Monthly ledger. In summary-only Monte Carlo runs this holds just the
    /// terminal month.
    pub rows: Vec<LedgerRow>,

    /// Initial monthly mortgage payment.
    pub payment_initial: f64,
    /// Down payment plus closing costs.
    pub cash_to_close: f64,

    pub final_buyer_nw: f64,
    pub final_renter_nw: f64,
    /// Pre-tax buyer win rate across trials. `None` when unavailable
    /// (single path), never coerced to zero.
    pub win_rate_pct: Option<f64>,

    pub liquidation: Option<LiquidationSummary>,
    pub diagnostics: Diagnostics,
}

impl SimulationResult {
    pub fn final_delta(&self) -> f64 {
        self.final_buyer_nw - self.final_renter_nw
    }
}
