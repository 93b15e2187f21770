//! Scenario configuration and run parameters.
//!
//! `ScenarioConfig` is the strongly-typed baseline model: every field is
//! named and carries its unit in the doc line. Simulation calls never mutate
//! a caller's config; per-evaluation changes go through [`Overrides`], which
//! produces a fresh value. A legacy adapter accepts the old flat
//! string-keyed scenario maps.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::policy::DownPaymentSource;

/// How the property-tax assessment base tracks the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PropTaxModel {
    /// Assessment equals market value every month.
    MarketValue,
    /// Assessment grows with general inflation, ignoring the market.
    Inflation,
    /// Assessment chases market value, capped per month at inflation plus a
    /// configurable add-on. Smoothing knob, not a faithful MPAC model.
    #[default]
    Hybrid,
}

/// Mortgage rate behavior over the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RateMode {
    #[default]
    Fixed,
    /// Renew to a new quoted rate every N years (plus an optional per-renewal
    /// step in percentage points).
    ResetEveryNYears,
}

/// How investment returns are taxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InvestmentTaxMode {
    /// No investment taxes anywhere.
    #[default]
    PreTax,
    /// Tax applied monthly as a drag on returns; terminal capital-gains step
    /// is disabled to avoid double taxation.
    AnnualDrag,
    /// Gains accrue untaxed and are settled at liquidation.
    DeferredCapitalGains,
}

/// Capital-gains inclusion policy at liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CgInclusionPolicy {
    /// Flat effective rate on all gains.
    #[default]
    Current,
    /// 4/3 multiplier on the effective rate above the threshold,
    /// approximating a 50% -> 66.67% inclusion step.
    Tiered,
}

/// How the monthly surplus/deficit between buyer and renter outflows is
/// handled. One pure strategy per variant, dispatched once per month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SurplusMode {
    /// The side with the lower outflow invests the gap.
    InvestDiff,
    /// The gap accrues to a zero-return cash sub-balance instead of the
    /// invested balance (surplus investing disabled).
    TrackAsCash,
    /// Full income-and-expense budgeting: each side invests net income minus
    /// non-housing spend minus housing outflow, withdrawing from the
    /// portfolio on shortfall when allowed.
    Budget {
        monthly_income: f64,
        monthly_nonhousing: f64,
        income_growth_pct: f64,
        allow_withdraw: bool,
    },
}

impl Default for SurplusMode {
    fn default() -> Self {
        SurplusMode::InvestDiff
    }
}

/// Which assumption the heatmap's y-axis sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeatmapYAxis {
    #[default]
    RentInflation,
    RenterReturn,
}

/// Baseline scenario inputs. Percent fields say so; everything else is a
/// decimal fraction or dollars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Horizon in years (>= 1).
    pub years: u32,
    /// Purchase price ($).
    pub price: f64,
    /// Down payment ($).
    pub down: f64,
    /// One-time closing costs ($), including any premium sales tax.
    pub close: f64,
    /// Sales tax on the insurance premium already included in `close` ($).
    pub premium_sales_tax: f64,
    /// Mortgage principal ($), post-insurance-premium.
    pub mort: f64,
    /// Amortization in months.
    pub amort_months: u32,
    /// Quoted nominal annual mortgage rate (%).
    pub rate_pct: f64,
    /// Semi-annual compounding (Canadian convention) vs nominal/12.
    pub canadian_compounding: bool,

    /// Starting monthly rent ($).
    pub rent: f64,
    /// Annual effective rent inflation (decimal).
    pub rent_inf: f64,
    pub rent_control_enabled: bool,
    /// Annual cap on rent increases (decimal), when rent control is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent_control_cap: Option<f64>,
    /// Rent increase cadence in years (1 = annual).
    pub rent_control_frequency_years: u32,

    /// Annual property tax as a fraction of the assessment base.
    pub p_tax_rate: f64,
    /// Annual maintenance as a fraction of home value.
    pub maint_rate: f64,
    /// Annual repairs as a fraction of home value.
    pub repair_rate: f64,
    /// Monthly condo fees ($).
    pub condo: f64,
    /// Monthly home insurance ($).
    pub h_ins: f64,
    /// Monthly owner utilities ($).
    pub o_util: f64,
    /// Monthly renter insurance ($).
    pub r_ins: f64,
    /// Monthly renter utilities ($).
    pub r_util: f64,
    /// Cost per renter move ($).
    pub moving_cost: f64,
    /// Years between renter moves.
    pub moving_freq: f64,

    /// Annual general inflation (decimal).
    pub general_inf: f64,
    /// Annual condo-fee inflation (decimal).
    pub condo_inf: f64,

    /// Annual stock-return volatility (decimal).
    pub ret_std: f64,
    /// Annual home-appreciation volatility (decimal).
    pub apprec_std: f64,
    /// Enable Monte Carlo when trials > 1.
    pub use_volatility: bool,
    /// Monte Carlo trial count.
    pub num_sims: u32,
    /// Use the vectorized MC engine when the memory estimate allows it.
    pub vectorized_mc: bool,
    /// Byte ceiling for vectorized MC path arrays.
    pub vectorized_mc_mem_ceiling_bytes: u64,

    pub rate_mode: RateMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_reset_years: Option<u32>,
    /// Quoted nominal rate after each renewal (%).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_reset_to_pct: Option<f64>,
    /// Extra percentage points added per renewal after the first.
    pub rate_reset_step_pp: f64,
    pub rate_shock_enabled: bool,
    pub rate_shock_start_year: u32,
    pub rate_shock_duration_years: u32,
    /// Additive rate shock (percentage points).
    pub rate_shock_pp: f64,

    pub crisis_enabled: bool,
    /// Crisis onset (years from start).
    pub crisis_year: f64,
    /// Drawdown fraction on invested balances.
    pub crisis_stock_dd: f64,
    /// Drawdown fraction on home value.
    pub crisis_house_dd: f64,
    pub crisis_duration_months: u32,

    /// One-time buyer-only condo special assessment ($).
    pub special_assessment_amount: f64,
    /// Month it lands (0 = never).
    pub special_assessment_month: u32,

    /// Sell the home at the horizon.
    pub assume_sale_end: bool,
    /// Compute the after-tax liquidation view.
    pub show_liquidation_view: bool,
    pub is_principal_residence: bool,
    /// Effective capital-gains tax rate at liquidation (%).
    pub cg_tax_end_pct: f64,
    pub cg_inclusion_policy: CgInclusionPolicy,
    /// Gain threshold for the tiered inclusion policy ($).
    pub cg_inclusion_threshold: f64,
    /// Selling costs as a fraction of sale price.
    pub sell_cost: f64,
    /// Flat legal fee on the home sale ($).
    pub home_sale_legal_fee: f64,

    pub reg_shelter_enabled: bool,
    /// Registered-shelter contribution room at the start ($ of basis).
    pub reg_initial_room: f64,
    /// Room added per year ($ of basis).
    pub reg_annual_room: f64,

    pub investment_tax_mode: InvestmentTaxMode,
    /// Annual return-drag tax rate (%), used under `AnnualDrag`.
    pub tax_r_pct: f64,

    pub prop_tax_growth_model: PropTaxModel,
    /// Hybrid model: annual add-on over inflation for the assessment cap (%).
    pub prop_tax_hybrid_addon_pct: f64,

    /// Annual discount rate for present-value series (decimal).
    pub discount_rate: f64,

    /// Province code for premium sales tax (e.g. "ON").
    pub province: String,
    pub down_payment_source: DownPaymentSource,
    /// As-of date for date-aware policy rules. `None` = today.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asof_date: Option<NaiveDate>,
    pub first_time_buyer: bool,
    pub in_toronto: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            years: 25,
            price: 800_000.0,
            down: 160_000.0,
            close: 25_000.0,
            premium_sales_tax: 0.0,
            mort: 640_000.0,
            amort_months: 300,
            rate_pct: 5.0,
            canadian_compounding: true,

            rent: 2_600.0,
            rent_inf: 0.025,
            rent_control_enabled: false,
            rent_control_cap: None,
            rent_control_frequency_years: 1,

            p_tax_rate: 0.0066,
            maint_rate: 0.01,
            repair_rate: 0.005,
            condo: 0.0,
            h_ins: 150.0,
            o_util: 250.0,
            r_ins: 30.0,
            r_util: 150.0,
            moving_cost: 2_000.0,
            moving_freq: 5.0,

            general_inf: 0.021,
            condo_inf: 0.035,

            ret_std: 0.15,
            apprec_std: 0.06,
            use_volatility: false,
            num_sims: 1_000,
            vectorized_mc: true,
            vectorized_mc_mem_ceiling_bytes: 850_000_000,

            rate_mode: RateMode::Fixed,
            rate_reset_years: None,
            rate_reset_to_pct: None,
            rate_reset_step_pp: 0.0,
            rate_shock_enabled: false,
            rate_shock_start_year: 5,
            rate_shock_duration_years: 5,
            rate_shock_pp: 0.0,

            crisis_enabled: false,
            crisis_year: 5.0,
            crisis_stock_dd: 0.30,
            crisis_house_dd: 0.20,
            crisis_duration_months: 1,

            special_assessment_amount: 0.0,
            special_assessment_month: 0,

            assume_sale_end: true,
            show_liquidation_view: false,
            is_principal_residence: true,
            cg_tax_end_pct: 22.5,
            cg_inclusion_policy: CgInclusionPolicy::Current,
            cg_inclusion_threshold: 250_000.0,
            sell_cost: 0.05,
            home_sale_legal_fee: 1_500.0,

            reg_shelter_enabled: false,
            reg_initial_room: 0.0,
            reg_annual_room: 0.0,

            investment_tax_mode: InvestmentTaxMode::PreTax,
            tax_r_pct: 0.0,

            prop_tax_growth_model: PropTaxModel::Hybrid,
            prop_tax_hybrid_addon_pct: 0.5,

            discount_rate: 0.0,

            province: "ON".to_string(),
            down_payment_source: DownPaymentSource::Traditional,
            asof_date: None,
            first_time_buyer: false,
            in_toronto: true,
        }
    }
}

impl ScenarioConfig {
    /// Rescale percent-like magnitudes accidentally supplied as
    /// percentage-points. Returns the names of corrected fields so the
    /// engine can surface them as diagnostics.
    pub fn normalize_units(&mut self) -> Vec<String> {
        let mut corrected = Vec::new();
        if self.general_inf.abs() > 1.0 {
            self.general_inf /= 100.0;
            corrected.push("general_inf".to_string());
        }
        if self.ret_std > 1.0 {
            self.ret_std /= 100.0;
            corrected.push("ret_std".to_string());
        }
        if self.apprec_std > 1.0 {
            self.apprec_std /= 100.0;
            corrected.push("apprec_std".to_string());
        }
        corrected
    }

    /// Effective annual rent inflation after the rent-control cap.
    pub fn effective_rent_inf(&self) -> f64 {
        let mut r = self.rent_inf;
        if self.rent_control_enabled {
            if let Some(cap) = self.rent_control_cap {
                r = r.min(cap);
            }
        }
        if r <= -1.0 {
            r = -0.99;
        }
        r
    }

    /// Rent increase cadence, floored at annual; only meaningful when rent
    /// control is enabled.
    pub fn effective_rent_step_years(&self) -> u32 {
        if self.rent_control_enabled {
            self.rent_control_frequency_years.clamp(1, 10)
        } else {
            1
        }
    }

    /// Rough land-transfer-plus-legal closing-cost estimate, used by the CLI
    /// when no explicit closing figure is configured.
    pub fn closing_costs_estimate(&self) -> f64 {
        let ltt = crate::policy::transfer_tax(self.price, self.first_time_buyer, self.in_toronto);
        ltt.total + self.home_sale_legal_fee + self.premium_sales_tax
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        let cfg: ScenarioConfig = toml::from_str(&text)?;
        Ok(cfg)
    }

    /// Adapter for legacy flat string-keyed scenario maps. Unknown keys are
    /// ignored; recognized keys are coerced with the same leniency the old
    /// engine applied. Returns the config plus any unit corrections made.
    pub fn from_legacy_map(map: &HashMap<String, serde_json::Value>) -> (Self, Vec<String>) {
        fn f(map: &HashMap<String, serde_json::Value>, key: &str, default: f64) -> f64 {
            match map.get(key) {
                Some(v) => v
                    .as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                    .unwrap_or(default),
                None => default,
            }
        }
        fn i(map: &HashMap<String, serde_json::Value>, key: &str, default: u32) -> u32 {
            f(map, key, default as f64).max(0.0) as u32
        }
        fn b(map: &HashMap<String, serde_json::Value>, key: &str, default: bool) -> bool {
            match map.get(key) {
                Some(v) => v.as_bool().unwrap_or(default),
                None => default,
            }
        }
        fn s(map: &HashMap<String, serde_json::Value>, key: &str) -> Option<String> {
            map.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
        }

        let d = ScenarioConfig::default();
        let mut cfg = ScenarioConfig {
            years: i(map, "years", d.years).max(1),
            price: f(map, "price", d.price),
            down: f(map, "down", d.down),
            close: f(map, "close", d.close),
            premium_sales_tax: f(map, "pst", 0.0),
            mort: f(map, "mort", d.mort),
            amort_months: i(map, "nm", d.amort_months).max(1),
            rate_pct: f(map, "rate", d.rate_pct),
            canadian_compounding: b(map, "canadian_compounding", true),
            rent: f(map, "rent", d.rent),
            rent_inf: f(map, "rent_inf", d.rent_inf),
            rent_control_enabled: b(map, "rent_control_enabled", false),
            rent_control_cap: map.get("rent_control_cap").and_then(|v| v.as_f64()),
            rent_control_frequency_years: i(map, "rent_control_frequency_years", 1),
            p_tax_rate: f(map, "p_tax_rate", d.p_tax_rate),
            maint_rate: f(map, "maint_rate", d.maint_rate),
            repair_rate: f(map, "repair_rate", d.repair_rate),
            condo: f(map, "condo", d.condo),
            h_ins: f(map, "h_ins", d.h_ins),
            o_util: f(map, "o_util", d.o_util),
            r_ins: f(map, "r_ins", d.r_ins),
            r_util: f(map, "r_util", d.r_util),
            moving_cost: f(map, "moving_cost", d.moving_cost),
            moving_freq: f(map, "moving_freq", d.moving_freq),
            general_inf: f(map, "general_inf", d.general_inf),
            condo_inf: f(map, "condo_inf", d.condo_inf),
            ret_std: f(map, "ret_std", d.ret_std),
            apprec_std: f(map, "apprec_std", d.apprec_std),
            use_volatility: b(map, "use_volatility", false),
            num_sims: i(map, "num_sims", d.num_sims),
            vectorized_mc: b(map, "vectorized_mc", true),
            vectorized_mc_mem_ceiling_bytes: f(
                map,
                "vectorized_mc_mem_ceiling_bytes",
                d.vectorized_mc_mem_ceiling_bytes as f64,
            ) as u64,
            rate_mode: match s(map, "rate_mode").as_deref() {
                Some(m) if m.starts_with("Reset") => RateMode::ResetEveryNYears,
                _ => RateMode::Fixed,
            },
            rate_reset_years: map
                .get("rate_reset_years_eff")
                .and_then(|v| v.as_f64())
                .map(|v| v.max(0.0) as u32),
            rate_reset_to_pct: map.get("rate_reset_to_eff").and_then(|v| v.as_f64()),
            rate_reset_step_pp: f(map, "rate_reset_step_pp_eff", 0.0),
            rate_shock_enabled: b(map, "rate_shock_enabled_eff", false),
            rate_shock_start_year: i(map, "rate_shock_start_year_eff", 5),
            rate_shock_duration_years: i(map, "rate_shock_duration_years_eff", 5),
            rate_shock_pp: f(map, "rate_shock_pp_eff", 0.0),
            crisis_enabled: b(map, "crisis_enabled", false),
            crisis_year: f(map, "crisis_year", 5.0),
            crisis_stock_dd: f(map, "crisis_stock_dd", 0.30),
            crisis_house_dd: f(map, "crisis_house_dd", 0.20),
            crisis_duration_months: i(map, "crisis_duration_months", 1),
            special_assessment_amount: f(map, "special_assessment_amount", 0.0),
            special_assessment_month: i(map, "special_assessment_month", 0),
            assume_sale_end: b(map, "assume_sale_end", false),
            show_liquidation_view: b(map, "show_liquidation_view", false),
            is_principal_residence: b(map, "is_principal_residence", true),
            cg_tax_end_pct: f(map, "cg_tax_end", 0.0),
            cg_inclusion_policy: match s(map, "cg_inclusion_policy").as_deref() {
                Some(p)
                    if matches!(
                        p.trim().to_ascii_lowercase().as_str(),
                        "tiered" | "tiered_50_66" | "proposed" | "proposed_2_3_over_250k"
                            | "hypothetical"
                    ) =>
                {
                    CgInclusionPolicy::Tiered
                }
                _ => CgInclusionPolicy::Current,
            },
            cg_inclusion_threshold: f(map, "cg_inclusion_threshold", 250_000.0),
            sell_cost: f(map, "sell_cost", 0.0),
            home_sale_legal_fee: f(map, "home_sale_legal_fee", 0.0),
            reg_shelter_enabled: b(map, "reg_shelter_enabled", false),
            reg_initial_room: f(map, "reg_initial_room", 0.0),
            reg_annual_room: f(map, "reg_annual_room", 0.0),
            investment_tax_mode: match s(map, "investment_tax_mode").as_deref() {
                Some(m) if m.starts_with("Annual") => InvestmentTaxMode::AnnualDrag,
                Some(m) if m.starts_with("Deferred") => InvestmentTaxMode::DeferredCapitalGains,
                _ => InvestmentTaxMode::PreTax,
            },
            tax_r_pct: f(map, "tax_r", 0.0),
            prop_tax_growth_model: match s(map, "prop_tax_growth_model").as_deref() {
                Some(m) if m.starts_with("Market") => PropTaxModel::MarketValue,
                Some(m) if m.starts_with("Inflation") => PropTaxModel::Inflation,
                _ => PropTaxModel::Hybrid,
            },
            prop_tax_hybrid_addon_pct: f(map, "prop_tax_hybrid_addon_pct", 0.5),
            discount_rate: f(map, "discount_rate", 0.0),
            province: s(map, "province").unwrap_or_else(|| d.province.clone()),
            down_payment_source: match s(map, "down_payment_source").as_deref() {
                Some(v) if v.trim().eq_ignore_ascii_case("non-traditional") => {
                    DownPaymentSource::NonTraditional
                }
                _ => DownPaymentSource::Traditional,
            },
            asof_date: s(map, "asof_date")
                .and_then(|v| NaiveDate::parse_from_str(&v[..v.len().min(10)], "%Y-%m-%d").ok()),
            first_time_buyer: b(map, "first_time_buyer", false),
            in_toronto: b(map, "in_toronto", false),
        };

        let corrections = cfg.normalize_units();
        (cfg, corrections)
    }
}

/// Per-invocation scalars not stored in [`ScenarioConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParams {
    /// Buyer expected annual investment return (%).
    pub buyer_ret_pct: f64,
    /// Renter expected annual investment return (%).
    pub renter_ret_pct: f64,
    /// Expected annual home appreciation (%).
    pub apprec_pct: f64,
    /// Correlation between stock and housing shocks, in [-1, 1].
    pub mkt_corr: f64,
    /// Monthly surplus/deficit handling.
    pub surplus: SurplusMode,
    /// Renter also invests the avoided closing costs up front.
    pub rent_closing: bool,
    /// Random seed. `None` draws from entropy (non-reproducible).
    pub seed: Option<u64>,
    /// Overrides the config trial count when set.
    pub num_sims_override: Option<u32>,
    /// Force the deterministic single path even when volatility is on.
    pub force_deterministic: bool,
    /// Force volatility on/off regardless of the config flag.
    pub force_use_volatility: Option<bool>,
    /// Skip full path storage; terminal statistics only.
    pub summary_only: bool,
}

impl Default for RunParams {
    fn default() -> Self {
        RunParams {
            buyer_ret_pct: 6.0,
            renter_ret_pct: 6.0,
            apprec_pct: 3.0,
            mkt_corr: 0.3,
            surplus: SurplusMode::InvestDiff,
            rent_closing: true,
            seed: Some(42),
            num_sims_override: None,
            force_deterministic: false,
            force_use_volatility: None,
            summary_only: false,
        }
    }
}

/// Per-evaluation scenario perturbation. Every field is optional; applying
/// an override never touches the base config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub price: Option<f64>,
    pub down: Option<f64>,
    /// Down payment as a fraction (0-1) or percent (0-100) of price; ignored
    /// when `down` is set.
    pub down_pct: Option<f64>,
    /// Nominal annual mortgage rate (%).
    pub rate_pct: Option<f64>,
    pub rent: Option<f64>,
    /// Annual rent inflation in percent points (3.0 == 3%).
    pub rent_inf_pct: Option<f64>,
    pub sell_cost: Option<f64>,
    pub p_tax_rate: Option<f64>,
    pub maint_rate: Option<f64>,
    pub repair_rate: Option<f64>,
    pub condo: Option<f64>,
    pub h_ins: Option<f64>,
    pub o_util: Option<f64>,
    pub r_ins: Option<f64>,
    pub r_util: Option<f64>,
    pub moving_cost: Option<f64>,
    pub moving_freq: Option<f64>,
    pub asof_date: Option<NaiveDate>,
    pub province: Option<String>,
    pub down_payment_source: Option<DownPaymentSource>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        *self == Overrides::default()
    }

    /// True when the loan/premium must be re-derived through policy.
    pub fn touches_financing(&self) -> bool {
        self.price.is_some() || self.down.is_some() || self.down_pct.is_some()
    }
}

/// Scheduled mortgage renewals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateResetPlan {
    pub every_months: u32,
    pub reset_to_pct: f64,
    pub step_pp: f64,
}

/// Bounded-duration additive rate shock, in months (1-based, inclusive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateShockPlan {
    pub start_month: u32,
    pub end_month: u32,
    pub pp: f64,
}

impl RateShockPlan {
    pub fn active(&self, month: u32) -> bool {
        self.start_month <= month && month <= self.end_month
    }
}

/// Crisis drawdown window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrisisPlan {
    pub start_month: u32,
    pub duration_months: u32,
    pub stock_dd: f64,
    pub house_dd: f64,
}

impl CrisisPlan {
    pub fn active(&self, month: u32) -> bool {
        self.start_month <= month && month < self.start_month + self.duration_months
    }
}

/// Terminal liquidation knobs, resolved once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidationPlan {
    /// Effective CG rate on investment gains (decimal); zeroed under
    /// annual-drag mode to avoid taxing twice.
    pub eff_cg_rate: f64,
    /// CG rate applied to a non-principal-residence home sale. Not zeroed
    /// by annual-drag mode, which only covers portfolio returns.
    pub home_cg_rate: f64,
    pub policy: CgInclusionPolicy,
    pub threshold: f64,
    pub shelter_enabled: bool,
    pub initial_room: f64,
    pub annual_room: f64,
    pub is_principal_residence: bool,
}

/// Fully-resolved per-evaluation inputs: the orchestrator derives these once
/// from config + params + overrides, and the simulators consume them without
/// further lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct SimInputs {
    pub years: u32,
    pub months: u32,

    /// Monthly log drifts (post tax-drag), before the -sigma^2/2 adjustment.
    pub buyer_drift: f64,
    pub renter_drift: f64,
    /// Annual home appreciation (decimal).
    pub apprec_annual: f64,

    pub mr_init: f64,
    pub amort_months: u32,
    pub pmt_init: f64,
    pub rate_nominal_pct: f64,
    pub canadian_compounding: bool,

    pub down: f64,
    pub close: f64,
    pub mort: f64,
    pub price: f64,
    pub rent: f64,

    pub p_tax_rate: f64,
    pub maint_rate: f64,
    pub repair_rate: f64,
    pub condo: f64,
    pub h_ins: f64,
    pub o_util: f64,
    pub r_ins: f64,
    pub r_util: f64,
    pub sell_cost: f64,
    pub home_sale_legal_fee: f64,

    /// Effective annual rent inflation (post rent-control cap).
    pub rent_inf: f64,
    pub rent_step_years: u32,
    pub moving_cost: f64,
    pub moving_freq_years: f64,

    /// Monthly effective general / condo inflation.
    pub inf_mo: f64,
    pub condo_inf_mo: f64,
    /// Hybrid assessment cap add-on, monthly effective.
    pub prop_tax_addon_mo: f64,
    pub prop_tax_model: PropTaxModel,

    /// Monthly volatilities (annual / sqrt(12)).
    pub ret_sigma_mo: f64,
    pub app_sigma_mo: f64,
    pub mkt_corr: f64,

    pub surplus: SurplusMode,
    pub rent_closing: bool,

    pub rate_reset: Option<RateResetPlan>,
    pub rate_shock: Option<RateShockPlan>,
    pub crisis: Option<CrisisPlan>,
    /// (month, amount); month 0 means never.
    pub special_assessment: (u32, f64),

    pub assume_sale_end: bool,
    pub show_liquidation: bool,
    pub liq: LiquidationPlan,
}

impl SimInputs {
    /// Monthly log mean for buyer/renter/home growth with the risk-neutral
    /// -sigma^2/2 adjustment applied.
    pub fn buyer_mu(&self) -> f64 {
        self.buyer_drift - 0.5 * self.ret_sigma_mo * self.ret_sigma_mo
    }

    pub fn renter_mu(&self) -> f64 {
        self.renter_drift - 0.5 * self.ret_sigma_mo * self.ret_sigma_mo
    }

    pub fn home_mu(&self) -> f64 {
        crate::mortgage::monthly_log_drift(self.apprec_annual)
            - 0.5 * self.app_sigma_mo * self.app_sigma_mo
    }

    /// Both volatilities zero: the stochastic run collapses to the
    /// deterministic exponential.
    pub fn degenerate(&self) -> bool {
        self.ret_sigma_mo <= 0.0 && self.app_sigma_mo <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_guard_rescales_percent_points() {
        let mut cfg = ScenarioConfig {
            general_inf: 2.5,
            ret_std: 15.0,
            apprec_std: 6.0,
            ..ScenarioConfig::default()
        };
        let corrected = cfg.normalize_units();
        assert_eq!(corrected, vec!["general_inf", "ret_std", "apprec_std"]);
        assert!((cfg.general_inf - 0.025).abs() < 1e-12);
        assert!((cfg.ret_std - 0.15).abs() < 1e-12);
        assert!((cfg.apprec_std - 0.06).abs() < 1e-12);
    }

    #[test]
    fn unit_guard_leaves_decimals_alone() {
        let mut cfg = ScenarioConfig::default();
        assert!(cfg.normalize_units().is_empty());
    }

    #[test]
    fn rent_control_caps_effective_inflation() {
        let cfg = ScenarioConfig {
            rent_inf: 0.03,
            rent_control_enabled: true,
            rent_control_cap: Some(0.02),
            rent_control_frequency_years: 3,
            ..ScenarioConfig::default()
        };
        assert!((cfg.effective_rent_inf() - 0.02).abs() < 1e-12);
        assert_eq!(cfg.effective_rent_step_years(), 3);

        let off = ScenarioConfig {
            rent_control_frequency_years: 3,
            ..ScenarioConfig::default()
        };
        assert_eq!(off.effective_rent_step_years(), 1);
    }

    #[test]
    fn legacy_map_adapter() {
        let mut map = HashMap::new();
        map.insert("price".to_string(), json!(950_000.0));
        map.insert("years".to_string(), json!(10));
        map.insert("rate".to_string(), json!("4.5"));
        map.insert("general_inf".to_string(), json!(2.1));
        map.insert("rate_mode".to_string(), json!("Reset every N years"));
        map.insert("rate_reset_years_eff".to_string(), json!(5.0));
        map.insert("rate_reset_to_eff".to_string(), json!(6.0));
        map.insert(
            "prop_tax_growth_model".to_string(),
            json!("Market value (track appreciation)"),
        );
        map.insert(
            "investment_tax_mode".to_string(),
            json!("Annual return drag"),
        );

        let (cfg, corrected) = ScenarioConfig::from_legacy_map(&map);
        assert_eq!(cfg.price, 950_000.0);
        assert_eq!(cfg.years, 10);
        assert_eq!(cfg.rate_pct, 4.5);
        assert_eq!(corrected, vec!["general_inf"]);
        assert!((cfg.general_inf - 0.021).abs() < 1e-12);
        assert_eq!(cfg.rate_mode, RateMode::ResetEveryNYears);
        assert_eq!(cfg.rate_reset_years, Some(5));
        assert_eq!(cfg.prop_tax_growth_model, PropTaxModel::MarketValue);
        assert_eq!(cfg.investment_tax_mode, InvestmentTaxMode::AnnualDrag);
    }
}
