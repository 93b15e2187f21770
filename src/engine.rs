//! Scenario orchestration: resolve config + overrides into simulator
//! inputs, pick an engine, and assemble the result envelope.
//!
//! Nothing here mutates the caller's config. Per-evaluation changes come in
//! through [`Overrides`] and are resolved into a fresh [`SimInputs`].

use chrono::Local;

use crate::config::{
    CrisisPlan, InvestmentTaxMode, LiquidationPlan, Overrides, RateMode, RateResetPlan,
    RateShockPlan, RunParams, ScenarioConfig, SimInputs,
};
use crate::ledger::{Diagnostics, EngineKind, SimulationResult};
use crate::monte_carlo;
use crate::mortgage;
use crate::policy;
use crate::single_path;

/// Multiplier applied to annual returns under the annual-drag tax mode.
pub fn annual_return_drag(cfg: &ScenarioConfig) -> f64 {
    if cfg.investment_tax_mode == InvestmentTaxMode::AnnualDrag && cfg.tax_r_pct > 0.0 {
        (1.0 - cfg.tax_r_pct / 100.0).max(0.0)
    } else {
        1.0
    }
}

/// Resolve the baseline config, run parameters and overrides into the flat
/// scalar inputs the simulators consume. Returns the inputs plus a
/// diagnostics record seeded with any unit corrections.
pub fn resolve_inputs(
    cfg: &ScenarioConfig,
    params: &RunParams,
    overrides: &Overrides,
) -> (SimInputs, Diagnostics) {
    let mut cfg = cfg.clone();
    let mut diag = Diagnostics {
        seed: params.seed,
        ..Diagnostics::default()
    };
    diag.autonormalized = cfg.normalize_units();

    // Annual return drag applies equally to both portfolios.
    let drag = annual_return_drag(&cfg);
    let buyer_drift = mortgage::monthly_log_drift_pct(params.buyer_ret_pct * drag);
    let renter_drift = mortgage::monthly_log_drift_pct(params.renter_ret_pct * drag);

    let price = overrides.price.unwrap_or(cfg.price);
    let rent = overrides.rent.unwrap_or(cfg.rent);
    let mut down = overrides.down.unwrap_or(cfg.down);
    if overrides.down.is_none() {
        if let Some(dp) = overrides.down_pct {
            // Accept either a 0-1 fraction or a 0-100 percent.
            down = if dp <= 1.0 { dp * price } else { dp / 100.0 * price };
        }
    }
    down = if price > 0.0 {
        down.clamp(0.0, price)
    } else {
        down.max(0.0)
    };

    let rate_pct = overrides.rate_pct.unwrap_or(cfg.rate_pct);
    let sell_cost = overrides.sell_cost.unwrap_or(cfg.sell_cost);
    let p_tax_rate = overrides.p_tax_rate.unwrap_or(cfg.p_tax_rate);
    let maint_rate = overrides.maint_rate.unwrap_or(cfg.maint_rate);
    let repair_rate = overrides.repair_rate.unwrap_or(cfg.repair_rate);
    let condo = overrides.condo.unwrap_or(cfg.condo);
    let h_ins = overrides.h_ins.unwrap_or(cfg.h_ins);
    let o_util = overrides.o_util.unwrap_or(cfg.o_util);
    let r_ins = overrides.r_ins.unwrap_or(cfg.r_ins);
    let r_util = overrides.r_util.unwrap_or(cfg.r_util);
    let moving_cost = overrides.moving_cost.unwrap_or(cfg.moving_cost);
    let moving_freq = overrides.moving_freq.unwrap_or(cfg.moving_freq);

    // Re-derive the loan and insurance premium whenever price or down
    // payment change; the configured principal no longer applies.
    let mut mort = cfg.mort;
    let mut close = cfg.close;
    if overrides.touches_financing() {
        let loan = (price - down).max(0.0);
        let ltv = if price > 0.0 { loan / price } else { 0.0 };
        let asof = overrides
            .asof_date
            .or(cfg.asof_date)
            .unwrap_or_else(|| Local::now().date_naive());

        let price_cap = policy::insured_mortgage_price_cap(asof);
        let min_down = policy::min_down_payment(price, asof);
        let eligible = price > 0.0 && ltv > 0.80 && price < price_cap && down + 1e-9 >= min_down;

        let mut premium = 0.0;
        let mut premium_pst = 0.0;
        if eligible {
            let source = overrides
                .down_payment_source
                .unwrap_or(cfg.down_payment_source);
            premium = loan * policy::insurance_premium_rate(ltv, source);
            let province = overrides.province.as_deref().unwrap_or(&cfg.province);
            premium_pst = premium * policy::insurance_sales_tax_rate(province, asof);
        }

        // The configured closing figure already includes premium sales tax;
        // strip it before adding the recomputed one.
        close = (cfg.close - cfg.premium_sales_tax) + premium_pst;
        mort = loan + premium;
    }

    let mr = mortgage::monthly_rate(rate_pct, cfg.canadian_compounding);
    let nm = cfg.amort_months.max(1);
    let pmt = if mort > 0.0 {
        mortgage::payment(mort, mr, nm)
    } else {
        0.0
    };

    let mut rent_inf = overrides
        .rent_inf_pct
        .map(|p| p / 100.0)
        .unwrap_or(cfg.rent_inf);
    if cfg.rent_control_enabled {
        if let Some(cap) = cfg.rent_control_cap {
            rent_inf = rent_inf.min(cap);
        }
    }
    if rent_inf <= -1.0 {
        rent_inf = -0.99;
    }

    // Volatility inputs accidentally expressed as percent points.
    let mut ret_std = cfg.ret_std;
    if ret_std > 2.0 {
        ret_std /= 100.0;
        diag.autonormalized.push("ret_std".to_string());
    }
    let mut apprec_std = cfg.apprec_std;
    if apprec_std > 2.0 {
        apprec_std /= 100.0;
        diag.autonormalized.push("apprec_std".to_string());
    }

    let rate_reset = match (cfg.rate_mode, cfg.rate_reset_years, cfg.rate_reset_to_pct) {
        (RateMode::ResetEveryNYears, Some(years), Some(to_pct)) if years > 0 => {
            Some(RateResetPlan {
                every_months: years * 12,
                reset_to_pct: to_pct,
                step_pp: cfg.rate_reset_step_pp,
            })
        }
        _ => None,
    };
    let rate_shock = if cfg.rate_shock_enabled && cfg.rate_shock_pp != 0.0 {
        let start = cfg.rate_shock_start_year * 12 + 1;
        Some(RateShockPlan {
            start_month: start,
            end_month: start + cfg.rate_shock_duration_years.max(0) * 12 - 1,
            pp: cfg.rate_shock_pp,
        })
    } else {
        None
    };
    let crisis = if cfg.crisis_enabled {
        Some(CrisisPlan {
            start_month: (cfg.crisis_year.max(1.0) * 12.0) as u32,
            duration_months: cfg.crisis_duration_months.max(1),
            stock_dd: cfg.crisis_stock_dd,
            house_dd: cfg.crisis_house_dd,
        })
    } else {
        None
    };

    let eff_cg = (cfg.cg_tax_end_pct / 100.0).max(0.0);
    let liq = LiquidationPlan {
        eff_cg_rate: if cfg.investment_tax_mode == InvestmentTaxMode::AnnualDrag {
            0.0
        } else {
            eff_cg
        },
        home_cg_rate: eff_cg,
        policy: cfg.cg_inclusion_policy,
        threshold: cfg.cg_inclusion_threshold,
        shelter_enabled: cfg.reg_shelter_enabled,
        initial_room: cfg.reg_initial_room,
        annual_room: cfg.reg_annual_room,
        is_principal_residence: cfg.is_principal_residence,
    };

    let years = cfg.years.max(1);
    let surplus = match params.surplus.clone() {
        crate::config::SurplusMode::Budget {
            monthly_income,
            monthly_nonhousing,
            income_growth_pct,
            allow_withdraw,
        } => crate::config::SurplusMode::Budget {
            monthly_income: monthly_income.max(0.0),
            monthly_nonhousing: monthly_nonhousing.max(0.0),
            income_growth_pct,
            allow_withdraw,
        },
        other => other,
    };

    let inputs = SimInputs {
        years,
        months: years * 12,
        buyer_drift,
        renter_drift,
        apprec_annual: params.apprec_pct / 100.0,
        mr_init: mr,
        amort_months: nm,
        pmt_init: pmt,
        rate_nominal_pct: rate_pct,
        canadian_compounding: cfg.canadian_compounding,
        down,
        close,
        mort,
        price,
        rent,
        p_tax_rate,
        maint_rate,
        repair_rate,
        condo,
        h_ins,
        o_util,
        r_ins,
        r_util,
        sell_cost,
        home_sale_legal_fee: cfg.home_sale_legal_fee,
        rent_inf,
        rent_step_years: cfg.effective_rent_step_years(),
        moving_cost,
        moving_freq_years: moving_freq,
        inf_mo: mortgage::monthly_effective(cfg.general_inf),
        condo_inf_mo: mortgage::monthly_effective(cfg.condo_inf),
        prop_tax_addon_mo: (1.0 + cfg.prop_tax_hybrid_addon_pct / 100.0).powf(1.0 / 12.0) - 1.0,
        prop_tax_model: cfg.prop_tax_growth_model,
        ret_sigma_mo: if ret_std > 0.0 {
            ret_std / 12f64.sqrt()
        } else {
            0.0
        },
        app_sigma_mo: if apprec_std > 0.0 {
            apprec_std / 12f64.sqrt()
        } else {
            0.0
        },
        mkt_corr: params.mkt_corr,
        surplus,
        rent_closing: params.rent_closing,
        rate_reset,
        rate_shock,
        crisis,
        special_assessment: (cfg.special_assessment_month, cfg.special_assessment_amount),
        assume_sale_end: cfg.assume_sale_end,
        show_liquidation: cfg.show_liquidation_view,
        liq,
    };

    (inputs, diag)
}

/// Monthly discount rate from the config, with the percent-points guard.
pub fn monthly_discount(cfg: &ScenarioConfig, diag: &mut Diagnostics) -> f64 {
    let mut disc = cfg.discount_rate;
    if disc > 1.0 {
        disc /= 100.0;
        diag.autonormalized.push("discount_rate".to_string());
    }
    mortgage::monthly_effective(disc)
}

/// Run one scenario end to end: resolve inputs, dispatch to the right
/// engine, attach present-value columns and diagnostics.
pub fn run_scenario(
    cfg: &ScenarioConfig,
    params: &RunParams,
    overrides: &Overrides,
    progress: Option<&mut dyn FnMut(u32, u32)>,
) -> SimulationResult {
    let (inp, mut diag) = resolve_inputs(cfg, params, overrides);
    let disc_mo = monthly_discount(cfg, &mut diag);

    let use_vol = params.force_use_volatility.unwrap_or(cfg.use_volatility);
    let trials = params.num_sims_override.unwrap_or(cfg.num_sims);
    let is_mc = use_vol && !params.force_deterministic && trials > 1;

    let mut result = if is_mc {
        diag.trials = trials;
        diag.summary_only = params.summary_only;
        let mem_est = monte_carlo::estimate_path_bytes(trials, inp.months);
        diag.mem_estimate_bytes = mem_est;

        let outcome = if cfg.vectorized_mc && mem_est <= cfg.vectorized_mc_mem_ceiling_bytes {
            diag.engine = EngineKind::Vectorized;
            monte_carlo::run_vectorized(&inp, trials, params.seed, params.summary_only, None, progress)
        } else {
            diag.engine = EngineKind::PerTrial;
            monte_carlo::run_per_trial(&inp, trials, params.seed, progress)
        };

        if let Some(check) = outcome.degenerate_check {
            if !check.passed {
                diag.note("Degenerate Monte Carlo diverged from the deterministic path.");
            }
            diag.degenerate_check = Some(check);
        }
        if outcome.nonfinite_paths > 0 {
            diag.note(format!(
                "Non-finite values detected in Monte Carlo paths (count={}).",
                outcome.nonfinite_paths
            ));
        }
        if outcome.win_rate_pct.is_none() {
            if outcome.finite_terminals == 0 {
                diag.note("No finite simulations for win% calculation (check extreme inputs).");
            } else {
                diag.note("Win% unavailable (non-finite or invalid).");
            }
        }

        SimulationResult {
            rows: outcome.rows,
            win_rate_pct: outcome.win_rate_pct,
            liquidation: outcome.liquidation,
            ..SimulationResult::default()
        }
    } else {
        diag.engine = EngineKind::Deterministic;
        diag.trials = 1;
        let outcome = single_path::simulate_single(&inp, None);
        SimulationResult {
            rows: outcome.rows,
            win_rate_pct: None,
            liquidation: outcome.liquidation,
            ..SimulationResult::default()
        }
    };

    for row in result.rows.iter_mut() {
        let pv = if disc_mo != 0.0 {
            row.delta / (1.0 + disc_mo).powi(row.month as i32)
        } else {
            row.delta
        };
        row.delta_pv = Some(pv);
    }

    result.payment_initial = inp.pmt_init;
    result.cash_to_close = inp.down + inp.close;
    if let Some(last) = result.rows.last() {
        result.final_buyer_nw = last.buyer_net_worth;
        result.final_renter_nw = last.renter_net_worth;
    }
    result.diagnostics = diag;
    result
}
