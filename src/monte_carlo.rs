//! Monte Carlo simulation across trials.
//!
//! `run_vectorized` keeps one f64 state slot per trial and walks all trials
//! month by month, storing only the random-dependent paths as f32 to keep
//! memory in check. Deterministic series (rent, insurance, the scalar
//! mortgage schedule) are stored once. `run_per_trial` is the fallback used
//! when the path arrays would exceed the memory ceiling; it replays the
//! single-path simulator per trial off one shared shock stream.

use crate::config::{PropTaxModel, SimInputs, SurplusMode};
use crate::ledger::{DegenerateCheck, LedgerRow, LiquidationSummary};
use crate::liquidation;
use crate::mortgage;
use crate::single_path::simulate_single;
use crate::stats;
use crate::stochastic::{growth_factor, ShockGenerator, ShockMatrices};

/// Stored f32 path arrays per trial in full-output mode.
const PATH_ARRAYS: u64 = 8;

/// Estimated bytes of per-trial path storage for full-output vectorized MC.
pub fn estimate_path_bytes(trials: u32, months: u32) -> u64 {
    PATH_ARRAYS * trials as u64 * months as u64 * 4
}

/// Aggregated Monte Carlo outcome.
pub struct McOutcome {
    /// Monthly ledger with medians in the main columns and 5/95 bands in
    /// the optional ones. Summary-only mode yields a single terminal row.
    pub rows: Vec<LedgerRow>,
    pub win_rate_pct: Option<f64>,
    pub liquidation: Option<LiquidationSummary>,
    /// Per-trial terminal pre-tax net worths.
    pub terminal_buyer: Vec<f64>,
    pub terminal_renter: Vec<f64>,
    pub degenerate_check: Option<DegenerateCheck>,
    /// Non-finite entries observed across stored paths.
    pub nonfinite_paths: u64,
    pub finite_terminals: u32,
}

/// Month-major f32 path storage.
struct PathMatrix {
    trials: usize,
    data: Vec<f32>,
}

impl PathMatrix {
    fn new(months: usize, trials: usize) -> Self {
        PathMatrix {
            trials,
            data: vec![0.0; months * trials],
        }
    }

    fn row_mut(&mut self, month: usize) -> &mut [f32] {
        let base = (month - 1) * self.trials;
        &mut self.data[base..base + self.trials]
    }

    fn row_f64(&self, month: usize) -> Vec<f64> {
        let base = (month - 1) * self.trials;
        self.data[base..base + self.trials]
            .iter()
            .map(|&x| x as f64)
            .collect()
    }

    fn nonfinite(&self) -> u64 {
        self.data.iter().filter(|x| !x.is_finite()).count() as u64
    }
}

fn budget_apply(nw: &mut f64, basis: &mut f64, net: f64, allow_withdraw: bool) {
    if net >= 0.0 {
        *nw += net;
        *basis += net;
        return;
    }
    if !allow_withdraw {
        // Shortfalls are not tracked across trials; the portfolio is simply
        // left alone.
        return;
    }
    let need = -net;
    if *nw >= need {
        if *nw > 0.0 {
            *basis *= ((*nw - need) / *nw).max(0.0);
        }
        *nw -= need;
    } else {
        *basis = 0.0;
        *nw = 0.0;
    }
}

/// Vectorized Monte Carlo over `trials` paths.
///
/// `shocks` supplies a precomputed shock stream (shared random numbers for
/// grid sweeps); otherwise a generator is seeded from `seed`. The progress
/// callback is invoked roughly a hundred times over the run.
pub fn run_vectorized(
    inp: &SimInputs,
    trials: u32,
    seed: Option<u64>,
    summary_only: bool,
    shocks: Option<&ShockMatrices>,
    mut progress: Option<&mut dyn FnMut(u32, u32)>,
) -> McOutcome {
    let months = inp.months.max(1);
    let n = trials.max(1) as usize;
    let stochastic = inp.ret_sigma_mo > 0.0 || inp.app_sigma_mo > 0.0;
    let degenerate = !stochastic;

    let init_r = if inp.rent_closing {
        inp.down + inp.close
    } else {
        inp.down
    };
    let mut r_nw = vec![init_r; n];
    let mut b_nw = vec![0.0f64; n];
    let mut r_cash = vec![0.0f64; n];
    let mut b_cash = vec![0.0f64; n];
    let mut r_basis = vec![init_r; n];
    let mut b_basis = vec![0.0f64; n];
    let mut c_home = vec![inp.price; n];
    let mut tax_base = vec![inp.price; n];
    let mut cum_b_op = vec![0.0f64; n];
    let mut b_val = vec![0.0f64; n];
    let mut cum_r_op = 0.0f64;

    // Scalars shared by every trial.
    let mut c_mort = inp.mort;
    let mut c_rent = inp.rent;
    let mut c_condo = inp.condo;
    let mut c_h_ins = inp.h_ins;
    let mut c_o_util = inp.o_util;
    let mut c_r_ins = inp.r_ins;
    let mut c_r_util = inp.r_util;
    let mut pmt = inp.pmt_init;
    let mut cur_rate_pct = inp.rate_nominal_pct;
    let mut shock_was_active = false;
    let mut next_move = inp.moving_freq_years * 12.0;

    let mut gen = ShockGenerator::new(seed, inp.mkt_corr);
    let mut shock_stock = vec![0.0f64; n];
    let mut shock_house = vec![0.0f64; n];

    // Full-output path storage.
    let mut paths = if summary_only {
        None
    } else {
        Some((
            PathMatrix::new(months as usize, n), // buyer nw
            PathMatrix::new(months as usize, n), // renter nw
            PathMatrix::new(months as usize, n), // buyer unrecoverable
            PathMatrix::new(months as usize, n), // property tax
            PathMatrix::new(months as usize, n), // maintenance
            PathMatrix::new(months as usize, n), // repairs
            PathMatrix::new(months as usize, n), // owner outflow
            PathMatrix::new(months as usize, n), // surplus gap
        ))
    };
    let mut det = if summary_only {
        None
    } else {
        Some(DetSeries::new(months as usize))
    };

    let buyer_mu = inp.buyer_mu();
    let renter_mu = inp.renter_mu();
    let home_mu = inp.home_mu();
    let prog_step = (months / 100).max(1);

    for m in 1..=months {
        let (b_growth_det, r_growth_det, home_growth_det);
        if stochastic {
            match shocks {
                Some(mat) => {
                    let (s_row, h_row) = mat.row(m);
                    for t in 0..n {
                        shock_stock[t] = s_row[t] as f64;
                        shock_house[t] = h_row[t] as f64;
                    }
                }
                None => gen.draw_row(&mut shock_stock, &mut shock_house),
            }
            b_growth_det = 0.0;
            r_growth_det = 0.0;
            home_growth_det = 0.0;
        } else {
            b_growth_det = inp.buyer_drift.exp();
            r_growth_det = inp.renter_drift.exp();
            home_growth_det = mortgage::monthly_log_drift(inp.apprec_annual).exp();
        }

        let mut rate_changed = false;
        if let Some(reset) = inp.rate_reset {
            let rm = reset.every_months;
            if rm > 0 && m > 1 && (m - 1) % rm == 0 {
                let reset_idx = (m - 1) / rm;
                cur_rate_pct =
                    reset.reset_to_pct + reset.step_pp * reset_idx.saturating_sub(1) as f64;
                rate_changed = true;
            }
        }
        let mut eff_nominal = cur_rate_pct;
        let mut shock_active = false;
        if let Some(s) = inp.rate_shock {
            shock_active = s.active(m);
            if shock_active {
                eff_nominal += s.pp;
            }
        }
        let mr = mortgage::monthly_rate(eff_nominal, inp.canadian_compounding);
        if rate_changed || shock_active != shock_was_active {
            let rem = inp.amort_months.saturating_sub(m - 1).max(1);
            pmt = mortgage::payment(c_mort, mr, rem);
        }
        shock_was_active = shock_active;

        let inte = if c_mort > 0.0 { c_mort * mr } else { 0.0 };
        let mut princ = if c_mort > 0.0 { pmt - inte } else { 0.0 };
        if princ > c_mort {
            princ = c_mort;
        }
        let pay = if c_mort > 0.0 { pmt } else { 0.0 };

        let (sa_month, sa_amount) = inp.special_assessment;
        let m_special = if sa_month > 0 && m == sa_month {
            sa_amount
        } else {
            0.0
        };

        let condo_paid = c_condo;
        let h_ins_paid = c_h_ins;
        let o_util_paid = c_o_util;
        let rent_paid = c_rent;
        let r_ins_paid = c_r_ins;
        let r_util_paid = c_r_util;

        let skip_last_move = inp.assume_sale_end && m == months;
        let move_due = (m as f64) == next_move;
        let m_moving = if move_due && !skip_last_move {
            inp.moving_cost
        } else {
            0.0
        };
        if move_due {
            next_move += inp.moving_freq_years * 12.0;
        }
        let r_out = c_rent + c_r_ins + c_r_util + m_moving;

        // Budget income is identical across trials within a month.
        let budget_net = match &inp.surplus {
            SurplusMode::Budget {
                monthly_income,
                monthly_nonhousing,
                income_growth_pct,
                ..
            } => {
                let g = (income_growth_pct / 100.0).max(-0.99);
                let inc = if g != 0.0 {
                    monthly_income * (1.0 + g).powf((m - 1) as f64 / 12.0)
                } else {
                    *monthly_income
                };
                Some((inc, inc - monthly_nonhousing - r_out))
            }
            _ => None,
        };

        let cap_mo = (1.0 + inp.inf_mo) * (1.0 + inp.prop_tax_addon_mo) - 1.0;
        let last = m == months;

        for t in 0..n {
            // Per-trial assessment base chases the per-trial home value.
            match inp.prop_tax_model {
                PropTaxModel::MarketValue => tax_base[t] = c_home[t],
                PropTaxModel::Inflation => tax_base[t] *= 1.0 + inp.inf_mo,
                PropTaxModel::Hybrid => {
                    if c_home[t] >= tax_base[t] {
                        tax_base[t] = (tax_base[t] * (1.0 + cap_mo)).min(c_home[t]);
                    } else {
                        tax_base[t] = (tax_base[t] / (1.0 + cap_mo)).max(c_home[t]);
                    }
                }
            }

            let m_tax = tax_base[t] * inp.p_tax_rate / 12.0;
            let m_maint = c_home[t] * inp.maint_rate / 12.0;
            let m_repair = c_home[t] * inp.repair_rate / 12.0;
            let b_out = pay
                + m_tax
                + m_maint
                + m_repair
                + condo_paid
                + h_ins_paid
                + o_util_paid
                + m_special;
            let b_op = inte
                + m_tax
                + m_maint
                + m_repair
                + condo_paid
                + h_ins_paid
                + o_util_paid
                + m_special;
            let diff = b_out - r_out;

            match &inp.surplus {
                SurplusMode::Budget {
                    monthly_income,
                    monthly_nonhousing,
                    allow_withdraw,
                    ..
                } => {
                    let (inc, r_net) = match budget_net {
                        Some(v) => v,
                        None => (*monthly_income, *monthly_income - monthly_nonhousing - r_out),
                    };
                    let b_net = inc - monthly_nonhousing - b_out;
                    budget_apply(&mut b_nw[t], &mut b_basis[t], b_net, *allow_withdraw);
                    budget_apply(&mut r_nw[t], &mut r_basis[t], r_net, *allow_withdraw);
                }
                SurplusMode::InvestDiff => {
                    if diff > 0.0 {
                        r_nw[t] += diff;
                        r_basis[t] += diff;
                    } else {
                        b_nw[t] += -diff;
                        b_basis[t] += -diff;
                    }
                }
                SurplusMode::TrackAsCash => {
                    if diff > 0.0 {
                        r_nw[t] += diff;
                        r_basis[t] += diff;
                        r_cash[t] += diff;
                    } else if diff < 0.0 {
                        b_nw[t] += -diff;
                        b_basis[t] += -diff;
                        b_cash[t] += -diff;
                    }
                }
            }

            let (b_growth, r_growth, home_growth) = if stochastic {
                (
                    growth_factor(buyer_mu, inp.ret_sigma_mo, shock_stock[t]),
                    growth_factor(renter_mu, inp.ret_sigma_mo, shock_stock[t]),
                    growth_factor(home_mu, inp.app_sigma_mo, shock_house[t]),
                )
            } else {
                (b_growth_det, r_growth_det, home_growth_det)
            };

            r_nw[t] = (r_nw[t] - r_cash[t]) * r_growth + r_cash[t];
            b_nw[t] = (b_nw[t] - b_cash[t]) * b_growth + b_cash[t];
            c_home[t] *= home_growth;

            if let Some(crisis) = inp.crisis {
                if crisis.active(m) {
                    let sdd = crisis.stock_dd.clamp(0.0, 0.95);
                    let hdd = crisis.house_dd.clamp(0.0, 0.95);
                    b_nw[t] = (b_nw[t] - b_cash[t]) * (1.0 - sdd) + b_cash[t];
                    r_nw[t] = (r_nw[t] - r_cash[t]) * (1.0 - sdd) + r_cash[t];
                    c_home[t] *= 1.0 - hdd;
                }
            }

            cum_b_op[t] += b_op;

            let exit_cost = if inp.assume_sale_end && last {
                c_home[t] * inp.sell_cost
            } else {
                0.0
            };
            let exit_legal = if inp.assume_sale_end && last {
                inp.home_sale_legal_fee
            } else {
                0.0
            };
            // Mortgage decrement happens after this store, matching the
            // scalar path; use the post-payment balance for net worth.
            let mort_after = if c_mort > 0.0 {
                (c_mort - princ).max(0.0)
            } else {
                0.0
            };
            b_val[t] = (c_home[t] - mort_after) + b_nw[t] - inp.close - exit_cost - exit_legal;

            if let Some((bp, rp, bu, pt, mt, rp2, bo, dg)) = paths.as_mut() {
                let unrec = cum_b_op[t] + inp.close + exit_cost + exit_legal;
                bp.row_mut(m as usize)[t] = b_val[t] as f32;
                rp.row_mut(m as usize)[t] = r_nw[t] as f32;
                bu.row_mut(m as usize)[t] = unrec as f32;
                pt.row_mut(m as usize)[t] = m_tax as f32;
                mt.row_mut(m as usize)[t] = m_maint as f32;
                rp2.row_mut(m as usize)[t] = m_repair as f32;
                bo.row_mut(m as usize)[t] = b_out as f32;
                dg.row_mut(m as usize)[t] = diff as f32;
            }
        }

        if c_mort > 0.0 {
            c_mort = (c_mort - princ).max(0.0);
        }

        let step = inp.rent_step_years.max(1);
        if step <= 1 {
            if m % 12 == 0 {
                c_rent *= 1.0 + inp.rent_inf;
            }
        } else if m % (12 * step) == 0 {
            c_rent *= (1.0 + inp.rent_inf).powi(step as i32);
        }

        cum_r_op += r_out;

        if let Some(series) = det.as_mut() {
            let idx = m as usize - 1;
            series.interest[idx] = inte;
            series.payment[idx] = pay;
            series.principal[idx] = princ;
            series.mortgage_balance[idx] = c_mort;
            series.condo[idx] = condo_paid;
            series.h_ins[idx] = h_ins_paid;
            series.o_util[idx] = o_util_paid;
            series.special[idx] = m_special;
            series.rent[idx] = rent_paid;
            series.r_ins[idx] = r_ins_paid;
            series.r_util[idx] = r_util_paid;
            series.moving[idx] = m_moving;
            series.rent_out[idx] = r_out;
            series.renter_unrec[idx] = cum_r_op;
        }

        // Fee inflation after the month's values were consumed.
        c_condo *= 1.0 + inp.condo_inf_mo;
        c_h_ins *= 1.0 + inp.inf_mo;
        c_o_util *= 1.0 + inp.inf_mo;
        c_r_ins *= 1.0 + inp.inf_mo;
        c_r_util *= 1.0 + inp.inf_mo;

        if let Some(cb) = progress.as_mut() {
            if m % prog_step == 0 || m == months {
                let done = ((m as f64 / months as f64) * trials as f64).round() as u32;
                cb(done, trials);
            }
        }
    }

    let terminal_buyer = b_val.clone();
    let terminal_renter = r_nw.clone();
    let finite_terminals = terminal_buyer
        .iter()
        .zip(terminal_renter.iter())
        .filter(|(b, r)| b.is_finite() && r.is_finite())
        .count() as u32;
    let win_rate = stats::win_rate_pct(&terminal_buyer, &terminal_renter);

    // Liquidation view over the terminal per-trial state.
    let liquidation_summary = if inp.show_liquidation {
        let mut b_liq = Vec::with_capacity(n);
        let mut r_liq = Vec::with_capacity(n);
        let mut b_taxes = Vec::with_capacity(n);
        let mut r_taxes = Vec::with_capacity(n);
        let mut sale_costs = Vec::with_capacity(n);
        for t in 0..n {
            let exit_cost = if inp.assume_sale_end {
                c_home[t] * inp.sell_cost
            } else {
                0.0
            };
            let exit_legal = if inp.assume_sale_end {
                inp.home_sale_legal_fee
            } else {
                0.0
            };
            let b_tax = liquidation::investment_tax(&inp.liq, inp.years, b_nw[t], b_basis[t]);
            let r_tax = liquidation::investment_tax(&inp.liq, inp.years, r_nw[t], r_basis[t]);
            let net_proceeds = c_home[t] - exit_cost - exit_legal;
            let home_tax = liquidation::home_sale_tax(
                &inp.liq,
                inp.assume_sale_end,
                net_proceeds,
                inp.price,
                inp.close,
            );
            let home_cash = if inp.assume_sale_end {
                (c_home[t] - c_mort) - exit_cost - exit_legal - home_tax
            } else {
                0.0
            };
            b_liq.push(home_cash + (b_nw[t] - b_tax) - inp.close);
            r_liq.push(r_nw[t] - r_tax);
            b_taxes.push(b_tax + home_tax);
            r_taxes.push(r_tax);
            sale_costs.push(exit_cost + exit_legal);
        }
        Some(LiquidationSummary {
            buyer_after_tax: stats::median(&b_liq).unwrap_or(f64::NAN),
            renter_after_tax: stats::median(&r_liq).unwrap_or(f64::NAN),
            buyer_tax: stats::median(&b_taxes).unwrap_or(f64::NAN),
            renter_tax: stats::median(&r_taxes).unwrap_or(f64::NAN),
            sale_costs: stats::median(&sale_costs).unwrap_or(f64::NAN),
            win_rate_pct: stats::win_rate_pct(&b_liq, &r_liq),
        })
    } else {
        None
    };

    if summary_only {
        let row = LedgerRow {
            month: months,
            year: months as f64 / 12.0,
            buyer_net_worth: stats::median(&terminal_buyer).unwrap_or(f64::NAN),
            renter_net_worth: stats::median(&terminal_renter).unwrap_or(f64::NAN),
            buyer_nw_mean: stats::mean(&terminal_buyer),
            renter_nw_mean: stats::mean(&terminal_renter),
            ..LedgerRow::default()
        };
        return McOutcome {
            rows: vec![row],
            win_rate_pct: win_rate,
            liquidation: liquidation_summary,
            terminal_buyer,
            terminal_renter,
            degenerate_check: None,
            nonfinite_paths: 0,
            finite_terminals,
        };
    }

    let (bp, rp, bu, pt, mt, rp2, bo, dg) = match paths {
        Some(p) => p,
        // Unreachable: full-output mode always allocates.
        None => {
            return McOutcome {
                rows: Vec::new(),
                win_rate_pct: win_rate,
                liquidation: liquidation_summary,
                terminal_buyer,
                terminal_renter,
                degenerate_check: None,
                nonfinite_paths: 0,
                finite_terminals,
            }
        }
    };
    let series = match det {
        Some(s) => s,
        None => DetSeries::new(months as usize),
    };
    let nonfinite_paths = bp.nonfinite() + rp.nonfinite() + bu.nonfinite();

    let mut rows = Vec::with_capacity(months as usize);
    for m in 1..=months as usize {
        let b_row = bp.row_f64(m);
        let r_row = rp.row_f64(m);
        let idx = m - 1;
        rows.push(LedgerRow {
            month: m as u32,
            year: m as f64 / 12.0,
            mortgage_balance: series.mortgage_balance[idx],
            payment: series.payment[idx],
            interest: series.interest[idx],
            principal: series.principal[idx],
            property_tax: stats::median(&pt.row_f64(m)).unwrap_or(f64::NAN),
            maintenance: stats::median(&mt.row_f64(m)).unwrap_or(f64::NAN),
            repairs: stats::median(&rp2.row_f64(m)).unwrap_or(f64::NAN),
            condo_fee: series.condo[idx],
            home_insurance: series.h_ins[idx],
            owner_utilities: series.o_util[idx],
            special_assessment: series.special[idx],
            owner_outflow: stats::median(&bo.row_f64(m)).unwrap_or(f64::NAN),
            rent: series.rent[idx],
            renter_insurance: series.r_ins[idx],
            renter_utilities: series.r_util[idx],
            moving_cost: series.moving[idx],
            renter_outflow: series.rent_out[idx],
            surplus: stats::median(&dg.row_f64(m)).unwrap_or(f64::NAN),
            buyer_net_worth: stats::median(&b_row).unwrap_or(f64::NAN),
            renter_net_worth: stats::median(&r_row).unwrap_or(f64::NAN),
            delta: stats::median(&b_row).unwrap_or(f64::NAN)
                - stats::median(&r_row).unwrap_or(f64::NAN),
            buyer_unrecoverable_cum: stats::median(&bu.row_f64(m)).unwrap_or(f64::NAN),
            renter_unrecoverable_cum: series.renter_unrec[idx],
            buyer_nw_p5: stats::percentile(&b_row, 5.0),
            buyer_nw_p95: stats::percentile(&b_row, 95.0),
            buyer_nw_mean: stats::mean(&b_row),
            renter_nw_p5: stats::percentile(&r_row, 5.0),
            renter_nw_p95: stats::percentile(&r_row, 95.0),
            renter_nw_mean: stats::mean(&r_row),
            ..LedgerRow::default()
        });
    }

    // With zero volatility every trial is the same path; it must agree with
    // the scalar simulator within float32 storage precision.
    let degenerate_check = if degenerate {
        let det_path = simulate_single(inp, None);
        let mut max_abs: f64 = 0.0;
        let mut max_rel: f64 = 0.0;
        let mut passed = true;
        for (mc, dt) in rows.iter().zip(det_path.rows.iter()) {
            for (a, b) in [
                (mc.buyer_net_worth, dt.buyer_net_worth),
                (mc.renter_net_worth, dt.renter_net_worth),
            ] {
                let abs = (a - b).abs();
                max_abs = max_abs.max(abs);
                max_rel = max_rel.max(abs / b.abs().max(1.0));
                if abs > 1.0 + 1e-6 * b.abs() {
                    passed = false;
                }
            }
        }
        Some(DegenerateCheck {
            max_rel_err: max_rel,
            max_abs_err: max_abs,
            passed,
        })
    } else {
        None
    };

    McOutcome {
        rows,
        win_rate_pct: win_rate,
        liquidation: liquidation_summary,
        terminal_buyer,
        terminal_renter,
        degenerate_check,
        nonfinite_paths,
        finite_terminals,
    }
}

/// Deterministic monthly series captured once in full-output mode.
struct DetSeries {
    interest: Vec<f64>,
    payment: Vec<f64>,
    principal: Vec<f64>,
    mortgage_balance: Vec<f64>,
    condo: Vec<f64>,
    h_ins: Vec<f64>,
    o_util: Vec<f64>,
    special: Vec<f64>,
    rent: Vec<f64>,
    r_ins: Vec<f64>,
    r_util: Vec<f64>,
    moving: Vec<f64>,
    rent_out: Vec<f64>,
    renter_unrec: Vec<f64>,
}

impl DetSeries {
    fn new(months: usize) -> Self {
        DetSeries {
            interest: vec![0.0; months],
            payment: vec![0.0; months],
            principal: vec![0.0; months],
            mortgage_balance: vec![0.0; months],
            condo: vec![0.0; months],
            h_ins: vec![0.0; months],
            o_util: vec![0.0; months],
            special: vec![0.0; months],
            rent: vec![0.0; months],
            r_ins: vec![0.0; months],
            r_util: vec![0.0; months],
            moving: vec![0.0; months],
            rent_out: vec![0.0; months],
            renter_unrec: vec![0.0; months],
        }
    }
}

/// Per-trial fallback used when the vectorized path arrays would exceed the
/// memory ceiling. One shared shock stream across trials keeps runs with
/// the same seed reproducible.
pub fn run_per_trial(
    inp: &SimInputs,
    trials: u32,
    seed: Option<u64>,
    mut progress: Option<&mut dyn FnMut(u32, u32)>,
) -> McOutcome {
    let months = inp.months.max(1) as usize;
    let n = trials.max(1);
    let mut gen = ShockGenerator::new(seed, inp.mkt_corr);

    let mut buyer_paths: Vec<Vec<f64>> = vec![Vec::with_capacity(n as usize); months];
    let mut renter_paths: Vec<Vec<f64>> = vec![Vec::with_capacity(n as usize); months];
    let mut terminal_buyer = Vec::with_capacity(n as usize);
    let mut terminal_renter = Vec::with_capacity(n as usize);
    let mut liq_buyer = Vec::new();
    let mut liq_renter = Vec::new();
    let mut liq_buyer_tax = Vec::new();
    let mut liq_renter_tax = Vec::new();
    let mut liq_sale_costs = Vec::new();
    let mut first_rows: Option<Vec<LedgerRow>> = None;

    for t in 0..n {
        let out = simulate_single(inp, Some(&mut gen));
        for (m, row) in out.rows.iter().enumerate() {
            buyer_paths[m].push(row.buyer_net_worth);
            renter_paths[m].push(row.renter_net_worth);
        }
        if let Some(last) = out.rows.last() {
            terminal_buyer.push(last.buyer_net_worth);
            terminal_renter.push(last.renter_net_worth);
        }
        if let Some(l) = &out.liquidation {
            liq_buyer.push(l.buyer_after_tax);
            liq_renter.push(l.renter_after_tax);
            liq_buyer_tax.push(l.buyer_tax);
            liq_renter_tax.push(l.renter_tax);
            liq_sale_costs.push(l.sale_costs);
        }
        if first_rows.is_none() {
            first_rows = Some(out.rows);
        }
        if let Some(cb) = progress.as_mut() {
            cb(t + 1, n);
        }
    }

    let finite_terminals = terminal_buyer
        .iter()
        .zip(terminal_renter.iter())
        .filter(|(b, r)| b.is_finite() && r.is_finite())
        .count() as u32;
    let win_rate = stats::win_rate_pct(&terminal_buyer, &terminal_renter);

    // Liquidation view aggregated over the per-trial after-tax positions,
    // same medians and win% as the vectorized engine reports.
    let liquidation = if inp.show_liquidation && !liq_buyer.is_empty() {
        Some(LiquidationSummary {
            buyer_after_tax: stats::median(&liq_buyer).unwrap_or(f64::NAN),
            renter_after_tax: stats::median(&liq_renter).unwrap_or(f64::NAN),
            buyer_tax: stats::median(&liq_buyer_tax).unwrap_or(f64::NAN),
            renter_tax: stats::median(&liq_renter_tax).unwrap_or(f64::NAN),
            sale_costs: stats::median(&liq_sale_costs).unwrap_or(f64::NAN),
            win_rate_pct: stats::win_rate_pct(&liq_buyer, &liq_renter),
        })
    } else {
        None
    };

    // The first trial's rows carry the deterministic columns; overwrite the
    // random-dependent ones with cross-trial aggregates.
    let mut rows = first_rows.unwrap_or_default();
    for (m, row) in rows.iter_mut().enumerate() {
        let b_row = &buyer_paths[m];
        let r_row = &renter_paths[m];
        row.buyer_net_worth = stats::median(b_row).unwrap_or(f64::NAN);
        row.renter_net_worth = stats::median(r_row).unwrap_or(f64::NAN);
        row.delta = row.buyer_net_worth - row.renter_net_worth;
        row.buyer_nw_p5 = stats::percentile(b_row, 5.0);
        row.buyer_nw_p95 = stats::percentile(b_row, 95.0);
        row.buyer_nw_mean = stats::mean(b_row);
        row.renter_nw_p5 = stats::percentile(r_row, 5.0);
        row.renter_nw_p95 = stats::percentile(r_row, 95.0);
        row.renter_nw_mean = stats::mean(r_row);
    }

    McOutcome {
        rows,
        win_rate_pct: win_rate,
        liquidation,
        terminal_buyer,
        terminal_renter,
        degenerate_check: None,
        nonfinite_paths: 0,
        finite_terminals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CgInclusionPolicy, LiquidationPlan};
    use approx::assert_relative_eq;

    fn inputs(sigma: f64) -> SimInputs {
        let years = 3;
        let rate_pct = 5.0;
        let mr = mortgage::monthly_rate(rate_pct, true);
        let mort = 640_000.0;
        SimInputs {
            years,
            months: years * 12,
            buyer_drift: mortgage::monthly_log_drift(0.06),
            renter_drift: mortgage::monthly_log_drift(0.06),
            apprec_annual: 0.03,
            mr_init: mr,
            amort_months: 300,
            pmt_init: mortgage::payment(mort, mr, 300),
            rate_nominal_pct: rate_pct,
            canadian_compounding: true,
            down: 160_000.0,
            close: 25_000.0,
            mort,
            price: 800_000.0,
            rent: 2_600.0,
            p_tax_rate: 0.0066,
            maint_rate: 0.01,
            repair_rate: 0.005,
            condo: 0.0,
            h_ins: 150.0,
            o_util: 250.0,
            r_ins: 30.0,
            r_util: 150.0,
            sell_cost: 0.05,
            home_sale_legal_fee: 1_500.0,
            rent_inf: 0.025,
            rent_step_years: 1,
            moving_cost: 2_000.0,
            moving_freq_years: 5.0,
            inf_mo: mortgage::monthly_effective(0.021),
            condo_inf_mo: mortgage::monthly_effective(0.035),
            prop_tax_addon_mo: (1.005f64).powf(1.0 / 12.0) - 1.0,
            prop_tax_model: PropTaxModel::Hybrid,
            ret_sigma_mo: sigma / 12f64.sqrt(),
            app_sigma_mo: (sigma * 0.4) / 12f64.sqrt(),
            mkt_corr: 0.3,
            surplus: SurplusMode::InvestDiff,
            rent_closing: true,
            rate_reset: None,
            rate_shock: None,
            crisis: None,
            special_assessment: (0, 0.0),
            assume_sale_end: true,
            show_liquidation: false,
            liq: LiquidationPlan {
                eff_cg_rate: 0.0,
                home_cg_rate: 0.0,
                policy: CgInclusionPolicy::Current,
                threshold: 250_000.0,
                shelter_enabled: false,
                initial_room: 0.0,
                annual_room: 0.0,
                is_principal_residence: true,
            },
        }
    }

    #[test]
    fn degenerate_run_matches_deterministic_path() {
        let inp = inputs(0.0);
        let out = run_vectorized(&inp, 64, Some(42), false, None, None);
        let check = out.degenerate_check.expect("degenerate check runs");
        assert!(check.passed, "max abs err {}", check.max_abs_err);
        assert!(check.max_rel_err < 1e-5);
    }

    #[test]
    fn same_seed_reproduces_results() {
        let inp = inputs(0.15);
        let a = run_vectorized(&inp, 200, Some(7), false, None, None);
        let b = run_vectorized(&inp, 200, Some(7), false, None, None);
        assert_eq!(a.terminal_buyer, b.terminal_buyer);
        assert_eq!(a.win_rate_pct, b.win_rate_pct);
    }

    #[test]
    fn summary_only_matches_full_terminals() {
        let inp = inputs(0.15);
        let full = run_vectorized(&inp, 100, Some(11), false, None, None);
        let summary = run_vectorized(&inp, 100, Some(11), true, None, None);
        assert_eq!(summary.rows.len(), 1);
        assert_eq!(full.terminal_buyer, summary.terminal_buyer);
        assert_eq!(full.win_rate_pct, summary.win_rate_pct);
    }

    #[test]
    fn win_rate_is_bounded() {
        let inp = inputs(0.15);
        let out = run_vectorized(&inp, 300, Some(5), true, None, None);
        let w = out.win_rate_pct.expect("finite trials");
        assert!((0.0..=100.0).contains(&w));
        assert_eq!(out.finite_terminals, 300);
    }

    #[test]
    fn bands_straddle_the_median() {
        let inp = inputs(0.15);
        let out = run_vectorized(&inp, 200, Some(3), false, None, None);
        let last = out.rows.last().unwrap();
        assert!(last.buyer_nw_p5.unwrap() <= last.buyer_net_worth);
        assert!(last.buyer_net_worth <= last.buyer_nw_p95.unwrap());
        assert!(last.renter_nw_p5.unwrap() <= last.renter_net_worth);
        assert!(last.renter_net_worth <= last.renter_nw_p95.unwrap());
    }

    #[test]
    fn precomputed_shocks_reproduce_generator_stream() {
        let inp = inputs(0.15);
        let months = inp.months;
        let mats = crate::stochastic::ShockMatrices::generate(Some(9), inp.mkt_corr, months, 50);
        let direct = run_vectorized(&inp, 50, Some(9), true, None, None);
        let shared = run_vectorized(&inp, 50, Some(9), true, Some(&mats), None);
        for (a, b) in direct
            .terminal_buyer
            .iter()
            .zip(shared.terminal_buyer.iter())
        {
            // f32 shock storage rounds the draws, so allow a loose match.
            assert_relative_eq!(a, b, max_relative = 1e-3);
        }
    }

    #[test]
    fn memory_estimate_scales_linearly() {
        assert_eq!(estimate_path_bytes(1000, 300), 8 * 1000 * 300 * 4);
        assert!(estimate_path_bytes(2000, 300) == 2 * estimate_path_bytes(1000, 300));
    }

    #[test]
    fn per_trial_fallback_same_shape() {
        let inp = inputs(0.15);
        let out = run_per_trial(&inp, 50, Some(21), None);
        assert_eq!(out.rows.len(), inp.months as usize);
        assert_eq!(out.terminal_buyer.len(), 50);
        assert!(out.rows.last().unwrap().buyer_nw_p5.is_some());
        let w = out.win_rate_pct.expect("finite");
        assert!((0.0..=100.0).contains(&w));
    }

    #[test]
    fn liquidation_summary_present_with_view() {
        let mut inp = inputs(0.10);
        inp.show_liquidation = true;
        inp.liq.eff_cg_rate = 0.225;
        let out = run_vectorized(&inp, 100, Some(13), true, None, None);
        let liq = out.liquidation.expect("liquidation view");
        assert!(liq.renter_tax >= 0.0);
        assert!(liq.win_rate_pct.is_some());
    }
}
