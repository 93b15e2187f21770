//! Deterministic / single-trial monthly simulation.
//!
//! One pass over the horizon, maintaining both households' balances. Order
//! within a month matters and is fixed:
//!
//! 1. draw shocks and growth factors
//! 2. mortgage rate resets / shock windows (payment recompute on change)
//! 3. property-tax assessment base update
//! 4. cash outflows for both sides
//! 5. surplus handling (invest / cash / budget)
//! 6. growth on invested balances and the home
//! 7. crisis drawdown, balance decrement, rent and cost inflation
//! 8. ledger row, terminal liquidation on the last month

use crate::config::{PropTaxModel, SimInputs, SurplusMode};
use crate::ledger::{LedgerRow, LiquidationSummary};
use crate::liquidation;
use crate::mortgage;
use crate::stochastic::{growth_factor, ShockGenerator};

/// Result of one simulated path.
pub struct PathOutcome {
    pub rows: Vec<LedgerRow>,
    pub liquidation: Option<LiquidationSummary>,
}

fn apply_budget(nw: &mut f64, basis: &mut f64, shortfall: &mut f64, net: f64, allow_withdraw: bool) {
    if net >= 0.0 {
        *nw += net;
        *basis += net;
        return;
    }
    let need = -net;
    if allow_withdraw {
        if *nw >= need {
            // Withdrawal reduces basis proportionally, realizing gains
            // pro-rata.
            if *nw > 0.0 {
                *basis *= ((*nw - need) / *nw).max(0.0);
            }
            *nw -= need;
        } else {
            *shortfall += need - *nw;
            *basis = 0.0;
            *nw = 0.0;
        }
    } else {
        *shortfall += need;
    }
}

/// Simulate one path. `shocks` drives the stochastic growth factors; pass
/// `None` (or zero volatilities) for the deterministic expectation path.
pub fn simulate_single(inp: &SimInputs, mut shocks: Option<&mut ShockGenerator>) -> PathOutcome {
    let months = inp.months;
    let stochastic = inp.ret_sigma_mo > 0.0 || inp.app_sigma_mo > 0.0;

    // Renter starts with the cash the buyer sank into the purchase.
    let mut r_nw = if inp.rent_closing {
        inp.down + inp.close
    } else {
        inp.down
    };
    let mut b_nw = 0.0;
    let mut r_basis = r_nw;
    let mut b_basis = b_nw;
    let mut r_cash = 0.0;
    let mut b_cash = 0.0;
    let mut b_shortfall = 0.0;
    let mut r_shortfall = 0.0;

    let mut c_mort = inp.mort;
    let mut c_home = inp.price;
    let mut c_rent = inp.rent;
    let mut c_condo = inp.condo;
    let mut c_h_ins = inp.h_ins;
    let mut c_o_util = inp.o_util;
    let mut c_r_ins = inp.r_ins;
    let mut c_r_util = inp.r_util;

    let mut pmt = inp.pmt_init;
    let mut cur_rate_pct = inp.rate_nominal_pct;
    let mut shock_was_active = false;

    let mut tax_base = inp.price;
    let mut next_move = inp.moving_freq_years * 12.0;
    let mut cum_b_op = 0.0;
    let mut cum_r_op = 0.0;

    let mut rows = Vec::with_capacity(months as usize);
    let mut liq = None;

    for m in 1..=months {
        let (b_growth, r_growth, home_growth) = match shocks.as_deref_mut() {
            Some(gen) if stochastic => {
                let (zs, zh) = gen.draw();
                (
                    growth_factor(inp.buyer_mu(), inp.ret_sigma_mo, zs),
                    growth_factor(inp.renter_mu(), inp.ret_sigma_mo, zs),
                    growth_factor(inp.home_mu(), inp.app_sigma_mo, zh),
                )
            }
            _ => (
                inp.buyer_drift.exp(),
                inp.renter_drift.exp(),
                mortgage::monthly_log_drift(inp.apprec_annual).exp(),
            ),
        };

        // Renewals reprice the loan at scheduled anniversaries.
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

        // Assessment base, using the pre-growth home value.
        match inp.prop_tax_model {
            PropTaxModel::MarketValue => tax_base = c_home,
            PropTaxModel::Inflation => tax_base *= 1.0 + inp.inf_mo,
            PropTaxModel::Hybrid => {
                let cap_mo = (1.0 + inp.inf_mo) * (1.0 + inp.prop_tax_addon_mo) - 1.0;
                if c_home >= tax_base {
                    tax_base = (tax_base * (1.0 + cap_mo)).min(c_home);
                } else {
                    tax_base = (tax_base / (1.0 + cap_mo)).max(c_home);
                }
            }
        }

        let m_tax = tax_base * inp.p_tax_rate / 12.0;
        let m_maint = c_home * inp.maint_rate / 12.0;
        let m_repair = c_home * inp.repair_rate / 12.0;
        let (sa_month, sa_amount) = inp.special_assessment;
        let m_special = if sa_month > 0 && m == sa_month {
            sa_amount
        } else {
            0.0
        };

        let inte = if c_mort > 0.0 { c_mort * mr } else { 0.0 };
        let mut princ = if c_mort > 0.0 { pmt - inte } else { 0.0 };
        if princ > c_mort {
            princ = c_mort;
        }
        let pay = if c_mort > 0.0 { pmt } else { 0.0 };

        let b_out =
            pay + m_tax + m_maint + m_repair + c_condo + c_h_ins + c_o_util + m_special;
        // Operating (unrecoverable) excludes principal.
        let b_op =
            inte + m_tax + m_maint + m_repair + c_condo + c_h_ins + c_o_util + m_special;

        let rent_paid = c_rent;
        let condo_paid = c_condo;
        let h_ins_paid = c_h_ins;
        let o_util_paid = c_o_util;
        let r_ins_paid = c_r_ins;
        let r_util_paid = c_r_util;

        // A move that would land on the sale month is skipped.
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
        let r_op = r_out;

        let diff = b_out - r_out;
        let mut net_income = None;
        let mut b_net = None;
        let mut r_net = None;

        match &inp.surplus {
            SurplusMode::Budget {
                monthly_income,
                monthly_nonhousing,
                income_growth_pct,
                allow_withdraw,
            } => {
                let g = (income_growth_pct / 100.0).max(-0.99);
                let inc = if g != 0.0 {
                    monthly_income * (1.0 + g).powf((m - 1) as f64 / 12.0)
                } else {
                    *monthly_income
                };
                let bb = inc - monthly_nonhousing - b_out;
                let rb = inc - monthly_nonhousing - r_out;
                net_income = Some(inc);
                b_net = Some(bb);
                r_net = Some(rb);
                apply_budget(&mut b_nw, &mut b_basis, &mut b_shortfall, bb, *allow_withdraw);
                apply_budget(&mut r_nw, &mut r_basis, &mut r_shortfall, rb, *allow_withdraw);
            }
            SurplusMode::InvestDiff => {
                if diff > 0.0 {
                    r_nw += diff;
                    r_basis += diff;
                } else {
                    b_nw += -diff;
                    b_basis += -diff;
                }
            }
            SurplusMode::TrackAsCash => {
                if diff > 0.0 {
                    r_nw += diff;
                    r_basis += diff;
                    r_cash += diff;
                } else if diff < 0.0 {
                    b_nw += -diff;
                    b_basis += -diff;
                    b_cash += -diff;
                }
            }
        }

        // Only the invested portion compounds; cash earns nothing.
        r_nw = (r_nw - r_cash) * r_growth + r_cash;
        b_nw = (b_nw - b_cash) * b_growth + b_cash;
        c_home *= home_growth;

        if let Some(crisis) = inp.crisis {
            if crisis.active(m) {
                let sdd = crisis.stock_dd.clamp(0.0, 0.95);
                let hdd = crisis.house_dd.clamp(0.0, 0.95);
                b_nw = (b_nw - b_cash) * (1.0 - sdd) + b_cash;
                r_nw = (r_nw - r_cash) * (1.0 - sdd) + r_cash;
                c_home *= 1.0 - hdd;
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

        c_condo *= 1.0 + inp.condo_inf_mo;
        c_h_ins *= 1.0 + inp.inf_mo;
        c_o_util *= 1.0 + inp.inf_mo;
        c_r_ins *= 1.0 + inp.inf_mo;
        c_r_util *= 1.0 + inp.inf_mo;

        let last = m == months;
        let exit_cost = if inp.assume_sale_end && last {
            c_home * inp.sell_cost
        } else {
            0.0
        };
        let exit_legal = if inp.assume_sale_end && last {
            inp.home_sale_legal_fee
        } else {
            0.0
        };

        // Closing costs are sunk from day one.
        let b_val = (c_home - c_mort) + b_nw - inp.close - exit_cost - exit_legal;

        if inp.show_liquidation && last {
            let b_tax = liquidation::investment_tax(&inp.liq, inp.years, b_nw, b_basis);
            let r_tax = liquidation::investment_tax(&inp.liq, inp.years, r_nw, r_basis);
            let net_proceeds = c_home - exit_cost - exit_legal;
            let home_tax = liquidation::home_sale_tax(
                &inp.liq,
                inp.assume_sale_end,
                net_proceeds,
                inp.price,
                inp.close,
            );
            // Without a sale the home equity cannot be cashed out.
            let home_cash = if inp.assume_sale_end {
                (c_home - c_mort) - exit_cost - exit_legal - home_tax
            } else {
                0.0
            };
            liq = Some(LiquidationSummary {
                buyer_after_tax: home_cash + (b_nw - b_tax) - inp.close,
                renter_after_tax: r_nw - r_tax,
                buyer_tax: b_tax + home_tax,
                renter_tax: r_tax,
                sale_costs: exit_cost + exit_legal,
                win_rate_pct: None,
            });
        }

        cum_b_op += b_op;
        cum_r_op += r_op;

        rows.push(LedgerRow {
            month: m,
            year: m as f64 / 12.0,
            home_value: c_home,
            mortgage_balance: c_mort,
            payment: pay,
            interest: inte,
            principal: princ,
            property_tax: m_tax,
            assessed_value: tax_base,
            maintenance: m_maint,
            repairs: m_repair,
            condo_fee: condo_paid,
            home_insurance: h_ins_paid,
            owner_utilities: o_util_paid,
            special_assessment: m_special,
            owner_outflow: b_out,
            rent: rent_paid,
            renter_insurance: r_ins_paid,
            renter_utilities: r_util_paid,
            moving_cost: m_moving,
            renter_outflow: r_out,
            surplus: diff,
            buyer_equity: c_home - c_mort,
            buyer_investments: b_nw - b_cash,
            buyer_cash: b_cash,
            buyer_net_worth: b_val,
            renter_investments: r_nw - r_cash,
            renter_cash: r_cash,
            renter_net_worth: r_nw,
            delta: b_val - r_nw,
            buyer_unrecoverable_cum: cum_b_op + inp.close + exit_cost + exit_legal,
            renter_unrecoverable_cum: cum_r_op,
            net_income,
            buyer_contribution: b_net,
            renter_contribution: r_net,
            buyer_shortfall_cum: net_income.map(|_| b_shortfall),
            renter_shortfall_cum: net_income.map(|_| r_shortfall),
            ..LedgerRow::default()
        });
    }

    PathOutcome {
        rows,
        liquidation: liq,
    }
}
