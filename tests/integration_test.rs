/// End-to-end deterministic scenario runs through the public engine API.
use rvb_sim::config::{Overrides, RunParams, ScenarioConfig, SurplusMode};
use rvb_sim::engine;
use rvb_sim::ledger::EngineKind;

fn base_config(years: u32) -> ScenarioConfig {
    let mut c = ScenarioConfig::default();
    c.years = years;
    c
}

#[test]
fn deterministic_baseline_run() {
    let cfg = base_config(25);
    let result = engine::run_scenario(&cfg, &RunParams::default(), &Overrides::default(), None);

    println!("\n  Deterministic baseline (25y, $800k, 20% down, 5%):");
    println!("    payment:       ${:.2}/mo", result.payment_initial);
    println!("    cash to close: ${:.2}", result.cash_to_close);
    println!("    final buyer:   ${:.0}", result.final_buyer_nw);
    println!("    final renter:  ${:.0}", result.final_renter_nw);
    println!("    final delta:   ${:.0}", result.final_delta());

    assert_eq!(result.diagnostics.engine, EngineKind::Deterministic);
    assert_eq!(result.rows.len(), 300);
    assert!(result.win_rate_pct.is_none());

    // $640k at 5% over 25y: the Canadian semi-annual convention prices the
    // payment a touch under the nominal-monthly figure of ~$3,742.
    assert!(result.payment_initial > 3_500.0 && result.payment_initial < 3_800.0);

    // The mortgage fully amortizes over the horizon.
    let last = result.rows.last().unwrap();
    assert!(last.mortgage_balance.abs() < 1.0);

    // Balance decreases monotonically, never below zero.
    let mut prev = f64::INFINITY;
    for row in &result.rows {
        assert!(row.mortgage_balance <= prev + 1e-9);
        assert!(row.mortgage_balance >= -1e-6);
        prev = row.mortgage_balance;
    }

    // Every month's interest + principal equals the payment while active.
    for row in result.rows.iter().take(299) {
        assert!((row.interest + row.principal - row.payment).abs() < 1e-6);
    }
}

#[test]
fn run_is_bit_reproducible() {
    let cfg = base_config(10);
    let params = RunParams::default();
    let a = engine::run_scenario(&cfg, &params, &Overrides::default(), None);
    let b = engine::run_scenario(&cfg, &params, &Overrides::default(), None);

    assert_eq!(a.rows.len(), b.rows.len());
    for (x, y) in a.rows.iter().zip(&b.rows) {
        assert_eq!(x.buyer_net_worth.to_bits(), y.buyer_net_worth.to_bits());
        assert_eq!(x.renter_net_worth.to_bits(), y.renter_net_worth.to_bits());
    }
}

#[test]
fn closing_costs_shift_the_delta_both_ways() {
    // The buyer pays closing costs; the renter invests them when
    // rent_closing is on. An extra dollar of closing costs should move the
    // terminal delta by more than a dollar against the buyer.
    let cfg = base_config(10);
    let params = RunParams::default();

    let base = engine::run_scenario(&cfg, &params, &Overrides::default(), None);

    let mut costlier = cfg.clone();
    costlier.close += 10_000.0;
    let bumped = engine::run_scenario(&costlier, &params, &Overrides::default(), None);

    println!(
        "\n  Closing-cost sensitivity: delta {:.0} -> {:.0}",
        base.final_delta(),
        bumped.final_delta()
    );
    assert!(bumped.final_delta() < base.final_delta() - 10_000.0);
}

#[test]
fn higher_mortgage_rate_hurts_the_buyer() {
    let cfg = base_config(15);
    let params = RunParams::default();

    let low = engine::run_scenario(
        &cfg,
        &params,
        &Overrides {
            rate_pct: Some(3.0),
            ..Overrides::default()
        },
        None,
    );
    let high = engine::run_scenario(
        &cfg,
        &params,
        &Overrides {
            rate_pct: Some(7.0),
            ..Overrides::default()
        },
        None,
    );

    assert!(high.payment_initial > low.payment_initial);
    assert!(high.final_delta() < low.final_delta());
}

#[test]
fn rent_control_slows_renter_outflow() {
    let mut uncapped = base_config(10);
    uncapped.rent_inf = 0.05;

    let mut capped = uncapped.clone();
    capped.rent_control_enabled = true;
    capped.rent_control_cap = Some(0.02);

    let params = RunParams::default();
    let a = engine::run_scenario(&uncapped, &params, &Overrides::default(), None);
    let b = engine::run_scenario(&capped, &params, &Overrides::default(), None);

    let rent_a = a.rows.last().unwrap().rent;
    let rent_b = b.rows.last().unwrap().rent;
    println!(
        "\n  Terminal rent: uncapped ${:.2}, capped ${:.2}",
        rent_a, rent_b
    );
    assert!(rent_b < rent_a);

    // Cheaper renting strengthens the renter's position.
    assert!(b.final_delta() < a.final_delta());
}

#[test]
fn track_as_cash_accrues_zero_return_surplus() {
    let cfg = base_config(10);
    let params = RunParams {
        surplus: SurplusMode::TrackAsCash,
        ..RunParams::default()
    };
    let result = engine::run_scenario(&cfg, &params, &Overrides::default(), None);

    // Owning costs more than renting at the baseline, so the renter side
    // accumulates the gap as cash.
    let last = result.rows.last().unwrap();
    assert!(last.renter_cash > 0.0);
    assert_eq!(last.buyer_cash, 0.0);
}

#[test]
fn budget_mode_populates_contribution_columns() {
    let cfg = base_config(5);
    let params = RunParams {
        surplus: SurplusMode::Budget {
            monthly_income: 9_000.0,
            monthly_nonhousing: 2_500.0,
            income_growth_pct: 2.0,
            allow_withdraw: true,
        },
        ..RunParams::default()
    };
    let result = engine::run_scenario(&cfg, &params, &Overrides::default(), None);

    for row in &result.rows {
        assert!(row.net_income.is_some());
        assert!(row.buyer_contribution.is_some());
        assert!(row.renter_contribution.is_some());
    }
    // Income grows annually.
    let first = result.rows[0].net_income.unwrap();
    let last = result.rows.last().unwrap().net_income.unwrap();
    assert!(last > first);
}

#[test]
fn liquidation_view_reports_after_tax_positions() {
    let mut cfg = base_config(15);
    cfg.show_liquidation_view = true;
    cfg.investment_tax_mode = rvb_sim::config::InvestmentTaxMode::DeferredCapitalGains;
    cfg.cg_tax_end_pct = 22.5;

    let result = engine::run_scenario(&cfg, &RunParams::default(), &Overrides::default(), None);
    let liq = result.liquidation.expect("liquidation view requested");

    println!(
        "\n  After-tax: buyer ${:.0} (tax ${:.0}), renter ${:.0} (tax ${:.0}), sale costs ${:.0}",
        liq.buyer_after_tax, liq.buyer_tax, liq.renter_after_tax, liq.renter_tax, liq.sale_costs
    );
    assert!(liq.renter_tax >= 0.0);
    assert!(liq.buyer_tax >= 0.0);
    assert!(liq.sale_costs > 0.0);
    // After-tax positions cannot exceed the pre-tax ones.
    assert!(liq.buyer_after_tax <= result.final_buyer_nw + 1e-6);
    assert!(liq.renter_after_tax <= result.final_renter_nw + 1e-6);
}
