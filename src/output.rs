use crate::config::ScenarioConfig;
use crate::heatmap::HeatmapGrid;
use crate::ledger::{EngineKind, LedgerRow, SimulationResult};
use std::path::Path;

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{:.2}", x),
        _ => String::new(),
    }
}

fn fmt_num(v: f64) -> String {
    if v.is_finite() {
        format!("{:.2}", v)
    } else {
        String::new()
    }
}

/// Save the monthly ledger to CSV. Optional columns (Monte Carlo bands,
/// budget accounting, present value) are emitted empty when absent.
pub fn save_ledger_csv(rows: &[LedgerRow], path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "month",
        "year",
        "home_value",
        "mortgage_balance",
        "payment",
        "interest",
        "principal",
        "property_tax",
        "assessed_value",
        "maintenance",
        "repairs",
        "condo_fee",
        "home_insurance",
        "owner_utilities",
        "special_assessment",
        "owner_outflow",
        "rent",
        "renter_insurance",
        "renter_utilities",
        "moving_cost",
        "renter_outflow",
        "surplus",
        "buyer_equity",
        "buyer_investments",
        "buyer_cash",
        "buyer_net_worth",
        "renter_investments",
        "renter_cash",
        "renter_net_worth",
        "delta",
        "delta_pv",
        "buyer_unrecoverable_cum",
        "renter_unrecoverable_cum",
        "net_income",
        "buyer_contribution",
        "renter_contribution",
        "buyer_shortfall_cum",
        "renter_shortfall_cum",
        "buyer_nw_p5",
        "buyer_nw_p95",
        "buyer_nw_mean",
        "renter_nw_p5",
        "renter_nw_p95",
        "renter_nw_mean",
    ])?;

    for r in rows {
        wtr.write_record(&[
            r.month.to_string(),
            format!("{:.4}", r.year),
            fmt_num(r.home_value),
            fmt_num(r.mortgage_balance),
            fmt_num(r.payment),
            fmt_num(r.interest),
            fmt_num(r.principal),
            fmt_num(r.property_tax),
            fmt_num(r.assessed_value),
            fmt_num(r.maintenance),
            fmt_num(r.repairs),
            fmt_num(r.condo_fee),
            fmt_num(r.home_insurance),
            fmt_num(r.owner_utilities),
            fmt_num(r.special_assessment),
            fmt_num(r.owner_outflow),
            fmt_num(r.rent),
            fmt_num(r.renter_insurance),
            fmt_num(r.renter_utilities),
            fmt_num(r.moving_cost),
            fmt_num(r.renter_outflow),
            fmt_num(r.surplus),
            fmt_num(r.buyer_equity),
            fmt_num(r.buyer_investments),
            fmt_num(r.buyer_cash),
            fmt_num(r.buyer_net_worth),
            fmt_num(r.renter_investments),
            fmt_num(r.renter_cash),
            fmt_num(r.renter_net_worth),
            fmt_num(r.delta),
            fmt_opt(r.delta_pv),
            fmt_num(r.buyer_unrecoverable_cum),
            fmt_num(r.renter_unrecoverable_cum),
            fmt_opt(r.net_income),
            fmt_opt(r.buyer_contribution),
            fmt_opt(r.renter_contribution),
            fmt_opt(r.buyer_shortfall_cum),
            fmt_opt(r.renter_shortfall_cum),
            fmt_opt(r.buyer_nw_p5),
            fmt_opt(r.buyer_nw_p95),
            fmt_opt(r.buyer_nw_mean),
            fmt_opt(r.renter_nw_p5),
            fmt_opt(r.renter_nw_p95),
            fmt_opt(r.renter_nw_mean),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Save the run summary to JSON.
pub fn save_summary_json(
    result: &SimulationResult,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let d = &result.diagnostics;
    let engine = match d.engine {
        EngineKind::Deterministic => "deterministic",
        EngineKind::Vectorized => "vectorized_mc",
        EngineKind::PerTrial => "per_trial_mc",
    };
    let win = match result.win_rate_pct {
        Some(w) => format!("{:.2}", w),
        None => "null".to_string(),
    };
    let seed = match d.seed {
        Some(s) => s.to_string(),
        None => "null".to_string(),
    };
    let liquidation = match &result.liquidation {
        Some(l) => format!(
            r#"{{
    "buyer_after_tax": {:.2},
    "renter_after_tax": {:.2},
    "buyer_tax": {:.2},
    "renter_tax": {:.2},
    "sale_costs": {:.2},
    "win_rate_pct": {}
  }}"#,
            l.buyer_after_tax,
            l.renter_after_tax,
            l.buyer_tax,
            l.renter_tax,
            l.sale_costs,
            match l.win_rate_pct {
                Some(w) => format!("{:.2}", w),
                None => "null".to_string(),
            },
        ),
        None => "null".to_string(),
    };
    let notes: Vec<String> = d
        .notes
        .iter()
        .map(|n| serde_json::to_string(n).unwrap_or_default())
        .collect();
    let autonorm: Vec<String> = d
        .autonormalized
        .iter()
        .map(|n| serde_json::to_string(n).unwrap_or_default())
        .collect();

    let json = format!(
        r#"{{
  "engine": "{}",
  "trials": {},
  "seed": {},
  "summary_only": {},
  "payment_initial": {:.2},
  "cash_to_close": {:.2},
  "final_buyer_nw": {:.2},
  "final_renter_nw": {:.2},
  "final_delta": {:.2},
  "win_rate_pct": {},
  "liquidation": {},
  "mem_estimate_bytes": {},
  "autonormalized": [{}],
  "notes": [{}]
}}"#,
        engine,
        d.trials,
        seed,
        d.summary_only,
        result.payment_initial,
        result.cash_to_close,
        result.final_buyer_nw,
        result.final_renter_nw,
        result.final_delta(),
        win,
        liquidation,
        d.mem_estimate_bytes,
        autonorm.join(", "),
        notes.join(", "),
    );

    std::fs::write(path, json)?;
    Ok(())
}

/// Save a heatmap grid to CSV: one row per cell with axis values and the
/// three outputs. Masked cells are emitted with empty outputs.
pub fn save_heatmap_csv(
    grid: &HeatmapGrid,
    app_vals_pct: &[f64],
    y_vals_pct: &[f64],
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "y_value_pct",
        "appreciation_pct",
        "win_pct",
        "mean_delta",
        "mean_pv_delta",
    ])?;

    for row in 0..grid.n_rows {
        for col in 0..grid.n_cols {
            let (win, delta, pv) = grid.at(row, col);
            wtr.write_record(&[
                format!("{:.4}", y_vals_pct[row]),
                format!("{:.4}", app_vals_pct[col]),
                fmt_num(win),
                fmt_num(delta),
                fmt_num(pv),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Save the resolved scenario configuration to TOML.
pub fn save_config_toml(
    config: &ScenarioConfig,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml = toml::to_string_pretty(config)?;
    std::fs::write(path, toml)?;
    Ok(())
}

/// Save all outputs for one scenario run to a directory.
pub fn save_all(
    result: &SimulationResult,
    config: &ScenarioConfig,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(output_dir)?;
    save_ledger_csv(&result.rows, &output_dir.join("ledger.csv"))?;
    save_summary_json(result, &output_dir.join("summary.json"))?;
    save_config_toml(config, &output_dir.join("config.toml"))?;
    Ok(())
}
