//! Sensitivity heatmaps over a grid of scenario assumptions.
//!
//! The x-axis always sweeps expected home appreciation; the y-axis sweeps
//! either rent inflation or the renter's expected return. Every cell is
//! evaluated with shared random numbers so adjacent cells differ only by
//! their assumptions, not by sampling noise: when the shock matrices fit in
//! memory they are generated once and shared across cells, otherwise each
//! cell re-seeds its own generator from the same seed and regenerates an
//! identical stream.

use rayon::prelude::*;

use crate::config::{HeatmapYAxis, Overrides, RunParams, ScenarioConfig, SimInputs};
use crate::engine;
use crate::monte_carlo;
use crate::mortgage;
use crate::single_path;
use crate::stats;
use crate::stochastic::ShockMatrices;

/// Byte ceiling above which the shared shock matrices are not precomputed
/// and cells fall back to per-cell generators.
pub const SHOCK_PRECOMPUTE_CEILING_BYTES: u64 = 350_000_000;

/// Inputs for one heatmap evaluation. `cell_mask`, when present, is
/// row-major `y_vals x app_vals`; `false` cells are skipped and reported
/// as NaN.
#[derive(Debug, Clone)]
pub struct HeatmapRequest {
    pub cfg: ScenarioConfig,
    pub params: RunParams,
    /// X-axis: expected annual home appreciation (%), left to right.
    pub app_vals_pct: Vec<f64>,
    /// Y-axis values (%), top to bottom.
    pub y_vals_pct: Vec<f64>,
    pub y_axis: HeatmapYAxis,
    /// Mortgage rate override (%) applied to every cell.
    pub rate_override_pct: Option<f64>,
    pub cell_mask: Option<Vec<bool>>,
    /// Shock-matrix precompute ceiling; lowering it forces the per-cell
    /// generator path.
    pub shock_precompute_ceiling_bytes: u64,
}

impl HeatmapRequest {
    pub fn new(cfg: ScenarioConfig, params: RunParams) -> Self {
        HeatmapRequest {
            cfg,
            params,
            app_vals_pct: Vec::new(),
            y_vals_pct: Vec::new(),
            y_axis: HeatmapYAxis::default(),
            rate_override_pct: None,
            cell_mask: None,
            shock_precompute_ceiling_bytes: SHOCK_PRECOMPUTE_CEILING_BYTES,
        }
    }
}

/// Row-major result grids (`y_vals x app_vals`). Masked or failed cells
/// hold NaN.
#[derive(Debug, Clone)]
pub struct HeatmapGrid {
    pub n_rows: usize,
    pub n_cols: usize,
    /// Buyer win rate per cell (%, deterministic cells are 0/50/100).
    pub win_pct: Vec<f64>,
    /// Mean terminal buyer-minus-renter delta ($).
    pub mean_delta: Vec<f64>,
    /// Mean delta discounted to present value ($).
    pub mean_pv_delta: Vec<f64>,
}

impl HeatmapGrid {
    fn nan_filled(n_rows: usize, n_cols: usize) -> Self {
        HeatmapGrid {
            n_rows,
            n_cols,
            win_pct: vec![f64::NAN; n_rows * n_cols],
            mean_delta: vec![f64::NAN; n_rows * n_cols],
            mean_pv_delta: vec![f64::NAN; n_rows * n_cols],
        }
    }

    pub fn idx(&self, row: usize, col: usize) -> usize {
        row * self.n_cols + col
    }

    /// (win%, mean delta, mean PV delta) for one cell.
    pub fn at(&self, row: usize, col: usize) -> (f64, f64, f64) {
        let i = self.idx(row, col);
        (self.win_pct[i], self.mean_delta[i], self.mean_pv_delta[i])
    }
}

#[derive(Debug, Clone, Copy)]
struct CellOut {
    win_pct: f64,
    mean_delta: f64,
}

/// Specialize the resolved baseline inputs for one grid cell.
fn cell_inputs(
    base: &SimInputs,
    cfg: &ScenarioConfig,
    drag: f64,
    app_pct: f64,
    y_pct: f64,
    y_axis: HeatmapYAxis,
) -> SimInputs {
    let mut inp = base.clone();
    inp.apprec_annual = app_pct / 100.0;
    match y_axis {
        HeatmapYAxis::RentInflation => {
            let mut r = y_pct / 100.0;
            if cfg.rent_control_enabled {
                if let Some(cap) = cfg.rent_control_cap {
                    r = r.min(cap);
                }
            }
            if r <= -1.0 {
                r = -0.99;
            }
            inp.rent_inf = r;
        }
        HeatmapYAxis::RenterReturn => {
            inp.renter_drift = mortgage::monthly_log_drift_pct(y_pct * drag);
        }
    }
    // Per-cell liquidation accounting is not part of the grid outputs.
    inp.show_liquidation = false;
    inp
}

/// Buyer win rate over the terminal pairs of one cell, with the tolerance
/// scaled to the cell's own magnitude.
fn cell_win_pct(buyer: &[f64], renter: &[f64]) -> f64 {
    let scales: Vec<f64> = buyer
        .iter()
        .zip(renter)
        .filter(|(b, r)| b.is_finite() && r.is_finite())
        .map(|(b, r)| b.abs().max(r.abs()))
        .collect();
    if scales.is_empty() {
        return f64::NAN;
    }
    let scale = stats::median(&scales).unwrap_or(0.0).max(1.0);
    let tol = (1e-9 * scale).max(1e-6);
    let mut wins = 0.0;
    let mut n = 0u32;
    for (b, r) in buyer.iter().zip(renter) {
        if !b.is_finite() || !r.is_finite() {
            continue;
        }
        let d = b - r;
        if d > tol {
            wins += 1.0;
        } else if d.abs() <= tol {
            wins += 0.5;
        }
        n += 1;
    }
    wins / n as f64 * 100.0
}

fn mean_finite(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0u32;
    for v in values {
        if v.is_finite() {
            sum += v;
            n += 1;
        }
    }
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

fn evaluate_cell(
    inp: &SimInputs,
    is_mc: bool,
    trials: u32,
    seed: Option<u64>,
    shocks: Option<&ShockMatrices>,
) -> CellOut {
    if is_mc {
        let out = monte_carlo::run_vectorized(inp, trials, seed, true, shocks, None);
        CellOut {
            win_pct: cell_win_pct(&out.terminal_buyer, &out.terminal_renter),
            mean_delta: mean_finite(
                out.terminal_buyer
                    .iter()
                    .zip(&out.terminal_renter)
                    .map(|(b, r)| b - r),
            ),
        }
    } else {
        let out = single_path::simulate_single(inp, None);
        let delta = out.rows.last().map(|r| r.delta).unwrap_or(f64::NAN);
        let win = if !delta.is_finite() {
            f64::NAN
        } else if delta > 1e-6 {
            100.0
        } else if delta < -1e-6 {
            0.0
        } else {
            50.0
        };
        CellOut {
            win_pct: win,
            mean_delta: delta,
        }
    }
}

/// Evaluate the full grid. Rows run sequentially (the progress callback is
/// invoked once per completed row); cells within a row run in parallel.
pub fn run_heatmap(
    req: &HeatmapRequest,
    mut progress: Option<&mut dyn FnMut(u32, u32)>,
) -> HeatmapGrid {
    let n_rows = req.y_vals_pct.len();
    let n_cols = req.app_vals_pct.len();
    let mut grid = HeatmapGrid::nan_filled(n_rows, n_cols);
    if n_rows == 0 || n_cols == 0 {
        return grid;
    }

    let overrides = Overrides {
        rate_pct: req.rate_override_pct,
        ..Overrides::default()
    };
    let (base_inp, mut diag) = engine::resolve_inputs(&req.cfg, &req.params, &overrides);
    let disc_mo = engine::monthly_discount(&req.cfg, &mut diag);
    let drag = engine::annual_return_drag(&req.cfg);

    let use_vol = req
        .params
        .force_use_volatility
        .unwrap_or(req.cfg.use_volatility);
    let trials = req
        .params
        .num_sims_override
        .unwrap_or(req.cfg.num_sims)
        .max(1);
    let is_mc = use_vol && !req.params.force_deterministic && trials > 1;

    // One shock stream for every cell. Without the precomputed matrices
    // each cell reconstructs the identical stream from the seed.
    let shocks = if is_mc
        && ShockMatrices::bytes(base_inp.months, trials) <= req.shock_precompute_ceiling_bytes
    {
        Some(ShockMatrices::generate(
            req.params.seed,
            req.params.mkt_corr,
            base_inp.months,
            trials,
        ))
    } else {
        None
    };

    let pv_factor = if disc_mo != 0.0 {
        (1.0 + disc_mo).powi(base_inp.months as i32)
    } else {
        1.0
    };

    for row in 0..n_rows {
        let y_pct = req.y_vals_pct[row];
        let outs: Vec<Option<CellOut>> = (0..n_cols)
            .into_par_iter()
            .map(|col| {
                if let Some(mask) = &req.cell_mask {
                    if !mask[row * n_cols + col] {
                        return None;
                    }
                }
                let inp = cell_inputs(
                    &base_inp,
                    &req.cfg,
                    drag,
                    req.app_vals_pct[col],
                    y_pct,
                    req.y_axis,
                );
                Some(evaluate_cell(
                    &inp,
                    is_mc,
                    trials,
                    req.params.seed,
                    shocks.as_ref(),
                ))
            })
            .collect();

        for (col, out) in outs.into_iter().enumerate() {
            if let Some(cell) = out {
                let i = grid.idx(row, col);
                grid.win_pct[i] = cell.win_pct;
                grid.mean_delta[i] = cell.mean_delta;
                grid.mean_pv_delta[i] = cell.mean_delta / pv_factor;
            }
        }
        if let Some(cb) = progress.as_deref_mut() {
            cb(row as u32 + 1, n_rows as u32);
        }
    }

    grid
}
