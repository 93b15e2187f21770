/// Heatmap sweeps: grid shape, axis semantics, shared-random-number
/// stability, and CSV export.
use rvb_sim::config::{HeatmapYAxis, RunParams, ScenarioConfig};
use rvb_sim::heatmap::{run_heatmap, HeatmapRequest};
use rvb_sim::output;
use std::path::PathBuf;

fn request(years: u32, mc: bool) -> HeatmapRequest {
    let mut cfg = ScenarioConfig::default();
    cfg.years = years;
    if mc {
        cfg.use_volatility = true;
        cfg.num_sims = 128;
    }
    let mut req = HeatmapRequest::new(cfg, RunParams::default());
    req.app_vals_pct = vec![0.0, 1.5, 3.0, 4.5, 6.0];
    req.y_vals_pct = vec![0.0, 2.0, 4.0];
    req
}

#[test]
fn deterministic_sweep_is_monotone_in_appreciation() {
    let req = request(10, false);
    let grid = run_heatmap(&req, None);

    println!("\n  Deterministic 3x5 sweep (rent-inflation axis):");
    for row in 0..grid.n_rows {
        let deltas: Vec<String> = (0..grid.n_cols)
            .map(|col| format!("{:>12.0}", grid.at(row, col).1))
            .collect();
        println!(
            "    rent_inf {:>4.1}%: {}",
            req.y_vals_pct[row],
            deltas.join(" ")
        );
    }

    assert_eq!(grid.n_rows, 3);
    assert_eq!(grid.n_cols, 5);
    for row in 0..grid.n_rows {
        for col in 1..grid.n_cols {
            assert!(grid.at(row, col).1 > grid.at(row, col - 1).1);
        }
    }

    // Faster rent inflation favors the buyer down every column.
    for col in 0..grid.n_cols {
        assert!(grid.at(2, col).1 > grid.at(0, col).1);
    }
}

#[test]
fn renter_return_axis_flips_the_gradient() {
    let mut req = request(10, false);
    req.y_axis = HeatmapYAxis::RenterReturn;
    req.y_vals_pct = vec![3.0, 6.0, 9.0];

    let grid = run_heatmap(&req, None);
    for col in 0..grid.n_cols {
        // A stronger renter portfolio hurts the buyer.
        assert!(grid.at(2, col).1 < grid.at(0, col).1);
    }
}

#[test]
fn mc_sweep_shares_random_numbers_across_cells() {
    let req = request(3, true);
    let a = run_heatmap(&req, None);
    let b = run_heatmap(&req, None);

    for i in 0..a.win_pct.len() {
        assert_eq!(a.win_pct[i].to_bits(), b.win_pct[i].to_bits());
        assert_eq!(a.mean_delta[i].to_bits(), b.mean_delta[i].to_bits());
        assert!((0.0..=100.0).contains(&a.win_pct[i]));
    }

    // With common random numbers the appreciation gradient survives the
    // sampling noise: win% is non-decreasing left to right.
    println!("\n  MC win% grid ({} trials/cell):", 128);
    for row in 0..a.n_rows {
        let wins: Vec<String> = (0..a.n_cols)
            .map(|col| format!("{:>6.1}", a.at(row, col).0))
            .collect();
        println!("    {}", wins.join(" "));
        // Allow a one-trial wobble at the tie boundary.
        for col in 1..a.n_cols {
            assert!(a.at(row, col).0 >= a.at(row, col - 1).0 - 1.0);
        }
    }
}

#[test]
fn per_cell_generator_fallback_agrees_with_precompute() {
    let req = request(3, true);
    let precomputed = run_heatmap(&req, None);

    let mut streamed_req = request(3, true);
    streamed_req.shock_precompute_ceiling_bytes = 0;
    let streamed = run_heatmap(&streamed_req, None);

    // The matrices store shocks as f32; regenerating f64 streams per cell
    // rounds a little differently.
    for i in 0..precomputed.mean_delta.len() {
        let p = precomputed.mean_delta[i];
        let s = streamed.mean_delta[i];
        assert!(
            (p - s).abs() <= 50.0 + 0.02 * p.abs().max(s.abs()),
            "cell {}: precomputed {:.1} vs streamed {:.1}",
            i,
            p,
            s
        );
        assert!((precomputed.win_pct[i] - streamed.win_pct[i]).abs() <= 5.0);
    }
}

#[test]
fn masked_cells_are_nan_and_skipped() {
    let mut req = request(5, false);
    let mut mask = vec![true; 15];
    mask[0] = false;
    mask[14] = false;
    req.cell_mask = Some(mask);

    let grid = run_heatmap(&req, None);
    assert!(grid.at(0, 0).1.is_nan());
    assert!(grid.at(2, 4).1.is_nan());
    assert!(grid.at(1, 2).1.is_finite());
}

#[test]
fn heatmap_csv_export() {
    let req = request(5, false);
    let grid = run_heatmap(&req, None);

    let dir = std::env::temp_dir().join("rvb_sim_heatmap_test");
    let path: PathBuf = dir.join("heatmap.csv");
    output::save_heatmap_csv(&grid, &req.app_vals_pct, &req.y_vals_pct, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 1 + 15);
    assert!(text.starts_with("y_value_pct,appreciation_pct,win_pct"));
    std::fs::remove_dir_all(&dir).ok();
}
