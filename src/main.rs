use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use rvb_sim::config::{HeatmapYAxis, Overrides, RunParams, ScenarioConfig, SurplusMode};
use rvb_sim::engine;
use rvb_sim::heatmap::{self, HeatmapRequest};
use rvb_sim::output;

#[derive(Parser)]
#[command(name = "rvb-sim", about = "Rent-vs-buy net-worth Monte Carlo simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SurplusArg {
    /// The cheaper side invests the monthly outflow gap
    InvestDiff,
    /// The gap accrues as zero-return cash
    Cash,
    /// Full income/expense budgeting (see --income flags)
    Budget,
}

#[derive(Clone, Copy, ValueEnum)]
enum YAxisArg {
    RentInflation,
    RenterReturn,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scenario (deterministic or Monte Carlo)
    Run {
        /// Scenario config TOML; defaults apply when omitted
        #[arg(long)]
        config: Option<String>,

        /// Output directory for ledger.csv, summary.json, config.toml
        #[arg(long, default_value = "output/run")]
        output_dir: String,

        /// Buyer expected annual return (%)
        #[arg(long, default_value = "6.0")]
        buyer_ret: f64,

        /// Renter expected annual return (%)
        #[arg(long, default_value = "6.0")]
        renter_ret: f64,

        /// Expected annual home appreciation (%)
        #[arg(long, default_value = "3.0")]
        apprec: f64,

        /// Stock/housing shock correlation [-1, 1]
        #[arg(long, default_value = "0.3")]
        corr: f64,

        /// Monthly surplus handling
        #[arg(long, value_enum, default_value = "invest-diff")]
        surplus: SurplusArg,

        /// Budget mode: gross monthly income ($)
        #[arg(long, default_value = "8000.0")]
        income: f64,

        /// Budget mode: monthly non-housing spend ($)
        #[arg(long, default_value = "3000.0")]
        nonhousing: f64,

        /// Budget mode: annual income growth (%)
        #[arg(long, default_value = "2.0")]
        income_growth: f64,

        /// Budget mode: allow portfolio withdrawals on shortfall
        #[arg(long)]
        allow_withdraw: bool,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Monte Carlo trials (overrides the config)
        #[arg(long)]
        sims: Option<u32>,

        /// Force the single deterministic path
        #[arg(long)]
        deterministic: bool,

        /// Skip path storage; terminal statistics only
        #[arg(long)]
        summary_only: bool,

        /// Mortgage rate override (%)
        #[arg(long)]
        rate: Option<f64>,

        /// Purchase price override ($)
        #[arg(long)]
        price: Option<f64>,

        /// Down payment override ($)
        #[arg(long)]
        down: Option<f64>,

        /// Down payment override as a fraction or percent of price
        #[arg(long)]
        down_pct: Option<f64>,

        /// Starting rent override ($/month)
        #[arg(long)]
        rent: Option<f64>,
    },

    /// Sweep a sensitivity heatmap over appreciation and a second axis
    Heatmap {
        /// Scenario config TOML; defaults apply when omitted
        #[arg(long)]
        config: Option<String>,

        /// Output CSV path
        #[arg(long, default_value = "output/heatmap.csv")]
        output: String,

        /// Comma-separated appreciation values (%), the x-axis
        #[arg(long, default_value = "0,1,2,3,4,5,6")]
        apprec: String,

        /// Comma-separated y-axis values (%)
        #[arg(long, default_value = "0,1,2,3,4,5")]
        y_vals: String,

        /// Which assumption the y-axis sweeps
        #[arg(long, value_enum, default_value = "rent-inflation")]
        y_axis: YAxisArg,

        /// Mortgage rate override (%) applied to every cell
        #[arg(long)]
        rate: Option<f64>,

        /// Buyer expected annual return (%)
        #[arg(long, default_value = "6.0")]
        buyer_ret: f64,

        /// Renter expected annual return (%); ignored on the renter-return axis
        #[arg(long, default_value = "6.0")]
        renter_ret: f64,

        /// Stock/housing shock correlation [-1, 1]
        #[arg(long, default_value = "0.3")]
        corr: f64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Monte Carlo trials per cell (overrides the config)
        #[arg(long)]
        sims: Option<u32>,

        /// Evaluate every cell on the single deterministic path
        #[arg(long)]
        deterministic: bool,
    },
}

fn load_config(path: &Option<String>) -> Result<ScenarioConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => ScenarioConfig::from_toml_file(std::path::Path::new(p)),
        None => Ok(ScenarioConfig::default()),
    }
}

fn parse_values(spec: &str) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
    spec.split(',')
        .map(|v| {
            let v = v.trim();
            v.parse::<f64>()
                .map_err(|e| format!("invalid axis value {:?}: {}", v, e).into())
        })
        .collect()
}

fn surplus_mode(
    arg: SurplusArg,
    income: f64,
    nonhousing: f64,
    income_growth: f64,
    allow_withdraw: bool,
) -> SurplusMode {
    match arg {
        SurplusArg::InvestDiff => SurplusMode::InvestDiff,
        SurplusArg::Cash => SurplusMode::TrackAsCash,
        SurplusArg::Budget => SurplusMode::Budget {
            monthly_income: income,
            monthly_nonhousing: nonhousing,
            income_growth_pct: income_growth,
            allow_withdraw,
        },
    }
}

fn progress_bar(label: &str) -> ProgressBar {
    let bar = ProgressBar::new(1);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .expect("Invalid progress template")
            .progress_chars("=> "),
    );
    bar.set_message(label.to_string());
    bar
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            buyer_ret,
            renter_ret,
            apprec,
            corr,
            surplus,
            income,
            nonhousing,
            income_growth,
            allow_withdraw,
            seed,
            sims,
            deterministic,
            summary_only,
            rate,
            price,
            down,
            down_pct,
            rent,
        } => {
            let cfg = match load_config(&config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error loading config: {}", e);
                    return;
                }
            };

            let params = RunParams {
                buyer_ret_pct: buyer_ret,
                renter_ret_pct: renter_ret,
                apprec_pct: apprec,
                mkt_corr: corr,
                surplus: surplus_mode(surplus, income, nonhousing, income_growth, allow_withdraw),
                rent_closing: true,
                seed: Some(seed),
                num_sims_override: sims,
                force_deterministic: deterministic,
                force_use_volatility: None,
                summary_only,
            };
            let overrides = Overrides {
                rate_pct: rate,
                price,
                down,
                down_pct,
                rent,
                ..Overrides::default()
            };

            let bar = progress_bar("simulating");
            let mut cb = |done: u32, total: u32| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            };
            let result = engine::run_scenario(&cfg, &params, &overrides, Some(&mut cb));
            bar.finish_and_clear();

            println!(
                "Engine: {:?}, trials={}, payment=${:.2}/mo, cash to close=${:.2}",
                result.diagnostics.engine,
                result.diagnostics.trials,
                result.payment_initial,
                result.cash_to_close
            );
            println!(
                "Final: buyer=${:.0}, renter=${:.0}, delta=${:.0}",
                result.final_buyer_nw,
                result.final_renter_nw,
                result.final_delta()
            );
            match result.win_rate_pct {
                Some(w) => println!("Buyer win rate: {:.1}%", w),
                None => println!("Buyer win rate: n/a"),
            }
            if let Some(liq) = &result.liquidation {
                println!(
                    "After tax: buyer=${:.0}, renter=${:.0} (taxes {:.0}/{:.0}, sale costs {:.0})",
                    liq.buyer_after_tax,
                    liq.renter_after_tax,
                    liq.buyer_tax,
                    liq.renter_tax,
                    liq.sale_costs
                );
            }
            for note in &result.diagnostics.notes {
                println!("Note: {}", note);
            }

            let dir = PathBuf::from(&output_dir);
            match output::save_all(&result, &cfg, &dir) {
                Ok(()) => println!("Saved {} ledger rows to {}", result.rows.len(), dir.display()),
                Err(e) => eprintln!("Error saving outputs: {}", e),
            }
        }

        Commands::Heatmap {
            config,
            output,
            apprec,
            y_vals,
            y_axis,
            rate,
            buyer_ret,
            renter_ret,
            corr,
            seed,
            sims,
            deterministic,
        } => {
            let cfg = match load_config(&config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error loading config: {}", e);
                    return;
                }
            };

            let params = RunParams {
                buyer_ret_pct: buyer_ret,
                renter_ret_pct: renter_ret,
                mkt_corr: corr,
                seed: Some(seed),
                num_sims_override: sims,
                force_deterministic: deterministic,
                ..RunParams::default()
            };

            let mut req = HeatmapRequest::new(cfg, params);
            req.app_vals_pct = match parse_values(&apprec) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Error parsing --apprec: {}", e);
                    return;
                }
            };
            req.y_vals_pct = match parse_values(&y_vals) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Error parsing --y-vals: {}", e);
                    return;
                }
            };
            req.y_axis = match y_axis {
                YAxisArg::RentInflation => HeatmapYAxis::RentInflation,
                YAxisArg::RenterReturn => HeatmapYAxis::RenterReturn,
            };
            req.rate_override_pct = rate;

            println!(
                "Sweeping {}x{} cells ({} axis)",
                req.y_vals_pct.len(),
                req.app_vals_pct.len(),
                match req.y_axis {
                    HeatmapYAxis::RentInflation => "rent inflation",
                    HeatmapYAxis::RenterReturn => "renter return",
                }
            );

            let bar = progress_bar("rows");
            let mut cb = |done: u32, total: u32| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            };
            let grid = heatmap::run_heatmap(&req, Some(&mut cb));
            bar.finish_and_clear();

            let out_path = PathBuf::from(&output);
            match output::save_heatmap_csv(&grid, &req.app_vals_pct, &req.y_vals_pct, &out_path) {
                Ok(()) => println!(
                    "Saved {} cells to {}",
                    grid.n_rows * grid.n_cols,
                    out_path.display()
                ),
                Err(e) => eprintln!("Error saving heatmap: {}", e),
            }
        }
    }
}
