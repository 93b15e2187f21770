pub mod config;
pub mod engine;
pub mod heatmap;
pub mod ledger;
pub mod liquidation;
pub mod monte_carlo;
pub mod mortgage;
pub mod output;
pub mod policy;
pub mod single_path;
pub mod stats;
pub mod stochastic;
