//! Correlated random shocks for stock returns and home prices.
//!
//! A single systematic factor drives the correlation: with `a = sqrt(|rho|)`
//! and `b = sqrt(1 - |rho|)`,
//!
//! ```text
//! stock = a * z_sys             + b * z_stock
//! house = a * sign(rho) * z_sys + b * z_house
//! ```
//!
//! which gives `corr(stock, house) = rho` for standard normal components.
//! Draw order is fixed (z_sys, z_stock, z_house) so a seed always produces
//! the same stream regardless of which consumer asks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Log-space growth exponent clamp. Keeps exp() finite even under absurd
/// drift/volatility inputs.
const GROWTH_EXP_CLAMP: f64 = 50.0;

/// One month's multiplicative growth factor from a log drift, a monthly
/// volatility and a standard normal shock.
pub fn growth_factor(mu: f64, sigma: f64, shock: f64) -> f64 {
    let mut expo = mu + sigma * shock;
    if !expo.is_finite() {
        expo = 0.0;
    }
    expo.clamp(-GROWTH_EXP_CLAMP, GROWTH_EXP_CLAMP).exp()
}

/// Seeded generator of correlated (stock, house) shock pairs.
pub struct ShockGenerator {
    rng: StdRng,
    a: f64,
    b: f64,
    corr_sign: f64,
}

impl ShockGenerator {
    /// `None` seeds from OS entropy and is not reproducible.
    pub fn new(seed: Option<u64>, mkt_corr: f64) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let rho = if mkt_corr.is_finite() {
            mkt_corr.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        ShockGenerator {
            rng,
            a: rho.abs().sqrt(),
            b: (1.0 - rho.abs()).sqrt(),
            corr_sign: if rho < 0.0 { -1.0 } else { 1.0 },
        }
    }

    /// One (stock, house) shock pair.
    pub fn draw(&mut self) -> (f64, f64) {
        let z_sys: f64 = self.rng.sample(StandardNormal);
        let z_stock: f64 = self.rng.sample(StandardNormal);
        let z_house: f64 = self.rng.sample(StandardNormal);
        (
            self.a * z_sys + self.b * z_stock,
            self.a * self.corr_sign * z_sys + self.b * z_house,
        )
    }

    /// One month of shocks across `n` trials, filled into the provided
    /// buffers. Draw order per trial matches [`ShockGenerator::draw`].
    pub fn draw_row(&mut self, stock: &mut [f64], house: &mut [f64]) {
        debug_assert_eq!(stock.len(), house.len());
        for (s, h) in stock.iter_mut().zip(house.iter_mut()) {
            let (zs, zh) = self.draw();
            *s = zs;
            *h = zh;
        }
    }
}

/// Precomputed month-major shock matrices, stored as f32 to halve memory.
/// Row `m` holds the shocks for month `m+1` across all trials.
pub struct ShockMatrices {
    pub months: u32,
    pub trials: u32,
    pub stock: Vec<f32>,
    pub house: Vec<f32>,
}

impl ShockMatrices {
    /// Bytes required for both matrices.
    pub fn bytes(months: u32, trials: u32) -> u64 {
        2 * months as u64 * trials as u64 * 4
    }

    /// Generate the full stream for `months x trials`. Re-generating with
    /// the same seed yields bit-identical matrices, which is what lets
    /// chunked grid evaluation share one set of random numbers.
    pub fn generate(seed: Option<u64>, mkt_corr: f64, months: u32, trials: u32) -> Self {
        let mut gen = ShockGenerator::new(seed, mkt_corr);
        let n = months as usize * trials as usize;
        let mut stock = vec![0.0f32; n];
        let mut house = vec![0.0f32; n];
        for m in 0..months as usize {
            let base = m * trials as usize;
            for t in 0..trials as usize {
                let (zs, zh) = gen.draw();
                stock[base + t] = zs as f32;
                house[base + t] = zh as f32;
            }
        }
        ShockMatrices {
            months,
            trials,
            stock,
            house,
        }
    }

    /// Shock rows for a given month (1-based).
    pub fn row(&self, month: u32) -> (&[f32], &[f32]) {
        let base = (month as usize - 1) * self.trials as usize;
        let end = base + self.trials as usize;
        (&self.stock[base..end], &self.house[base..end])
    }
}
