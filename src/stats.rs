//! Small statistics helpers: percentiles, means and the scale-aware win
//! rate used across trials. All functions skip non-finite values rather
//! than poisoning the aggregate.

/// Linear-interpolation percentile of the finite values in `data`.
/// `p` in [0, 100]. Returns `None` when nothing finite remains.
pub fn percentile(data: &[f64], p: f64) -> Option<f64> {
    let mut v: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (v.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(v[lo]);
    }
    let frac = rank - lo as f64;
    Some(v[lo] + (v[hi] - v[lo]) * frac)
}

pub fn median(data: &[f64]) -> Option<f64> {
    percentile(data, 50.0)
}

pub fn mean(data: &[f64]) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &x in data {
        if x.is_finite() {
            sum += x;
            n += 1;
        }
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Buyer win rate across paired terminal net worths, as a percent.
///
/// Comparisons use a tolerance scaled to the data so that a $1 difference on
/// a $2M outcome counts as a tie, not a win: `tol = max(1e-6, 1e-9 * scale)`
/// where `scale = max(1, median(|all finite values|))`. Ties count half.
/// Pairs with a non-finite member are excluded; `None` means no valid pairs,
/// which is distinct from a 0% win rate.
pub fn win_rate_pct(buyer: &[f64], renter: &[f64]) -> Option<f64> {
    debug_assert_eq!(buyer.len(), renter.len());

    let abs_all: Vec<f64> = buyer
        .iter()
        .chain(renter.iter())
        .copied()
        .filter(|x| x.is_finite())
        .map(f64::abs)
        .collect();
    let scale = median(&abs_all).unwrap_or(1.0).max(1.0);
    let tol = (1e-9 * scale).max(1e-6);

    let mut wins = 0.0;
    let mut ties = 0.0;
    let mut n = 0usize;
    for (&b, &r) in buyer.iter().zip(renter.iter()) {
        if !b.is_finite() || !r.is_finite() {
            continue;
        }
        n += 1;
        let diff = b - r;
        if diff.abs() <= tol {
            ties += 1.0;
        } else if diff > 0.0 {
            wins += 1.0;
        }
    }

    if n == 0 {
        return None;
    }
    Some((wins + 0.5 * ties) / n as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile(&v, 0.0).unwrap(), 1.0);
        assert_relative_eq!(percentile(&v, 100.0).unwrap(), 4.0);
        assert_relative_eq!(percentile(&v, 50.0).unwrap(), 2.5);
        assert_relative_eq!(percentile(&v, 25.0).unwrap(), 1.75);
    }

    #[test]
    fn percentile_skips_nonfinite() {
        let v = [f64::NAN, 1.0, f64::INFINITY, 3.0];
        assert_relative_eq!(median(&v).unwrap(), 2.0);
        assert!(percentile(&[f64::NAN], 50.0).is_none());
    }

    #[test]
    fn win_rate_counts_ties_as_half() {
        let buyer = [10.0, 10.0, 5.0, 20.0];
        let renter = [10.0, 10.0, 6.0, 10.0];
        // 2 ties, 1 loss, 1 win -> (1 + 0.5*2) / 4 = 50%
        assert_relative_eq!(win_rate_pct(&buyer, &renter).unwrap(), 50.0);
    }

    #[test]
    fn win_rate_tolerance_scales_with_magnitude() {
        // $1 apart at $2M scale falls inside the tolerance band? No: tol is
        // 2e-3 at that scale, so $1 is a clear win. But 1e-4 apart is a tie.
        let buyer = [2_000_000.0 + 1e-4];
        let renter = [2_000_000.0];
        assert_relative_eq!(win_rate_pct(&buyer, &renter).unwrap(), 50.0);

        let buyer2 = [2_000_000.0 + 1.0];
        assert_relative_eq!(win_rate_pct(&buyer2, &renter).unwrap(), 100.0);
    }

    #[test]
    fn win_rate_none_when_no_valid_pairs() {
        assert!(win_rate_pct(&[], &[]).is_none());
        assert!(win_rate_pct(&[f64::NAN], &[1.0]).is_none());
    }

    #[test]
    fn win_rate_excludes_nonfinite_pairs() {
        let buyer = [f64::NAN, 20.0];
        let renter = [1.0, 10.0];
        assert_relative_eq!(win_rate_pct(&buyer, &renter).unwrap(), 100.0);
    }
}
