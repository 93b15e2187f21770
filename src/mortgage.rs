//! Mortgage rate conversions and amortization math.
//!
//! Canadian fixed mortgages compound semi-annually by law, so the quoted
//! nominal annual rate converts to an effective monthly rate as
//! `(1 + r/2)^(2/12) - 1` rather than `r/12`. All functions here coerce
//! pathological inputs to something finite instead of propagating NaN into
//! the simulation loop.

/// Floor applied to effective monthly rates so `1 + mr > 0` always holds.
const MIN_MONTHLY_RATE: f64 = -0.999999;

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Clamp an effective monthly rate to a mathematically safe range for
/// amortization math.
pub fn clamp_monthly_rate(mr: f64) -> f64 {
    finite_or_zero(mr).max(MIN_MONTHLY_RATE)
}

/// Convert an annual nominal rate in percent to an effective monthly rate
/// (decimal).
///
/// - Standard (US-style): nominal compounded monthly -> r/12
/// - Canada: nominal compounded semi-annually -> (1 + r/2)^(2/12) - 1
pub fn monthly_rate(nominal_annual_pct: f64, canadian: bool) -> f64 {
    let r = finite_or_zero(nominal_annual_pct) / 100.0;

    if canadian {
        let mut base = 1.0 + r / 2.0;
        if base <= 0.0 {
            base = 1e-12;
        }
        let mr = base.powf(2.0 / 12.0) - 1.0;
        return mr.max(MIN_MONTHLY_RATE);
    }

    (r / 12.0).max(MIN_MONTHLY_RATE)
}

/// Inverse of [`monthly_rate`]: monthly effective rate -> annual nominal
/// percent.
pub fn annual_nominal_pct(mr: f64, canadian: bool) -> f64 {
    let mr = finite_or_zero(mr);

    if canadian {
        // (1 + r/2)^(2/12) - 1 = mr  =>  r = 2((1+mr)^6 - 1)
        let mut base = 1.0 + mr.max(MIN_MONTHLY_RATE);
        if base <= 0.0 {
            base = 1e-12;
        }
        return 100.0 * 2.0 * (base.powi(6) - 1.0);
    }

    100.0 * mr * 12.0
}

/// Fixed level payment for remaining balance `principal` at monthly rate `mr`
/// over `rem_months`.
///
/// Supports negative rates as long as `(1+mr) > 0`. For mr ~ 0 or a
/// degenerate annuity denominator, falls back to straight-line
/// `principal / rem_months`. Returns 0 for non-positive principal.
pub fn payment(principal: f64, mr: f64, rem_months: u32) -> f64 {
    let p = finite_or_zero(principal);
    if p <= 0.0 {
        return 0.0;
    }
    let n = rem_months.max(1);
    let r = clamp_monthly_rate(mr);

    if r.abs() < 1e-12 {
        return p / n as f64;
    }

    let mut base = 1.0 + r;
    if base <= 0.0 {
        base = 1e-12;
    }
    let pow = base.powi(n as i32);
    let denom = pow - 1.0;
    if !pow.is_finite() || denom.abs() < 1e-12 {
        return p / n as f64;
    }

    p * (r * pow) / denom
}

/// Annual *effective* return (decimal) -> monthly log drift.
///
/// Growth factors are modeled as `exp(mu + sigma*z - 0.5*sigma^2)`, so
/// `mu = ln(1+r)/12` makes the expected monthly growth compound to the
/// annual effective input.
pub fn monthly_log_drift(annual_effective: f64) -> f64 {
    let r = finite_or_zero(annual_effective).max(MIN_MONTHLY_RATE);
    r.ln_1p() / 12.0
}

/// Annual effective percent (e.g. 6.0) -> monthly log drift.
pub fn monthly_log_drift_pct(annual_effective_pct: f64) -> f64 {
    monthly_log_drift(finite_or_zero(annual_effective_pct) / 100.0)
}

/// Annual *effective* rate (decimal) -> monthly effective rate (decimal).
pub fn monthly_effective(annual_effective: f64) -> f64 {
    let r = finite_or_zero(annual_effective).max(MIN_MONTHLY_RATE);
    (1.0 + r).powf(1.0 / 12.0) - 1.0
}

/// Interest Rate Differential prepayment penalty.
///
/// Breaking a fixed-rate mortgage mid-term costs the greater of three
/// months' interest at the contract rate and the IRD: the rate spread times
/// the remaining term on the outstanding balance. Simplified lender-posted
/// model; actual penalties vary by lender.
pub fn ird_prepayment_penalty(
    remaining_balance: f64,
    contract_rate_pct: f64,
    comparison_rate_pct: f64,
    remaining_term_months: u32,
    canadian_compounding: bool,
) -> f64 {
    let bal = finite_or_zero(remaining_balance).max(0.0);
    if bal <= 0.0 || remaining_term_months == 0 {
        return 0.0;
    }

    let mr_contract = monthly_rate(contract_rate_pct, canadian_compounding);
    let three_month_interest = bal * mr_contract * 3.0;

    let rate_diff = (finite_or_zero(contract_rate_pct) - finite_or_zero(comparison_rate_pct)) / 100.0;
    if rate_diff <= 0.0 {
        // Comparison rate >= contract rate: only the 3-month rule applies.
        return three_month_interest.max(0.0);
    }

    let ird = bal * rate_diff * (remaining_term_months as f64 / 12.0);
    three_month_interest.max(ird).max(0.0)
}

/// IRD penalty at `months_elapsed` into a term, estimating the remaining
/// balance by replaying the amortization schedule. The comparison rate
/// defaults to `contract - rate_drop_pp` when not supplied (the falling-rate
/// case where an IRD penalty typically arises).
#[allow(clippy::too_many_arguments)]
pub fn ird_penalty_for_simulation(
    original_principal: f64,
    contract_rate_pct: f64,
    monthly_payment: f64,
    months_elapsed: u32,
    term_months: u32,
    comparison_rate_pct: Option<f64>,
    rate_drop_pp: f64,
    canadian_compounding: bool,
) -> f64 {
    let bal0 = finite_or_zero(original_principal).max(0.0);
    if months_elapsed >= term_months || bal0 <= 0.0 {
        return 0.0;
    }

    let mr = monthly_rate(contract_rate_pct, canadian_compounding);
    let pmt = finite_or_zero(monthly_payment);
    let mut balance = bal0;
    for _ in 0..months_elapsed {
        let interest = balance * mr;
        balance = (balance - (pmt - interest)).max(0.0);
    }

    let comparison = comparison_rate_pct
        .unwrap_or_else(|| (finite_or_zero(contract_rate_pct) - rate_drop_pp).max(0.0));

    ird_prepayment_penalty(
        balance,
        contract_rate_pct,
        comparison,
        term_months - months_elapsed,
        canadian_compounding,
    )
}
