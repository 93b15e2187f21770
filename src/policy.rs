//! Canada-specific purchase policy lookups.
//!
//! Rules-of-thumb used for simulation defaults; lenders and insurers apply
//! additional criteria. Everything is keyed off an as-of date so threshold
//! changes remain auditable over time. The engine treats these as opaque
//! lookup functions and never reaches into the bracket math.

use chrono::NaiveDate;

/// Insured-mortgage purchase price cap.
///
/// As of 2024-12-15 the federal cap rose from $1,000,000 to $1,500,000.
pub fn insured_mortgage_price_cap(asof: NaiveDate) -> f64 {
    let cutover = NaiveDate::from_ymd_opt(2024, 12, 15).expect("valid date");
    if asof >= cutover {
        1_500_000.0
    } else {
        1_000_000.0
    }
}

/// Minimum down payment in Canada (simulation default).
///
/// - <= $500k: 5% of price
/// - $500k .. insured cap: 5% of first $500k + 10% of the remainder
/// - >= insured cap: 20% (mortgage insurance unavailable)
pub fn min_down_payment(price: f64, asof: NaiveDate) -> f64 {
    let p = price.max(0.0);
    if p <= 500_000.0 {
        return 0.05 * p;
    }
    let cap = insured_mortgage_price_cap(asof);
    if p < cap {
        return 0.05 * 500_000.0 + 0.10 * (p - 500_000.0);
    }
    0.20 * p
}

/// How the down payment was funded. Non-traditional sources (borrowed funds)
/// carry a higher premium in the top LTV band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DownPaymentSource {
    #[default]
    Traditional,
    NonTraditional,
}

/// Approximate mortgage default insurance premium rate from loan-to-value.
///
/// Returns 0 when no insurance is required (LTV <= 80%) or out of range.
pub fn insurance_premium_rate(ltv: f64, source: DownPaymentSource) -> f64 {
    if ltv <= 0.80 {
        return 0.0;
    }
    if ltv <= 0.85 {
        return 0.028;
    }
    if ltv <= 0.90 {
        return 0.031;
    }
    if ltv <= 0.95 {
        return match source {
            DownPaymentSource::Traditional => 0.040,
            DownPaymentSource::NonTraditional => 0.045,
        };
    }
    0.0
}

/// Provincial sales tax charged on the mortgage default insurance premium.
/// Payable in cash at closing (it cannot be rolled into the loan).
pub fn insurance_sales_tax_rate(province: &str, _asof: NaiveDate) -> f64 {
    match province.trim().to_ascii_uppercase().as_str() {
        "ON" | "ONTARIO" => 0.08,
        "QC" | "QUEBEC" | "QUÉBEC" => 0.09975,
        "SK" | "SASKATCHEWAN" => 0.06,
        "MB" | "MANITOBA" => 0.07,
        _ => 0.0,
    }
}

/// Land transfer / registration tax split.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransferTax {
    pub provincial: f64,
    pub municipal: f64,
    pub total: f64,
}

/// Land transfer tax on a purchase.
///
/// Simplified Ontario-style marginal schedule; Toronto layers a matching
/// municipal tax on top, and first-time buyers get a rebate capped per level
/// of government. Stands in for the full per-province bracket tables, which
/// live outside the engine.
pub fn transfer_tax(price: f64, first_time_buyer: bool, toronto: bool) -> TransferTax {
    fn marginal(p: f64) -> f64 {
        let brackets = [
            (55_000.0, 0.005),
            (250_000.0, 0.010),
            (400_000.0, 0.015),
            (2_000_000.0, 0.020),
            (f64::INFINITY, 0.025),
        ];
        let mut tax = 0.0;
        let mut lower = 0.0;
        for (upper, rate) in brackets {
            if p <= lower {
                break;
            }
            tax += (p.min(upper) - lower) * rate;
            lower = upper;
        }
        tax
    }

    let p = price.max(0.0);
    let mut provincial = marginal(p);
    let mut municipal = if toronto { marginal(p) } else { 0.0 };

    if first_time_buyer {
        provincial = (provincial - 4_000.0).max(0.0);
        municipal = (municipal - 4_475.0).max(0.0);
    }

    TransferTax {
        provincial,
        municipal,
        total: provincial + municipal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn asof(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn price_cap_cutover() {
        assert_eq!(insured_mortgage_price_cap(asof(2024, 12, 14)), 1_000_000.0);
        assert_eq!(insured_mortgage_price_cap(asof(2024, 12, 15)), 1_500_000.0);
    }

    #[test]
    fn min_down_tiers() {
        let d = asof(2025, 6, 1);
        assert_relative_eq!(min_down_payment(400_000.0, d), 20_000.0);
        assert_relative_eq!(min_down_payment(800_000.0, d), 25_000.0 + 30_000.0);
        assert_relative_eq!(min_down_payment(1_600_000.0, d), 320_000.0);
    }

    #[test]
    fn premium_rate_bands() {
        assert_eq!(insurance_premium_rate(0.80, DownPaymentSource::Traditional), 0.0);
        assert_eq!(insurance_premium_rate(0.85, DownPaymentSource::Traditional), 0.028);
        assert_eq!(insurance_premium_rate(0.90, DownPaymentSource::Traditional), 0.031);
        assert_eq!(insurance_premium_rate(0.95, DownPaymentSource::Traditional), 0.040);
        assert_eq!(
            insurance_premium_rate(0.95, DownPaymentSource::NonTraditional),
            0.045
        );
        assert_eq!(insurance_premium_rate(0.97, DownPaymentSource::Traditional), 0.0);
    }

    #[test]
    fn transfer_tax_toronto_doubles() {
        let t = transfer_tax(800_000.0, false, true);
        assert_relative_eq!(t.provincial, t.municipal, epsilon = 1e-9);
        assert_relative_eq!(t.total, t.provincial + t.municipal, epsilon = 1e-9);

        let rebated = transfer_tax(800_000.0, true, true);
        assert!(rebated.total < t.total);
    }
}
