//! Terminal liquidation and capital-gains accounting.
//!
//! Pure functions over terminal balances; the simulators track cost basis
//! along the path and hand the final numbers here. Registered-account
//! shelter is modeled pro-rata on basis: if the contribution room covers
//! 60% of the basis, 60% of the gain is assumed sheltered.

use crate::config::{CgInclusionPolicy, LiquidationPlan};

/// Inclusion-rate multiplier above the tiered threshold, approximating the
/// 50% -> 66.67% step.
const TIERED_MULTIPLIER: f64 = 4.0 / 3.0;

/// Total registered contribution room accumulated over the horizon.
pub fn shelter_cap(plan: &LiquidationPlan, years: u32) -> f64 {
    if !plan.shelter_enabled {
        return 0.0;
    }
    (plan.initial_room + plan.annual_room * years as f64).max(0.0)
}

/// Portion of an investment gain left taxable after the registered shelter.
pub fn taxable_gain_after_shelter(gain: f64, basis: f64, cap: f64) -> f64 {
    if gain <= 0.0 {
        return 0.0;
    }
    if basis <= 0.0 {
        // No contributions were ever made, so nothing is sheltered.
        return gain;
    }
    let sheltered_frac = (basis.min(cap) / basis).clamp(0.0, 1.0);
    gain * (1.0 - sheltered_frac)
}

/// Capital-gains tax on a taxable gain under the configured inclusion
/// policy. `eff_rate` is the effective decimal rate on included gains.
pub fn cg_tax_due(
    taxable_gain: f64,
    eff_rate: f64,
    policy: CgInclusionPolicy,
    threshold: f64,
) -> f64 {
    if taxable_gain <= 0.0 || eff_rate <= 0.0 {
        return 0.0;
    }
    match policy {
        CgInclusionPolicy::Current => taxable_gain * eff_rate,
        CgInclusionPolicy::Tiered => {
            let below = taxable_gain.min(threshold.max(0.0));
            let above = (taxable_gain - below).max(0.0);
            below * eff_rate + above * eff_rate * TIERED_MULTIPLIER
        }
    }
}

/// Tax due at liquidation on an invested balance with tracked cost basis.
pub fn investment_tax(plan: &LiquidationPlan, years: u32, balance: f64, basis: f64) -> f64 {
    let gain = (balance - basis).max(0.0);
    let taxable = taxable_gain_after_shelter(gain, basis, shelter_cap(plan, years));
    cg_tax_due(taxable, plan.eff_cg_rate, plan.policy, plan.threshold)
}

/// Tax due on the home sale. Zero for a principal residence; otherwise the
/// gain of net sale proceeds (after selling costs) over the adjusted cost
/// base (purchase price plus closing costs) is taxed under the same
/// inclusion policy.
pub fn home_sale_tax(
    plan: &LiquidationPlan,
    sold: bool,
    net_proceeds: f64,
    purchase_price: f64,
    closing_costs: f64,
) -> f64 {
    if !sold || plan.is_principal_residence || plan.home_cg_rate <= 0.0 {
        return 0.0;
    }
    let acb = purchase_price + closing_costs.max(0.0);
    let gain = (net_proceeds - acb).max(0.0);
    cg_tax_due(gain, plan.home_cg_rate, plan.policy, plan.threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plan(rate: f64, policy: CgInclusionPolicy) -> LiquidationPlan {
        LiquidationPlan {
            eff_cg_rate: rate,
            home_cg_rate: rate,
            policy,
            threshold: 250_000.0,
            shelter_enabled: true,
            initial_room: 50_000.0,
            annual_room: 7_000.0,
            is_principal_residence: true,
        }
    }

    #[test]
    fn shelter_prorates_on_basis() {
        // Cap covers half the basis, so half the gain stays taxable.
        assert_relative_eq!(taxable_gain_after_shelter(100_000.0, 200_000.0, 100_000.0), 50_000.0);
        // Cap exceeds basis: fully sheltered.
        assert_relative_eq!(taxable_gain_after_shelter(100_000.0, 80_000.0, 100_000.0), 0.0);
        // Zero basis means nothing was contributed through the account.
        assert_relative_eq!(taxable_gain_after_shelter(100_000.0, 0.0, 100_000.0), 100_000.0);
        assert_relative_eq!(taxable_gain_after_shelter(-5.0, 100.0, 50.0), 0.0);
    }

    #[test]
    fn shelter_cap_accrues_annually() {
        let p = plan(0.225, CgInclusionPolicy::Current);
        assert_relative_eq!(shelter_cap(&p, 10), 50_000.0 + 70_000.0);
        let off = LiquidationPlan {
            shelter_enabled: false,
            ..p
        };
        assert_relative_eq!(shelter_cap(&off, 10), 0.0);
    }

    #[test]
    fn tiered_policy_steps_above_threshold() {
        let rate = 0.225;
        let below = cg_tax_due(200_000.0, rate, CgInclusionPolicy::Tiered, 250_000.0);
        assert_relative_eq!(below, 200_000.0 * rate);

        let above = cg_tax_due(400_000.0, rate, CgInclusionPolicy::Tiered, 250_000.0);
        let expect = 250_000.0 * rate + 150_000.0 * rate * 4.0 / 3.0;
        assert_relative_eq!(above, expect, epsilon = 1e-9);

        // Flat policy ignores the threshold.
        let flat = cg_tax_due(400_000.0, rate, CgInclusionPolicy::Current, 250_000.0);
        assert_relative_eq!(flat, 400_000.0 * rate);
    }

    #[test]
    fn principal_residence_exempt() {
        let p = plan(0.225, CgInclusionPolicy::Current);
        assert_eq!(home_sale_tax(&p, true, 1_200_000.0, 800_000.0, 25_000.0), 0.0);

        let rental = LiquidationPlan {
            is_principal_residence: false,
            ..p
        };
        let tax = home_sale_tax(&rental, true, 1_200_000.0, 800_000.0, 25_000.0);
        assert_relative_eq!(tax, (1_200_000.0 - 825_000.0) * 0.225, epsilon = 1e-9);
        // Not sold: no tax regardless.
        assert_eq!(home_sale_tax(&rental, false, 1_200_000.0, 800_000.0, 25_000.0), 0.0);
    }

    #[test]
    fn zero_rate_disables_everything() {
        let p = plan(0.0, CgInclusionPolicy::Tiered);
        assert_eq!(investment_tax(&p, 25, 900_000.0, 300_000.0), 0.0);
    }
}
