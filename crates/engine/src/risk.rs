//! Dual-asset risk engine.
//!
//! Combines the independently moving USD prices of a loan's collateral and
//! debt assets into a single LTV, and inverts that relationship to find the
//! price of either asset at which the loan hits its liquidation threshold.
//!
//! LTV = debt_amount * debt_price / (collateral_amount * collateral_price) * 100
//!
//! Every LTV in the workspace goes through [`RiskEngine::compute_ltv`]. All
//! functions here are pure: no I/O, no logging, no state.
//! Degenerate inputs (zero or negative amounts and prices) never panic; they
//! produce non-finite numbers or hit the zero-collateral guard.

use loanwatch_common::types::{Loan, MarketPrices, RiskAssessment, RiskTier};

/// Fraction of the liquidation threshold at which a loan becomes `high` risk.
pub const HIGH_TIER_FRACTION: f64 = 0.90;

/// Fraction of the liquidation threshold at which a loan becomes `medium` risk.
pub const MEDIUM_TIER_FRACTION: f64 = 0.75;

/// The risk engine.
pub struct RiskEngine;

impl RiskEngine {
    /// Loan-to-value in percent.
    ///
    /// Returns `0.0` when the collateral value is not positive instead of
    /// dividing by zero. There is no upper clamp: an underwater loan reports
    /// an LTV above 100.
    pub fn compute_ltv(
        collateral_amount: f64,
        debt_amount: f64,
        collateral_price_usd: f64,
        debt_asset_price_usd: f64,
    ) -> f64 {
        let collateral_value_usd = collateral_amount * collateral_price_usd;
        let debt_value_usd = debt_amount * debt_asset_price_usd;

        if collateral_value_usd <= 0.0 {
            return 0.0;
        }

        debt_value_usd / collateral_value_usd * 100.0
    }

    /// Collateral price at which the loan liquidates, holding the debt-asset price fixed.
    ///
    /// `collateral_amount` and `liquidation_threshold_pct` must be `> 0`.
    pub fn compute_liquidation_price_collateral(
        debt_amount: f64,
        collateral_amount: f64,
        debt_asset_price_usd: f64,
        liquidation_threshold_pct: f64,
    ) -> f64 {
        (debt_amount * debt_asset_price_usd) / collateral_amount
            * (100.0 / liquidation_threshold_pct)
    }

    /// Debt-asset price at which the loan liquidates, holding the collateral price fixed.
    ///
    /// `debt_amount` must be `> 0`; a loan without debt never liquidates.
    pub fn compute_liquidation_price_debt_asset(
        debt_amount: f64,
        collateral_amount: f64,
        collateral_price_usd: f64,
        liquidation_threshold_pct: f64,
    ) -> f64 {
        (collateral_amount * collateral_price_usd) * (liquidation_threshold_pct / 100.0)
            / debt_amount
    }

    /// Classify an LTV relative to the loan's own liquidation threshold.
    ///
    /// First match wins:
    /// - `critical` at or above the threshold
    /// - `high` at or above 90% of it
    /// - `medium` at or above 75% of it
    /// - `low` otherwise
    ///
    /// A non-finite LTV cannot be placed and is treated as `critical`.
    pub fn classify(current_ltv: f64, liquidation_threshold_pct: f64) -> RiskTier {
        if current_ltv.is_nan() || current_ltv >= liquidation_threshold_pct {
            RiskTier::Critical
        } else if current_ltv >= HIGH_TIER_FRACTION * liquidation_threshold_pct {
            RiskTier::High
        } else if current_ltv >= MEDIUM_TIER_FRACTION * liquidation_threshold_pct {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    /// Current LTV of a loan at the given prices.
    pub fn current_ltv(loan: &Loan, prices: &MarketPrices) -> f64 {
        Self::compute_ltv(
            loan.collateral_amount,
            loan.debt_amount,
            prices.collateral_price_usd,
            prices.debt_asset_price_usd,
        )
    }

    /// Full risk assessment of a loan at the given prices.
    pub fn assess_risk(loan: &Loan, prices: &MarketPrices) -> RiskAssessment {
        let collateral_price = prices.collateral_price_usd;
        let debt_price = prices.debt_asset_price_usd;
        let threshold = loan.liquidation_threshold_pct;

        let current_ltv = Self::current_ltv(loan, prices);

        let liquidation_price_collateral = Self::compute_liquidation_price_collateral(
            loan.debt_amount,
            loan.collateral_amount,
            debt_price,
            threshold,
        );
        let liquidation_price_debt_asset = Self::compute_liquidation_price_debt_asset(
            loan.debt_amount,
            loan.collateral_amount,
            collateral_price,
            threshold,
        );

        // f64::max drops a NaN operand, so both buffers stay >= 0.
        let collateral_drop_pct_to_liquidation =
            ((collateral_price - liquidation_price_collateral) / collateral_price * 100.0).max(0.0);
        let debt_asset_rise_pct_to_liquidation =
            ((liquidation_price_debt_asset - debt_price) / debt_price * 100.0).max(0.0);

        RiskAssessment {
            current_ltv,
            liquidation_price_collateral,
            liquidation_price_debt_asset,
            collateral_drop_pct_to_liquidation,
            debt_asset_rise_pct_to_liquidation,
            risk_tier: Self::classify(current_ltv, threshold),
        }
    }

    /// Whether the loan is at or past its liquidation threshold.
    ///
    /// Derived from the same classification as [`RiskEngine::assess_risk`],
    /// so it is `true` exactly when the assessed tier is `critical`.
    pub fn is_liquidation_eligible(loan: &Loan, prices: &MarketPrices) -> bool {
        let current_ltv = Self::current_ltv(loan, prices);
        Self::classify(current_ltv, loan.liquidation_threshold_pct) == RiskTier::Critical
    }
}
