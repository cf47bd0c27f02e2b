//! Loan sizing: how much can be borrowed against a collateral deposit.
//!
//! Sizing holds the debt-asset price fixed at its loan-creation value and
//! solves the canonical LTV equation for the debt amount. The resulting quote
//! is checked by running a provisional loan through [`RiskEngine::assess_risk`].

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use loanwatch_common::error::AppError;
use loanwatch_common::types::{Loan, LoanRecord, LoanStatus, MarketPrices, RiskTier};

use crate::risk::RiskEngine;

/// Terms offered for a new loan at creation-time prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoanQuote {
    /// Largest debt amount (in debt-asset units) that keeps LTV at the target
    pub max_borrow: f64,
    /// LTV of the quoted loan, recomputed through the risk engine
    pub ltv: f64,
    pub liquidation_price_collateral: f64,
    pub liquidation_price_debt_asset: f64,
    pub collateral_drop_pct_to_liquidation: f64,
    pub risk_tier: RiskTier,
}

/// Loan sizing service.
pub struct LoanSizer;

impl LoanSizer {
    /// Debt amount whose LTV equals `target_ltv_pct` at the given prices.
    ///
    /// Returns `0.0` when the collateral is worthless or the debt asset has no price.
    pub fn max_safe_borrow(
        collateral_amount: f64,
        prices: &MarketPrices,
        target_ltv_pct: f64,
    ) -> f64 {
        let collateral_value_usd = collateral_amount * prices.collateral_price_usd;
        if collateral_value_usd <= 0.0 || prices.debt_asset_price_usd <= 0.0 {
            return 0.0;
        }
        collateral_value_usd * (target_ltv_pct / 100.0) / prices.debt_asset_price_usd
    }

    /// Quote a new loan borrowing up to `target_ltv_pct`.
    ///
    /// The target must sit strictly below the liquidation threshold, otherwise
    /// the loan would be liquidatable the moment it is opened.
    pub fn quote(
        collateral_asset: &str,
        debt_asset: &str,
        collateral_amount: f64,
        prices: &MarketPrices,
        target_ltv_pct: f64,
        liquidation_threshold_pct: f64,
    ) -> Result<LoanQuote, AppError> {
        if !collateral_amount.is_finite() || collateral_amount <= 0.0 {
            return Err(AppError::Validation(format!(
                "collateral_amount must be > 0, got {}",
                collateral_amount
            )));
        }
        // Re-validate: callers may hand over a hand-built MarketPrices.
        let prices = MarketPrices::new(prices.collateral_price_usd, prices.debt_asset_price_usd)?;
        if !(target_ltv_pct > 0.0 && target_ltv_pct < liquidation_threshold_pct) {
            return Err(AppError::Validation(format!(
                "target LTV must be in (0, {}), got {}",
                liquidation_threshold_pct, target_ltv_pct
            )));
        }

        let max_borrow = Self::max_safe_borrow(collateral_amount, &prices, target_ltv_pct);

        // Goes through the same validation as a loan read from storage.
        let provisional = Loan::try_from(LoanRecord {
            id: Uuid::new_v4(),
            collateral_asset: collateral_asset.to_string(),
            debt_asset: debt_asset.to_string(),
            collateral_amount,
            debt_amount: max_borrow,
            liquidation_threshold_pct,
            status: LoanStatus::Active,
            initial_collateral_price_usd: Some(prices.collateral_price_usd),
            initial_debt_asset_price_usd: Some(prices.debt_asset_price_usd),
            created_at: Utc::now(),
        })?;

        let assessment = RiskEngine::assess_risk(&provisional, &prices);

        Ok(LoanQuote {
            max_borrow,
            ltv: assessment.current_ltv,
            liquidation_price_collateral: assessment.liquidation_price_collateral,
            liquidation_price_debt_asset: assessment.liquidation_price_debt_asset,
            collateral_drop_pct_to_liquidation: assessment.collateral_drop_pct_to_liquidation,
            risk_tier: assessment.risk_tier,
        })
    }
}
