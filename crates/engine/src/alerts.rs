//! Alert formatting.
//!
//! Translates a loan's `RiskAssessment` into a human-readable payload. Only
//! formats fields the risk engine already computed; nothing here derives
//! LTV or prices on its own.

use serde_json::json;

use loanwatch_common::types::{AlertPayload, Loan, RiskAssessment, RiskTier, Severity};

/// Formats risk assessments into alert payloads.
pub struct AlertFormatter;

impl AlertFormatter {
    /// Severity used when a loan in `tier` raises an alert.
    pub fn severity_for(tier: RiskTier) -> Severity {
        match tier {
            RiskTier::Low | RiskTier::Medium => Severity::Info,
            RiskTier::High => Severity::Warning,
            RiskTier::Critical => Severity::Critical,
        }
    }

    /// Translate an assessment into a human-readable alert payload.
    pub fn payload(loan: &Loan, assessment: &RiskAssessment) -> AlertPayload {
        let ltv = Self::fmt_pct(assessment.current_ltv);
        let threshold = Self::fmt_pct(loan.liquidation_threshold_pct);

        let (title, body) = match assessment.risk_tier {
            RiskTier::Critical => (
                "Loan At Liquidation Threshold".to_string(),
                format!(
                    "Loan {} ({}/{}) is eligible for liquidation: LTV {} >= threshold {}",
                    loan.id, loan.collateral_asset, loan.debt_asset, ltv, threshold
                ),
            ),
            RiskTier::High => (
                "Loan Near Liquidation".to_string(),
                format!(
                    "Loan {} ({}/{}) LTV {} is within 10% of threshold {}. \
                     Liquidation if {} falls to {} ({} drop) or {} rises to {} ({} rise)",
                    loan.id,
                    loan.collateral_asset,
                    loan.debt_asset,
                    ltv,
                    threshold,
                    loan.collateral_asset,
                    Self::fmt_usd(assessment.liquidation_price_collateral),
                    Self::fmt_pct(assessment.collateral_drop_pct_to_liquidation),
                    loan.debt_asset,
                    Self::fmt_usd(assessment.liquidation_price_debt_asset),
                    Self::fmt_pct(assessment.debt_asset_rise_pct_to_liquidation),
                ),
            ),
            RiskTier::Medium => (
                "Loan Risk Elevated".to_string(),
                format!(
                    "Loan {} ({}/{}) LTV {} has reached 75% of threshold {}",
                    loan.id, loan.collateral_asset, loan.debt_asset, ltv, threshold
                ),
            ),
            RiskTier::Low => (
                "Loan Healthy".to_string(),
                format!(
                    "Loan {} ({}/{}) LTV {} is well below threshold {}",
                    loan.id, loan.collateral_asset, loan.debt_asset, ltv, threshold
                ),
            ),
        };

        AlertPayload {
            title,
            body,
            severity: Self::severity_for(assessment.risk_tier),
            metadata: json!({
                "loan_id": loan.id,
                "collateral_asset": loan.collateral_asset,
                "debt_asset": loan.debt_asset,
                "risk_tier": assessment.risk_tier,
                "current_ltv": Self::finite(assessment.current_ltv),
                "liquidation_threshold_pct": loan.liquidation_threshold_pct,
                "liquidation_price_collateral": Self::finite(assessment.liquidation_price_collateral),
                "liquidation_price_debt_asset": Self::finite(assessment.liquidation_price_debt_asset),
                "collateral_drop_pct_to_liquidation": Self::finite(assessment.collateral_drop_pct_to_liquidation),
                "debt_asset_rise_pct_to_liquidation": Self::finite(assessment.debt_asset_rise_pct_to_liquidation),
            }),
        }
    }

    fn finite(value: f64) -> Option<f64> {
        value.is_finite().then_some(value)
    }

    fn fmt_pct(value: f64) -> String {
        match Self::finite(value) {
            Some(v) => format!("{:.2}%", v),
            None => "N/A".to_string(),
        }
    }

    /// Small token prices need more than two decimals to be useful.
    fn fmt_usd(value: f64) -> String {
        match Self::finite(value) {
            Some(v) if v.abs() >= 1.0 => format!("${:.2}", v),
            Some(v) => format!("${:.6}", v),
            None => "N/A".to_string(),
        }
    }
}
