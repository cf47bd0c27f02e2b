//! Portfolio aggregation: assesses every active loan against one price sheet.
//!
//! Each loan is assessed independently. Portfolio-level LTV is computed with
//! the same `compute_ltv` used for single loans, applied to USD totals.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use loanwatch_common::types::{Loan, PriceSheet, RiskAssessment, RiskTier};

use crate::risk::RiskEngine;

/// Assessment of a single loan within a portfolio evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct LoanAssessment {
    pub loan_id: Uuid,
    pub assessment: RiskAssessment,
    pub liquidation_eligible: bool,
}

/// An active loan that could not be priced from the sheet.
#[derive(Debug, Clone, Serialize)]
pub struct UnpricedLoan {
    pub loan_id: Uuid,
    pub reason: String,
}

/// Aggregate figures over all priced active loans.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioSummary {
    pub active_loans: usize,
    pub total_collateral_value_usd: f64,
    pub total_debt_value_usd: f64,
    /// LTV of the portfolio as if it were one loan
    pub aggregate_ltv: f64,
    /// Unweighted mean of the per-loan LTVs
    pub average_ltv: f64,
    pub tier_counts: BTreeMap<RiskTier, usize>,
    /// Loans in the `high` or `critical` tier
    pub at_risk_loans: usize,
    pub liquidation_eligible: usize,
}

/// Result of evaluating a portfolio against one price sheet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioReport {
    pub assessments: Vec<LoanAssessment>,
    pub unpriced: Vec<UnpricedLoan>,
    pub summary: PortfolioSummary,
}

impl PortfolioReport {
    /// Assessment for one loan, if it was priced.
    pub fn assessment_for(&self, loan_id: Uuid) -> Option<&LoanAssessment> {
        self.assessments.iter().find(|a| a.loan_id == loan_id)
    }
}

/// Portfolio evaluation service.
pub struct Portfolio;

impl Portfolio {
    /// Assess every active loan in `loans` at the prices in `sheet`.
    ///
    /// Non-active loans are skipped. Loans whose assets are missing from the
    /// sheet (or carry a non-positive price) are reported in `unpriced`.
    pub fn evaluate<'a>(
        loans: impl IntoIterator<Item = &'a Loan>,
        sheet: &PriceSheet,
    ) -> PortfolioReport {
        let mut report = PortfolioReport::default();
        let mut summary = PortfolioSummary::default();
        for tier in RiskTier::ALL {
            summary.tier_counts.insert(tier, 0);
        }
        let mut ltv_sum = 0.0;

        for loan in loans.into_iter().filter(|loan| loan.is_active()) {
            let prices = match sheet.market_prices_for(loan) {
                Ok(prices) => prices,
                Err(e) => {
                    report.unpriced.push(UnpricedLoan {
                        loan_id: loan.id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let assessment = RiskEngine::assess_risk(loan, &prices);
            let liquidation_eligible = RiskEngine::is_liquidation_eligible(loan, &prices);

            summary.active_loans += 1;
            summary.total_collateral_value_usd += loan.collateral_amount * prices.collateral_price_usd;
            summary.total_debt_value_usd += loan.debt_amount * prices.debt_asset_price_usd;
            ltv_sum += assessment.current_ltv;
            *summary.tier_counts.entry(assessment.risk_tier).or_insert(0) += 1;
            if assessment.risk_tier >= RiskTier::High {
                summary.at_risk_loans += 1;
            }
            if liquidation_eligible {
                summary.liquidation_eligible += 1;
            }

            report.assessments.push(LoanAssessment {
                loan_id: loan.id,
                assessment,
                liquidation_eligible,
            });
        }

        // USD totals are already values, so both "prices" are 1.
        summary.aggregate_ltv = RiskEngine::compute_ltv(
            summary.total_collateral_value_usd,
            summary.total_debt_value_usd,
            1.0,
            1.0,
        );
        if summary.active_loans > 0 {
            summary.average_ltv = ltv_sum / summary.active_loans as f64;
        }

        report.summary = summary;
        report
    }
}
