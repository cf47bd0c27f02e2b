use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use loanwatch_common::config::AppConfig;
use loanwatch_common::error::AppError;
use loanwatch_common::store::{LoanBook, load_price_sheet};
use loanwatch_common::types::{AlertPayload, Loan, PriceSheet, Severity};
use loanwatch_engine::alerts::AlertFormatter;
use loanwatch_engine::hysteresis::TierHysteresis;
use loanwatch_engine::portfolio::{Portfolio, PortfolioReport};

/// Everything produced by one price tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub tick: u64,
    pub observed_at: DateTime<Utc>,
    pub report: PortfolioReport,
    pub alerts: Vec<AlertPayload>,
    /// Loan records dropped by validation while loading the loan book
    pub rejected_records: usize,
}

/// Price-feed poller that re-assesses the loan book on every new price sheet.
pub struct PriceFeedPoller {
    loanbook_path: PathBuf,
    price_feed_path: PathBuf,
    poll_interval: Duration,
    hysteresis: TierHysteresis,
    /// `observed_at` of the last sheet that produced a tick.
    last_observed_at: Option<DateTime<Utc>>,
    tick: u64,
}

impl PriceFeedPoller {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            loanbook_path: config.loanbook_path.clone(),
            price_feed_path: config.price_feed_path.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            hysteresis: TierHysteresis::new(config.hysteresis_ticks, config.alert_min_tier),
            last_observed_at: None,
            tick: 0,
        }
    }

    /// Start the polling loop. Runs indefinitely until the task is cancelled.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        tracing::info!(
            loanbook = %self.loanbook_path.display(),
            price_feed = %self.price_feed_path.display(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            alert_min_tier = %self.hysteresis.min_tier(),
            "Price feed poller started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.poll_once().await {
                Ok(Some(outcome)) => Self::log_outcome(&outcome),
                Ok(None) => {
                    tracing::trace!("No new price sheet");
                }
                Err(e) => {
                    // Feed or loan book may be mid-write, retry on the next interval
                    tracing::warn!(
                        error = %e,
                        data_error = e.is_data_error(),
                        "Failed to read price sheet or loan book, retrying"
                    );
                }
            }
        }
    }

    /// Read the price sheet and, if it is new, re-assess the loan book.
    ///
    /// Returns `None` when the sheet has the same `observed_at` as the last one
    /// that was processed.
    pub async fn poll_once(&mut self) -> Result<Option<TickOutcome>, AppError> {
        let sheet = load_price_sheet(&self.price_feed_path).await?;
        if self.last_observed_at == Some(sheet.observed_at) {
            return Ok(None);
        }

        // Loans change through repayments and top-ups; always read the current book.
        let book = LoanBook::load(&self.loanbook_path).await?;
        let outcome = self.evaluate(&book, &sheet);
        self.last_observed_at = Some(sheet.observed_at);
        Ok(Some(outcome))
    }

    /// Assess every active loan at the prices in `sheet` as a new tick.
    pub fn evaluate(&mut self, book: &LoanBook, sheet: &PriceSheet) -> TickOutcome {
        self.tick += 1;
        let tick = self.tick;

        let loans: HashMap<Uuid, &Loan> = book.active().map(|loan| (loan.id, loan)).collect();
        let live: HashSet<Uuid> = loans.keys().copied().collect();
        self.hysteresis.retain_loans(&live);

        let report = Portfolio::evaluate(book.active(), sheet);

        let mut alerts = Vec::new();
        for entry in &report.assessments {
            if !self
                .hysteresis
                .check(entry.loan_id, entry.assessment.risk_tier, tick)
            {
                continue;
            }
            if let Some(loan) = loans.get(&entry.loan_id) {
                alerts.push(AlertFormatter::payload(loan, &entry.assessment));
            }
        }

        TickOutcome {
            tick,
            observed_at: sheet.observed_at,
            report,
            alerts,
            rejected_records: book.rejected.len(),
        }
    }

    fn log_outcome(outcome: &TickOutcome) {
        for unpriced in &outcome.report.unpriced {
            tracing::warn!(
                tick = outcome.tick,
                loan_id = %unpriced.loan_id,
                reason = %unpriced.reason,
                "Loan could not be priced"
            );
        }

        for alert in &outcome.alerts {
            let loan_id = alert.metadata["loan_id"].as_str().unwrap_or("unknown");
            match alert.severity {
                Severity::Critical => tracing::error!(
                    tick = outcome.tick,
                    loan_id,
                    title = %alert.title,
                    "{}",
                    alert.body
                ),
                Severity::Warning => tracing::warn!(
                    tick = outcome.tick,
                    loan_id,
                    title = %alert.title,
                    "{}",
                    alert.body
                ),
                Severity::Info => tracing::info!(
                    tick = outcome.tick,
                    loan_id,
                    title = %alert.title,
                    "{}",
                    alert.body
                ),
            }
        }

        let summary = &outcome.report.summary;
        tracing::info!(
            tick = outcome.tick,
            observed_at = %outcome.observed_at,
            active_loans = summary.active_loans,
            unpriced = outcome.report.unpriced.len(),
            rejected_records = outcome.rejected_records,
            aggregate_ltv = summary.aggregate_ltv,
            average_ltv = summary.average_ltv,
            at_risk_loans = summary.at_risk_loans,
            liquidation_eligible = summary.liquidation_eligible,
            alerts = outcome.alerts.len(),
            "Portfolio assessed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loanwatch_common::types::{LoanStatus, RiskTier};

    fn config(dir: &std::path::Path, ticks: u64) -> AppConfig {
        AppConfig {
            loanbook_path: dir.join("loans.json"),
            price_feed_path: dir.join("prices.json"),
            poll_interval_ms: 10,
            hysteresis_ticks: ticks,
            alert_min_tier: RiskTier::High,
        }
    }

    fn loan(debt_amount: f64) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            collateral_asset: "DOGE".to_string(),
            debt_asset: "SOL".to_string(),
            collateral_amount: 150_000.0,
            debt_amount,
            liquidation_threshold_pct: 65.0,
            status: LoanStatus::Active,
            initial_collateral_price_usd: None,
            initial_debt_asset_price_usd: None,
            created_at: Utc::now(),
        }
    }

    fn sheet_json(observed_at: &str, sol: f64) -> String {
        serde_json::json!({
            "observed_at": observed_at,
            "prices": { "DOGE": 0.02, "SOL": sol }
        })
        .to_string()
    }

    fn sheet(sol: f64) -> PriceSheet {
        serde_json::from_str(&sheet_json("2026-05-01T00:00:00Z", sol)).unwrap()
    }

    #[test]
    fn test_evaluate_alerts_once_per_tier() {
        let dir = std::env::temp_dir();
        let mut poller = PriceFeedPoller::new(&config(&dir, 1));
        let book = LoanBook {
            loans: vec![loan(500.0)],
            rejected: Vec::new(),
        };

        // 50% -> medium, no alert
        let outcome = poller.evaluate(&book, &sheet(3.0));
        assert_eq!(outcome.tick, 1);
        assert!(outcome.alerts.is_empty());

        // 100% -> critical, alert
        let outcome = poller.evaluate(&book, &sheet(6.0));
        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.alerts[0].severity, Severity::Critical);

        // still critical, no repeat
        let outcome = poller.evaluate(&book, &sheet(6.5));
        assert!(outcome.alerts.is_empty());
        assert_eq!(outcome.report.summary.liquidation_eligible, 1);
    }

    #[test]
    fn test_evaluate_respects_hysteresis_ticks() {
        let dir = std::env::temp_dir();
        let mut poller = PriceFeedPoller::new(&config(&dir, 2));
        let book = LoanBook {
            loans: vec![loan(600.0)],
            rejected: Vec::new(),
        };

        // 60% -> high for two consecutive ticks
        assert!(poller.evaluate(&book, &sheet(3.0)).alerts.is_empty());
        let outcome = poller.evaluate(&book, &sheet(3.0));
        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.alerts[0].severity, Severity::Warning);
    }

    #[test]
    fn test_duplicate_loan_ids_alert_once() {
        let dir = std::env::temp_dir();
        let mut poller = PriceFeedPoller::new(&config(&dir, 1));

        let critical = loan(1_000.0);
        let mut healthy = loan(100.0);
        healthy.id = critical.id;
        let json = serde_json::to_string(&vec![critical, healthy]).unwrap();
        let book = LoanBook::parse(&json).unwrap();
        assert_eq!(book.rejected.len(), 1);

        let alerts: usize = (0..5)
            .map(|_| poller.evaluate(&book, &sheet(3.0)).alerts.len())
            .sum();
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn test_poll_once_only_ticks_on_new_sheet() {
        let dir = std::env::temp_dir().join(format!("loanwatch-monitor-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let cfg = config(&dir, 1);

        let loans = serde_json::to_string(&vec![loan(500.0)]).unwrap();
        tokio::fs::write(&cfg.loanbook_path, loans).await.unwrap();
        tokio::fs::write(&cfg.price_feed_path, sheet_json("2026-05-01T00:00:00Z", 3.0))
            .await
            .unwrap();

        let mut poller = PriceFeedPoller::new(&cfg);
        let first = poller.poll_once().await.unwrap().expect("first sheet is new");
        assert_eq!(first.tick, 1);
        assert_eq!(first.report.summary.active_loans, 1);

        // Same observed_at → no tick
        assert!(poller.poll_once().await.unwrap().is_none());

        tokio::fs::write(&cfg.price_feed_path, sheet_json("2026-05-01T00:00:05Z", 6.0))
            .await
            .unwrap();
        let second = poller.poll_once().await.unwrap().expect("second sheet is new");
        assert_eq!(second.tick, 2);
        assert_eq!(second.alerts.len(), 1);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_poll_once_missing_feed_is_error() {
        let dir = std::env::temp_dir().join(format!("loanwatch-monitor-{}", Uuid::new_v4()));
        let mut poller = PriceFeedPoller::new(&config(&dir, 1));
        assert!(poller.poll_once().await.is_err());
    }
}
