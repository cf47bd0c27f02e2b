use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Lifecycle status of a loan, owned by the loan store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    #[default]
    Active,
    Repaid,
    Liquidated,
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanStatus::Active => write!(f, "active"),
            LoanStatus::Repaid => write!(f, "repaid"),
            LoanStatus::Liquidated => write!(f, "liquidated"),
        }
    }
}

/// Discrete risk classification, ordered from safest to most dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// All tiers in ascending order of risk.
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Critical,
    ];
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
            RiskTier::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for RiskTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            "critical" => Ok(RiskTier::Critical),
            other => Err(AppError::Validation(format!(
                "Invalid risk tier '{}'. Valid tiers: low, medium, high, critical",
                other
            ))),
        }
    }
}

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A loan record exactly as it comes out of storage, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRecord {
    pub id: Uuid,
    pub collateral_asset: String,
    pub debt_asset: String,
    pub collateral_amount: f64,
    /// Debt in the debt asset's native unit, accrued interest included.
    pub debt_amount: f64,
    pub liquidation_threshold_pct: f64,
    #[serde(default)]
    pub status: LoanStatus,
    #[serde(default)]
    pub initial_collateral_price_usd: Option<f64>,
    #[serde(default)]
    pub initial_debt_asset_price_usd: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A validated dual-asset loan.
///
/// Built from a [`LoanRecord`] through `TryFrom`, which is also what serde uses
/// when deserializing, so a `Loan` read from storage always satisfies:
/// - amounts are finite and `>= 0`
/// - `0 < liquidation_threshold_pct <= 100`
/// - asset symbols are non-empty and upper-case
///
/// The initial prices are kept for display and audit only. Risk is always
/// computed from current market prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LoanRecord")]
pub struct Loan {
    pub id: Uuid,
    pub collateral_asset: String,
    pub debt_asset: String,
    pub collateral_amount: f64,
    pub debt_amount: f64,
    pub liquidation_threshold_pct: f64,
    pub status: LoanStatus,
    pub initial_collateral_price_usd: Option<f64>,
    pub initial_debt_asset_price_usd: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

impl TryFrom<LoanRecord> for Loan {
    type Error = AppError;

    fn try_from(record: LoanRecord) -> Result<Self, Self::Error> {
        let collateral_asset = normalize_symbol("collateral_asset", &record.collateral_asset)?;
        let debt_asset = normalize_symbol("debt_asset", &record.debt_asset)?;

        non_negative("collateral_amount", record.collateral_amount)?;
        non_negative("debt_amount", record.debt_amount)?;

        let threshold = record.liquidation_threshold_pct;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 100.0 {
            return Err(AppError::Validation(format!(
                "liquidation_threshold_pct must be in (0, 100], got {}",
                threshold
            )));
        }

        if let Some(price) = record.initial_collateral_price_usd {
            positive_price("initial_collateral_price_usd", price)?;
        }
        if let Some(price) = record.initial_debt_asset_price_usd {
            positive_price("initial_debt_asset_price_usd", price)?;
        }

        Ok(Self {
            id: record.id,
            collateral_asset,
            debt_asset,
            collateral_amount: record.collateral_amount,
            debt_amount: record.debt_amount,
            liquidation_threshold_pct: threshold,
            status: record.status,
            initial_collateral_price_usd: record.initial_collateral_price_usd,
            initial_debt_asset_price_usd: record.initial_debt_asset_price_usd,
            created_at: record.created_at,
        })
    }
}

/// Current USD prices of a loan's two assets.
///
/// Fields are public so callers can build degenerate values on purpose; use
/// [`MarketPrices::new`] for validated construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketPrices {
    pub collateral_price_usd: f64,
    pub debt_asset_price_usd: f64,
}

impl MarketPrices {
    pub fn new(collateral_price_usd: f64, debt_asset_price_usd: f64) -> Result<Self, AppError> {
        positive_price("collateral_price_usd", collateral_price_usd)?;
        positive_price("debt_asset_price_usd", debt_asset_price_usd)?;
        Ok(Self {
            collateral_price_usd,
            debt_asset_price_usd,
        })
    }
}

/// A price sheet exactly as published by the feed, before symbol normalisation.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceSheetRecord {
    pub observed_at: DateTime<Utc>,
    pub prices: HashMap<String, f64>,
}

/// A snapshot of USD prices published by the external price feed.
///
/// Symbols are stored upper-case, so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PriceSheetRecord")]
pub struct PriceSheet {
    pub observed_at: DateTime<Utc>,
    pub prices: HashMap<String, f64>,
}

impl TryFrom<PriceSheetRecord> for PriceSheet {
    type Error = AppError;

    fn try_from(record: PriceSheetRecord) -> Result<Self, Self::Error> {
        Self::new(record.observed_at, record.prices)
    }
}

impl PriceSheet {
    /// Build a sheet, rejecting symbols that collide once upper-cased.
    pub fn new(
        observed_at: DateTime<Utc>,
        prices: HashMap<String, f64>,
    ) -> Result<Self, AppError> {
        let mut normalized = HashMap::with_capacity(prices.len());
        for (symbol, price) in prices {
            let key = symbol.trim().to_ascii_uppercase();
            if normalized.insert(key.clone(), price).is_some() {
                return Err(AppError::Validation(format!(
                    "Price sheet lists asset '{}' more than once",
                    key
                )));
            }
        }
        Ok(Self {
            observed_at,
            prices: normalized,
        })
    }

    /// USD price of a single asset.
    pub fn price_of(&self, symbol: &str) -> Result<f64, AppError> {
        let key = symbol.trim().to_ascii_uppercase();
        let price = self
            .prices
            .get(&key)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("No price for asset '{}'", key)))?;
        positive_price(&key, price)?;
        Ok(price)
    }

    /// Resolve the current prices of both of a loan's assets.
    pub fn market_prices_for(&self, loan: &Loan) -> Result<MarketPrices, AppError> {
        MarketPrices::new(
            self.price_of(&loan.collateral_asset)?,
            self.price_of(&loan.debt_asset)?,
        )
    }
}

/// Risk measures of one loan against one price snapshot.
///
/// Derived on demand and never persisted. An assessment is only valid for the
/// prices it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Loan-to-value in percent. May exceed 100.
    pub current_ltv: f64,
    /// Collateral price that triggers liquidation at the current debt-asset price.
    pub liquidation_price_collateral: f64,
    /// Debt-asset price that triggers liquidation at the current collateral price.
    pub liquidation_price_debt_asset: f64,
    /// Percent drop in collateral price to reach liquidation, clamped to `>= 0`.
    pub collateral_drop_pct_to_liquidation: f64,
    /// Percent rise in debt-asset price to reach liquidation, clamped to `>= 0`.
    pub debt_asset_rise_pct_to_liquidation: f64,
    pub risk_tier: RiskTier,
}

/// Human-readable alert payload ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Short title (e.g., "Loan At Liquidation Threshold")
    pub title: String,
    /// Detailed body message
    pub body: String,
    /// Alert severity
    pub severity: Severity,
    /// Additional metadata for channel-specific formatting
    pub metadata: serde_json::Value,
}

fn normalize_symbol(field: &str, symbol: &str) -> Result<String, AppError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(symbol.to_ascii_uppercase())
}

fn non_negative(field: &str, value: f64) -> Result<(), AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation(format!(
            "{} must be a finite number >= 0, got {}",
            field, value
        )));
    }
    Ok(())
}

fn positive_price(field: &str, value: f64) -> Result<(), AppError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::Validation(format!(
            "{} must be a finite price > 0, got {}",
            field, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LoanRecord {
        LoanRecord {
            id: Uuid::new_v4(),
            collateral_asset: "doge".to_string(),
            debt_asset: " Sol ".to_string(),
            collateral_amount: 150_000.0,
            debt_amount: 500.0,
            liquidation_threshold_pct: 65.0,
            status: LoanStatus::Active,
            initial_collateral_price_usd: Some(0.02),
            initial_debt_asset_price_usd: Some(3.0),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_record_normalizes_symbols() {
        let loan = Loan::try_from(record()).unwrap();
        assert_eq!(loan.collateral_asset, "DOGE");
        assert_eq!(loan.debt_asset, "SOL");
        assert!(loan.is_active());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut r = record();
        r.debt_amount = -1.0;
        assert!(matches!(Loan::try_from(r), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_non_finite_amount_rejected() {
        let mut r = record();
        r.collateral_amount = f64::NAN;
        assert!(Loan::try_from(r).is_err());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        for bad in [0.0, -5.0, 100.5, f64::INFINITY] {
            let mut r = record();
            r.liquidation_threshold_pct = bad;
            assert!(Loan::try_from(r).is_err(), "threshold {} accepted", bad);
        }
        let mut r = record();
        r.liquidation_threshold_pct = 100.0;
        assert!(Loan::try_from(r).is_ok());
    }

    #[test]
    fn test_empty_symbol_rejected() {
        let mut r = record();
        r.collateral_asset = "  ".to_string();
        assert!(Loan::try_from(r).is_err());
    }

    #[test]
    fn test_zero_initial_price_rejected() {
        let mut r = record();
        r.initial_debt_asset_price_usd = Some(0.0);
        assert!(Loan::try_from(r).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "collateral_asset": "DOGE",
            "debt_asset": "SOL",
            "collateral_amount": 10.0,
            "debt_amount": 1.0,
            "liquidation_threshold_pct": 150.0,
            "created_at": "2026-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<Loan>(json).is_err());
    }

    #[test]
    fn test_deserialize_defaults_status() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "collateral_asset": "DOGE",
            "debt_asset": "SOL",
            "collateral_amount": 10.0,
            "debt_amount": 1.0,
            "liquidation_threshold_pct": 65.0,
            "created_at": "2026-01-01T00:00:00Z"
        });
        let loan: Loan = serde_json::from_value(json).unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.initial_collateral_price_usd, None);
    }

    #[test]
    fn test_market_prices_validation() {
        assert!(MarketPrices::new(0.02, 3.0).is_ok());
        assert!(MarketPrices::new(0.0, 3.0).is_err());
        assert!(MarketPrices::new(0.02, -3.0).is_err());
        assert!(MarketPrices::new(f64::NAN, 3.0).is_err());
    }

    #[test]
    fn test_price_sheet_lookup_is_case_insensitive() {
        let sheet: PriceSheet = serde_json::from_value(serde_json::json!({
            "observed_at": "2026-01-01T00:00:00Z",
            "prices": { "doge": 0.02, "SOL": 3.0 }
        }))
        .unwrap();
        assert_eq!(sheet.price_of("DOGE").unwrap(), 0.02);
        assert_eq!(sheet.price_of("sol").unwrap(), 3.0);

        let loan = Loan::try_from(record()).unwrap();
        let prices = sheet.market_prices_for(&loan).unwrap();
        assert_eq!(prices.collateral_price_usd, 0.02);
        assert_eq!(prices.debt_asset_price_usd, 3.0);
    }

    #[test]
    fn test_price_sheet_missing_and_bad_prices() {
        let mut prices = HashMap::new();
        prices.insert("DOGE".to_string(), 0.0);
        let sheet = PriceSheet::new(Utc::now(), prices).unwrap();
        assert!(matches!(sheet.price_of("SOL"), Err(AppError::NotFound(_))));
        assert!(matches!(
            sheet.price_of("DOGE"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_price_sheet_rejects_colliding_symbols() {
        let result = serde_json::from_value::<PriceSheet>(serde_json::json!({
            "observed_at": "2026-01-01T00:00:00Z",
            "prices": { "sol": 3.0, "SOL": 6.0 }
        }));
        assert!(result.is_err());

        let prices = HashMap::from([(" doge".to_string(), 0.02), ("DOGE".to_string(), 0.02)]);
        assert!(matches!(
            PriceSheet::new(Utc::now(), prices),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_risk_tier_ordering_and_parsing() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::High < RiskTier::Critical);
        assert_eq!("HIGH".parse::<RiskTier>().unwrap(), RiskTier::High);
        assert!("severe".parse::<RiskTier>().is_err());
        for tier in RiskTier::ALL {
            assert_eq!(tier.to_string().parse::<RiskTier>().unwrap(), tier);
        }
    }
}
