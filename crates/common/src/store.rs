//! File-backed storage boundary.
//!
//! Loan records and price sheets enter the system here and are validated
//! into strongly-typed values before anything downstream sees them.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::types::{Loan, LoanRecord, PriceSheet};

/// A loan record that failed validation.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    /// Position of the record in the loan book array
    pub index: usize,
    /// Loan id, if the record got far enough to carry one
    pub loan_id: Option<Uuid>,
    pub reason: String,
}

/// The validated contents of a loan book file.
#[derive(Debug, Clone, Default)]
pub struct LoanBook {
    pub loans: Vec<Loan>,
    pub rejected: Vec<RejectedRecord>,
}

impl LoanBook {
    /// Parse a loan book from its JSON text.
    ///
    /// The document must be a JSON array. Individual records that fail
    /// validation are collected in `rejected` instead of failing the whole book.
    /// Loan ids are unique: only the first record with a given id is kept.
    pub fn parse(json: &str) -> Result<Self, AppError> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let mut book = LoanBook::default();
        let mut seen: HashSet<Uuid> = HashSet::new();

        for (index, value) in raw.into_iter().enumerate() {
            let loan_id = value
                .get("id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok());

            let parsed = serde_json::from_value::<LoanRecord>(value)
                .map_err(AppError::from)
                .and_then(Loan::try_from)
                .and_then(|loan| {
                    if seen.insert(loan.id) {
                        Ok(loan)
                    } else {
                        Err(AppError::Validation(format!(
                            "Duplicate loan id {}",
                            loan.id
                        )))
                    }
                });

            match parsed {
                Ok(loan) => book.loans.push(loan),
                Err(e) => book.rejected.push(RejectedRecord {
                    index,
                    loan_id,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(book)
    }

    /// Read and validate a loan book file.
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let json = tokio::fs::read_to_string(path).await?;
        let book = Self::parse(&json)?;

        for rejected in &book.rejected {
            tracing::warn!(
                path = %path.display(),
                index = rejected.index,
                loan_id = ?rejected.loan_id,
                reason = %rejected.reason,
                "Rejected invalid loan record"
            );
        }

        Ok(book)
    }

    /// Loans that are still open.
    pub fn active(&self) -> impl Iterator<Item = &Loan> {
        self.loans.iter().filter(|loan| loan.is_active())
    }
}

/// Read the latest price sheet published by the price feed.
pub async fn load_price_sheet(path: &Path) -> Result<PriceSheet, AppError> {
    let json = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&json)?)
}
