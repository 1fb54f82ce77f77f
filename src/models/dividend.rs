//! Dividend declarations and their per-member allocations.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::DividendMethod;
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DividendDistribution {
    pub id: String,
    pub total_amount: Decimal,
    pub distribution_date: NaiveDate,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub calculation_method: DividendMethod,
    pub recipients: i64,
    pub declared_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDividend {
    pub id: String,
    pub distribution_id: String,
    pub member_id: String,
    pub amount: Decimal,
    /// Member's fraction of the total weight, in percent
    pub weight_percentage: Decimal,
    pub share_capital_basis: Decimal,
    pub deposits_basis: Decimal,
    pub distribution_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclareDividendRequest {
    pub total_amount: Decimal,
    #[serde(default)]
    pub distribution_date: Option<NaiveDate>,
    pub source: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl DeclareDividendRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        super::require_positive_money(self.total_amount, "Dividend amount")?;
        if self.source.trim().is_empty() {
            return Err(AppError::Validation("Dividend source is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionDetail {
    pub distribution: DividendDistribution,
    pub allocations: Vec<MemberDividend>,
}
