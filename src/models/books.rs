//! The society's own books: operating expenses and non-loan income.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

string_enum! {
    ExpenseCategory {
        Administrative => "ADMINISTRATIVE",
        Operation => "OPERATION",
        Rental => "RENTAL",
        Banking => "BANKING",
        Marketing => "MARKETING",
        Technology => "TECHNOLOGY",
        Professional => "PROFESSIONAL",
        Other => "OTHER",
    }
}

string_enum! {
    IncomeCategory {
        Investment => "INVESTMENT",
        Membership => "MEMBERSHIP",
        Penalties => "PENALTIES",
        Donations => "DONATIONS",
        Grants => "GRANTS",
        Other => "OTHER",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaccoExpense {
    pub id: String,
    pub expense_date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub category: ExpenseCategory,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    /// Bank or mobile-money charges on top of the amount
    pub transaction_cost: Decimal,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaccoIncome {
    pub id: String,
    pub income_date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub category: IncomeCategory,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordExpenseRequest {
    #[serde(default)]
    pub expense_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub description: String,
    pub category: ExpenseCategory,
    pub payment_method: String,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub transaction_cost: Option<Decimal>,
}

impl RecordExpenseRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        super::require_positive_money(self.amount, "Expense amount")?;
        if self.transaction_cost.is_some_and(|c| c < Decimal::ZERO) {
            return Err(AppError::Validation(
                "Transaction cost must not be negative".to_string(),
            ));
        }
        require_text(&self.description, "Description")?;
        require_text(&self.payment_method, "Payment method")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIncomeRequest {
    #[serde(default)]
    pub income_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub description: String,
    pub category: IncomeCategory,
    pub payment_method: String,
    #[serde(default)]
    pub reference_number: Option<String>,
}

impl RecordIncomeRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        super::require_positive_money(self.amount, "Income amount")?;
        require_text(&self.description, "Description")?;
        require_text(&self.payment_method, "Payment method")
    }
}

fn require_text(value: &str, label: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", label)));
    }
    Ok(())
}

/// Query filters for listing expenses or income. Dates are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooksFilter {
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
}

impl BooksFilter {
    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(AppError::Validation(format!(
                    "dateFrom {} is after dateTo {}",
                    from, to
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn expense(amount: Decimal, cost: Option<Decimal>) -> RecordExpenseRequest {
        RecordExpenseRequest {
            expense_date: None,
            amount,
            description: "Office rent".into(),
            category: ExpenseCategory::Rental,
            payment_method: "Bank transfer".into(),
            reference_number: None,
            transaction_cost: cost,
        }
    }

    #[test]
    fn test_expense_validation() {
        assert!(expense(dec!(15000), Some(dec!(35))).validate().is_ok());
        assert!(expense(dec!(0.001), None).validate().is_err());
        assert!(expense(dec!(100), Some(dec!(-1))).validate().is_err());

        let mut blank = expense(dec!(100), None);
        blank.payment_method = "  ".into();
        assert!(matches!(blank.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(ExpenseCategory::from_str("banking"), Some(ExpenseCategory::Banking));
        assert_eq!(IncomeCategory::from_str("GRANTS"), Some(IncomeCategory::Grants));
        assert_eq!(IncomeCategory::from_str("LOAN"), None);
    }

    #[test]
    fn test_filter_rejects_inverted_range() {
        let filter = BooksFilter {
            date_from: NaiveDate::from_ymd_opt(2025, 6, 1),
            date_to: NaiveDate::from_ymd_opt(2025, 1, 1),
            category: None,
        };
        assert!(filter.validate().is_err());
    }
}
