//! Organisation-wide business parameters.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Longest repayment term an administrator may configure.
pub const MAX_LOAN_TERM_MONTHS: i64 = 120;

string_enum! {
    /// Basis on which a declared dividend is split between members.
    DividendMethod {
        Shares => "SHARES",
        Deposits => "DEPOSITS",
        Both => "BOTH",
    }
}

/// The single settings record. Loaded per request and passed explicitly to
/// the engine functions that depend on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaccoSettings {
    pub name: String,
    pub share_value: Decimal,
    pub minimum_monthly_contribution: Decimal,
    /// Annual interest rate in percent
    pub loan_interest_rate: Decimal,
    pub maximum_loan_multiplier: Decimal,
    pub loan_processing_fee_percentage: Decimal,
    pub loan_insurance_percentage: Decimal,
    pub maximum_loan_term_months: i64,
    pub dividend_calculation_method: DividendMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_address: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl Default for SaccoSettings {
    fn default() -> Self {
        Self {
            name: "SACCO Organization".to_string(),
            share_value: dec!(5000.00),
            minimum_monthly_contribution: dec!(1000.00),
            loan_interest_rate: dec!(10.00),
            maximum_loan_multiplier: dec!(3.00),
            loan_processing_fee_percentage: dec!(1.00),
            loan_insurance_percentage: dec!(1.00),
            maximum_loan_term_months: 36,
            dividend_calculation_method: DividendMethod::Both,
            contact_phone: None,
            contact_email: None,
            postal_address: None,
            physical_address: None,
            updated_at: Utc::now(),
            updated_by: None,
        }
    }
}

/// Partial update of the settings record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub share_value: Option<Decimal>,
    #[serde(default)]
    pub minimum_monthly_contribution: Option<Decimal>,
    #[serde(default)]
    pub loan_interest_rate: Option<Decimal>,
    #[serde(default)]
    pub maximum_loan_multiplier: Option<Decimal>,
    #[serde(default)]
    pub loan_processing_fee_percentage: Option<Decimal>,
    #[serde(default)]
    pub loan_insurance_percentage: Option<Decimal>,
    #[serde(default)]
    pub maximum_loan_term_months: Option<i64>,
    #[serde(default)]
    pub dividend_calculation_method: Option<DividendMethod>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub postal_address: Option<String>,
    #[serde(default)]
    pub physical_address: Option<String>,
}

impl UpdateSettingsRequest {
    /// Merge the request into `settings`, rejecting out-of-range values
    /// before anything is changed.
    pub fn apply_to(&self, settings: &SaccoSettings) -> Result<SaccoSettings, AppError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Name must not be empty".to_string()));
            }
        }
        if let Some(v) = self.share_value {
            if v <= Decimal::ZERO {
                return Err(AppError::Validation(
                    "Share value must be greater than zero".to_string(),
                ));
            }
        }
        if let Some(v) = self.minimum_monthly_contribution {
            if v < Decimal::ZERO {
                return Err(AppError::Validation(
                    "Minimum monthly contribution must not be negative".to_string(),
                ));
            }
        }
        for (label, value) in [
            ("Loan interest rate", self.loan_interest_rate),
            ("Processing fee percentage", self.loan_processing_fee_percentage),
            ("Insurance percentage", self.loan_insurance_percentage),
        ] {
            if let Some(v) = value {
                if v < Decimal::ZERO || v > dec!(100) {
                    return Err(AppError::Validation(format!(
                        "{} must be between 0 and 100",
                        label
                    )));
                }
            }
        }
        if let Some(v) = self.maximum_loan_multiplier {
            if v < Decimal::ZERO {
                return Err(AppError::Validation(
                    "Loan multiplier must not be negative".to_string(),
                ));
            }
        }
        if let Some(v) = self.maximum_loan_term_months {
            if !(1..=MAX_LOAN_TERM_MONTHS).contains(&v) {
                return Err(AppError::Validation(format!(
                    "Maximum loan term must be between 1 and {} months",
                    MAX_LOAN_TERM_MONTHS
                )));
            }
        }

        let mut next = settings.clone();
        if let Some(v) = &self.name {
            next.name = v.trim().to_string();
        }
        if let Some(v) = self.share_value {
            next.share_value = v;
        }
        if let Some(v) = self.minimum_monthly_contribution {
            next.minimum_monthly_contribution = v;
        }
        if let Some(v) = self.loan_interest_rate {
            next.loan_interest_rate = v;
        }
        if let Some(v) = self.maximum_loan_multiplier {
            next.maximum_loan_multiplier = v;
        }
        if let Some(v) = self.loan_processing_fee_percentage {
            next.loan_processing_fee_percentage = v;
        }
        if let Some(v) = self.loan_insurance_percentage {
            next.loan_insurance_percentage = v;
        }
        if let Some(v) = self.maximum_loan_term_months {
            next.maximum_loan_term_months = v;
        }
        if let Some(v) = self.dividend_calculation_method {
            next.dividend_calculation_method = v;
        }
        if self.contact_phone.is_some() {
            next.contact_phone = self.contact_phone.clone();
        }
        if self.contact_email.is_some() {
            next.contact_email = self.contact_email.clone();
        }
        if self.postal_address.is_some() {
            next.postal_address = self.postal_address.clone();
        }
        if self.physical_address.is_some() {
            next.physical_address = self.physical_address.clone();
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = SaccoSettings::default();
        assert_eq!(s.share_value, dec!(5000));
        assert_eq!(s.maximum_loan_term_months, 36);
        assert_eq!(s.dividend_calculation_method, DividendMethod::Both);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let s = SaccoSettings::default();
        let req = UpdateSettingsRequest {
            loan_interest_rate: Some(dec!(12)),
            ..Default::default()
        };
        let next = req.apply_to(&s).unwrap();
        assert_eq!(next.loan_interest_rate, dec!(12));
        assert_eq!(next.share_value, s.share_value);
    }

    #[test]
    fn test_rejects_out_of_range_percentage() {
        let req = UpdateSettingsRequest {
            loan_insurance_percentage: Some(dec!(101)),
            ..Default::default()
        };
        assert!(matches!(
            req.apply_to(&SaccoSettings::default()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_zero_share_value() {
        let req = UpdateSettingsRequest {
            share_value: Some(Decimal::ZERO),
            ..Default::default()
        };
        assert!(req.apply_to(&SaccoSettings::default()).is_err());
    }

    #[test]
    fn test_loan_term_ceiling() {
        let at_limit = UpdateSettingsRequest {
            maximum_loan_term_months: Some(MAX_LOAN_TERM_MONTHS),
            ..Default::default()
        };
        assert!(at_limit.apply_to(&SaccoSettings::default()).is_ok());

        let too_long = UpdateSettingsRequest {
            maximum_loan_term_months: Some(i64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            too_long.apply_to(&SaccoSettings::default()),
            Err(AppError::Validation(_))
        ));
    }
}
