//! Guarantee requests between members and per-member guarantee capacity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

string_enum! {
    GuarantorStatus {
        Pending => "PENDING",
        Accepted => "ACCEPTED",
        Rejected => "REJECTED",
        Cancelled => "CANCELLED",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuarantorRequest {
    pub id: String,
    pub application_id: String,
    pub requester_id: String,
    pub guarantor_id: String,
    pub guarantee_amount: Decimal,
    pub status: GuarantorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_message: Option<String>,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGuarantorRequest {
    pub application_id: String,
    pub guarantor_id: String,
    pub guarantee_amount: Decimal,
    #[serde(default)]
    pub message: Option<String>,
}

impl CreateGuarantorRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        super::require_positive_money(self.guarantee_amount, "Guarantee amount")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondGuarantorRequest {
    pub accept: bool,
    #[serde(default)]
    pub response_message: Option<String>,
}

/// Snapshot of a member's guarantee capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuarantorLimit {
    pub member_id: String,
    pub total_guaranteed: Decimal,
    pub active_guarantees: i64,
    pub maximum_guarantee_amount: Decimal,
    pub available_guarantee_amount: Decimal,
    pub updated_at: DateTime<Utc>,
}
