//! SACCO member model, profile requests and KYC documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Access role of an account.
    Role {
        Admin => "ADMIN",
        Member => "MEMBER",
    }
}

string_enum! {
    /// Kind of KYC document a member can upload.
    DocumentType {
        IdFront => "ID_FRONT",
        IdBack => "ID_BACK",
        Passport => "PASSPORT",
        Other => "OTHER",
    }
}

/// Share capital may be paid over 12 or 24 months.
pub const SHARE_CAPITAL_TERMS: [i64; 2] = [12, 24];

pub fn is_valid_share_capital_term(term: i64) -> bool {
    SHARE_CAPITAL_TERMS.contains(&term)
}

/// A registered account (member or administrator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_number: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_on_hold: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_hold_reason: Option<String>,
    pub share_capital_term: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Member {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Fields required to create an account.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub email: String,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub share_capital_term: i64,
}

/// Query filters for listing members.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberFilter {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub on_hold: Option<bool>,
}

/// Request body for a member updating their own profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Administrative change to a member's status flags.
#[derive(Debug, Clone)]
pub enum MemberStatusChange {
    Verification(bool),
    Hold { on_hold: bool, reason: Option<String> },
    Active(bool),
    ShareCapitalTerm(i64),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVerificationRequest {
    pub verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetHoldRequest {
    pub on_hold: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetShareCapitalTermRequest {
    pub term_months: i64,
}

/// A KYC document reference uploaded by a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDocument {
    pub id: String,
    pub member_id: String,
    pub document_type: DocumentType,
    pub storage_ref: String,
    pub is_verified: bool,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDocumentRequest {
    pub document_type: DocumentType,
    pub storage_ref: String,
}

/// Outcome of verifying a document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVerification {
    pub document: MemberDocument,
    pub member_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_codes() {
        assert_eq!(Role::Admin.as_str(), "ADMIN");
        assert_eq!(Role::from_str("member"), Some(Role::Member));
        assert_eq!(Role::from_str("guest"), None);
    }

    #[test]
    fn test_document_type_serializes_to_code() {
        let json = serde_json::to_string(&DocumentType::IdFront).unwrap();
        assert_eq!(json, "\"ID_FRONT\"");
    }

    #[test]
    fn test_share_capital_terms() {
        assert!(is_valid_share_capital_term(12));
        assert!(is_valid_share_capital_term(24));
        assert!(!is_valid_share_capital_term(18));
    }
}
