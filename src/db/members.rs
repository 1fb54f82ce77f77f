//! Members and KYC documents.

use chrono::{Datelike, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::ledger::recompute_summary;
use super::repository::{bump_revision, code, log_activity, new_id};
use super::settings::load_settings;
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    is_plausible_email, is_valid_share_capital_term, normalize_email, ActivityAction,
    DocumentType, DocumentVerification, Member, MemberDocument, MemberFilter, MemberStatusChange,
    NewMember, Role, UpdateProfileRequest,
};

const MEMBER_COLUMNS: &str = "id, email, full_name, phone_number, role, membership_number, is_active, is_verified, is_on_hold, on_hold_reason, share_capital_term, created_at, updated_at, version";

impl Repository {
    // ==================== MEMBER OPERATIONS ====================

    /// List members, optionally filtered by status flags.
    pub async fn list_members(&self, filter: &MemberFilter) -> Result<Vec<Member>, AppError> {
        let mut sql = format!("SELECT {} FROM members WHERE 1 = 1", MEMBER_COLUMNS);
        if filter.active.is_some() {
            sql.push_str(" AND is_active = ?");
        }
        if filter.verified.is_some() {
            sql.push_str(" AND is_verified = ?");
        }
        if filter.on_hold.is_some() {
            sql.push_str(" AND is_on_hold = ?");
        }
        sql.push_str(" ORDER BY full_name");

        let mut query = sqlx::query(&sql);
        for flag in [filter.active, filter.verified, filter.on_hold].into_iter().flatten() {
            query = query.bind(flag);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(member_from_row).collect()
    }

    /// Get a member by ID.
    pub async fn get_member(&self, id: &str) -> Result<Option<Member>, AppError> {
        let mut conn = self.pool.acquire().await?;
        find_member(&mut conn, id).await
    }

    pub async fn require_member(&self, id: &str) -> Result<Member, AppError> {
        self.get_member(id)
            .await?
            .ok_or_else(|| AppError::not_found("Member", id))
    }

    pub async fn get_member_by_email(&self, email: &str) -> Result<Option<Member>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM members WHERE email = ?",
            MEMBER_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    /// Create an account directly (administrators, bootstrap, imports).
    pub async fn create_member(
        &self,
        new: &NewMember,
        actor_id: Option<&str>,
    ) -> Result<Member, AppError> {
        let mut tx = self.pool.begin().await?;
        let member = insert_member(&mut tx, new).await?;
        log_activity(
            &mut tx,
            actor_id,
            ActivityAction::MemberCreated,
            format!("Created {} account for {}", member.role, member.email),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;
        Ok(member)
    }

    /// Create the first administrator when none exists yet.
    pub async fn bootstrap_admin(&self, email: &str) -> Result<Option<Member>, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM members WHERE role = ?")
            .bind(Role::Admin.as_str())
            .fetch_one(&self.pool)
            .await?;
        let admins: i64 = row.try_get("n")?;
        if admins > 0 {
            return Ok(None);
        }
        if let Some(existing) = self.get_member_by_email(email).await? {
            tracing::warn!(
                email = %existing.email,
                "Bootstrap email belongs to a member account; no administrator created"
            );
            return Ok(None);
        }

        let admin = self
            .create_member(
                &NewMember {
                    email: email.to_string(),
                    full_name: "Administrator".to_string(),
                    phone_number: None,
                    role: Role::Admin,
                    share_capital_term: 12,
                },
                None,
            )
            .await?;
        tracing::info!(email = %admin.email, "Bootstrap administrator created");
        Ok(Some(admin))
    }

    /// Update a member's own profile with optimistic concurrency control.
    pub async fn update_profile(
        &self,
        id: &str,
        request: &UpdateProfileRequest,
        actor_id: &str,
    ) -> Result<Member, AppError> {
        let existing = self.require_member(id).await?;

        // Check version for optimistic concurrency
        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(AppError::Conflict {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, existing.version
                    ),
                    current_version: existing.version,
                });
            }
        }

        let full_name = match &request.full_name {
            Some(name) if name.trim().is_empty() => {
                return Err(AppError::Validation("Full name must not be empty".to_string()))
            }
            Some(name) => name.trim().to_string(),
            None => existing.full_name.clone(),
        };
        let phone_number = request.phone_number.clone().or(existing.phone_number.clone());
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE members SET full_name = ?, phone_number = ?, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(&full_name)
        .bind(&phone_number)
        .bind(now)
        .bind(id)
        .bind(existing.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Race condition - version changed between read and write
            drop(tx);
            let current = self.get_member(id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|m| m.version).unwrap_or(0),
            });
        }

        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::ProfileUpdated,
            format!("Updated profile of {}", existing.email),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.require_member(id).await
    }

    /// Administrative change to verification, hold, activation or term.
    pub async fn set_member_status(
        &self,
        id: &str,
        change: &MemberStatusChange,
        actor_id: &str,
    ) -> Result<Member, AppError> {
        let existing = self.require_member(id).await?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let (action, description) = match change {
            MemberStatusChange::Verification(verified) => {
                sqlx::query(
                    "UPDATE members SET is_verified = ?, updated_at = ?, version = version + 1 WHERE id = ?",
                )
                .bind(verified)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                (
                    ActivityAction::MemberVerification,
                    format!("Set verified = {} for {}", verified, existing.email),
                )
            }
            MemberStatusChange::Hold { on_hold, reason } => {
                let reason = if *on_hold {
                    reason.clone().filter(|r| !r.trim().is_empty())
                } else {
                    None
                };
                sqlx::query(
                    "UPDATE members SET is_on_hold = ?, on_hold_reason = ?, updated_at = ?, version = version + 1 WHERE id = ?",
                )
                .bind(on_hold)
                .bind(&reason)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                (
                    ActivityAction::MemberHold,
                    match &reason {
                        Some(r) => format!("Placed {} on hold: {}", existing.email, r),
                        None if *on_hold => format!("Placed {} on hold", existing.email),
                        None => format!("Released hold on {}", existing.email),
                    },
                )
            }
            MemberStatusChange::Active(active) => {
                sqlx::query(
                    "UPDATE members SET is_active = ?, updated_at = ?, version = version + 1 WHERE id = ?",
                )
                .bind(active)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                (
                    ActivityAction::MemberActivation,
                    format!("Set active = {} for {}", active, existing.email),
                )
            }
            MemberStatusChange::ShareCapitalTerm(term) => {
                if !is_valid_share_capital_term(*term) {
                    return Err(AppError::Validation(
                        "Share capital term must be 12 or 24 months".to_string(),
                    ));
                }
                sqlx::query(
                    "UPDATE members SET share_capital_term = ?, updated_at = ?, version = version + 1 WHERE id = ?",
                )
                .bind(term)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                (
                    ActivityAction::ShareCapitalTermChanged,
                    format!("Set share capital term of {} to {} months", existing.email, term),
                )
            }
        };

        log_activity(&mut tx, Some(actor_id), action, description).await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(member = %id, action = %action, "Member status changed");
        self.require_member(id).await
    }

    // ==================== DOCUMENT OPERATIONS ====================

    pub async fn upload_document(
        &self,
        member_id: &str,
        document_type: DocumentType,
        storage_ref: &str,
    ) -> Result<MemberDocument, AppError> {
        if storage_ref.trim().is_empty() {
            return Err(AppError::Validation(
                "Document storage reference is required".to_string(),
            ));
        }
        let member = self.require_member(member_id).await?;

        let document = MemberDocument {
            id: new_id(),
            member_id: member.id.clone(),
            document_type,
            storage_ref: storage_ref.trim().to_string(),
            is_verified: false,
            uploaded_at: Utc::now(),
            verified_at: None,
            verified_by: None,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO member_documents (id, member_id, document_type, storage_ref, is_verified, uploaded_at) VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&document.id)
        .bind(&document.member_id)
        .bind(document.document_type.as_str())
        .bind(&document.storage_ref)
        .bind(document.uploaded_at)
        .execute(&mut *tx)
        .await?;
        log_activity(
            &mut tx,
            Some(&member.id),
            ActivityAction::DocumentUploaded,
            format!("Uploaded {} document", document_type),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(document)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<MemberDocument>, AppError> {
        let row = sqlx::query("SELECT * FROM member_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    pub async fn list_documents(&self, member_id: &str) -> Result<Vec<MemberDocument>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM member_documents WHERE member_id = ? ORDER BY uploaded_at",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Mark a document verified. Once both sides of the national ID are
    /// verified the member becomes verified as well.
    pub async fn verify_document(
        &self,
        id: &str,
        actor_id: &str,
    ) -> Result<DocumentVerification, AppError> {
        let document = self
            .get_document(id)
            .await?
            .ok_or_else(|| AppError::not_found("Document", id))?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE member_documents SET is_verified = 1, verified_at = ?, verified_by = ? WHERE id = ?",
        )
        .bind(now)
        .bind(actor_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT COUNT(DISTINCT document_type) AS n FROM member_documents WHERE member_id = ? AND is_verified = 1 AND document_type IN (?, ?)",
        )
        .bind(&document.member_id)
        .bind(DocumentType::IdFront.as_str())
        .bind(DocumentType::IdBack.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let verified_sides: i64 = row.try_get("n")?;
        let member_verified = verified_sides == 2;

        if member_verified {
            sqlx::query(
                "UPDATE members SET is_verified = 1, updated_at = ?, version = version + 1 WHERE id = ? AND is_verified = 0",
            )
            .bind(now)
            .bind(&document.member_id)
            .execute(&mut *tx)
            .await?;
        }

        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::DocumentVerified,
            format!(
                "Verified {} document of member {}",
                document.document_type, document.member_id
            ),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        let document = self
            .get_document(id)
            .await?
            .ok_or_else(|| AppError::not_found("Document", id))?;
        Ok(DocumentVerification {
            document,
            member_verified,
        })
    }
}

pub(super) async fn find_member(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Member>, AppError> {
    let row = sqlx::query(&format!("SELECT {} FROM members WHERE id = ?", MEMBER_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(member_from_row).transpose()
}

/// Insert an account inside the caller's transaction. Members get a
/// membership number and an empty share summary.
pub(super) async fn insert_member(
    conn: &mut SqliteConnection,
    new: &NewMember,
) -> Result<Member, AppError> {
    let email = normalize_email(&new.email);
    if !is_plausible_email(&email) {
        return Err(AppError::Validation(format!("Invalid email address: {}", new.email)));
    }
    if new.full_name.trim().is_empty() {
        return Err(AppError::Validation("Full name is required".to_string()));
    }
    if !is_valid_share_capital_term(new.share_capital_term) {
        return Err(AppError::Validation(
            "Share capital term must be 12 or 24 months".to_string(),
        ));
    }

    let existing = sqlx::query("SELECT id FROM members WHERE email = ?")
        .bind(&email)
        .fetch_optional(&mut *conn)
        .await?;
    if existing.is_some() {
        return Err(AppError::Validation(format!(
            "A member with email {} already exists",
            email
        )));
    }

    let now = Utc::now();
    let membership_number = match new.role {
        Role::Member => {
            let row = sqlx::query("SELECT COUNT(*) AS n FROM members WHERE role = ?")
                .bind(Role::Member.as_str())
                .fetch_one(&mut *conn)
                .await?;
            let count: i64 = row.try_get("n")?;
            Some(format!("SACCO-{}-{:04}", now.year(), count + 1))
        }
        Role::Admin => None,
    };

    let member = Member {
        id: new_id(),
        email,
        full_name: new.full_name.trim().to_string(),
        phone_number: new.phone_number.clone(),
        role: new.role,
        membership_number,
        is_active: true,
        is_verified: false,
        is_on_hold: false,
        on_hold_reason: None,
        share_capital_term: new.share_capital_term,
        created_at: now,
        updated_at: now,
        version: 1,
    };

    sqlx::query(
        "INSERT INTO members (id, email, full_name, phone_number, role, membership_number, is_active, is_verified, is_on_hold, share_capital_term, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, 1, 0, 0, ?, ?, ?, 1)",
    )
    .bind(&member.id)
    .bind(&member.email)
    .bind(&member.full_name)
    .bind(&member.phone_number)
    .bind(member.role.as_str())
    .bind(&member.membership_number)
    .bind(member.share_capital_term)
    .bind(member.created_at)
    .bind(member.updated_at)
    .execute(&mut *conn)
    .await?;

    if member.role == Role::Member {
        let settings = load_settings(conn).await?;
        recompute_summary(conn, &settings, &member.id).await?;
    }

    Ok(member)
}

pub(super) fn member_from_row(row: &SqliteRow) -> Result<Member, AppError> {
    Ok(Member {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        phone_number: row.try_get("phone_number")?,
        role: code(row, "role", Role::from_str)?,
        membership_number: row.try_get("membership_number")?,
        is_active: row.try_get("is_active")?,
        is_verified: row.try_get("is_verified")?,
        is_on_hold: row.try_get("is_on_hold")?,
        on_hold_reason: row.try_get("on_hold_reason")?,
        share_capital_term: row.try_get("share_capital_term")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn document_from_row(row: &SqliteRow) -> Result<MemberDocument, AppError> {
    Ok(MemberDocument {
        id: row.try_get("id")?,
        member_id: row.try_get("member_id")?,
        document_type: code(row, "document_type", DocumentType::from_str)?,
        storage_ref: row.try_get("storage_ref")?,
        is_verified: row.try_get("is_verified")?,
        uploaded_at: row.try_get("uploaded_at")?,
        verified_at: row.try_get("verified_at")?,
        verified_by: row.try_get("verified_by")?,
    })
}
