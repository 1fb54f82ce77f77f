//! OTP invitations and self-service onboarding.

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::members::insert_member;
use super::repository::{bump_revision, log_activity, new_id};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    generate_otp, is_plausible_email, is_valid_share_capital_term, normalize_email,
    AcceptInvitationRequest, ActivityAction, CreateInvitationRequest, Invitation, Member,
    NewMember, Role,
};

/// `now + ttl_hours`, refusing lifetimes chrono cannot represent.
fn expiry_after(now: DateTime<Utc>, ttl_hours: i64) -> Result<DateTime<Utc>, AppError> {
    TimeDelta::try_hours(ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AppError::Validation(format!("Invalid invitation lifetime: {} hours", ttl_hours)))
}

impl Repository {
    /// Create an invitation and hand it to `deliver` before committing. If
    /// delivery fails nothing is stored.
    pub async fn create_invitation<F>(
        &self,
        request: &CreateInvitationRequest,
        ttl_hours: i64,
        invited_by: &str,
        deliver: F,
    ) -> Result<Invitation, AppError>
    where
        F: FnOnce(&Invitation) -> Result<(), AppError>,
    {
        let email = normalize_email(&request.email);
        if !is_plausible_email(&email) {
            return Err(AppError::Validation(format!(
                "Invalid email address: {}",
                request.email
            )));
        }
        let share_capital_term = request.share_capital_term.unwrap_or(12);
        if !is_valid_share_capital_term(share_capital_term) {
            return Err(AppError::Validation(
                "Share capital term must be 12 or 24 months".to_string(),
            ));
        }

        let now = Utc::now();
        let invitation = Invitation {
            id: new_id(),
            email,
            otp: generate_otp(),
            share_capital_term,
            expires_at: expiry_after(now, ttl_hours)?,
            is_used: false,
            invited_by: invited_by.to_string(),
            created_at: now,
            used_at: None,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO invitations (id, email, otp, share_capital_term, expires_at, is_used, invited_by, created_at) VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&invitation.id)
        .bind(&invitation.email)
        .bind(&invitation.otp)
        .bind(invitation.share_capital_term)
        .bind(invitation.expires_at)
        .bind(&invitation.invited_by)
        .bind(invitation.created_at)
        .execute(&mut *tx)
        .await?;

        let member = sqlx::query("SELECT id FROM members WHERE email = ?")
            .bind(&invitation.email)
            .fetch_optional(&mut *tx)
            .await?;
        if member.is_some() {
            return Err(AppError::Validation(format!(
                "{} is already a member",
                invitation.email
            )));
        }
        let row = sqlx::query("SELECT COUNT(*) AS n FROM invitations WHERE email = ? AND is_used = 0")
            .bind(&invitation.email)
            .fetch_one(&mut *tx)
            .await?;
        let open: i64 = row.try_get("n")?;
        if open > 1 {
            return Err(AppError::Validation(format!(
                "{} already has a pending invitation",
                invitation.email
            )));
        }

        log_activity(
            &mut tx,
            Some(invited_by),
            ActivityAction::MemberInvited,
            format!("Invited {}", invitation.email),
        )
        .await?;
        bump_revision(&mut tx).await?;

        deliver(&invitation)?;
        tx.commit().await?;

        tracing::info!(email = %invitation.email, "Invitation sent");
        Ok(invitation)
    }

    /// Issue a fresh OTP and expiry for an unused invitation.
    pub async fn resend_invitation<F>(
        &self,
        id: &str,
        ttl_hours: i64,
        actor_id: &str,
        deliver: F,
    ) -> Result<Invitation, AppError>
    where
        F: FnOnce(&Invitation) -> Result<(), AppError>,
    {
        let now = Utc::now();
        let otp = generate_otp();
        let expires_at = expiry_after(now, ttl_hours)?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE invitations SET otp = ?, expires_at = ? WHERE id = ? AND is_used = 0",
        )
        .bind(&otp)
        .bind(expires_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return match find_invitation(&mut tx, id).await? {
                Some(_) => Err(AppError::InvalidState(
                    "Invitation has already been used".to_string(),
                )),
                None => Err(AppError::not_found("Invitation", id)),
            };
        }

        let invitation = find_invitation(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found("Invitation", id))?;

        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::InvitationResent,
            format!("Resent invitation to {}", invitation.email),
        )
        .await?;
        bump_revision(&mut tx).await?;

        deliver(&invitation)?;
        tx.commit().await?;

        Ok(invitation)
    }

    pub async fn list_invitations(&self) -> Result<Vec<Invitation>, AppError> {
        let rows = sqlx::query("SELECT * FROM invitations ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(invitation_from_row).collect()
    }

    /// Redeem an OTP and create the member account.
    pub async fn accept_invitation(
        &self,
        request: &AcceptInvitationRequest,
    ) -> Result<Member, AppError> {
        let email = normalize_email(&request.email);
        let otp = request.otp.trim();
        let now = Utc::now();

        let row = sqlx::query(
            "SELECT * FROM invitations WHERE email = ? AND otp = ? AND is_used = 0 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(&email)
        .bind(otp)
        .fetch_optional(&self.pool)
        .await?;
        let invitation = match row {
            Some(row) => invitation_from_row(&row)?,
            None => return Err(AppError::Validation("Invalid or already used OTP".to_string())),
        };
        if invitation.is_expired(now) {
            return Err(AppError::Validation("OTP has expired".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE invitations SET is_used = 1, used_at = ? WHERE id = ? AND is_used = 0",
        )
        .bind(now)
        .bind(&invitation.id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Validation("Invalid or already used OTP".to_string()));
        }

        let member = insert_member(
            &mut tx,
            &NewMember {
                email,
                full_name: request.full_name.clone(),
                phone_number: request.phone_number.clone(),
                role: Role::Member,
                share_capital_term: invitation.share_capital_term,
            },
        )
        .await?;

        log_activity(
            &mut tx,
            Some(&member.id),
            ActivityAction::InvitationAccepted,
            format!(
                "{} joined as {}",
                member.email,
                member.membership_number.as_deref().unwrap_or("member")
            ),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(member = %member.id, email = %member.email, "Invitation accepted");
        Ok(member)
    }
}

async fn find_invitation(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Invitation>, AppError> {
    let row = sqlx::query("SELECT * FROM invitations WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(invitation_from_row).transpose()
}

fn invitation_from_row(row: &SqliteRow) -> Result<Invitation, AppError> {
    Ok(Invitation {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        otp: row.try_get("otp")?,
        share_capital_term: row.try_get("share_capital_term")?,
        expires_at: row.try_get("expires_at")?,
        is_used: row.try_get("is_used")?,
        invited_by: row.try_get("invited_by")?,
        created_at: row.try_get("created_at")?,
        used_at: row.try_get("used_at")?,
    })
}
