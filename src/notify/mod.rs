//! Outbound email.
//!
//! Delivery sits behind the [`Mailer`] trait. The default [`LogMailer`] writes
//! every message to the log, which is what development and tests run with.

use rust_decimal::Decimal;

use crate::models::{BatchOutcome, Invitation, Loan, LoanDue, Member, SaccoSettings};

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct MailError(pub String);

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mail delivery failed: {}", self.0)
    }
}

impl std::error::Error for MailError {}

pub trait Mailer: Send + Sync {
    fn send(&self, email: &OutboundEmail) -> Result<(), MailError>;
}

/// Mailer that only logs.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email dispatched");
        tracing::debug!(body = %email.body, "Email body");
        Ok(())
    }
}

/// Send a message whose failure must not abort the caller. Returns whether it
/// was delivered.
pub fn send_best_effort(mailer: &dyn Mailer, email: &OutboundEmail) -> bool {
    match mailer.send(email) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(to = %email.to, subject = %email.subject, "{}", e);
            false
        }
    }
}

/// Send messages one after another, counting successes and failures.
pub fn send_batch<I>(mailer: &dyn Mailer, emails: I) -> BatchOutcome
where
    I: IntoIterator<Item = OutboundEmail>,
{
    let mut outcome = BatchOutcome::default();
    for email in emails {
        if send_best_effort(mailer, &email) {
            outcome.sent_count += 1;
        } else {
            outcome.failed_count += 1;
        }
    }
    outcome
}

fn signature(settings: &SaccoSettings) -> String {
    format!("\n\nRegards,\n{}", settings.name)
}

pub fn invitation_email(settings: &SaccoSettings, invitation: &Invitation) -> OutboundEmail {
    OutboundEmail {
        to: invitation.email.clone(),
        subject: format!("Invitation to join {}", settings.name),
        body: format!(
            "You have been invited to become a member of {}.\n\n\
             Your one-time password is: {}\n\
             It expires at {} UTC.{}",
            settings.name,
            invitation.otp,
            invitation.expires_at.format("%Y-%m-%d %H:%M"),
            signature(settings)
        ),
    }
}

pub fn loan_approved_email(settings: &SaccoSettings, member: &Member, loan: &Loan) -> OutboundEmail {
    OutboundEmail {
        to: member.email.clone(),
        subject: "Your loan application has been approved".to_string(),
        body: format!(
            "Dear {},\n\nYour loan of {} over {} months at {}% has been approved. \
             Total repayable: {}. Fees deducted at disbursement: {}.{}",
            member.full_name,
            loan.principal_amount,
            loan.term_months,
            loan.interest_rate,
            loan.total_expected_repayment,
            loan.processing_fee + loan.insurance_fee,
            signature(settings)
        ),
    }
}

pub fn loan_rejected_email(settings: &SaccoSettings, member: &Member, reason: &str) -> OutboundEmail {
    OutboundEmail {
        to: member.email.clone(),
        subject: "Your loan application was not approved".to_string(),
        body: format!(
            "Dear {},\n\nYour loan application was rejected.\nReason: {}{}",
            member.full_name,
            reason,
            signature(settings)
        ),
    }
}

pub fn loan_disbursed_email(settings: &SaccoSettings, member: &Member, loan: &Loan) -> OutboundEmail {
    let disbursed_on = loan
        .disbursement_date
        .map(|d| d.to_string())
        .unwrap_or_default();
    OutboundEmail {
        to: member.email.clone(),
        subject: "Your loan has been disbursed".to_string(),
        body: format!(
            "Dear {},\n\n{} has been disbursed to you on {}. \
             Balance to repay: {}, expected completion {}.{}",
            member.full_name,
            loan.disbursed_amount,
            disbursed_on,
            loan.remaining_balance,
            loan.expected_completion_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            signature(settings)
        ),
    }
}

pub fn payment_received_email(
    settings: &SaccoSettings,
    member: &Member,
    loan: &Loan,
    amount: Decimal,
) -> OutboundEmail {
    OutboundEmail {
        to: member.email.clone(),
        subject: "Loan repayment received".to_string(),
        body: format!(
            "Dear {},\n\nWe received your repayment of {}. Remaining balance: {}.{}",
            member.full_name,
            amount,
            loan.remaining_balance,
            signature(settings)
        ),
    }
}

pub fn loan_settled_email(settings: &SaccoSettings, member: &Member, loan: &Loan) -> OutboundEmail {
    OutboundEmail {
        to: member.email.clone(),
        subject: "Congratulations, your loan is fully repaid".to_string(),
        body: format!(
            "Dear {},\n\nYour loan of {} is now fully repaid. Total paid: {}.{}",
            member.full_name,
            loan.principal_amount,
            loan.total_repaid,
            signature(settings)
        ),
    }
}

pub fn payment_reminder_email(settings: &SaccoSettings, due: &LoanDue, overdue: bool) -> OutboundEmail {
    let (subject, lead) = if overdue {
        (
            "Overdue loan payment",
            format!(
                "Your loan payment is {} day(s) overdue.",
                due.days_overdue
            ),
        )
    } else {
        (
            "Upcoming loan payment",
            format!("A loan payment falls due on {}.", due.earliest_due_date),
        )
    };
    OutboundEmail {
        to: due.member_email.clone(),
        subject: subject.to_string(),
        body: format!(
            "Dear {},\n\n{} Amount due: {}.{}",
            due.member_name,
            lead,
            due.total_due,
            signature(settings)
        ),
    }
}

pub fn contribution_reminder_email(
    settings: &SaccoSettings,
    to: &str,
    full_name: &str,
    year: i64,
    month: i64,
) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: format!("Contribution reminder for {}-{:02}", year, month),
        body: format!(
            "Dear {},\n\nWe have not yet received your monthly contribution for {}-{:02}. \
             The minimum monthly contribution is {}.{}",
            full_name,
            year,
            month,
            settings.minimum_monthly_contribution,
            signature(settings)
        ),
    }
}

pub fn mass_email(settings: &SaccoSettings, member: &Member, subject: &str, message: &str) -> OutboundEmail {
    OutboundEmail {
        to: member.email.clone(),
        subject: subject.to_string(),
        body: format!("Dear {},\n\n{}{}", member.full_name, message, signature(settings)),
    }
}

/// Test double that keeps every message and can refuse chosen recipients.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<OutboundEmail>>,
    failing: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().push(address.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_to(&self, address: &str) -> Option<OutboundEmail> {
        self.sent()
            .into_iter()
            .rev()
            .find(|e| e.to == address)
    }

    /// The six-digit code from the most recent invitation to `address`.
    pub fn otp_for(&self, address: &str) -> Option<String> {
        let email = self
            .sent()
            .into_iter()
            .rev()
            .find(|e| e.to == address && e.subject.starts_with("Invitation"))?;
        let marker = "one-time password is: ";
        let start = email.body.find(marker)? + marker.len();
        Some(email.body[start..start + 6].to_string())
    }
}

#[cfg(test)]
impl Mailer for RecordingMailer {
    fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        if self.failing.lock().unwrap().iter().any(|a| a == &email.to) {
            return Err(MailError(format!("recipient {} refused", email.to)));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
