//! Applying a repayment to a loan balance and to its schedule.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::errors::AppError;
use crate::models::{ScheduleEntry, ScheduleStatus};

/// New loan totals after a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceUpdate {
    pub total_repaid: Decimal,
    pub remaining_balance: Decimal,
    pub settled: bool,
}

/// Apply `amount` to the running totals of a loan.
///
/// Payments must be positive and may not exceed what is still owed.
pub fn apply_to_balance(
    total_repaid: Decimal,
    remaining_balance: Decimal,
    amount: Decimal,
) -> Result<BalanceUpdate, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Repayment amount must be greater than zero".to_string(),
        ));
    }
    if amount > remaining_balance {
        return Err(AppError::Overpayment {
            message: format!(
                "Repayment of {} exceeds the outstanding balance of {}",
                amount, remaining_balance
            ),
            outstanding: remaining_balance,
        });
    }

    let mut remaining = remaining_balance - amount;
    let settled = remaining <= Decimal::ZERO;
    if settled {
        remaining = Decimal::ZERO;
    }

    Ok(BalanceUpdate {
        total_repaid: total_repaid + amount,
        remaining_balance: remaining,
        settled,
    })
}

/// Indices of the entries changed by [`allocate_payment`] and any amount
/// left over once every outstanding entry is paid.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub touched: Vec<usize>,
    pub unallocated: Decimal,
}

/// Walk a payment across outstanding entries, oldest due date first.
///
/// Entries that the payment covers become PAID; the first entry it cannot
/// cover absorbs the rest as PARTIAL and allocation stops there.
pub fn allocate_payment(
    entries: &mut [ScheduleEntry],
    amount: Decimal,
    paid_on: NaiveDate,
) -> Allocation {
    let mut order: Vec<usize> = (0..entries.len())
        .filter(|&i| entries[i].status.is_outstanding())
        .collect();
    order.sort_by_key(|&i| (entries[i].due_date, entries[i].installment_number));

    let mut pool = amount;
    let mut touched = Vec::new();

    for i in order {
        if pool <= Decimal::ZERO {
            break;
        }
        let entry = &mut entries[i];
        if entry.remaining_amount <= pool {
            pool -= entry.remaining_amount;
            entry.amount_paid += entry.remaining_amount;
            entry.remaining_amount = Decimal::ZERO;
            entry.status = ScheduleStatus::Paid;
            entry.paid_date = Some(paid_on);
        } else {
            entry.amount_paid += pool;
            entry.remaining_amount -= pool;
            entry.status = ScheduleStatus::Partial;
            pool = Decimal::ZERO;
        }
        touched.push(i);
    }

    Allocation {
        touched,
        unallocated: pool,
    }
}
