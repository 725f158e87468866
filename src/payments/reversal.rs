use chrono::NaiveDate;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::model::{AllocationLine, Installment, Loan, Transaction};
use crate::types::TransactionKind;

/// reverse a prior payment allocation exactly
///
/// Subtracts the recorded per-installment split from each touched
/// installment, restores the unapplied credit, and appends a negating
/// transaction; history is never rewritten.
pub fn reverse_transaction(
    loan: &mut Loan,
    schedule: &mut [Installment],
    original: &mut Transaction,
    date: NaiveDate,
    reason: &str,
) -> Result<Transaction> {
    loan.ensure_open()?;
    // a reversal cannot itself be reversed, and a payment only once
    if original.kind == TransactionKind::Reversal || original.reversed_by.is_some() {
        return Err(EngineError::AlreadyReversed { id: original.id });
    }

    let mut negated = Vec::with_capacity(original.allocations.len());
    for line in &original.allocations {
        let inst = schedule
            .iter_mut()
            .find(|i| i.id == line.installment_id)
            .ok_or_else(|| EngineError::Storage {
                message: format!(
                    "allocation references missing installment {}",
                    line.installment_id
                ),
            })?;
        inst.fee_paid -= line.fee_applied;
        inst.interest_paid -= line.interest_applied;
        inst.principal_paid -= line.principal_applied;
        inst.refresh_status();

        negated.push(AllocationLine {
            installment_id: line.installment_id,
            sequence: line.sequence,
            fee_applied: Money::ZERO - line.fee_applied,
            interest_applied: Money::ZERO - line.interest_applied,
            principal_applied: Money::ZERO - line.principal_applied,
        });
    }

    loan.credit_balance -= original.unapplied;

    let reversal = Transaction {
        id: Uuid::new_v4(),
        loan_id: loan.id,
        kind: TransactionKind::Reversal,
        amount: original.amount,
        date,
        method: original.method,
        allocations: negated,
        unapplied: Money::ZERO - original.unapplied,
        reversed_by: None,
        reverses: Some(original.id),
        reason: Some(reason.to_string()),
    };
    original.reversed_by = Some(reversal.id);
    Ok(reversal)
}
