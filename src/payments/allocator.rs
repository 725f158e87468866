use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::model::{schedule_total_outstanding, AllocationLine, Installment, Loan, Transaction};
use crate::types::TransactionKind;

use super::PaymentRequest;

/// applies a payment against outstanding installments
///
/// Installments are consumed in due-date ascending order (oldest obligation
/// first); within an installment the waterfall is fees, then interest, then
/// principal. Surplus is recorded on the transaction as unapplied credit,
/// never dropped, and never applied to not-yet-due installments unless the
/// request is flagged as an advance payment.
pub struct PaymentAllocator;

impl PaymentAllocator {
    pub fn allocate(
        loan: &mut Loan,
        schedule: &mut [Installment],
        request: &PaymentRequest,
    ) -> Result<Transaction> {
        loan.ensure_open()?;
        if !request.amount.is_positive() {
            return Err(EngineError::InvalidPaymentAmount {
                amount: request.amount,
            });
        }
        if schedule_total_outstanding(schedule).is_zero() {
            return Err(EngineError::NoOutstandingBalance { id: loan.id });
        }

        // oldest obligation first; sequence breaks due-date ties
        let mut order: Vec<usize> = (0..schedule.len())
            .filter(|&i| {
                let inst = &schedule[i];
                inst.is_open() && (request.advance || inst.due_date <= request.date)
            })
            .collect();
        order.sort_by_key(|&i| (schedule[i].due_date, schedule[i].sequence));

        let mut remaining = request.amount;
        let mut allocations = Vec::new();
        for idx in order {
            if remaining.is_zero() {
                break;
            }
            let inst = &mut schedule[idx];

            let fee = remaining.min(inst.outstanding_fee());
            inst.fee_paid += fee;
            remaining -= fee;

            let interest = remaining.min(inst.outstanding_interest());
            inst.interest_paid += interest;
            remaining -= interest;

            let principal = remaining.min(inst.outstanding_principal());
            inst.principal_paid += principal;
            remaining -= principal;

            if (fee + interest + principal).is_positive() {
                inst.refresh_status();
                allocations.push(AllocationLine {
                    installment_id: inst.id,
                    sequence: inst.sequence,
                    fee_applied: fee,
                    interest_applied: interest,
                    principal_applied: principal,
                });
            }
        }

        loan.credit_balance += remaining;

        Ok(Transaction {
            id: Uuid::new_v4(),
            loan_id: loan.id,
            kind: TransactionKind::Payment,
            amount: request.amount,
            date: request.date,
            method: request.method,
            allocations,
            unapplied: remaining,
            reversed_by: None,
            reverses: None,
            reason: None,
        })
    }
}
