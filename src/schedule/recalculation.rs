use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::daycount::due_date;
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::model::{Installment, Loan, Transaction};
use crate::types::{
    InstallmentStatus, InterestMethod, LoanId, RecalculationMode, RepaymentFrequency,
    TransactionKind,
};

use super::generator::{amortize, flat_lines};

/// restructure a loan with payments already applied: supersede the open
/// installments and regenerate the remaining schedule from the pivot date
///
/// The mode is always caller-selected. `ReduceInstallment` keeps the
/// remaining installment count and shrinks the per-period payment;
/// `ReduceTerm` keeps the prior per-period payment and shortens the term.
pub fn recalculate_schedule(
    loan: &Loan,
    schedule: &[Installment],
    transactions: &[Transaction],
    pivot_date: NaiveDate,
    mode: RecalculationMode,
) -> Result<Vec<Installment>> {
    loan.ensure_open()?;

    // a payment applied after the pivot would have been allocated against
    // installments the restructuring replaces; reject instead of guessing
    if let Some(tx) = transactions
        .iter()
        .find(|t| t.kind == TransactionKind::Payment && t.reversed_by.is_none() && t.date > pivot_date)
    {
        return Err(EngineError::RecalculationConflict {
            message: format!(
                "payment {} dated {} falls after the pivot date {}",
                tx.id, tx.date, pivot_date
            ),
        });
    }

    let open: Vec<&Installment> = schedule.iter().filter(|i| i.is_open()).collect();
    if open.is_empty() {
        return Err(EngineError::NoOutstandingBalance { id: loan.id });
    }

    // outstanding principal rolls forward; unpaid fees are still owed and
    // land on the first replacement line; unpaid interest is re-priced by
    // the new schedule
    let outstanding_principal = open
        .iter()
        .map(|i| i.outstanding_principal())
        .fold(Money::ZERO, |acc, x| acc + x);
    let carried_fees = open
        .iter()
        .map(|i| i.outstanding_fee())
        .fold(Money::ZERO, |acc, x| acc + x);
    if !outstanding_principal.is_positive() {
        return Err(EngineError::NoOutstandingBalance { id: loan.id });
    }

    let periodic_rate = loan
        .terms
        .annual_rate
        .periodic(loan.terms.frequency.periods_per_year())
        .as_decimal();
    let next_sequence = schedule.iter().map(|i| i.sequence).max().unwrap_or(0) + 1;

    let mut replacement = match mode {
        RecalculationMode::ReduceInstallment => {
            let new_term = open.len() as u32;
            let lines = line_plan(pivot_date, loan.terms.frequency, next_sequence, new_term);
            match loan.terms.interest_method {
                InterestMethod::Flat => {
                    let total_interest =
                        flat_interest(outstanding_principal, loan, new_term);
                    flat_lines(loan.id, outstanding_principal, total_interest, &lines, 0)
                }
                InterestMethod::ReducingBalance | InterestMethod::Compound => {
                    amortize(loan.id, outstanding_principal, periodic_rate, &lines, Money::ZERO)
                }
            }
        }
        RecalculationMode::ReduceTerm => {
            let payment = open[0].total_due();
            match loan.terms.interest_method {
                InterestMethod::Flat => {
                    let new_term =
                        flat_term_for_payment(outstanding_principal, periodic_rate, payment)?;
                    let lines = line_plan(pivot_date, loan.terms.frequency, next_sequence, new_term);
                    let total_interest = flat_interest(outstanding_principal, loan, new_term);
                    flat_lines(loan.id, outstanding_principal, total_interest, &lines, 0)
                }
                InterestMethod::ReducingBalance | InterestMethod::Compound => {
                    fixed_payment_walk(
                        loan.id,
                        outstanding_principal,
                        periodic_rate,
                        payment,
                        pivot_date,
                        loan.terms.frequency,
                        next_sequence,
                    )?
                }
            }
        }
    };
    if carried_fees.is_positive() {
        replacement[0].fee_due = carried_fees;
    }

    // old installments are never deleted, only superseded
    let mut updated: Vec<Installment> = schedule.to_vec();
    for inst in updated.iter_mut() {
        if inst.is_open() {
            inst.status = InstallmentStatus::Superseded;
        }
    }
    updated.extend(replacement);
    Ok(updated)
}

fn line_plan(
    pivot_date: NaiveDate,
    frequency: RepaymentFrequency,
    next_sequence: u32,
    term: u32,
) -> Vec<(u32, NaiveDate)> {
    (1..=term)
        .map(|p| (next_sequence + p - 1, due_date(pivot_date, frequency, p)))
        .collect()
}

fn flat_interest(principal: Money, loan: &Loan, term: u32) -> Money {
    let years = Decimal::from(term) / Decimal::from(loan.terms.frequency.periods_per_year());
    (principal * (loan.terms.annual_rate.as_decimal() * years)).round_minor()
}

/// flat schedules have level totals, so the term that preserves the prior
/// payment solves  payment * m = principal + principal * r * m
fn flat_term_for_payment(principal: Money, periodic_rate: Decimal, payment: Money) -> Result<u32> {
    let margin = payment.as_decimal() - principal.as_decimal() * periodic_rate;
    if margin <= Decimal::ZERO {
        return Err(EngineError::RecalculationConflict {
            message: format!("payment {} does not cover periodic interest", payment),
        });
    }
    let term = (principal.as_decimal() / margin).ceil().to_u32().unwrap_or(120);
    Ok(term.clamp(1, 120))
}

/// walk the balance down at a fixed per-period payment; the final line
/// absorbs whatever remains
fn fixed_payment_walk(
    loan_id: LoanId,
    principal: Money,
    periodic_rate: Decimal,
    payment: Money,
    pivot_date: NaiveDate,
    frequency: RepaymentFrequency,
    next_sequence: u32,
) -> Result<Vec<Installment>> {
    if !payment.is_positive() {
        return Err(EngineError::RecalculationConflict {
            message: "prior installment amount is zero; cannot keep payment".to_string(),
        });
    }

    let mut out = Vec::new();
    let mut balance = principal;
    let mut period = 0u32;
    while balance.is_positive() {
        period += 1;
        if period > 120 {
            return Err(EngineError::RecalculationConflict {
                message: format!(
                    "payment {} cannot retire {} within 120 periods",
                    payment, principal
                ),
            });
        }
        let interest = (balance * periodic_rate).round_minor();
        let available = payment - interest;
        if !available.is_positive() {
            return Err(EngineError::RecalculationConflict {
                message: format!(
                    "payment {} does not cover periodic interest {}",
                    payment, interest
                ),
            });
        }
        let principal_portion = available.min(balance);
        out.push(Installment::new(
            loan_id,
            next_sequence + period - 1,
            due_date(pivot_date, frequency, period),
            Money::ZERO,
            interest,
            principal_portion,
        ));
        balance -= principal_portion;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::model::LoanTerms;
    use crate::schedule::ScheduleGenerator;
    use crate::types::{GracePolicy, PaymentMethod};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn active_loan(method: InterestMethod) -> Loan {
        let terms = LoanTerms {
            principal: Money::from_major(120_000),
            annual_rate: Rate::from_percent(dec!(12)),
            interest_method: method,
            term_periods: 12,
            frequency: RepaymentFrequency::Monthly,
            grace_periods: 0,
            grace_policy: GracePolicy::InterestOnly,
            disbursement_date: d(2024, 1, 1),
        };
        let mut loan = Loan::new(Uuid::new_v4(), Uuid::new_v4(), terms);
        loan.status = crate::types::LoanStatus::Active;
        loan
    }

    fn pay_installment(inst: &mut Installment) {
        inst.fee_paid = inst.fee_due;
        inst.interest_paid = inst.interest_due;
        inst.principal_paid = inst.principal_due;
        inst.refresh_status();
    }

    fn payment_tx(loan_id: LoanId, date: NaiveDate) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            loan_id,
            kind: TransactionKind::Payment,
            amount: Money::from_major(100),
            date,
            method: PaymentMethod::Cash,
            allocations: vec![],
            unapplied: Money::ZERO,
            reversed_by: None,
            reverses: None,
            reason: None,
        }
    }

    fn live_principal(schedule: &[Installment]) -> Money {
        schedule
            .iter()
            .filter(|i| i.status != InstallmentStatus::Superseded)
            .map(|i| i.principal_due)
            .fold(Money::ZERO, |acc, x| acc + x)
    }

    #[test]
    fn test_reduce_installment_keeps_term_and_principal_invariant() {
        let loan = active_loan(InterestMethod::ReducingBalance);
        let mut schedule = ScheduleGenerator::generate(loan.id, &loan.terms).unwrap();
        pay_installment(&mut schedule[0]);
        pay_installment(&mut schedule[1]);
        // the tail installment prepaid in advance
        pay_installment(&mut schedule[11]);

        let updated = recalculate_schedule(
            &loan,
            &schedule,
            &[],
            d(2024, 3, 15),
            RecalculationMode::ReduceInstallment,
        )
        .unwrap();

        // 12 originals (3 paid + 9 superseded) + 9 replacements
        assert_eq!(updated.len(), 21);
        let superseded = updated
            .iter()
            .filter(|i| i.status == InstallmentStatus::Superseded)
            .count();
        assert_eq!(superseded, 9);

        // paid principal + replacement principal still total the original
        assert_eq!(live_principal(&updated), Money::from_major(120_000));

        // replacement lines continue the sequence and step from the pivot
        let first_new = updated.iter().find(|i| i.sequence == 13).unwrap();
        assert_eq!(first_new.due_date, d(2024, 4, 15));
        // prepaid tail, same remaining installment count => smaller payment
        assert!(first_new.total_due() < schedule[2].total_due());
    }

    #[test]
    fn test_reduce_term_keeps_payment_and_shortens() {
        let loan = active_loan(InterestMethod::ReducingBalance);
        let mut schedule = ScheduleGenerator::generate(loan.id, &loan.terms).unwrap();
        let original_payment = schedule[0].total_due();
        for inst in schedule.iter_mut().take(6) {
            pay_installment(inst);
        }

        let updated = recalculate_schedule(
            &loan,
            &schedule,
            &[],
            d(2024, 7, 1),
            RecalculationMode::ReduceTerm,
        )
        .unwrap();

        let new_lines: Vec<&Installment> = updated.iter().filter(|i| i.sequence > 12).collect();
        // half the balance at the same payment retires in about half the term
        assert!(new_lines.len() >= 6 && new_lines.len() <= 7);
        for line in &new_lines[..new_lines.len() - 1] {
            assert_eq!(line.total_due(), original_payment);
        }
        assert_eq!(live_principal(&updated), Money::from_major(120_000));
    }

    #[test]
    fn test_reduce_term_flat_preserves_level_totals() {
        let loan = active_loan(InterestMethod::Flat);
        let mut schedule = ScheduleGenerator::generate(loan.id, &loan.terms).unwrap();
        for inst in schedule.iter_mut().take(6) {
            pay_installment(inst);
        }
        let original_payment = schedule[0].total_due();

        let updated = recalculate_schedule(
            &loan,
            &schedule,
            &[],
            d(2024, 7, 1),
            RecalculationMode::ReduceTerm,
        )
        .unwrap();

        let new_lines: Vec<&Installment> = updated.iter().filter(|i| i.sequence > 12).collect();
        assert!(!new_lines.is_empty());
        assert!(new_lines.len() < 12);
        // flat totals stay level and close to the prior payment
        let diff = (new_lines[0].total_due() - original_payment).abs();
        assert!(diff < original_payment);
        assert_eq!(live_principal(&updated), Money::from_major(120_000));
    }

    #[test]
    fn test_conflict_when_payment_postdates_pivot() {
        let loan = active_loan(InterestMethod::ReducingBalance);
        let mut schedule = ScheduleGenerator::generate(loan.id, &loan.terms).unwrap();
        pay_installment(&mut schedule[0]);
        let tx = payment_tx(loan.id, d(2024, 5, 1));

        let result = recalculate_schedule(
            &loan,
            &schedule,
            &[tx],
            d(2024, 4, 1),
            RecalculationMode::ReduceInstallment,
        );
        assert!(matches!(result, Err(EngineError::RecalculationConflict { .. })));
    }

    #[test]
    fn test_reversed_payment_does_not_conflict() {
        let loan = active_loan(InterestMethod::ReducingBalance);
        let schedule = ScheduleGenerator::generate(loan.id, &loan.terms).unwrap();
        let mut tx = payment_tx(loan.id, d(2024, 5, 1));
        tx.reversed_by = Some(Uuid::new_v4());

        let result = recalculate_schedule(
            &loan,
            &schedule,
            &[tx],
            d(2024, 4, 1),
            RecalculationMode::ReduceInstallment,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_fully_paid_loan_has_nothing_to_restructure() {
        let loan = active_loan(InterestMethod::ReducingBalance);
        let mut schedule = ScheduleGenerator::generate(loan.id, &loan.terms).unwrap();
        for inst in schedule.iter_mut() {
            pay_installment(inst);
        }

        let result = recalculate_schedule(
            &loan,
            &schedule,
            &[],
            d(2025, 1, 1),
            RecalculationMode::ReduceInstallment,
        );
        assert!(matches!(result, Err(EngineError::NoOutstandingBalance { .. })));
    }

    #[test]
    fn test_unpaid_fees_carry_to_first_replacement() {
        let loan = active_loan(InterestMethod::ReducingBalance);
        let mut schedule = ScheduleGenerator::generate(loan.id, &loan.terms).unwrap();
        schedule[0].fee_due = Money::from_major(500);
        pay_installment(&mut schedule[1]);

        let updated = recalculate_schedule(
            &loan,
            &schedule,
            &[],
            d(2024, 3, 1),
            RecalculationMode::ReduceInstallment,
        )
        .unwrap();

        let first_new = updated.iter().find(|i| i.sequence == 13).unwrap();
        assert_eq!(first_new.fee_due, Money::from_major(500));
    }
}
