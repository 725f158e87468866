use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::daycount::{days_between, DayCountConvention};
use crate::decimal::{Money, Rate};
use crate::model::{schedule_outstanding_principal, Installment, Loan};
use crate::types::InstallmentStatus;

/// computes accrued-but-not-yet-due interest for the partial period between
/// the last installment due date and an arbitrary as-of date
///
/// Pure functions over explicit dates; never mutates the schedule.
pub struct InterestAccrual {
    pub convention: DayCountConvention,
}

impl InterestAccrual {
    pub fn new(convention: DayCountConvention) -> Self {
        Self { convention }
    }

    /// simple interest on an outstanding principal between two dates
    pub fn accrue(
        &self,
        principal: Money,
        annual_rate: Rate,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Money {
        let days = days_between(from, to).max(0);
        let daily = annual_rate.as_decimal() / Decimal::from(self.convention.year_basis());
        (principal * (daily * Decimal::from(days))).round_minor()
    }

    /// interest accrued on the live outstanding principal since the last
    /// due date at or before the as-of date (disbursement when none has
    /// fallen due yet); this is the accrued-interest-receivable figure
    pub fn accrued_receivable(
        &self,
        loan: &Loan,
        schedule: &[Installment],
        as_of: NaiveDate,
    ) -> Money {
        let anchor = schedule
            .iter()
            .filter(|i| i.status != InstallmentStatus::Superseded && i.due_date <= as_of)
            .map(|i| i.due_date)
            .max()
            .unwrap_or(loan.terms.disbursement_date);
        let outstanding = schedule_outstanding_principal(schedule);
        self.accrue(outstanding, loan.terms.annual_rate, anchor, as_of)
    }

    /// early-closure payoff quote as of a date
    pub fn payoff_quote(
        &self,
        loan: &Loan,
        schedule: &[Installment],
        as_of: NaiveDate,
    ) -> PayoffQuote {
        let live: Vec<&Installment> = schedule
            .iter()
            .filter(|i| i.status != InstallmentStatus::Superseded)
            .collect();
        let outstanding_fees = live
            .iter()
            .map(|i| i.outstanding_fee())
            .fold(Money::ZERO, |acc, x| acc + x);
        let outstanding_interest = live
            .iter()
            .map(|i| i.outstanding_interest())
            .fold(Money::ZERO, |acc, x| acc + x);
        let outstanding_principal = live
            .iter()
            .map(|i| i.outstanding_principal())
            .fold(Money::ZERO, |acc, x| acc + x);
        let accrued_interest = self.accrued_receivable(loan, schedule, as_of);

        PayoffQuote {
            as_of,
            outstanding_fees,
            outstanding_interest,
            outstanding_principal,
            accrued_interest,
        }
    }
}

/// amount required to settle a loan in full as of a date
#[derive(Debug, Clone, PartialEq)]
pub struct PayoffQuote {
    pub as_of: NaiveDate,
    pub outstanding_fees: Money,
    pub outstanding_interest: Money,
    pub outstanding_principal: Money,
    /// accrued since the last due date, not yet billed on any installment
    pub accrued_interest: Money,
}

impl PayoffQuote {
    pub fn total(&self) -> Money {
        self.outstanding_fees
            + self.outstanding_interest
            + self.outstanding_principal
            + self.accrued_interest
    }
}
