use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::daycount::days_between;
use crate::decimal::Money;
use crate::model::Installment;
use crate::types::InstallmentStatus;

/// arrears position of a loan as of a reference date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrearsState {
    pub as_of: NaiveDate,
    /// days since the oldest unpaid installment fell due; 0 when current
    pub days_in_arrears: u32,
    /// unpaid components on installments due strictly before the as-of date
    pub amount_past_due: Money,
}

/// derives arrears state from a schedule
pub struct ArrearsTracker;

impl ArrearsTracker {
    /// read-only query; an installment due today is not yet in arrears
    pub fn state(schedule: &[Installment], as_of: NaiveDate) -> ArrearsState {
        let past_due: Vec<&Installment> = schedule
            .iter()
            .filter(|i| i.is_open() && i.due_date < as_of)
            .collect();

        let days_in_arrears = past_due
            .iter()
            .map(|i| i.due_date)
            .min()
            .map(|oldest| days_between(oldest, as_of).max(0) as u32)
            .unwrap_or(0);
        let amount_past_due = past_due
            .iter()
            .map(|i| i.total_outstanding())
            .fold(Money::ZERO, |acc, x| acc + x);

        ArrearsState {
            as_of,
            days_in_arrears,
            amount_past_due,
        }
    }

    /// batch variant: flips Pending/Partial installments past their due
    /// date to Overdue, returning the sequences that changed
    pub fn mark_overdue(schedule: &mut [Installment], as_of: NaiveDate) -> Vec<u32> {
        let mut flipped = Vec::new();
        for inst in schedule.iter_mut() {
            let eligible = matches!(
                inst.status,
                InstallmentStatus::Pending | InstallmentStatus::Partial
            );
            if eligible && inst.due_date < as_of && !inst.is_settled() {
                inst.status = InstallmentStatus::Overdue;
                flipped.push(inst.sequence);
            }
        }
        flipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn installment(seq: u32, due: NaiveDate, interest: i64, principal: i64) -> Installment {
        Installment::new(
            Uuid::new_v4(),
            seq,
            due,
            Money::ZERO,
            Money::from_major(interest),
            Money::from_major(principal),
        )
    }

    #[test]
    fn test_current_loan_has_no_arrears() {
        let schedule = vec![installment(1, d(2024, 2, 1), 10, 90)];
        let state = ArrearsTracker::state(&schedule, d(2024, 1, 15));
        assert_eq!(state.days_in_arrears, 0);
        assert_eq!(state.amount_past_due, Money::ZERO);
    }

    #[test]
    fn test_due_today_not_yet_in_arrears() {
        let schedule = vec![installment(1, d(2024, 2, 1), 10, 90)];
        let state = ArrearsTracker::state(&schedule, d(2024, 2, 1));
        assert_eq!(state.days_in_arrears, 0);
        assert_eq!(state.amount_past_due, Money::ZERO);

        let state = ArrearsTracker::state(&schedule, d(2024, 2, 2));
        assert_eq!(state.days_in_arrears, 1);
        assert_eq!(state.amount_past_due, Money::from_major(100));
    }

    #[test]
    fn test_oldest_unpaid_installment_drives_days() {
        let schedule = vec![
            installment(1, d(2024, 1, 1), 10, 90),
            installment(2, d(2024, 2, 1), 10, 90),
        ];
        let state = ArrearsTracker::state(&schedule, d(2024, 4, 5));
        // 2024-01-01 -> 2024-04-05 = 95 days
        assert_eq!(state.days_in_arrears, 95);
        assert_eq!(state.amount_past_due, Money::from_major(200));
    }

    #[test]
    fn test_paid_installments_do_not_count() {
        let mut first = installment(1, d(2024, 1, 1), 10, 90);
        first.interest_paid = first.interest_due;
        first.principal_paid = first.principal_due;
        first.refresh_status();
        let schedule = vec![first, installment(2, d(2024, 2, 1), 10, 90)];

        let state = ArrearsTracker::state(&schedule, d(2024, 3, 1));
        // clock starts at the second installment's due date
        assert_eq!(state.days_in_arrears, 29);
        assert_eq!(state.amount_past_due, Money::from_major(100));
    }

    #[test]
    fn test_partial_payment_keeps_installment_in_arrears() {
        let mut inst = installment(1, d(2024, 1, 1), 10, 90);
        inst.interest_paid = inst.interest_due;
        inst.refresh_status();
        let schedule = vec![inst];

        let state = ArrearsTracker::state(&schedule, d(2024, 1, 11));
        assert_eq!(state.days_in_arrears, 10);
        assert_eq!(state.amount_past_due, Money::from_major(90));
    }

    #[test]
    fn test_mark_overdue_flips_only_past_due() {
        let mut schedule = vec![
            installment(1, d(2024, 1, 1), 10, 90),
            installment(2, d(2024, 2, 1), 10, 90),
            installment(3, d(2024, 3, 1), 10, 90),
        ];

        let flipped = ArrearsTracker::mark_overdue(&mut schedule, d(2024, 2, 15));
        assert_eq!(flipped, vec![1, 2]);
        assert_eq!(schedule[0].status, InstallmentStatus::Overdue);
        assert_eq!(schedule[1].status, InstallmentStatus::Overdue);
        assert_eq!(schedule[2].status, InstallmentStatus::Pending);

        // re-running is a no-op
        let again = ArrearsTracker::mark_overdue(&mut schedule, d(2024, 2, 15));
        assert!(again.is_empty());
    }

    #[test]
    fn test_read_only_query_does_not_mutate() {
        let schedule = vec![installment(1, d(2024, 1, 1), 10, 90)];
        let _ = ArrearsTracker::state(&schedule, d(2024, 3, 1));
        assert_eq!(schedule[0].status, InstallmentStatus::Pending);
    }
}
