use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::RepaymentFrequency;

/// day count convention for interest calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayCountConvention {
    /// actual days / 365
    Actual365,
    /// actual days / 360
    Actual360,
}

impl DayCountConvention {
    /// denominator days for the convention
    pub fn year_basis(&self) -> u32 {
        match self {
            DayCountConvention::Actual365 => 365,
            DayCountConvention::Actual360 => 360,
        }
    }
}

/// actual days between two dates; negative when `end` precedes `start`
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// due date of the given period (1-based), stepped from the disbursement
/// anchor rather than cumulatively, so month-end clamping never drifts
pub fn due_date(anchor: NaiveDate, frequency: RepaymentFrequency, period: u32) -> NaiveDate {
    match frequency {
        RepaymentFrequency::Daily => anchor + Duration::days(period as i64),
        RepaymentFrequency::Weekly => anchor + Duration::days(7 * period as i64),
        RepaymentFrequency::Biweekly => anchor + Duration::days(14 * period as i64),
        RepaymentFrequency::Monthly => anchor
            .checked_add_months(Months::new(period))
            .unwrap_or(NaiveDate::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_year_basis() {
        assert_eq!(DayCountConvention::Actual365.year_basis(), 365);
        assert_eq!(DayCountConvention::Actual360.year_basis(), 360);
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(d(2024, 1, 1), d(2024, 2, 1)), 31);
        assert_eq!(days_between(d(2024, 2, 1), d(2024, 3, 1)), 29);
        assert_eq!(days_between(d(2024, 3, 1), d(2024, 2, 1)), -29);
    }

    #[test]
    fn test_monthly_stepping_clamps_without_drift() {
        let anchor = d(2024, 1, 31);
        assert_eq!(due_date(anchor, RepaymentFrequency::Monthly, 1), d(2024, 2, 29));
        // anchored stepping: march returns to the 31st instead of
        // inheriting february's clamp
        assert_eq!(due_date(anchor, RepaymentFrequency::Monthly, 2), d(2024, 3, 31));
        assert_eq!(due_date(anchor, RepaymentFrequency::Monthly, 3), d(2024, 4, 30));
    }

    #[test]
    fn test_sub_monthly_stepping() {
        let anchor = d(2024, 1, 1);
        assert_eq!(due_date(anchor, RepaymentFrequency::Daily, 3), d(2024, 1, 4));
        assert_eq!(due_date(anchor, RepaymentFrequency::Weekly, 2), d(2024, 1, 15));
        assert_eq!(due_date(anchor, RepaymentFrequency::Biweekly, 2), d(2024, 1, 29));
    }
}
