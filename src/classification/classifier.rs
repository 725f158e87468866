use chrono::NaiveDate;

use crate::arrears::ArrearsTracker;
use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::interest::InterestAccrual;
use crate::model::{schedule_outstanding_principal, ClassificationRecord, Installment, Loan};
use crate::types::RiskClass;

/// maps a loan's arrears state to a risk class and provision
///
/// Classification is a pure function of current arrears as of the given
/// date: a loan brought current reclassifies downward immediately, unless
/// a cure period is configured.
pub struct LoanClassifier<'a> {
    config: &'a EngineConfig,
}

impl<'a> LoanClassifier<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// classify a loan as of a date; `history` holds the loan's prior
    /// classification records (any order), consulted only by cure policy
    pub fn classify(
        &self,
        loan: &Loan,
        schedule: &[Installment],
        history: &[ClassificationRecord],
        as_of: NaiveDate,
    ) -> ClassificationRecord {
        let arrears = ArrearsTracker::state(schedule, as_of);
        let computed = RiskClass::from_days_in_arrears(arrears.days_in_arrears);
        let risk_class = self.apply_cure(computed, history, as_of);

        let outstanding_principal = schedule_outstanding_principal(schedule);
        let accrued_interest_receivable = InterestAccrual::new(self.config.day_count)
            .accrued_receivable(loan, schedule, as_of);

        let provision_base = if self.config.net_collateral {
            (outstanding_principal - loan.collateral_value).max(Money::ZERO)
        } else {
            outstanding_principal
        };
        let provision_rate = self.config.provisions.rate_for(risk_class);
        let provision_amount = (provision_base * provision_rate.as_decimal()).round_minor();

        ClassificationRecord {
            loan_id: loan.id,
            as_of,
            days_in_arrears: arrears.days_in_arrears,
            outstanding_principal,
            accrued_interest_receivable,
            risk_class,
            provision_rate,
            provision_amount,
        }
    }

    /// a grade only improves once the loan has held the better grade for
    /// the configured number of consecutive runs (this run included);
    /// worsening always applies immediately
    fn apply_cure(
        &self,
        computed: RiskClass,
        history: &[ClassificationRecord],
        as_of: NaiveDate,
    ) -> RiskClass {
        let Some(cure) = self.config.cure else {
            return computed;
        };

        let mut prior: Vec<&ClassificationRecord> =
            history.iter().filter(|r| r.as_of < as_of).collect();
        prior.sort_by_key(|r| r.as_of);
        let Some(last) = prior.last() else {
            return computed;
        };
        if computed >= last.risk_class {
            return computed;
        }

        let needed = cure.consecutive_runs.saturating_sub(1) as usize;
        let recent: Vec<&&ClassificationRecord> = prior.iter().rev().take(needed).collect();
        let cured = recent.len() == needed
            && recent
                .iter()
                .all(|r| RiskClass::from_days_in_arrears(r.days_in_arrears) <= computed);
        if cured {
            computed
        } else {
            last.risk_class
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CurePolicy;
    use crate::decimal::Rate;
    use crate::model::LoanTerms;
    use crate::types::{GracePolicy, InterestMethod, LoanStatus, RepaymentFrequency};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn test_loan() -> Loan {
        let terms = LoanTerms {
            principal: Money::from_major(100_000),
            annual_rate: Rate::from_percent(dec!(12)),
            interest_method: InterestMethod::Flat,
            term_periods: 12,
            frequency: RepaymentFrequency::Monthly,
            grace_periods: 0,
            grace_policy: GracePolicy::InterestOnly,
            disbursement_date: d(2023, 12, 1),
        };
        let mut loan = Loan::new(Uuid::new_v4(), Uuid::new_v4(), terms);
        loan.status = LoanStatus::Active;
        loan
    }

    fn installment(loan: &Loan, seq: u32, due: NaiveDate, principal: i64) -> Installment {
        Installment::new(
            loan.id,
            seq,
            due,
            Money::ZERO,
            Money::from_major(1_000),
            Money::from_major(principal),
        )
    }

    fn record(loan: &Loan, as_of: NaiveDate, days: u32, class: RiskClass) -> ClassificationRecord {
        ClassificationRecord {
            loan_id: loan.id,
            as_of,
            days_in_arrears: days,
            outstanding_principal: Money::from_major(100_000),
            accrued_interest_receivable: Money::ZERO,
            risk_class: class,
            provision_rate: Rate::ZERO,
            provision_amount: Money::ZERO,
        }
    }

    #[test]
    fn test_ninety_five_days_is_doubtful_at_fifty_percent() {
        let config = EngineConfig::standard();
        let loan = test_loan();
        // oldest unpaid installment due 95 days before the as-of date
        let schedule = vec![installment(&loan, 1, d(2024, 1, 1), 100_000)];

        let classifier = LoanClassifier::new(&config);
        let rec = classifier.classify(&loan, &schedule, &[], d(2024, 4, 5));

        assert_eq!(rec.days_in_arrears, 95);
        assert_eq!(rec.risk_class, RiskClass::Doubtful);
        assert_eq!(rec.provision_rate, Rate::from_percent(dec!(50)));
        assert_eq!(rec.provision_amount, Money::from_major(50_000));
    }

    #[test]
    fn test_current_loan_carries_no_provision() {
        let config = EngineConfig::standard();
        let loan = test_loan();
        let schedule = vec![installment(&loan, 1, d(2024, 6, 1), 100_000)];

        let classifier = LoanClassifier::new(&config);
        let rec = classifier.classify(&loan, &schedule, &[], d(2024, 1, 15));

        assert_eq!(rec.risk_class, RiskClass::Current);
        assert_eq!(rec.provision_amount, Money::ZERO);
    }

    #[test]
    fn test_immediate_downward_reclassification_without_cure() {
        let config = EngineConfig::standard();
        let loan = test_loan();
        // fully paid installment: the loan is current again
        let mut inst = installment(&loan, 1, d(2024, 1, 1), 100_000);
        inst.interest_paid = inst.interest_due;
        inst.principal_paid = inst.principal_due;
        inst.refresh_status();
        let schedule = vec![inst];

        let history = vec![record(&loan, d(2024, 4, 1), 91, RiskClass::Doubtful)];
        let classifier = LoanClassifier::new(&config);
        let rec = classifier.classify(&loan, &schedule, &history, d(2024, 5, 1));

        assert_eq!(rec.risk_class, RiskClass::Current);
    }

    #[test]
    fn test_cure_policy_holds_grade_until_consecutive_runs() {
        let mut config = EngineConfig::standard();
        config.cure = Some(CurePolicy { consecutive_runs: 3 });
        let loan = test_loan();

        let mut inst = installment(&loan, 1, d(2024, 1, 1), 100_000);
        inst.interest_paid = inst.interest_due;
        inst.principal_paid = inst.principal_due;
        inst.refresh_status();
        let schedule = vec![inst];
        let classifier = LoanClassifier::new(&config);

        // first clean run after the arrears spell: grade held
        let history = vec![record(&loan, d(2024, 4, 1), 91, RiskClass::Doubtful)];
        let rec = classifier.classify(&loan, &schedule, &history, d(2024, 5, 1));
        assert_eq!(rec.risk_class, RiskClass::Doubtful);

        // second clean run: still held (needs 3 consecutive, this is run 2)
        let history = vec![
            record(&loan, d(2024, 4, 1), 91, RiskClass::Doubtful),
            record(&loan, d(2024, 5, 1), 0, RiskClass::Doubtful),
        ];
        let rec = classifier.classify(&loan, &schedule, &history, d(2024, 6, 1));
        assert_eq!(rec.risk_class, RiskClass::Doubtful);

        // third clean run: cured
        let history = vec![
            record(&loan, d(2024, 4, 1), 91, RiskClass::Doubtful),
            record(&loan, d(2024, 5, 1), 0, RiskClass::Doubtful),
            record(&loan, d(2024, 6, 1), 0, RiskClass::Doubtful),
        ];
        let rec = classifier.classify(&loan, &schedule, &history, d(2024, 7, 1));
        assert_eq!(rec.risk_class, RiskClass::Current);
    }

    #[test]
    fn test_worsening_applies_immediately_under_cure() {
        let mut config = EngineConfig::standard();
        config.cure = Some(CurePolicy { consecutive_runs: 3 });
        let loan = test_loan();
        let schedule = vec![installment(&loan, 1, d(2024, 1, 1), 100_000)];

        let history = vec![record(&loan, d(2024, 1, 15), 0, RiskClass::Current)];
        let classifier = LoanClassifier::new(&config);
        let rec = classifier.classify(&loan, &schedule, &history, d(2024, 3, 1));
        assert_eq!(rec.risk_class, RiskClass::Substandard);
    }

    #[test]
    fn test_collateral_netting_reduces_provision_base() {
        let mut config = EngineConfig::standard();
        config.net_collateral = true;
        let mut loan = test_loan();
        loan.collateral_value = Money::from_major(40_000);
        let schedule = vec![installment(&loan, 1, d(2024, 1, 1), 100_000)];

        let classifier = LoanClassifier::new(&config);
        let rec = classifier.classify(&loan, &schedule, &[], d(2024, 4, 5));

        // (100,000 - 40,000) * 50%
        assert_eq!(rec.provision_amount, Money::from_major(30_000));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let config = EngineConfig::standard();
        let loan = test_loan();
        let schedule = vec![installment(&loan, 1, d(2024, 1, 1), 100_000)];

        let classifier = LoanClassifier::new(&config);
        let a = classifier.classify(&loan, &schedule, &[], d(2024, 4, 5));
        let b = classifier.classify(&loan, &schedule, &[], d(2024, 4, 5));
        assert_eq!(a, b);
    }
}
