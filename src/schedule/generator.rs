use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::daycount::due_date;
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::model::{Installment, LoanTerms};
use crate::types::{GracePolicy, InterestMethod, LoanId};

/// builds the installment schedule for a loan
pub struct ScheduleGenerator;

impl ScheduleGenerator {
    /// generate the full schedule for a loan's terms
    ///
    /// Runs once at loan creation. Regenerating a schedule that already has
    /// payments applied is a restructuring, handled by `recalculation`.
    pub fn generate(loan_id: LoanId, terms: &LoanTerms) -> Result<Vec<Installment>> {
        Self::validate(terms)?;

        let n = terms.term_periods;
        let g = terms.grace_periods;
        let periodic_rate = terms
            .annual_rate
            .periodic(terms.frequency.periods_per_year())
            .as_decimal();

        // schedule lines and the period offset each one falls due at
        let periods: Vec<u32> = match terms.grace_policy {
            GracePolicy::FullDeferral if g > 0 => (g + 1..=n).collect(),
            _ => (1..=n).collect(),
        };
        let lines: Vec<(u32, NaiveDate)> = periods
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                (
                    (i + 1) as u32,
                    due_date(terms.disbursement_date, terms.frequency, p),
                )
            })
            .collect();

        match terms.interest_method {
            InterestMethod::Flat => Ok(Self::generate_flat(loan_id, terms, &lines)),
            InterestMethod::ReducingBalance | InterestMethod::Compound => {
                Ok(Self::generate_amortizing(loan_id, terms, periodic_rate, &lines))
            }
        }
    }

    fn validate(terms: &LoanTerms) -> Result<()> {
        if !terms.principal.is_positive() {
            return Err(EngineError::InvalidScheduleInput {
                message: format!("principal must be positive, got {}", terms.principal),
            });
        }
        let pct = terms.annual_rate.as_percent();
        if pct < Decimal::ZERO || pct > Decimal::from(100) {
            return Err(EngineError::InvalidScheduleInput {
                message: format!("annual rate must be within 0%..100%, got {}%", pct),
            });
        }
        if terms.term_periods < 1 || terms.term_periods > 120 {
            return Err(EngineError::InvalidScheduleInput {
                message: format!("term must be within 1..120 periods, got {}", terms.term_periods),
            });
        }
        if terms.grace_periods >= terms.term_periods {
            return Err(EngineError::InvalidScheduleInput {
                message: format!(
                    "grace period ({}) must be shorter than the term ({})",
                    terms.grace_periods, terms.term_periods
                ),
            });
        }
        Ok(())
    }

    /// flat method: total interest on the original principal for the full
    /// term, split evenly; principal split evenly across the lines that
    /// amortize it
    fn generate_flat(
        loan_id: LoanId,
        terms: &LoanTerms,
        lines: &[(u32, NaiveDate)],
    ) -> Vec<Installment> {
        let years = Decimal::from(terms.term_periods)
            / Decimal::from(terms.frequency.periods_per_year());
        let total_interest =
            (terms.principal * (terms.annual_rate.as_decimal() * years)).round_minor();

        // under an interest-only grace, the leading lines carry no principal
        let principal_free = match terms.grace_policy {
            GracePolicy::InterestOnly => terms.grace_periods as usize,
            GracePolicy::FullDeferral => 0,
        };
        flat_lines(loan_id, terms.principal, total_interest, lines, principal_free)
    }

    /// reducing-balance and compound methods share the annuity walk; they
    /// differ in how interest deferred during grace accrues (simple vs
    /// compounded)
    fn generate_amortizing(
        loan_id: LoanId,
        terms: &LoanTerms,
        periodic_rate: Decimal,
        lines: &[(u32, NaiveDate)],
    ) -> Vec<Installment> {
        let g = terms.grace_periods;

        let mut out = Vec::with_capacity(lines.len());
        let mut paying = lines;
        let mut deferred = Money::ZERO;

        if g > 0 {
            match terms.grace_policy {
                GracePolicy::InterestOnly => {
                    // interest on the full principal falls due during grace
                    for &(seq, due) in &lines[..g as usize] {
                        let interest = (terms.principal * periodic_rate).round_minor();
                        out.push(Installment::new(
                            loan_id,
                            seq,
                            due,
                            Money::ZERO,
                            interest,
                            Money::ZERO,
                        ));
                    }
                    paying = &lines[g as usize..];
                }
                GracePolicy::FullDeferral => {
                    // nothing falls due during grace; deferred interest is
                    // collected across the paying lines. Compound is the one
                    // method where the deferral earns interest on interest.
                    deferred = match terms.interest_method {
                        InterestMethod::Compound => {
                            let factor = compound_factor(periodic_rate, g) - Decimal::ONE;
                            (terms.principal * factor).round_minor()
                        }
                        _ => {
                            (terms.principal * (periodic_rate * Decimal::from(g))).round_minor()
                        }
                    };
                }
            }
        }

        out.extend(amortize(loan_id, terms.principal, periodic_rate, paying, deferred));
        out
    }
}

/// evenly split an amount, final share absorbing the division remainder so
/// the parts sum back exactly
pub(crate) fn even_split(total: Money, parts: usize) -> Vec<Money> {
    let share = (total / Decimal::from(parts as u32)).round_minor();
    let mut out = vec![share; parts];
    let allocated = share * Decimal::from((parts - 1) as u32);
    out[parts - 1] = total - allocated;
    out
}

/// (1 + r)^periods
pub(crate) fn compound_factor(r: Decimal, periods: u32) -> Decimal {
    let mut factor = Decimal::ONE;
    let base = Decimal::ONE + r;
    for _ in 0..periods {
        factor *= base;
    }
    factor
}

/// level annuity payment for a principal over a number of periods
pub(crate) fn annuity_payment(principal: Money, r: Decimal, periods: u32) -> Money {
    if r.is_zero() {
        return principal / Decimal::from(periods);
    }
    let c = compound_factor(r, periods);
    Money::from_decimal(principal.as_decimal() * r * c / (c - Decimal::ONE))
}

/// annuity walk over the given lines: constant total due per period, final
/// line's principal set to the remaining balance so the principal column
/// sums to the original principal exactly
pub(crate) fn amortize(
    loan_id: LoanId,
    principal: Money,
    periodic_rate: Decimal,
    lines: &[(u32, NaiveDate)],
    deferred_interest: Money,
) -> Vec<Installment> {
    let m = lines.len();
    let payment = annuity_payment(principal, periodic_rate, m as u32).round_minor();
    let deferred_shares = even_split(deferred_interest, m);

    let mut out = Vec::with_capacity(m);
    let mut balance = principal;
    for (k, &(seq, due)) in lines.iter().enumerate() {
        let interest = (balance * periodic_rate).round_minor();
        let principal_portion = if k == m - 1 {
            balance
        } else {
            (payment - interest).max(Money::ZERO).min(balance)
        };
        out.push(Installment::new(
            loan_id,
            seq,
            due,
            Money::ZERO,
            interest + deferred_shares[k],
            principal_portion,
        ));
        balance -= principal_portion;
    }
    out
}

/// flat split over the given lines: interest even across all of them,
/// principal even across the lines past `principal_free`; both remainders
/// land on the final line
pub(crate) fn flat_lines(
    loan_id: LoanId,
    principal: Money,
    total_interest: Money,
    lines: &[(u32, NaiveDate)],
    principal_free: usize,
) -> Vec<Installment> {
    let m = lines.len();
    let interest_shares = even_split(total_interest, m);
    let principal_shares = even_split(principal, m - principal_free);

    lines
        .iter()
        .enumerate()
        .map(|(k, &(seq, due))| {
            let principal_portion = if k < principal_free {
                Money::ZERO
            } else {
                principal_shares[k - principal_free]
            };
            Installment::new(
                loan_id,
                seq,
                due,
                Money::ZERO,
                interest_shares[k],
                principal_portion,
            )
        })
        .collect()
}
