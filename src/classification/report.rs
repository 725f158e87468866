use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::model::ClassificationRecord;
use crate::types::{BranchId, LoanId, RiskClass};

/// exposure held in one risk class
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassBreakdown {
    pub loans: u32,
    pub exposure: Money,
    pub provision: Money,
}

/// portfolio-level classification statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAtRisk {
    pub as_of: NaiveDate,
    pub total_exposure: Money,
    /// exposure in classes worse than Current
    pub exposure_in_arrears: Money,
    /// exposure-in-arrears / total exposure; zero on an empty book
    pub par_ratio: Rate,
    pub total_provision: Money,
    pub by_class: BTreeMap<RiskClass, ClassBreakdown>,
}

/// rolls per-loan classification records into portfolio statistics
///
/// Read-only; operates on whatever record set the caller scopes to.
pub struct ClassificationReportAggregator;

impl ClassificationReportAggregator {
    /// most recent record per loan at or before the report date
    pub fn latest_per_loan(
        records: &[ClassificationRecord],
        as_of: NaiveDate,
    ) -> Vec<ClassificationRecord> {
        let mut latest: HashMap<LoanId, &ClassificationRecord> = HashMap::new();
        for record in records.iter().filter(|r| r.as_of <= as_of) {
            latest
                .entry(record.loan_id)
                .and_modify(|current| {
                    if record.as_of > current.as_of {
                        *current = record;
                    }
                })
                .or_insert(record);
        }
        let mut out: Vec<ClassificationRecord> = latest.into_values().cloned().collect();
        out.sort_by_key(|r| r.loan_id);
        out
    }

    /// aggregate a set of per-loan records (one per loan) into PAR figures
    pub fn summarize(records: &[ClassificationRecord], as_of: NaiveDate) -> PortfolioAtRisk {
        let mut by_class: BTreeMap<RiskClass, ClassBreakdown> = BTreeMap::new();
        let mut total_exposure = Money::ZERO;
        let mut exposure_in_arrears = Money::ZERO;
        let mut total_provision = Money::ZERO;

        for record in records {
            let entry = by_class.entry(record.risk_class).or_default();
            entry.loans += 1;
            entry.exposure += record.outstanding_principal;
            entry.provision += record.provision_amount;

            total_exposure += record.outstanding_principal;
            total_provision += record.provision_amount;
            if record.risk_class.is_in_arrears() {
                exposure_in_arrears += record.outstanding_principal;
            }
        }

        let par_ratio = if total_exposure.is_zero() {
            Rate::ZERO
        } else {
            Rate::from_decimal(exposure_in_arrears.as_decimal() / total_exposure.as_decimal())
        };

        PortfolioAtRisk {
            as_of,
            total_exposure,
            exposure_in_arrears,
            par_ratio,
            total_provision,
            by_class,
        }
    }

    /// PAR sliced by branch; loans with no branch land under `None`
    pub fn summarize_by_branch(
        records: &[ClassificationRecord],
        branches: &HashMap<LoanId, Option<BranchId>>,
        as_of: NaiveDate,
    ) -> Vec<(Option<BranchId>, PortfolioAtRisk)> {
        let mut grouped: HashMap<Option<BranchId>, Vec<ClassificationRecord>> = HashMap::new();
        for record in records {
            let branch = branches.get(&record.loan_id).copied().flatten();
            grouped.entry(branch).or_default().push(record.clone());
        }
        let mut out: Vec<(Option<BranchId>, PortfolioAtRisk)> = grouped
            .into_iter()
            .map(|(branch, group)| (branch, Self::summarize(&group, as_of)))
            .collect();
        out.sort_by_key(|(branch, _)| *branch);
        out
    }
}
