use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arrears::{ArrearsState, ArrearsTracker};
use crate::classification::{
    ClassificationReportAggregator, LoanClassifier, PortfolioAtRisk,
};
use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::interest::{InterestAccrual, PayoffQuote};
use crate::model::{
    schedule_total_outstanding, ClassificationRecord, Installment, Loan, Transaction,
};
use crate::payments::{reverse_transaction, PaymentAllocator, PaymentRequest};
use crate::schedule::{recalculate_schedule, ScheduleGenerator};
use crate::store::{LoanRecord, LoanStore};
use crate::types::{
    BranchId, InstallmentStatus, LoanId, LoanStatus, OrganizationId, PaymentMethod,
    RecalculationMode, TransactionId, TransactionKind,
};

/// one loan's failure inside a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub loan_id: LoanId,
    pub error: String,
}

/// outcome of a portfolio classification run; per-loan failures are
/// collected here instead of aborting the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationBatchSummary {
    pub as_of: NaiveDate,
    pub records: Vec<ClassificationRecord>,
    pub failures: Vec<BatchFailure>,
}

/// outcome of an arrears batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrearsBatchSummary {
    pub as_of: NaiveDate,
    /// sequences flipped to Overdue, per loan
    pub overdue: Vec<(LoanId, Vec<u32>)>,
    pub failures: Vec<BatchFailure>,
}

/// the repayment and classification engine
///
/// Every operation takes the organization scope and any reference date
/// explicitly; the engine never reads a process clock. Mutating
/// operations on one loan are serialized through a per-loan lock;
/// operations on different loans run in parallel.
pub struct LoanEngine<S: LoanStore> {
    store: S,
    config: EngineConfig,
    events: Mutex<EventStore>,
    locks: Mutex<HashMap<LoanId, Arc<Mutex<()>>>>,
}

impl<S: LoanStore> LoanEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            events: Mutex::new(EventStore::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// drain the audit events accumulated by operations so far
    pub fn take_events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_events()
    }

    /// register a loan in Draft status; the schedule comes later
    pub fn create_loan(&self, loan: Loan) -> Result<Loan> {
        info!(loan_id = %loan.id, principal = %loan.terms.principal, "creating loan");
        self.store.insert(LoanRecord::new(loan.clone()))?;
        Ok(loan)
    }

    /// generate the schedule and activate the loan
    ///
    /// Allowed while no payment has been applied; a schedule with payments
    /// behind it can only be replaced through `recalculate_schedule`.
    pub fn generate_schedule(
        &self,
        organization_id: OrganizationId,
        loan_id: LoanId,
    ) -> Result<Vec<Installment>> {
        let lock = self.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.store.load(organization_id, loan_id)?;
        record.loan.ensure_open()?;
        if record.transactions.iter().any(|t| !t.allocations.is_empty()) {
            return Err(EngineError::InvalidScheduleInput {
                message: "loan already has payments applied; restructure instead".to_string(),
            });
        }

        let schedule = ScheduleGenerator::generate(record.loan.id, &record.loan.terms)?;
        info!(
            loan_id = %loan_id,
            installments = schedule.len(),
            "schedule generated"
        );
        self.emit(Event::ScheduleGenerated {
            loan_id,
            installments: schedule.len() as u32,
            principal: record.loan.terms.principal,
            first_due: schedule[0].due_date,
        });
        if record.loan.status == LoanStatus::Draft {
            self.emit(Event::StatusChanged {
                loan_id,
                old_status: LoanStatus::Draft,
                new_status: LoanStatus::Active,
            });
            record.loan.status = LoanStatus::Active;
        }
        record.installments = schedule.clone();
        self.store.commit(organization_id, record)?;
        Ok(schedule)
    }

    /// apply a payment against the loan's outstanding installments
    pub fn allocate_payment(
        &self,
        organization_id: OrganizationId,
        loan_id: LoanId,
        amount: Money,
        date: NaiveDate,
        method: PaymentMethod,
        advance: bool,
    ) -> Result<Transaction> {
        let lock = self.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.store.load(organization_id, loan_id)?;
        let request = PaymentRequest {
            loan_id,
            amount,
            date,
            method,
            advance,
        };
        let transaction =
            PaymentAllocator::allocate(&mut record.loan, &mut record.installments, &request)?;

        let applied_fees = transaction
            .allocations
            .iter()
            .map(|a| a.fee_applied)
            .fold(Money::ZERO, |acc, x| acc + x);
        let applied_interest = transaction
            .allocations
            .iter()
            .map(|a| a.interest_applied)
            .fold(Money::ZERO, |acc, x| acc + x);
        let applied_principal = transaction
            .allocations
            .iter()
            .map(|a| a.principal_applied)
            .fold(Money::ZERO, |acc, x| acc + x);
        info!(
            loan_id = %loan_id,
            amount = %amount,
            principal = %applied_principal,
            unapplied = %transaction.unapplied,
            "payment allocated"
        );
        self.emit(Event::PaymentReceived {
            loan_id,
            transaction_id: transaction.id,
            amount,
            applied_to_fees: applied_fees,
            applied_to_interest: applied_interest,
            applied_to_principal: applied_principal,
            unapplied: transaction.unapplied,
            date,
        });

        // fully repaid loans close out
        if schedule_total_outstanding(&record.installments).is_zero() {
            self.emit(Event::StatusChanged {
                loan_id,
                old_status: record.loan.status,
                new_status: LoanStatus::Closed,
            });
            record.loan.status = LoanStatus::Closed;
        }

        record.transactions.push(transaction.clone());
        self.store.commit(organization_id, record)?;
        Ok(transaction)
    }

    /// undo a prior allocation exactly, appending a negating transaction
    pub fn reverse_transaction(
        &self,
        organization_id: OrganizationId,
        transaction_id: TransactionId,
        date: NaiveDate,
        reason: &str,
    ) -> Result<Transaction> {
        let loan_id = self.store.find_transaction(organization_id, transaction_id)?;
        let lock = self.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.store.load(organization_id, loan_id)?;
        let idx = record
            .transactions
            .iter()
            .position(|t| t.id == transaction_id)
            .ok_or(EngineError::TransactionNotFound { id: transaction_id })?;
        let original = &record.transactions[idx];
        if original.kind == TransactionKind::Reversal || original.reversed_by.is_some() {
            return Err(EngineError::AlreadyReversed { id: transaction_id });
        }

        // reversing the payment that settled the loan reopens it; a
        // written-off loan stays shut
        if record.loan.status == LoanStatus::Closed {
            self.emit(Event::StatusChanged {
                loan_id,
                old_status: LoanStatus::Closed,
                new_status: LoanStatus::Active,
            });
            record.loan.status = LoanStatus::Active;
        }

        let reversal = reverse_transaction(
            &mut record.loan,
            &mut record.installments,
            &mut record.transactions[idx],
            date,
            reason,
        )?;
        info!(
            loan_id = %loan_id,
            transaction_id = %transaction_id,
            reversal_id = %reversal.id,
            "payment reversed"
        );
        self.emit(Event::PaymentReversed {
            loan_id,
            transaction_id,
            reversal_id: reversal.id,
            amount: reversal.amount,
            date,
        });

        record.transactions.push(reversal.clone());
        self.store.commit(organization_id, record)?;
        Ok(reversal)
    }

    /// restructure the remaining schedule from a pivot date
    pub fn recalculate_schedule(
        &self,
        organization_id: OrganizationId,
        loan_id: LoanId,
        pivot_date: NaiveDate,
        mode: RecalculationMode,
    ) -> Result<Vec<Installment>> {
        let lock = self.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.store.load(organization_id, loan_id)?;
        let before_superseded = record
            .installments
            .iter()
            .filter(|i| i.status == InstallmentStatus::Superseded)
            .count();
        let before_len = record.installments.len();

        let updated = recalculate_schedule(
            &record.loan,
            &record.installments,
            &record.transactions,
            pivot_date,
            mode,
        )?;
        let superseded = updated
            .iter()
            .filter(|i| i.status == InstallmentStatus::Superseded)
            .count()
            - before_superseded;
        let appended = updated.len() - before_len;
        info!(
            loan_id = %loan_id,
            ?mode,
            superseded,
            appended,
            "schedule restructured"
        );
        self.emit(Event::LoanRestructured {
            loan_id,
            mode,
            superseded: superseded as u32,
            appended: appended as u32,
            pivot_date,
        });

        record.installments = updated.clone();
        self.store.commit(organization_id, record)?;
        Ok(updated)
    }

    /// arrears position without side effects
    pub fn get_arrears_state(
        &self,
        organization_id: OrganizationId,
        loan_id: LoanId,
        as_of: NaiveDate,
    ) -> Result<ArrearsState> {
        let record = self.store.load(organization_id, loan_id)?;
        Ok(ArrearsTracker::state(&record.installments, as_of))
    }

    /// early-closure payoff quote
    pub fn payoff_quote(
        &self,
        organization_id: OrganizationId,
        loan_id: LoanId,
        as_of: NaiveDate,
    ) -> Result<PayoffQuote> {
        let record = self.store.load(organization_id, loan_id)?;
        let accrual = InterestAccrual::new(self.config.day_count);
        Ok(accrual.payoff_quote(&record.loan, &record.installments, as_of))
    }

    /// batch side of the arrears tracker: flip past-due installments to
    /// Overdue across the portfolio
    pub fn run_arrears_batch(
        &self,
        organization_id: OrganizationId,
        as_of: NaiveDate,
    ) -> Result<ArrearsBatchSummary> {
        let mut summary = ArrearsBatchSummary {
            as_of,
            overdue: Vec::new(),
            failures: Vec::new(),
        };
        for loan_id in self.store.loan_ids(organization_id)? {
            match self.mark_overdue_one(organization_id, loan_id, as_of) {
                Ok(flipped) if !flipped.is_empty() => summary.overdue.push((loan_id, flipped)),
                Ok(_) => {}
                Err(e) => {
                    warn!(loan_id = %loan_id, error = %e, "arrears batch: loan skipped");
                    summary.failures.push(BatchFailure {
                        loan_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(summary)
    }

    fn mark_overdue_one(
        &self,
        organization_id: OrganizationId,
        loan_id: LoanId,
        as_of: NaiveDate,
    ) -> Result<Vec<u32>> {
        let lock = self.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.store.load(organization_id, loan_id)?;
        if record.loan.status != LoanStatus::Active {
            return Ok(Vec::new());
        }
        let flipped = ArrearsTracker::mark_overdue(&mut record.installments, as_of);
        if !flipped.is_empty() {
            self.emit(Event::InstallmentsOverdue {
                loan_id,
                sequences: flipped.clone(),
                as_of,
            });
            self.store.commit(organization_id, record)?;
        }
        Ok(flipped)
    }

    /// classify one loan as of a date; re-running for the same date
    /// overwrites the single stored record
    pub fn classify_loan(
        &self,
        organization_id: OrganizationId,
        loan_id: LoanId,
        as_of: NaiveDate,
    ) -> Result<ClassificationRecord> {
        let lock = self.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.store.load(organization_id, loan_id)?;
        let classifier = LoanClassifier::new(&self.config);
        let classification = classifier.classify(
            &record.loan,
            &record.installments,
            &record.classifications,
            as_of,
        );
        debug!(
            loan_id = %loan_id,
            as_of = %as_of,
            class = ?classification.risk_class,
            days = classification.days_in_arrears,
            "loan classified"
        );
        self.emit(Event::LoanClassified {
            loan_id,
            as_of,
            risk_class: classification.risk_class,
            days_in_arrears: classification.days_in_arrears,
            provision_amount: classification.provision_amount,
        });

        // unique per (loan, as-of date)
        record.classifications.retain(|r| r.as_of != as_of);
        record.classifications.push(classification.clone());
        self.store.commit(organization_id, record)?;
        Ok(classification)
    }

    /// classify every active loan in the organization; one loan's failure
    /// never aborts the rest
    pub fn classify_portfolio(
        &self,
        organization_id: OrganizationId,
        as_of: NaiveDate,
    ) -> Result<ClassificationBatchSummary> {
        let mut summary = ClassificationBatchSummary {
            as_of,
            records: Vec::new(),
            failures: Vec::new(),
        };
        for loan_id in self.store.loan_ids(organization_id)? {
            let active = match self.store.load(organization_id, loan_id) {
                Ok(record) => record.loan.status == LoanStatus::Active,
                Err(e) => {
                    warn!(loan_id = %loan_id, error = %e, "classification batch: loan failed");
                    summary.failures.push(BatchFailure {
                        loan_id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if !active {
                continue;
            }
            match self.classify_loan(organization_id, loan_id, as_of) {
                Ok(record) => summary.records.push(record),
                Err(e) => {
                    warn!(loan_id = %loan_id, error = %e, "classification batch: loan failed");
                    summary.failures.push(BatchFailure {
                        loan_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            organization_id = %organization_id,
            classified = summary.records.len(),
            failed = summary.failures.len(),
            "portfolio classified"
        );
        Ok(summary)
    }

    /// portfolio-at-risk from the most recent classification per loan
    pub fn get_portfolio_at_risk(
        &self,
        organization_id: OrganizationId,
        as_of: NaiveDate,
    ) -> Result<PortfolioAtRisk> {
        let records = self.all_classifications(organization_id)?;
        let latest = ClassificationReportAggregator::latest_per_loan(&records, as_of);
        Ok(ClassificationReportAggregator::summarize(&latest, as_of))
    }

    /// portfolio-at-risk sliced by branch
    pub fn get_portfolio_at_risk_by_branch(
        &self,
        organization_id: OrganizationId,
        as_of: NaiveDate,
    ) -> Result<Vec<(Option<BranchId>, PortfolioAtRisk)>> {
        let records = self.all_classifications(organization_id)?;
        let latest = ClassificationReportAggregator::latest_per_loan(&records, as_of);
        let mut branches = HashMap::new();
        for loan_id in self.store.loan_ids(organization_id)? {
            let record = self.store.load(organization_id, loan_id)?;
            branches.insert(loan_id, record.loan.branch_id);
        }
        Ok(ClassificationReportAggregator::summarize_by_branch(
            &latest, &branches, as_of,
        ))
    }

    /// write a loan off as loss
    pub fn write_off(&self, organization_id: OrganizationId, loan_id: LoanId) -> Result<()> {
        let lock = self.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.store.load(organization_id, loan_id)?;
        record.loan.ensure_open()?;
        self.emit(Event::StatusChanged {
            loan_id,
            old_status: record.loan.status,
            new_status: LoanStatus::WrittenOff,
        });
        record.loan.status = LoanStatus::WrittenOff;
        self.store.commit(organization_id, record)
    }

    fn all_classifications(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ClassificationRecord>> {
        let mut records = Vec::new();
        for loan_id in self.store.loan_ids(organization_id)? {
            let record = self.store.load(organization_id, loan_id)?;
            records.extend(record.classifications);
        }
        Ok(records)
    }

    fn loan_lock(&self, loan_id: LoanId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(loan_id).or_default().clone()
    }

    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(event);
    }
}
