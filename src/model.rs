use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{EngineError, Result};
use crate::types::{
    BorrowerId, BranchId, GracePolicy, InstallmentId, InstallmentStatus, InterestMethod, LoanId,
    LoanStatus, OfficerId, OrganizationId, PaymentMethod, RepaymentFrequency, RiskClass,
    TransactionId, TransactionKind,
};

/// contractual terms fixed at loan creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    pub annual_rate: Rate,
    pub interest_method: InterestMethod,
    pub term_periods: u32,
    pub frequency: RepaymentFrequency,
    pub grace_periods: u32,
    pub grace_policy: GracePolicy,
    pub disbursement_date: NaiveDate,
}

/// loan master record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub organization_id: OrganizationId,
    pub borrower_id: BorrowerId,
    pub branch_id: Option<BranchId>,
    pub officer_id: Option<OfficerId>,
    pub terms: LoanTerms,
    pub status: LoanStatus,
    /// payment surplus not yet applied to any installment
    pub credit_balance: Money,
    /// eligible collateral value for provision netting
    pub collateral_value: Money,
}

impl Loan {
    pub fn new(organization_id: OrganizationId, borrower_id: BorrowerId, terms: LoanTerms) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            borrower_id,
            branch_id: None,
            officer_id: None,
            terms,
            status: LoanStatus::Draft,
            credit_balance: Money::ZERO,
            collateral_value: Money::ZERO,
        }
    }

    /// reject mutating operations on a terminal-state loan
    pub fn ensure_open(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(EngineError::LoanClosed {
                status: self.status,
            });
        }
        Ok(())
    }
}

/// schedule line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    /// 1..N, unique per loan, ordering = due-date order
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub fee_due: Money,
    pub interest_due: Money,
    pub principal_due: Money,
    pub fee_paid: Money,
    pub interest_paid: Money,
    pub principal_paid: Money,
    pub status: InstallmentStatus,
}

impl Installment {
    pub fn new(
        loan_id: LoanId,
        sequence: u32,
        due_date: NaiveDate,
        fee_due: Money,
        interest_due: Money,
        principal_due: Money,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            sequence,
            due_date,
            fee_due,
            interest_due,
            principal_due,
            fee_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            principal_paid: Money::ZERO,
            status: InstallmentStatus::Pending,
        }
    }

    pub fn total_due(&self) -> Money {
        self.fee_due + self.interest_due + self.principal_due
    }

    pub fn total_paid(&self) -> Money {
        self.fee_paid + self.interest_paid + self.principal_paid
    }

    pub fn outstanding_fee(&self) -> Money {
        self.fee_due - self.fee_paid
    }

    pub fn outstanding_interest(&self) -> Money {
        self.interest_due - self.interest_paid
    }

    pub fn outstanding_principal(&self) -> Money {
        self.principal_due - self.principal_paid
    }

    pub fn total_outstanding(&self) -> Money {
        self.outstanding_fee() + self.outstanding_interest() + self.outstanding_principal()
    }

    /// all components fully covered
    pub fn is_settled(&self) -> bool {
        self.total_outstanding().is_zero()
    }

    /// collectible: not superseded, with an unpaid balance
    pub fn is_open(&self) -> bool {
        self.status != InstallmentStatus::Superseded && !self.is_settled()
    }

    /// derive Pending / Partial / Paid from payment state; Superseded is
    /// sticky, Overdue is re-applied by the arrears batch
    pub fn refresh_status(&mut self) {
        if self.status == InstallmentStatus::Superseded {
            return;
        }
        self.status = if self.is_settled() {
            InstallmentStatus::Paid
        } else if self.total_paid().is_positive() {
            InstallmentStatus::Partial
        } else {
            InstallmentStatus::Pending
        };
    }
}

/// outstanding principal across the live schedule
pub fn schedule_outstanding_principal(installments: &[Installment]) -> Money {
    installments
        .iter()
        .filter(|i| i.status != InstallmentStatus::Superseded)
        .map(|i| i.outstanding_principal())
        .fold(Money::ZERO, |acc, x| acc + x)
}

/// total unpaid balance across the live schedule
pub fn schedule_total_outstanding(installments: &[Installment]) -> Money {
    installments
        .iter()
        .filter(|i| i.status != InstallmentStatus::Superseded)
        .map(|i| i.total_outstanding())
        .fold(Money::ZERO, |acc, x| acc + x)
}

/// per-installment split of an applied payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub installment_id: InstallmentId,
    pub sequence: u32,
    pub fee_applied: Money,
    pub interest_applied: Money,
    pub principal_applied: Money,
}

impl AllocationLine {
    pub fn total(&self) -> Money {
        self.fee_applied + self.interest_applied + self.principal_applied
    }
}

/// payment or reversal event; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub loan_id: LoanId,
    pub kind: TransactionKind,
    pub amount: Money,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub allocations: Vec<AllocationLine>,
    /// surplus recorded as credit, never silently dropped
    pub unapplied: Money,
    /// set on the original when a reversal negates it
    pub reversed_by: Option<TransactionId>,
    /// set on a reversal, pointing at the original
    pub reverses: Option<TransactionId>,
    pub reason: Option<String>,
}

impl Transaction {
    pub fn total_allocated(&self) -> Money {
        self.allocations
            .iter()
            .map(|a| a.total())
            .fold(Money::ZERO, |acc, x| acc + x)
    }
}

/// per-loan classification result; unique per (loan, as-of date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub loan_id: LoanId,
    pub as_of: NaiveDate,
    pub days_in_arrears: u32,
    pub outstanding_principal: Money,
    pub accrued_interest_receivable: Money,
    pub risk_class: RiskClass,
    pub provision_rate: Rate,
    pub provision_amount: Money,
}
