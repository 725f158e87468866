use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a schedule line
pub type InstallmentId = Uuid;

/// unique identifier for a payment or reversal transaction
pub type TransactionId = Uuid;

/// tenant scope; every engine operation carries one explicitly
pub type OrganizationId = Uuid;

/// borrower owning the loan
pub type BorrowerId = Uuid;

/// optional report-slicing dimensions
pub type BranchId = Uuid;
pub type OfficerId = Uuid;

/// interest calculation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterestMethod {
    /// total interest on original principal, split evenly across periods
    Flat,
    /// per-period interest on the outstanding balance, annuity payment
    ReducingBalance,
    /// as reducing balance, but deferred interest compounds
    Compound,
}

/// repayment frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepaymentFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl RepaymentFrequency {
    /// number of repayment periods in a year
    pub fn periods_per_year(&self) -> u32 {
        match self {
            RepaymentFrequency::Daily => 365,
            RepaymentFrequency::Weekly => 52,
            RepaymentFrequency::Biweekly => 26,
            RepaymentFrequency::Monthly => 12,
        }
    }
}

/// how repayment is deferred during the grace period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GracePolicy {
    /// interest falls due during grace, principal is deferred
    InterestOnly,
    /// nothing falls due during grace; deferred interest is
    /// collected across the remaining installments
    FullDeferral,
}

/// loan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// created, schedule not yet generated
    Draft,
    /// schedule generated, repayments expected
    Active,
    /// fully repaid
    Closed,
    /// written off as loss
    WrittenOff,
}

impl LoanStatus {
    /// terminal states reject mutating operations
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Closed | LoanStatus::WrittenOff)
    }
}

/// schedule line status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    /// nothing paid yet
    Pending,
    /// some component partially paid
    Partial,
    /// all components fully paid
    Paid,
    /// past due with an unpaid balance (set by the arrears batch)
    Overdue,
    /// replaced by a restructuring; no longer collectible
    Superseded,
}

/// payment channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    MobileMoney,
    Cheque,
}

/// transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Payment,
    Reversal,
}

/// restructuring mode, always caller-selected rather than inferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecalculationMode {
    /// keep the remaining term, shrink the per-period payment
    ReduceInstallment,
    /// keep the per-period payment, shorten the term
    ReduceTerm,
}

/// regulatory risk class, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskClass {
    Current,
    Watch,
    Substandard,
    Doubtful,
    Loss,
}

impl RiskClass {
    /// class for a days-in-arrears figure
    pub fn from_days_in_arrears(days: u32) -> Self {
        match days {
            0 => RiskClass::Current,
            1..=30 => RiskClass::Watch,
            31..=90 => RiskClass::Substandard,
            91..=180 => RiskClass::Doubtful,
            _ => RiskClass::Loss,
        }
    }

    /// loans in any class worse than Current count toward PAR
    pub fn is_in_arrears(&self) -> bool {
        *self != RiskClass::Current
    }
}
