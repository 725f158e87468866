pub mod arrears;
pub mod classification;
pub mod config;
pub mod daycount;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod interest;
pub mod model;
pub mod payments;
pub mod schedule;
pub mod store;
pub mod types;

// re-export key types
pub use decimal::{Money, Rate};
pub use errors::{EngineError, Result};
pub use events::{Event, EventStore};
pub use arrears::{ArrearsState, ArrearsTracker};
pub use classification::{
    ClassBreakdown, ClassificationReportAggregator, LoanClassifier, PortfolioAtRisk,
};
pub use config::{CurePolicy, EngineConfig, ProvisionPolicy};
pub use daycount::DayCountConvention;
pub use engine::{
    ArrearsBatchSummary, BatchFailure, ClassificationBatchSummary, LoanEngine,
};
pub use interest::{InterestAccrual, PayoffQuote};
pub use model::{
    AllocationLine, ClassificationRecord, Installment, Loan, LoanTerms, Transaction,
};
pub use payments::{PaymentAllocator, PaymentRequest};
pub use schedule::{recalculate_schedule, ScheduleGenerator};
pub use store::{InMemoryLoanStore, LoanRecord, LoanStore};
pub use types::{
    GracePolicy, InstallmentStatus, InterestMethod, LoanId, LoanStatus, OrganizationId,
    PaymentMethod, RecalculationMode, RepaymentFrequency, RiskClass, TransactionId,
    TransactionKind,
};

// re-export external dependencies that users will need
pub use chrono;
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
