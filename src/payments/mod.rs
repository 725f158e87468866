pub mod allocator;
pub mod reversal;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{LoanId, PaymentMethod};

pub use allocator::PaymentAllocator;
pub use reversal::reverse_transaction;

/// payment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub loan_id: LoanId,
    pub amount: Money,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    /// allow allocation against installments not yet due
    pub advance: bool,
}
