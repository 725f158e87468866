use thiserror::Error;

use crate::decimal::Money;
use crate::types::{LoanId, LoanStatus, TransactionId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid schedule input: {message}")]
    InvalidScheduleInput {
        message: String,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: LoanId,
    },

    #[error("loan is in terminal status {status:?}")]
    LoanClosed {
        status: LoanStatus,
    },

    #[error("no outstanding balance on loan {id}")]
    NoOutstandingBalance {
        id: LoanId,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("transaction not found: {id}")]
    TransactionNotFound {
        id: TransactionId,
    },

    #[error("transaction already reversed: {id}")]
    AlreadyReversed {
        id: TransactionId,
    },

    #[error("recalculation conflict: {message}")]
    RecalculationConflict {
        message: String,
    },

    #[error("storage failure: {message}")]
    Storage {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
