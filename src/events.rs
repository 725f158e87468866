use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    LoanId, LoanStatus, RecalculationMode, RiskClass, TransactionId,
};

/// audit-trail events emitted by engine operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    ScheduleGenerated {
        loan_id: LoanId,
        installments: u32,
        principal: Money,
        first_due: NaiveDate,
    },
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
    },

    // payment events
    PaymentReceived {
        loan_id: LoanId,
        transaction_id: TransactionId,
        amount: Money,
        applied_to_fees: Money,
        applied_to_interest: Money,
        applied_to_principal: Money,
        unapplied: Money,
        date: NaiveDate,
    },
    PaymentReversed {
        loan_id: LoanId,
        transaction_id: TransactionId,
        reversal_id: TransactionId,
        amount: Money,
        date: NaiveDate,
    },
    LoanRestructured {
        loan_id: LoanId,
        mode: RecalculationMode,
        superseded: u32,
        appended: u32,
        pivot_date: NaiveDate,
    },

    // arrears and classification events
    InstallmentsOverdue {
        loan_id: LoanId,
        sequences: Vec<u32>,
        as_of: NaiveDate,
    },
    LoanClassified {
        loan_id: LoanId,
        as_of: NaiveDate,
        risk_class: RiskClass,
        days_in_arrears: u32,
        provision_amount: Money,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// export the trail for downstream audit sinks
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}
