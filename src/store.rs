use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::model::{ClassificationRecord, Installment, Loan, Transaction};
use crate::types::{LoanId, OrganizationId, TransactionId};

/// everything the engine persists for one loan
///
/// Loaded and committed as a unit: a commit replaces the whole record or
/// fails, so a transaction is never stored without its matching
/// installment updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan: Loan,
    pub installments: Vec<Installment>,
    pub transactions: Vec<Transaction>,
    pub classifications: Vec<ClassificationRecord>,
}

impl LoanRecord {
    pub fn new(loan: Loan) -> Self {
        Self {
            loan,
            installments: Vec::new(),
            transactions: Vec::new(),
            classifications: Vec::new(),
        }
    }
}

/// the data shapes and invariants the engine requires from storage
///
/// Every call carries the tenant scope explicitly; a record is only
/// visible to its own organization. Implementations must make `commit`
/// atomic: partial writes are how schedules and transactions drift apart.
pub trait LoanStore: Send + Sync {
    /// store a new record; fails if the loan already exists
    fn insert(&self, record: LoanRecord) -> Result<()>;

    /// load a loan's full record within the organization scope
    fn load(&self, organization_id: OrganizationId, loan_id: LoanId) -> Result<LoanRecord>;

    /// atomically replace a loan's record
    fn commit(&self, organization_id: OrganizationId, record: LoanRecord) -> Result<()>;

    /// all loan ids within the organization scope
    fn loan_ids(&self, organization_id: OrganizationId) -> Result<Vec<LoanId>>;

    /// resolve which loan a transaction belongs to
    fn find_transaction(
        &self,
        organization_id: OrganizationId,
        transaction_id: TransactionId,
    ) -> Result<LoanId>;
}

/// in-memory store used by tests and embedding callers
#[derive(Debug, Default)]
pub struct InMemoryLoanStore {
    records: RwLock<HashMap<(OrganizationId, LoanId), LoanRecord>>,
}

impl InMemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoanStore for InMemoryLoanStore {
    fn insert(&self, record: LoanRecord) -> Result<()> {
        let key = (record.loan.organization_id, record.loan.id);
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&key) {
            return Err(EngineError::Storage {
                message: format!("loan {} already exists", record.loan.id),
            });
        }
        records.insert(key, record);
        Ok(())
    }

    fn load(&self, organization_id: OrganizationId, loan_id: LoanId) -> Result<LoanRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(organization_id, loan_id))
            .cloned()
            .ok_or(EngineError::LoanNotFound { id: loan_id })
    }

    fn commit(&self, organization_id: OrganizationId, record: LoanRecord) -> Result<()> {
        let key = (organization_id, record.loan.id);
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !records.contains_key(&key) {
            return Err(EngineError::LoanNotFound { id: record.loan.id });
        }
        records.insert(key, record);
        Ok(())
    }

    fn loan_ids(&self, organization_id: OrganizationId) -> Result<Vec<LoanId>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<LoanId> = records
            .keys()
            .filter(|(org, _)| *org == organization_id)
            .map(|(_, loan_id)| *loan_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn find_transaction(
        &self,
        organization_id: OrganizationId,
        transaction_id: TransactionId,
    ) -> Result<LoanId> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .filter(|((org, _), _)| *org == organization_id)
            .find(|(_, record)| record.transactions.iter().any(|t| t.id == transaction_id))
            .map(|((_, loan_id), _)| *loan_id)
            .ok_or(EngineError::TransactionNotFound { id: transaction_id })
    }
}
