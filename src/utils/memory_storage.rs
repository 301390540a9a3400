//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::import::{parse_statement, StatementFile};
use crate::traits::*;
use crate::types::*;

/// Storage calls that can be made to fail on their next invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOperation {
    Import,
    PersistMatch,
    PersistUnmatch,
    Complete,
    List,
}

type AccountKey = (String, String);

fn key(company_id: &str, account_id: &str) -> AccountKey {
    (company_id.to_string(), account_id.to_string())
}

/// In-memory backend for testing and development
///
/// Ledger transactions are seeded per account with
/// [`MemoryStorage::add_system_transactions`]; statement imports return the
/// seeded transactions that fall inside the statement period.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    system_transactions: Arc<RwLock<HashMap<AccountKey, Vec<SystemTransaction>>>>,
    persisted_matches: Arc<RwLock<HashMap<AccountKey, Vec<MatchRelation>>>>,
    reconciliations: Arc<RwLock<Vec<Reconciliation>>>,
    failures: Arc<RwLock<HashSet<StorageOperation>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed ledger transactions for an account
    pub fn add_system_transactions(
        &self,
        company_id: &str,
        account_id: &str,
        transactions: Vec<SystemTransaction>,
    ) -> ReconciliationResult<()> {
        write(&self.system_transactions)?
            .entry(key(company_id, account_id))
            .or_default()
            .extend(transactions);
        Ok(())
    }

    /// Make the next call of `operation` fail with a storage error
    pub fn fail_next(&self, operation: StorageOperation) -> ReconciliationResult<()> {
        write(&self.failures)?.insert(operation);
        Ok(())
    }

    /// Relations persisted incrementally for an account
    pub fn persisted_matches(
        &self,
        company_id: &str,
        account_id: &str,
    ) -> ReconciliationResult<Vec<MatchRelation>> {
        Ok(read(&self.persisted_matches)?
            .get(&key(company_id, account_id))
            .cloned()
            .unwrap_or_default())
    }

    /// Every reconciliation record stored so far
    pub fn reconciliations(&self) -> ReconciliationResult<Vec<Reconciliation>> {
        Ok(read(&self.reconciliations)?.clone())
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> ReconciliationResult<()> {
        write(&self.system_transactions)?.clear();
        write(&self.persisted_matches)?.clear();
        write(&self.reconciliations)?.clear();
        write(&self.failures)?.clear();
        Ok(())
    }

    fn take_failure(&self, operation: StorageOperation) -> ReconciliationResult<()> {
        if write(&self.failures)?.remove(&operation) {
            return Err(ReconciliationError::Storage(format!(
                "{:?} failed",
                operation
            )));
        }
        Ok(())
    }
}

fn read<T>(lock: &RwLock<T>) -> ReconciliationResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| ReconciliationError::Storage("storage lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> ReconciliationResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| ReconciliationError::Storage("storage lock poisoned".to_string()))
}

#[async_trait]
impl ReconciliationStorage for MemoryStorage {
    async fn import_statement(
        &mut self,
        company_id: &str,
        account_id: &str,
        file: &StatementFile,
    ) -> ReconciliationResult<StatementImport> {
        self.take_failure(StorageOperation::Import)?;

        let bank_transactions = parse_statement(file)?;
        let start = bank_transactions.iter().map(|t| t.date).min();
        let end = bank_transactions.iter().map(|t| t.date).max();

        let system_transactions = match start.zip(end) {
            Some((start, end)) => read(&self.system_transactions)?
                .get(&key(company_id, account_id))
                .map(|txns| {
                    txns.iter()
                        .filter(|t| t.date >= start && t.date <= end)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(StatementImport {
            bank_transactions,
            system_transactions,
        })
    }

    async fn persist_match(
        &mut self,
        company_id: &str,
        account_id: &str,
        relation: &MatchRelation,
    ) -> ReconciliationResult<()> {
        self.take_failure(StorageOperation::PersistMatch)?;

        let mut matches = write(&self.persisted_matches)?;
        let stored = matches.entry(key(company_id, account_id)).or_default();
        if stored.iter().any(|r| {
            r.bank_transaction_id == relation.bank_transaction_id
                || r.system_transaction_id == relation.system_transaction_id
        }) {
            return Err(ReconciliationError::Conflict(format!(
                "A match for '{}' or '{}' is already stored",
                relation.bank_transaction_id, relation.system_transaction_id
            )));
        }
        stored.push(relation.clone());
        Ok(())
    }

    async fn persist_unmatch(
        &mut self,
        company_id: &str,
        account_id: &str,
        relation: &MatchRelation,
    ) -> ReconciliationResult<()> {
        self.take_failure(StorageOperation::PersistUnmatch)?;

        let mut matches = write(&self.persisted_matches)?;
        let stored = matches.entry(key(company_id, account_id)).or_default();
        let before = stored.len();
        stored.retain(|r| {
            !(r.bank_transaction_id == relation.bank_transaction_id
                && r.system_transaction_id == relation.system_transaction_id)
        });
        if stored.len() == before {
            return Err(ReconciliationError::NotFound(format!(
                "No stored match between '{}' and '{}'",
                relation.bank_transaction_id, relation.system_transaction_id
            )));
        }
        Ok(())
    }

    async fn complete_reconciliation(
        &mut self,
        request: &CompletionRequest,
    ) -> ReconciliationResult<Reconciliation> {
        self.take_failure(StorageOperation::Complete)?;

        let mut reconciliations = write(&self.reconciliations)?;
        if let Some(existing) = reconciliations.iter().find(|r| {
            r.company_id == request.company_id
                && r.account_id == request.account_id
                && r.status == ReconciliationStatus::Completed
                && r.overlaps(request.period_start, request.period_end)
        }) {
            return Err(ReconciliationError::Conflict(format!(
                "Account '{}' is already reconciled for {} to {} ({})",
                request.account_id, existing.period_start, existing.period_end, existing.id
            )));
        }

        let reconciliation = Reconciliation {
            id: Uuid::new_v4().to_string(),
            company_id: request.company_id.clone(),
            account_id: request.account_id.clone(),
            period_start: request.period_start,
            period_end: request.period_end,
            opening_balance: request.opening_balance.clone(),
            closing_balance: request.closing_balance.clone(),
            status: ReconciliationStatus::Completed,
            matched_count: request.summary.matched_count,
            unmatched_count: request.summary.unmatched_count,
            matches: request.matches.clone(),
            completed_at: Some(chrono::Utc::now().naive_utc()),
        };
        reconciliations.push(reconciliation.clone());

        // incremental matches are now part of the record
        write(&self.persisted_matches)?.remove(&key(&request.company_id, &request.account_id));

        Ok(reconciliation)
    }

    async fn list_reconciliations(
        &self,
        company_id: &str,
        account_id: &str,
    ) -> ReconciliationResult<Vec<Reconciliation>> {
        self.take_failure(StorageOperation::List)?;

        let mut history: Vec<Reconciliation> = read(&self.reconciliations)?
            .iter()
            .filter(|r| r.company_id == company_id && r.account_id == account_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn request(start: NaiveDate, end: NaiveDate) -> CompletionRequest {
        CompletionRequest {
            company_id: "acme".to_string(),
            account_id: "hdfc-current".to_string(),
            period_start: start,
            period_end: end,
            opening_balance: None,
            closing_balance: Some(BigDecimal::from(1000)),
            bank_transactions: Vec::new(),
            system_transactions: Vec::new(),
            matches: Vec::new(),
            summary: MatchSummary {
                matched_count: 0,
                unmatched_count: 0,
                unmatched_system_count: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_import_filters_system_transactions_to_statement_period() {
        let mut storage = MemoryStorage::new();
        storage
            .add_system_transactions(
                "acme",
                "hdfc-current",
                vec![
                    SystemTransaction::new(
                        "s-in".to_string(),
                        date(1, 15),
                        "Rent".to_string(),
                        BigDecimal::from(500),
                        EntryType::Debit,
                    ),
                    SystemTransaction::new(
                        "s-out".to_string(),
                        date(2, 15),
                        "Rent".to_string(),
                        BigDecimal::from(500),
                        EntryType::Debit,
                    ),
                ],
            )
            .unwrap();

        let file = StatementFile::csv(
            "Date,Description,Debit,Credit\n2024-01-10,Fee,5,\n2024-01-20,Rent,500,\n",
        );
        let import = storage
            .import_statement("acme", "hdfc-current", &file)
            .await
            .unwrap();

        assert_eq!(import.bank_transactions.len(), 2);
        assert_eq!(import.system_transactions.len(), 1);
        assert_eq!(import.system_transactions[0].id, "s-in");

        let other = storage
            .import_statement("globex", "hdfc-current", &file)
            .await
            .unwrap();
        assert!(other.system_transactions.is_empty());
    }

    #[tokio::test]
    async fn test_import_surfaces_parse_errors_as_validation() {
        let mut storage = MemoryStorage::new();
        let result = storage
            .import_statement("acme", "hdfc-current", &StatementFile::csv(""))
            .await;
        assert!(matches!(result, Err(ReconciliationError::Validation(_))));
    }

    #[tokio::test]
    async fn test_persist_match_and_unmatch() {
        let mut storage = MemoryStorage::new();
        let relation = MatchRelation::new("b1".to_string(), "s1".to_string());

        storage
            .persist_match("acme", "hdfc-current", &relation)
            .await
            .unwrap();
        let duplicate = MatchRelation::new("b2".to_string(), "s1".to_string());
        assert!(matches!(
            storage
                .persist_match("acme", "hdfc-current", &duplicate)
                .await,
            Err(ReconciliationError::Conflict(_))
        ));

        storage
            .persist_unmatch("acme", "hdfc-current", &relation)
            .await
            .unwrap();
        assert!(matches!(
            storage
                .persist_unmatch("acme", "hdfc-current", &relation)
                .await,
            Err(ReconciliationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_overlapping_completion_conflicts() {
        let mut storage = MemoryStorage::new();
        storage
            .complete_reconciliation(&request(date(1, 1), date(1, 31)))
            .await
            .unwrap();

        let result = storage
            .complete_reconciliation(&request(date(1, 20), date(2, 10)))
            .await;
        assert!(matches!(result, Err(ReconciliationError::Conflict(_))));

        storage
            .complete_reconciliation(&request(date(2, 1), date(2, 29)))
            .await
            .unwrap();

        let history = storage
            .list_reconciliations("acme", "hdfc-current")
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].period_start, date(2, 1));
        assert!(storage
            .list_reconciliations("acme", "other")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let mut storage = MemoryStorage::new();
        storage.fail_next(StorageOperation::Complete).unwrap();

        let req = request(date(3, 1), date(3, 31));
        assert!(matches!(
            storage.complete_reconciliation(&req).await,
            Err(ReconciliationError::Storage(_))
        ));
        assert!(storage.complete_reconciliation(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_clear() {
        let mut storage = MemoryStorage::new();
        storage
            .complete_reconciliation(&request(date(1, 1), date(1, 31)))
            .await
            .unwrap();
        storage.clear().unwrap();
        assert!(storage.reconciliations().unwrap().is_empty());
    }
}
