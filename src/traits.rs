//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use std::collections::HashSet;

use crate::import::StatementFile;
use crate::types::*;

/// Backend collaborator for the reconciliation workflow
///
/// This trait lets the reconciliation core run against any backend
/// (REST API client, database, in-memory, etc.). The session itself never
/// touches storage except through these calls.
#[async_trait]
pub trait ReconciliationStorage: Send + Sync {
    /// Parse a statement for an account and return it with the ledger
    /// transactions that are candidates for the same period
    async fn import_statement(
        &mut self,
        company_id: &str,
        account_id: &str,
        file: &StatementFile,
    ) -> ReconciliationResult<StatementImport>;

    /// Persist a single match relation
    async fn persist_match(
        &mut self,
        company_id: &str,
        account_id: &str,
        relation: &MatchRelation,
    ) -> ReconciliationResult<()>;

    /// Remove a previously persisted match relation
    async fn persist_unmatch(
        &mut self,
        company_id: &str,
        account_id: &str,
        relation: &MatchRelation,
    ) -> ReconciliationResult<()>;

    /// Persist a finished session as one reconciliation record.
    ///
    /// Either every match is stored as part of the record or none is.
    async fn complete_reconciliation(
        &mut self,
        request: &CompletionRequest,
    ) -> ReconciliationResult<Reconciliation>;

    /// List prior reconciliations for an account, most recent period first
    async fn list_reconciliations(
        &self,
        company_id: &str,
        account_id: &str,
    ) -> ReconciliationResult<Vec<Reconciliation>>;
}

/// Decides whether a system transaction may be offered as a match
pub trait CandidateMatcher: Send + Sync {
    /// Whether `system` is an acceptable counterpart for `bank`.
    /// Matched state is handled by the session, not the matcher.
    fn is_candidate(&self, bank: &BankTransaction, system: &SystemTransaction) -> bool;
}

/// Trait for implementing statement validation rules
pub trait StatementValidator: Send + Sync {
    /// Validate both transaction sets before a session is created
    fn validate_statement(
        &self,
        bank_transactions: &[BankTransaction],
        system_transactions: &[SystemTransaction],
    ) -> ReconciliationResult<()>;
}

/// Default statement validator: non-empty sets with unique ids
pub struct DefaultStatementValidator;

impl StatementValidator for DefaultStatementValidator {
    fn validate_statement(
        &self,
        bank_transactions: &[BankTransaction],
        system_transactions: &[SystemTransaction],
    ) -> ReconciliationResult<()> {
        if bank_transactions.is_empty() {
            return Err(ReconciliationError::Validation(
                "Statement must contain at least one bank transaction".to_string(),
            ));
        }

        if system_transactions.is_empty() {
            return Err(ReconciliationError::Validation(
                "At least one system transaction is required for matching".to_string(),
            ));
        }

        ensure_unique_ids("bank", bank_transactions.iter().map(|t| t.id.as_str()))?;
        ensure_unique_ids("system", system_transactions.iter().map(|t| t.id.as_str()))?;

        Ok(())
    }
}

fn ensure_unique_ids<'a>(
    side: &str,
    ids: impl Iterator<Item = &'a str>,
) -> ReconciliationResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(ReconciliationError::Validation(format!(
                "A {} transaction has an empty id",
                side
            )));
        }
        if !seen.insert(id) {
            return Err(ReconciliationError::Validation(format!(
                "Duplicate {} transaction id '{}'",
                side, id
            )));
        }
    }
    Ok(())
}
