//! In-memory matching state for one statement import

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::reconciliation::DefaultCandidateMatcher;
use crate::traits::*;
use crate::types::*;

/// Matching state for one bank account over one imported statement.
///
/// The match relation is held as a bidirectional index keyed by both ids.
/// The `matched` flags on the stored transactions are only ever written
/// together with the index (in `link`/`unlink`), so they cannot drift.
pub struct ReconciliationSession {
    company_id: String,
    account_id: String,
    bank_transactions: Vec<BankTransaction>,
    system_transactions: Vec<SystemTransaction>,
    bank_index: HashMap<String, usize>,
    system_index: HashMap<String, usize>,
    bank_to_system: HashMap<String, MatchRelation>,
    system_to_bank: HashMap<String, String>,
    period_start: NaiveDate,
    period_end: NaiveDate,
    matcher: Arc<dyn CandidateMatcher>,
}

impl ReconciliationSession {
    /// Start a session with the default validator and same-day matcher
    pub fn load_statement(
        company_id: String,
        account_id: String,
        bank_transactions: Vec<BankTransaction>,
        system_transactions: Vec<SystemTransaction>,
    ) -> ReconciliationResult<Self> {
        Self::load_statement_with(
            company_id,
            account_id,
            bank_transactions,
            system_transactions,
            &DefaultStatementValidator,
            Arc::new(DefaultCandidateMatcher::default()),
        )
    }

    /// Start a session with a custom validator and candidate matcher
    pub fn load_statement_with(
        company_id: String,
        account_id: String,
        mut bank_transactions: Vec<BankTransaction>,
        mut system_transactions: Vec<SystemTransaction>,
        validator: &dyn StatementValidator,
        matcher: Arc<dyn CandidateMatcher>,
    ) -> ReconciliationResult<Self> {
        validator.validate_statement(&bank_transactions, &system_transactions)?;

        let period_start = bank_transactions.iter().map(|t| t.date).min();
        let period_end = bank_transactions.iter().map(|t| t.date).max();
        let (period_start, period_end) = period_start.zip(period_end).ok_or_else(|| {
            ReconciliationError::Validation(
                "Statement must contain at least one bank transaction".to_string(),
            )
        })?;

        // A new session starts with no relations, whatever the input claims
        for txn in &mut bank_transactions {
            txn.matched = false;
            txn.matched_with = None;
        }
        for txn in &mut system_transactions {
            txn.matched = false;
        }

        let bank_index = bank_transactions
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.id.clone(), idx))
            .collect();
        let system_index = system_transactions
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.id.clone(), idx))
            .collect();

        tracing::info!(
            company_id = %company_id,
            account_id = %account_id,
            bank_transactions = bank_transactions.len(),
            system_transactions = system_transactions.len(),
            period_start = %period_start,
            period_end = %period_end,
            "Reconciliation session loaded"
        );

        Ok(Self {
            company_id,
            account_id,
            bank_transactions,
            system_transactions,
            bank_index,
            system_index,
            bank_to_system: HashMap::new(),
            system_to_bank: HashMap::new(),
            period_start,
            period_end,
            matcher,
        })
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Bank transactions in statement order
    pub fn bank_transactions(&self) -> &[BankTransaction] {
        &self.bank_transactions
    }

    /// System transactions in the order they were loaded
    pub fn system_transactions(&self) -> &[SystemTransaction] {
        &self.system_transactions
    }

    pub fn bank_transaction(&self, id: &str) -> Option<&BankTransaction> {
        self.bank_index
            .get(id)
            .and_then(|&idx| self.bank_transactions.get(idx))
    }

    pub fn system_transaction(&self, id: &str) -> Option<&SystemTransaction> {
        self.system_index
            .get(id)
            .and_then(|&idx| self.system_transactions.get(idx))
    }

    /// Active relations in statement order of their bank transaction
    pub fn matches(&self) -> Vec<MatchRelation> {
        self.bank_transactions
            .iter()
            .filter_map(|t| self.bank_to_system.get(&t.id))
            .cloned()
            .collect()
    }

    /// The active relation for a bank transaction, if any
    pub fn match_for_bank(&self, bank_id: &str) -> Option<&MatchRelation> {
        self.bank_to_system.get(bank_id)
    }

    /// Earliest and latest bank transaction dates
    pub fn period(&self) -> (NaiveDate, NaiveDate) {
        (self.period_start, self.period_end)
    }

    /// Balance before the first statement line, when the bank reports balances
    pub fn opening_balance(&self) -> Option<BigDecimal> {
        let first = *self.chronological().first()?;
        first
            .running_balance
            .as_ref()
            .map(|balance| balance - first.signed_amount())
    }

    /// Balance after the last statement line, when the bank reports balances
    pub fn closing_balance(&self) -> Option<BigDecimal> {
        self.chronological().last()?.running_balance.clone()
    }

    /// Statement lines in the order the bank applied them. Newest-first
    /// exports are reversed before the stable date sort so same-day lines
    /// keep their posting order.
    fn chronological(&self) -> Vec<&BankTransaction> {
        let newest_first = match (self.bank_transactions.first(), self.bank_transactions.last()) {
            (Some(first), Some(last)) => first.date > last.date,
            _ => false,
        };

        let mut ordered: Vec<&BankTransaction> = if newest_first {
            self.bank_transactions.iter().rev().collect()
        } else {
            self.bank_transactions.iter().collect()
        };
        ordered.sort_by_key(|t| t.date);
        ordered
    }

    pub(crate) fn unmatched_bank_transactions(&self) -> impl Iterator<Item = &BankTransaction> {
        self.bank_transactions
            .iter()
            .filter(|t| !self.bank_to_system.contains_key(&t.id))
    }

    pub(crate) fn candidates_for(&self, bank: &BankTransaction) -> Vec<&SystemTransaction> {
        self.system_transactions
            .iter()
            .filter(|s| !self.system_to_bank.contains_key(&s.id))
            .filter(|s| self.matcher.is_candidate(bank, s))
            .collect()
    }

    /// Unmatched system transactions that qualify as a match for `bank_id`
    pub fn select_for_matching(&self, bank_id: &str) -> ReconciliationResult<Vec<&SystemTransaction>> {
        let bank = self.require_bank(bank_id)?;
        if self.bank_to_system.contains_key(bank_id) {
            return Err(ReconciliationError::NotFound(format!(
                "Bank transaction '{}' is already matched",
                bank_id
            )));
        }

        let candidates = self.candidates_for(bank);
        tracing::debug!(
            bank_transaction_id = %bank_id,
            candidates = candidates.len(),
            "Selected bank transaction for matching"
        );
        Ok(candidates)
    }

    /// Pair a bank transaction with a system transaction
    pub fn match_transactions(
        &mut self,
        bank_id: &str,
        system_id: &str,
    ) -> ReconciliationResult<MatchRelation> {
        let relation = self.check_match(bank_id, system_id)?;
        self.link(relation.clone());
        Ok(relation)
    }

    /// Remove the active match of a bank transaction and return it
    pub fn unmatch(&mut self, bank_id: &str) -> ReconciliationResult<MatchRelation> {
        let relation = self.check_unmatch(bank_id)?;
        self.unlink(&relation);
        Ok(relation)
    }

    /// Validate a match without applying it
    pub(crate) fn check_match(
        &self,
        bank_id: &str,
        system_id: &str,
    ) -> ReconciliationResult<MatchRelation> {
        self.require_bank(bank_id)?;
        if self.system_transaction(system_id).is_none() {
            return Err(ReconciliationError::NotFound(format!(
                "System transaction '{}' not found",
                system_id
            )));
        }

        if let Some(existing) = self.bank_to_system.get(bank_id) {
            return Err(ReconciliationError::Conflict(format!(
                "Bank transaction '{}' is already matched with '{}'",
                bank_id, existing.system_transaction_id
            )));
        }
        if let Some(existing) = self.system_to_bank.get(system_id) {
            return Err(ReconciliationError::Conflict(format!(
                "System transaction '{}' is already matched with '{}'",
                system_id, existing
            )));
        }

        Ok(MatchRelation::new(bank_id.to_string(), system_id.to_string()))
    }

    /// Validate an unmatch without applying it
    pub(crate) fn check_unmatch(&self, bank_id: &str) -> ReconciliationResult<MatchRelation> {
        self.require_bank(bank_id)?;
        self.bank_to_system.get(bank_id).cloned().ok_or_else(|| {
            ReconciliationError::NotFound(format!(
                "Bank transaction '{}' has no active match",
                bank_id
            ))
        })
    }

    /// Apply a relation produced by [`Self::check_match`]
    pub(crate) fn link(&mut self, relation: MatchRelation) {
        if let Some(txn) = self
            .bank_index
            .get(&relation.bank_transaction_id)
            .and_then(|&idx| self.bank_transactions.get_mut(idx))
        {
            txn.matched = true;
            txn.matched_with = Some(relation.system_transaction_id.clone());
        }
        if let Some(txn) = self
            .system_index
            .get(&relation.system_transaction_id)
            .and_then(|&idx| self.system_transactions.get_mut(idx))
        {
            txn.matched = true;
        }

        tracing::info!(
            account_id = %self.account_id,
            bank_transaction_id = %relation.bank_transaction_id,
            system_transaction_id = %relation.system_transaction_id,
            "Transactions matched"
        );

        self.system_to_bank.insert(
            relation.system_transaction_id.clone(),
            relation.bank_transaction_id.clone(),
        );
        self.bank_to_system
            .insert(relation.bank_transaction_id.clone(), relation);
    }

    /// Remove a relation produced by [`Self::check_unmatch`]
    pub(crate) fn unlink(&mut self, relation: &MatchRelation) {
        if let Some(txn) = self
            .bank_index
            .get(&relation.bank_transaction_id)
            .and_then(|&idx| self.bank_transactions.get_mut(idx))
        {
            txn.matched = false;
            txn.matched_with = None;
        }
        if let Some(txn) = self
            .system_index
            .get(&relation.system_transaction_id)
            .and_then(|&idx| self.system_transactions.get_mut(idx))
        {
            txn.matched = false;
        }

        self.bank_to_system.remove(&relation.bank_transaction_id);
        self.system_to_bank.remove(&relation.system_transaction_id);

        tracing::info!(
            account_id = %self.account_id,
            bank_transaction_id = %relation.bank_transaction_id,
            system_transaction_id = %relation.system_transaction_id,
            "Transactions unmatched"
        );
    }

    /// Matched and unmatched counts
    pub fn summary(&self) -> MatchSummary {
        let matched_count = self.bank_to_system.len();
        MatchSummary {
            matched_count,
            unmatched_count: self.bank_transactions.len() - matched_count,
            unmatched_system_count: self.system_transactions.len() - self.system_to_bank.len(),
        }
    }

    /// Snapshot of everything the backend needs to persist this session
    pub fn completion_request(&self) -> CompletionRequest {
        CompletionRequest {
            company_id: self.company_id.clone(),
            account_id: self.account_id.clone(),
            period_start: self.period_start,
            period_end: self.period_end,
            opening_balance: self.opening_balance(),
            closing_balance: self.closing_balance(),
            bank_transactions: self.bank_transactions.clone(),
            system_transactions: self.system_transactions.clone(),
            matches: self.matches(),
            summary: self.summary(),
        }
    }

    /// Hand the session to storage as a single reconciliation record.
    ///
    /// Unmatched bank transactions block completion unless `allow_partial`
    /// is set. The session is left untouched on any failure so the caller
    /// can retry.
    pub async fn complete<S: ReconciliationStorage>(
        &self,
        storage: &mut S,
        allow_partial: bool,
    ) -> ReconciliationResult<CompletionResult> {
        let summary = self.summary();
        if summary.unmatched_count > 0 && !allow_partial {
            tracing::warn!(
                account_id = %self.account_id,
                unmatched = summary.unmatched_count,
                "Completion blocked by unmatched bank transactions"
            );
            return Err(ReconciliationError::IncompleteReconciliation {
                unmatched: summary.unmatched_count,
            });
        }

        let request = self.completion_request();
        let reconciliation = storage
            .complete_reconciliation(&request)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    account_id = %self.account_id,
                    error = %e,
                    "Failed to persist reconciliation"
                );
            })?;

        tracing::info!(
            account_id = %self.account_id,
            reconciliation_id = %reconciliation.id,
            matched = summary.matched_count,
            unmatched = summary.unmatched_count,
            "Reconciliation completed"
        );

        Ok(CompletionResult {
            reconciliation,
            summary,
        })
    }

    fn require_bank(&self, bank_id: &str) -> ReconciliationResult<&BankTransaction> {
        self.bank_transaction(bank_id).ok_or_else(|| {
            ReconciliationError::NotFound(format!("Bank transaction '{}' not found", bank_id))
        })
    }
}

impl fmt::Debug for ReconciliationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationSession")
            .field("company_id", &self.company_id)
            .field("account_id", &self.account_id)
            .field("bank_transactions", &self.bank_transactions.len())
            .field("system_transactions", &self.system_transactions.len())
            .field("matches", &self.bank_to_system.len())
            .finish_non_exhaustive()
    }
}
