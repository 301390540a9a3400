//! Reconciliation workflow orchestrator
//!
//! Drives the four steps of a reconciliation (select account, import
//! statement, match transactions, complete) around a
//! [`ReconciliationSession`] and a storage backend.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::ReconciliationConfig;
use crate::import::StatementFile;
use crate::reconciliation::{DefaultCandidateMatcher, ReconciliationSession};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_account_id;

/// Reconciliation workflow for one company
pub struct ReconciliationWorkflow<S: ReconciliationStorage> {
    storage: S,
    company_id: String,
    config: ReconciliationConfig,
    validator: Box<dyn StatementValidator>,
    matcher: Arc<dyn CandidateMatcher>,
    phase: ReconciliationPhase,
    account_id: Option<String>,
    session: Option<ReconciliationSession>,
    completion: Option<CompletionResult>,
}

impl<S: ReconciliationStorage> ReconciliationWorkflow<S> {
    /// Create a workflow with default settings
    pub fn new(storage: S, company_id: String) -> Self {
        Self::with_config(storage, company_id, ReconciliationConfig::default())
    }

    /// Create a workflow with custom settings
    pub fn with_config(storage: S, company_id: String, config: ReconciliationConfig) -> Self {
        let matcher = Arc::new(DefaultCandidateMatcher::from_config(&config));
        Self::with_components(
            storage,
            company_id,
            config,
            Box::new(DefaultStatementValidator),
            matcher,
        )
    }

    /// Create a workflow with a custom statement validator and candidate matcher
    pub fn with_components(
        storage: S,
        company_id: String,
        config: ReconciliationConfig,
        validator: Box<dyn StatementValidator>,
        matcher: Arc<dyn CandidateMatcher>,
    ) -> Self {
        Self {
            storage,
            company_id,
            config,
            validator,
            matcher,
            phase: ReconciliationPhase::SelectingAccount,
            account_id: None,
            session: None,
            completion: None,
        }
    }

    pub fn phase(&self) -> ReconciliationPhase {
        self.phase
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// The current session, including a completed one kept for review
    pub fn session(&self) -> Option<&ReconciliationSession> {
        self.session.as_ref()
    }

    /// Result of the last successful completion
    pub fn completion(&self) -> Option<&CompletionResult> {
        self.completion.as_ref()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Choose the bank account to reconcile
    pub fn select_account(&mut self, account_id: String) -> ReconciliationResult<()> {
        self.expect_phase(ReconciliationPhase::SelectingAccount)?;
        validate_account_id(&account_id)?;

        info!(company_id = %self.company_id, account_id = %account_id, "Account selected");
        self.account_id = Some(account_id);
        self.phase = ReconciliationPhase::ImportingStatement;
        Ok(())
    }

    /// Import a statement file through storage and start matching
    #[instrument(skip(self, file), fields(company_id = %self.company_id, format = ?file.format))]
    pub async fn import_statement(&mut self, file: &StatementFile) -> ReconciliationResult<MatchSummary> {
        self.expect_phase(ReconciliationPhase::ImportingStatement)?;
        let account_id = self.selected_account()?;

        let import = self
            .storage
            .import_statement(&self.company_id, &account_id, file)
            .await?;

        self.start_session(import.bank_transactions, import.system_transactions)
    }

    /// Start matching with already-parsed transaction lists
    pub fn load_statement(
        &mut self,
        bank_transactions: Vec<BankTransaction>,
        system_transactions: Vec<SystemTransaction>,
    ) -> ReconciliationResult<MatchSummary> {
        self.expect_phase(ReconciliationPhase::ImportingStatement)?;
        self.start_session(bank_transactions, system_transactions)
    }

    fn start_session(
        &mut self,
        bank_transactions: Vec<BankTransaction>,
        system_transactions: Vec<SystemTransaction>,
    ) -> ReconciliationResult<MatchSummary> {
        let account_id = self.selected_account()?;
        let session = ReconciliationSession::load_statement_with(
            self.company_id.clone(),
            account_id,
            bank_transactions,
            system_transactions,
            self.validator.as_ref(),
            Arc::clone(&self.matcher),
        )?;

        let summary = session.summary();
        self.session = Some(session);
        self.phase = ReconciliationPhase::Matching;
        Ok(summary)
    }

    /// Candidates for an unmatched bank transaction
    pub fn select_for_matching(&self, bank_id: &str) -> ReconciliationResult<Vec<&SystemTransaction>> {
        self.matching_session()?.select_for_matching(bank_id)
    }

    /// Candidate lists for every unmatched bank transaction
    pub fn suggest_matches(&self) -> ReconciliationResult<Vec<MatchSuggestion>> {
        Ok(self.matching_session()?.suggest_matches())
    }

    /// Pair a bank transaction with a system transaction.
    ///
    /// With incremental persistence enabled the pair is stored before the
    /// session changes; a storage failure leaves the session as it was.
    #[instrument(skip(self), fields(company_id = %self.company_id))]
    pub async fn match_transactions(
        &mut self,
        bank_id: &str,
        system_id: &str,
    ) -> ReconciliationResult<MatchRelation> {
        self.expect_phase(ReconciliationPhase::Matching)?;
        let session = self.session.as_mut().ok_or_else(missing_session)?;

        let relation = session.check_match(bank_id, system_id)?;
        if self.config.persist_matches_incrementally {
            self.storage
                .persist_match(&self.company_id, session.account_id(), &relation)
                .await?;
        }
        session.link(relation.clone());
        Ok(relation)
    }

    /// Remove the match of a bank transaction
    #[instrument(skip(self), fields(company_id = %self.company_id))]
    pub async fn unmatch(&mut self, bank_id: &str) -> ReconciliationResult<MatchRelation> {
        self.expect_phase(ReconciliationPhase::Matching)?;
        let session = self.session.as_mut().ok_or_else(missing_session)?;

        let relation = session.check_unmatch(bank_id)?;
        if self.config.persist_matches_incrementally {
            self.storage
                .persist_unmatch(&self.company_id, session.account_id(), &relation)
                .await?;
        }
        session.unlink(&relation);
        Ok(relation)
    }

    /// Match every unambiguous pair.
    ///
    /// With incremental persistence each pair is its own unit of failure:
    /// pairs stored before a failing one stay matched.
    #[instrument(skip(self), fields(company_id = %self.company_id))]
    pub async fn auto_match(&mut self) -> ReconciliationResult<Vec<MatchRelation>> {
        self.expect_phase(ReconciliationPhase::Matching)?;
        let session = self.session.as_mut().ok_or_else(missing_session)?;

        if !self.config.persist_matches_incrementally {
            return Ok(session.auto_match());
        }

        let mut created = Vec::new();
        for (bank_id, system_id) in session.unambiguous_matches() {
            let relation = session.check_match(&bank_id, &system_id)?;
            self.storage
                .persist_match(&self.company_id, session.account_id(), &relation)
                .await?;
            session.link(relation.clone());
            created.push(relation);
        }
        Ok(created)
    }

    /// Matched and unmatched counts for the current session
    pub fn summary(&self) -> ReconciliationResult<MatchSummary> {
        Ok(self.matching_session()?.summary())
    }

    /// Persist the session and move to the completed phase.
    ///
    /// On failure the workflow stays in matching with all work intact.
    #[instrument(skip(self), fields(company_id = %self.company_id))]
    pub async fn complete(&mut self, allow_partial: bool) -> ReconciliationResult<CompletionResult> {
        self.expect_phase(ReconciliationPhase::Matching)?;
        let session = self.session.as_ref().ok_or_else(missing_session)?;

        let result = session.complete(&mut self.storage, allow_partial).await?;

        self.phase = ReconciliationPhase::Completed;
        self.completion = Some(result.clone());
        Ok(result)
    }

    /// Discard the current session and return to account selection.
    ///
    /// Matches already stored through incremental persistence are withdrawn
    /// first. If storage fails, the workflow stays in matching with the
    /// remaining matches intact and the call can be repeated.
    #[instrument(skip(self), fields(company_id = %self.company_id))]
    pub async fn start_new(&mut self) -> ReconciliationResult<()> {
        if self.phase == ReconciliationPhase::Matching {
            if let Some(session) = self.session.as_mut() {
                warn!(
                    account_id = %session.account_id(),
                    matched = session.summary().matched_count,
                    "Abandoning reconciliation session"
                );

                if self.config.persist_matches_incrementally {
                    for relation in session.matches() {
                        self.storage
                            .persist_unmatch(&self.company_id, session.account_id(), &relation)
                            .await?;
                        session.unlink(&relation);
                    }
                }
            }
        }

        self.phase = ReconciliationPhase::SelectingAccount;
        self.account_id = None;
        self.session = None;
        self.completion = None;
        Ok(())
    }

    /// Prior reconciliations for an account
    #[instrument(skip(self), fields(company_id = %self.company_id))]
    pub async fn reconciliation_history(
        &self,
        account_id: &str,
    ) -> ReconciliationResult<Vec<Reconciliation>> {
        self.storage
            .list_reconciliations(&self.company_id, account_id)
            .await
    }

    fn expect_phase(&self, expected: ReconciliationPhase) -> ReconciliationResult<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ReconciliationError::InvalidState {
                expected,
                actual: self.phase,
            })
        }
    }

    fn selected_account(&self) -> ReconciliationResult<String> {
        self.account_id
            .clone()
            .ok_or(ReconciliationError::InvalidState {
                expected: ReconciliationPhase::ImportingStatement,
                actual: ReconciliationPhase::SelectingAccount,
            })
    }

    fn matching_session(&self) -> ReconciliationResult<&ReconciliationSession> {
        self.expect_phase(ReconciliationPhase::Matching)?;
        self.session.as_ref().ok_or_else(missing_session)
    }
}

fn missing_session() -> ReconciliationError {
    ReconciliationError::InvalidState {
        expected: ReconciliationPhase::Matching,
        actual: ReconciliationPhase::ImportingStatement,
    }
}
