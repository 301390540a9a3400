//! Core types and data structures for bank reconciliation

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a transaction amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Money leaving the account (withdrawal, payment)
    Debit,
    /// Money entering the account (deposit, receipt)
    Credit,
}

impl EntryType {
    /// Returns the opposite entry type
    pub fn opposite(&self) -> Self {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }

    /// Apply this direction's sign to an amount.
    /// Credits are positive, debits are negative; the input sign is ignored.
    pub fn signed(&self, amount: &BigDecimal) -> BigDecimal {
        match self {
            EntryType::Debit => -amount.abs(),
            EntryType::Credit => amount.abs(),
        }
    }
}

/// One line of an imported bank statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Unique identifier within the statement
    pub id: String,
    /// Booking date reported by the bank
    pub date: NaiveDate,
    /// Narrative text from the statement
    pub description: String,
    /// Bank reference (cheque number, transfer id, etc.)
    #[serde(default)]
    pub reference: Option<String>,
    /// Amount withdrawn; mutually exclusive with `credit`
    #[serde(default)]
    pub debit: BigDecimal,
    /// Amount deposited; mutually exclusive with `debit`
    #[serde(default)]
    pub credit: BigDecimal,
    /// Statement balance after this line, when the bank reports one
    #[serde(default)]
    pub running_balance: Option<BigDecimal>,
    /// Whether this line participates in an active match
    #[serde(default)]
    pub matched: bool,
    /// Id of the system transaction this line is matched with
    #[serde(default)]
    pub matched_with: Option<String>,
}

impl BankTransaction {
    /// Create a new bank transaction with zero amounts
    pub fn new(
        id: String,
        date: NaiveDate,
        description: String,
        reference: Option<String>,
    ) -> Self {
        Self {
            id,
            date,
            description,
            reference,
            debit: BigDecimal::from(0),
            credit: BigDecimal::from(0),
            running_balance: None,
            matched: false,
            matched_with: None,
        }
    }

    /// Create a withdrawal line
    pub fn debit(id: String, date: NaiveDate, description: String, amount: BigDecimal) -> Self {
        let mut txn = Self::new(id, date, description, None);
        txn.debit = amount;
        txn
    }

    /// Create a deposit line
    pub fn credit(id: String, date: NaiveDate, description: String, amount: BigDecimal) -> Self {
        let mut txn = Self::new(id, date, description, None);
        txn.credit = amount;
        txn
    }

    /// Set the bank reference
    pub fn with_reference(mut self, reference: String) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Set the running balance reported after this line
    pub fn with_running_balance(mut self, balance: BigDecimal) -> Self {
        self.running_balance = Some(balance);
        self
    }

    /// Direction of the line, derived from which amount column is populated
    pub fn entry_type(&self) -> EntryType {
        if self.credit > BigDecimal::from(0) {
            EntryType::Credit
        } else {
            EntryType::Debit
        }
    }

    /// Net effect on the account: credit minus debit
    pub fn signed_amount(&self) -> BigDecimal {
        &self.credit - &self.debit
    }
}

/// Ledger-side transaction used as a reconciliation candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemTransaction {
    /// Unique identifier assigned by the accounting system
    pub id: String,
    /// Posting date
    pub date: NaiveDate,
    /// Document reference (invoice number, payment voucher, etc.)
    #[serde(default)]
    pub reference: Option<String>,
    /// Description of the posting
    pub description: String,
    /// Amount; its sign is taken from `transaction_type`
    pub amount: BigDecimal,
    /// Whether the amount moves money into or out of the bank account
    #[serde(rename = "type")]
    pub transaction_type: EntryType,
    /// Whether this transaction participates in an active match
    #[serde(default)]
    pub matched: bool,
}

impl SystemTransaction {
    /// Create a new system transaction
    pub fn new(
        id: String,
        date: NaiveDate,
        description: String,
        amount: BigDecimal,
        transaction_type: EntryType,
    ) -> Self {
        Self {
            id,
            date,
            reference: None,
            description,
            amount,
            transaction_type,
            matched: false,
        }
    }

    /// Set the document reference
    pub fn with_reference(mut self, reference: String) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Net effect on the bank account, comparable with [`BankTransaction::signed_amount`]
    pub fn signed_amount(&self) -> BigDecimal {
        self.transaction_type.signed(&self.amount)
    }
}

/// A confirmed pairing between one bank and one system transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRelation {
    pub bank_transaction_id: String,
    pub system_transaction_id: String,
    /// When the pairing was made
    pub matched_at: NaiveDateTime,
}

impl MatchRelation {
    /// Create a relation stamped with the current time
    pub fn new(bank_transaction_id: String, system_transaction_id: String) -> Self {
        Self {
            bank_transaction_id,
            system_transaction_id,
            matched_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Matched/unmatched counts for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Bank transactions with an active match
    pub matched_count: usize,
    /// Bank transactions without a match
    pub unmatched_count: usize,
    /// System transactions without a match
    pub unmatched_system_count: usize,
}

impl MatchSummary {
    /// Total number of bank transactions in the session
    pub fn total(&self) -> usize {
        self.matched_count + self.unmatched_count
    }

    /// Whether every bank transaction is matched
    pub fn is_complete(&self) -> bool {
        self.unmatched_count == 0
    }
}

/// Lifecycle status of a persisted reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    InProgress,
    Completed,
}

/// Historical reconciliation record created by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub id: String,
    pub company_id: String,
    pub account_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub opening_balance: Option<BigDecimal>,
    pub closing_balance: Option<BigDecimal>,
    pub status: ReconciliationStatus,
    pub matched_count: usize,
    pub unmatched_count: usize,
    pub matches: Vec<MatchRelation>,
    pub completed_at: Option<NaiveDateTime>,
}

impl Reconciliation {
    /// Whether this record's period shares at least one day with the given range
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.period_start <= end && start <= self.period_end
    }
}

/// Everything the backend needs to persist a finished session in one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub company_id: String,
    pub account_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub opening_balance: Option<BigDecimal>,
    pub closing_balance: Option<BigDecimal>,
    pub bank_transactions: Vec<BankTransaction>,
    pub system_transactions: Vec<SystemTransaction>,
    pub matches: Vec<MatchRelation>,
    pub summary: MatchSummary,
}

/// Outcome of a successful completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Record created by the backend
    pub reconciliation: Reconciliation,
    /// Counts at the moment of completion
    pub summary: MatchSummary,
}

/// Parsed statement plus the ledger candidates for the same account and period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementImport {
    pub bank_transactions: Vec<BankTransaction>,
    pub system_transactions: Vec<SystemTransaction>,
}

/// Read-only candidate list for one unmatched bank transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub bank_transaction_id: String,
    pub candidate_ids: Vec<String>,
}

/// Steps of the reconciliation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationPhase {
    SelectingAccount,
    ImportingStatement,
    Matching,
    Completed,
}

impl fmt::Display for ReconciliationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconciliationPhase::SelectingAccount => "selecting account",
            ReconciliationPhase::ImportingStatement => "importing statement",
            ReconciliationPhase::Matching => "matching",
            ReconciliationPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during reconciliation
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Reconciliation incomplete: {unmatched} bank transaction(s) remain unmatched")]
    IncompleteReconciliation { unmatched: usize },
    #[error("Invalid state: expected {expected}, workflow is {actual}")]
    InvalidState {
        expected: ReconciliationPhase,
        actual: ReconciliationPhase,
    },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for reconciliation operations
pub type ReconciliationResult<T> = Result<T, ReconciliationError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_signed_amounts_agree_across_sides() {
        let bank = BankTransaction::debit(
            "b1".to_string(),
            date(2024, 1, 15),
            "Rent".to_string(),
            BigDecimal::from(500),
        );
        let system = SystemTransaction::new(
            "s1".to_string(),
            date(2024, 1, 15),
            "Rent January".to_string(),
            BigDecimal::from(500),
            EntryType::Debit,
        );

        assert_eq!(bank.signed_amount(), BigDecimal::from(-500));
        assert_eq!(system.signed_amount(), BigDecimal::from(-500));
        assert_eq!(bank.entry_type(), EntryType::Debit);
    }

    #[test]
    fn test_system_amount_sign_comes_from_type() {
        let system = SystemTransaction::new(
            "s1".to_string(),
            date(2024, 1, 15),
            "Refund".to_string(),
            BigDecimal::from(-75),
            EntryType::Credit,
        );
        assert_eq!(system.signed_amount(), BigDecimal::from(75));
        assert_eq!(EntryType::Credit.opposite(), EntryType::Debit);
    }

    #[test]
    fn test_system_transaction_deserializes_type_field() {
        let json = r#"{
            "id": "s1",
            "date": "2024-01-15",
            "description": "Supplier payment",
            "amount": "500",
            "type": "debit"
        }"#;
        let txn: SystemTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(txn.transaction_type, EntryType::Debit);
        assert!(!txn.matched);
        assert_eq!(txn.reference, None);
    }

    #[test]
    fn test_reconciliation_period_overlap() {
        let record = Reconciliation {
            id: "r1".to_string(),
            company_id: "acme".to_string(),
            account_id: "hdfc-current".to_string(),
            period_start: date(2024, 1, 1),
            period_end: date(2024, 1, 31),
            opening_balance: None,
            closing_balance: None,
            status: ReconciliationStatus::Completed,
            matched_count: 0,
            unmatched_count: 0,
            matches: Vec::new(),
            completed_at: None,
        };

        assert!(record.overlaps(date(2024, 1, 31), date(2024, 2, 28)));
        assert!(!record.overlaps(date(2024, 2, 1), date(2024, 2, 28)));
    }

    #[test]
    fn test_invalid_state_message_names_phases() {
        let err = ReconciliationError::InvalidState {
            expected: ReconciliationPhase::Matching,
            actual: ReconciliationPhase::SelectingAccount,
        };
        assert_eq!(
            err.to_string(),
            "Invalid state: expected matching, workflow is selecting account"
        );
    }
}
