//! # Reconciliation Core
//!
//! Bank reconciliation for a multi-tenant accounting system: import a bank
//! statement, match its lines against ledger transactions, and record the
//! completed reconciliation.
//!
//! ## Features
//!
//! - **Matching sessions**: one-to-one match relation between bank and system
//!   transactions with conflict detection and same-day/amount suggestions
//! - **Workflow**: select account, import statement, match, complete
//! - **Statement import**: CSV and JSON bank statements
//! - **Storage abstraction**: backend-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{BankTransaction, EntryType, ReconciliationSession, SystemTransaction};
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let mut session = ReconciliationSession::load_statement(
//!     "acme".to_string(),
//!     "hdfc-current".to_string(),
//!     vec![BankTransaction::debit("b1".to_string(), date, "Rent".to_string(), BigDecimal::from(500))],
//!     vec![SystemTransaction::new("s1".to_string(), date, "Rent".to_string(), BigDecimal::from(500), EntryType::Debit)],
//! )
//! .unwrap();
//!
//! let candidates = session.select_for_matching("b1").unwrap();
//! assert_eq!(candidates[0].id, "s1");
//!
//! session.match_transactions("b1", "s1").unwrap();
//! assert!(session.summary().is_complete());
//! ```

pub mod config;
pub mod import;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::ReconciliationConfig;
pub use import::{parse_statement, ImportError, StatementFile, StatementFormat};
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
