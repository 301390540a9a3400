//! Validation utilities

use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an account ID is valid
pub fn validate_account_id(account_id: &str) -> ReconciliationResult<()> {
    validate_identifier("Account ID", account_id)
}

/// Validate that a transaction ID is valid
pub fn validate_transaction_id(transaction_id: &str) -> ReconciliationResult<()> {
    validate_identifier("Transaction ID", transaction_id)
}

fn validate_identifier(label: &str, value: &str) -> ReconciliationResult<()> {
    if value.trim().is_empty() {
        return Err(ReconciliationError::Validation(format!(
            "{} cannot be empty",
            label
        )));
    }

    if value.len() > 64 {
        return Err(ReconciliationError::Validation(format!(
            "{} cannot exceed 64 characters",
            label
        )));
    }

    // Alphanumeric plus dashes and underscores; uuids pass
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ReconciliationError::Validation(format!(
            "{} can only contain alphanumeric characters, dashes, and underscores",
            label
        )));
    }

    Ok(())
}

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> ReconciliationResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(ReconciliationError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate the amount columns of a bank statement line
pub fn validate_bank_amounts(transaction: &BankTransaction) -> ReconciliationResult<()> {
    let zero = BigDecimal::from(0);

    if transaction.debit < zero || transaction.credit < zero {
        return Err(ReconciliationError::Validation(format!(
            "Bank transaction '{}' has a negative amount",
            transaction.id
        )));
    }

    match (transaction.debit > zero, transaction.credit > zero) {
        (true, true) => Err(ReconciliationError::Validation(format!(
            "Bank transaction '{}' cannot carry both a debit and a credit",
            transaction.id
        ))),
        (false, false) => Err(ReconciliationError::Validation(format!(
            "Bank transaction '{}' has no amount",
            transaction.id
        ))),
        _ => Ok(()),
    }
}

/// Enhanced statement validator with per-line checks
pub struct EnhancedStatementValidator;

impl StatementValidator for EnhancedStatementValidator {
    fn validate_statement(
        &self,
        bank_transactions: &[BankTransaction],
        system_transactions: &[SystemTransaction],
    ) -> ReconciliationResult<()> {
        // Basic validation
        DefaultStatementValidator.validate_statement(bank_transactions, system_transactions)?;

        for transaction in bank_transactions {
            validate_transaction_id(&transaction.id)?;
            validate_bank_amounts(transaction)?;
        }

        for transaction in system_transactions {
            validate_transaction_id(&transaction.id)?;
            validate_positive_amount(&transaction.amount.abs()).map_err(|_| {
                ReconciliationError::Validation(format!(
                    "System transaction '{}' has no amount",
                    transaction.id
                ))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bank(id: &str, debit: i64, credit: i64) -> BankTransaction {
        let mut txn = BankTransaction::new(
            id.to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            "Line".to_string(),
            None,
        );
        txn.debit = BigDecimal::from(debit);
        txn.credit = BigDecimal::from(credit);
        txn
    }

    fn system(id: &str, amount: i64) -> SystemTransaction {
        SystemTransaction::new(
            id.to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            "Posting".to_string(),
            BigDecimal::from(amount),
            EntryType::Debit,
        )
    }

    #[test]
    fn test_identifiers() {
        assert!(validate_account_id("hdfc-current_01").is_ok());
        assert!(validate_account_id("").is_err());
        assert!(validate_account_id("has space").is_err());
        assert!(validate_account_id(&"x".repeat(65)).is_err());
        assert!(validate_transaction_id("5f0c6a52-8a4e-4a8e-9d6f-0d1b2c3d4e5f").is_ok());
    }

    #[test]
    fn test_bank_amount_shape() {
        assert!(validate_bank_amounts(&bank("b1", 10, 0)).is_ok());
        assert!(validate_bank_amounts(&bank("b2", 0, 10)).is_ok());
        assert!(validate_bank_amounts(&bank("b3", 10, 10)).is_err());
        assert!(validate_bank_amounts(&bank("b4", 0, 0)).is_err());
        assert!(validate_bank_amounts(&bank("b5", -10, 0)).is_err());
    }

    #[test]
    fn test_enhanced_validator() {
        let validator = EnhancedStatementValidator;

        assert!(validator
            .validate_statement(&[bank("b1", 10, 0)], &[system("s1", 10)])
            .is_ok());
        assert!(validator
            .validate_statement(&[bank("b1", 10, 5)], &[system("s1", 10)])
            .is_err());
        assert!(validator
            .validate_statement(&[bank("b1", 10, 0)], &[system("s1", 0)])
            .is_err());
        assert!(validator
            .validate_statement(&[bank("bad id", 10, 0)], &[system("s1", 10)])
            .is_err());
        // still runs the basic checks
        assert!(validator
            .validate_statement(&[bank("b1", 10, 0)], &[])
            .is_err());
    }
}
