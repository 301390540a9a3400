//! Candidate selection and match suggestions

use bigdecimal::BigDecimal;
use std::collections::HashMap;

use crate::config::ReconciliationConfig;
use crate::reconciliation::ReconciliationSession;
use crate::traits::*;
use crate::types::*;

/// Amount-and-date candidate filter.
///
/// A system transaction qualifies when its signed amount differs from the
/// bank line's by strictly less than `amount_tolerance` and its date lies
/// within `date_window_days` of the bank date. With the default window of
/// zero days only same-day postings qualify.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultCandidateMatcher {
    amount_tolerance: BigDecimal,
    date_window_days: u32,
}

impl DefaultCandidateMatcher {
    pub fn new(amount_tolerance: BigDecimal, date_window_days: u32) -> Self {
        Self {
            amount_tolerance,
            date_window_days,
        }
    }

    pub fn from_config(config: &ReconciliationConfig) -> Self {
        Self::new(config.amount_tolerance.clone(), config.date_window_days)
    }
}

impl Default for DefaultCandidateMatcher {
    fn default() -> Self {
        Self::from_config(&ReconciliationConfig::default())
    }
}

impl CandidateMatcher for DefaultCandidateMatcher {
    fn is_candidate(&self, bank: &BankTransaction, system: &SystemTransaction) -> bool {
        let days_apart = (bank.date - system.date).num_days().abs();
        if days_apart > i64::from(self.date_window_days) {
            return false;
        }

        let difference = (bank.signed_amount() - system.signed_amount()).abs();
        difference < self.amount_tolerance
    }
}

impl ReconciliationSession {
    /// Candidate lists for every unmatched bank transaction, in statement order
    pub fn suggest_matches(&self) -> Vec<MatchSuggestion> {
        self.unmatched_bank_transactions()
            .map(|bank| MatchSuggestion {
                bank_transaction_id: bank.id.clone(),
                candidate_ids: self
                    .candidates_for(bank)
                    .into_iter()
                    .map(|system| system.id.clone())
                    .collect(),
            })
            .collect()
    }

    /// Pairs that can be matched without a user decision.
    ///
    /// A pair qualifies when the bank transaction has exactly one candidate
    /// and that candidate is offered to no other unmatched bank transaction.
    pub fn unambiguous_matches(&self) -> Vec<(String, String)> {
        let suggestions = self.suggest_matches();

        let mut claims: HashMap<&str, usize> = HashMap::new();
        for suggestion in &suggestions {
            for candidate in &suggestion.candidate_ids {
                *claims.entry(candidate.as_str()).or_default() += 1;
            }
        }

        suggestions
            .iter()
            .filter_map(|suggestion| match suggestion.candidate_ids.as_slice() {
                [only] if claims.get(only.as_str()) == Some(&1) => {
                    Some((suggestion.bank_transaction_id.clone(), only.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Match every unambiguous pair and return the relations created
    pub fn auto_match(&mut self) -> Vec<MatchRelation> {
        let mut created = Vec::new();
        for (bank_id, system_id) in self.unambiguous_matches() {
            match self.check_match(&bank_id, &system_id) {
                Ok(relation) => {
                    self.link(relation.clone());
                    created.push(relation);
                }
                Err(err) => tracing::warn!(
                    bank_id = %bank_id,
                    system_id = %system_id,
                    error = %err,
                    "Skipping auto-match pair"
                ),
            }
        }
        tracing::info!(
            account_id = %self.account_id(),
            matched = created.len(),
            "Auto-matched unambiguous transactions"
        );
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bank_debit(id: &str, day: u32, amount: &str) -> BankTransaction {
        BankTransaction::debit(
            id.to_string(),
            date(day),
            "Payment".to_string(),
            BigDecimal::from_str(amount).unwrap(),
        )
    }

    fn system(id: &str, day: u32, amount: &str, entry_type: EntryType) -> SystemTransaction {
        SystemTransaction::new(
            id.to_string(),
            date(day),
            "Posting".to_string(),
            BigDecimal::from_str(amount).unwrap(),
            entry_type,
        )
    }

    #[test]
    fn test_default_matcher_requires_same_day_and_amount() {
        let matcher = DefaultCandidateMatcher::default();
        let bank = bank_debit("b1", 15, "500");

        assert!(matcher.is_candidate(&bank, &system("s1", 15, "500", EntryType::Debit)));
        assert!(!matcher.is_candidate(&bank, &system("s2", 16, "500", EntryType::Debit)));
        assert!(!matcher.is_candidate(&bank, &system("s3", 15, "500", EntryType::Credit)));
        assert!(!matcher.is_candidate(&bank, &system("s4", 15, "501", EntryType::Debit)));
    }

    #[test]
    fn test_default_matcher_tolerance_is_exclusive() {
        let matcher = DefaultCandidateMatcher::default();
        let bank = bank_debit("b1", 15, "100.00");

        assert!(matcher.is_candidate(&bank, &system("s1", 15, "100.005", EntryType::Debit)));
        assert!(!matcher.is_candidate(&bank, &system("s2", 15, "100.01", EntryType::Debit)));
    }

    #[test]
    fn test_date_window_matcher() {
        let matcher = DefaultCandidateMatcher::new(BigDecimal::from_str("0.01").unwrap(), 2);
        let bank = bank_debit("b1", 15, "80");

        assert!(matcher.is_candidate(&bank, &system("s1", 13, "80", EntryType::Debit)));
        assert!(matcher.is_candidate(&bank, &system("s2", 17, "80", EntryType::Debit)));
        assert!(!matcher.is_candidate(&bank, &system("s3", 18, "80", EntryType::Debit)));
    }

    fn session(bank: Vec<BankTransaction>, system: Vec<SystemTransaction>) -> ReconciliationSession {
        ReconciliationSession::load_statement("acme".to_string(), "acct-1".to_string(), bank, system)
            .unwrap()
    }

    #[test]
    fn test_suggest_matches_lists_every_unmatched_bank_line() {
        let s = session(
            vec![bank_debit("b1", 15, "500"), bank_debit("b2", 20, "75")],
            vec![
                system("s1", 15, "500", EntryType::Debit),
                system("s2", 15, "500", EntryType::Debit),
            ],
        );

        let suggestions = s.suggest_matches();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].bank_transaction_id, "b1");
        assert_eq!(suggestions[0].candidate_ids, vec!["s1", "s2"]);
        assert!(suggestions[1].candidate_ids.is_empty());
    }

    #[test]
    fn test_auto_match_skips_ambiguous_pairs() {
        let mut s = session(
            vec![
                bank_debit("b1", 15, "500"),
                bank_debit("b2", 15, "500"),
                bank_debit("b3", 16, "42"),
            ],
            vec![
                system("s1", 15, "500", EntryType::Debit),
                system("s2", 16, "42", EntryType::Debit),
            ],
        );

        let created = s.auto_match();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].bank_transaction_id, "b3");
        assert_eq!(created[0].system_transaction_id, "s2");

        let summary = s.summary();
        assert_eq!(summary.matched_count, 1);
        assert_eq!(summary.unmatched_count, 2);
    }

    #[test]
    fn test_auto_match_respects_manual_matches_and_links_both_sides() {
        let mut s = session(
            vec![bank_debit("b1", 15, "500"), bank_debit("b2", 16, "42")],
            vec![
                system("s1", 15, "500", EntryType::Debit),
                system("s2", 15, "500", EntryType::Debit),
                system("s3", 16, "42", EntryType::Debit),
            ],
        );
        s.match_transactions("b1", "s2").unwrap();

        let created = s.auto_match();
        assert_eq!(created.len(), 1);
        assert_eq!(s.match_for_bank("b1").unwrap().system_transaction_id, "s2");
        assert_eq!(s.match_for_bank("b2"), Some(&created[0]));
        assert!(s.bank_transaction("b2").unwrap().matched);
        assert!(s.system_transaction("s3").unwrap().matched);
        assert!(!s.system_transaction("s1").unwrap().matched);

        // a second pass finds nothing new
        assert!(s.auto_match().is_empty());
        assert_eq!(s.summary().matched_count, 2);
    }

    #[test]
    fn test_auto_match_with_nothing_to_do() {
        let mut s = session(
            vec![bank_debit("b1", 15, "500")],
            vec![system("s1", 20, "500", EntryType::Debit)],
        );
        assert!(s.auto_match().is_empty());
        assert!(s.unambiguous_matches().is_empty());
    }
}
