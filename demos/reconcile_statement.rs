//! Bank statement reconciliation example

use reconciliation_core::utils::MemoryStorage;
use reconciliation_core::{
    EntryType, ReconciliationConfig, ReconciliationWorkflow, StatementFile, SystemTransaction,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const STATEMENT: &str = "\
Date,Description,Reference,Debit,Credit,Balance
2024-01-05,Opening deposit,DEP-1,,50000.00,50000.00
2024-01-10,Customer payment INV-101,NEFT-2231,,11800.00,61800.00
2024-01-15,Office rent,CHQ-1001,8000.00,,53800.00
2024-01-15,Courier charges,UPI-77,8000.00,,45800.00
2024-01-31,Bank charges,,118.00,,45682.00
";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🏦 Reconciliation Core - Bank Statement Example\n");

    // Ledger postings the accounting system already has for the account
    let storage = MemoryStorage::new();
    storage.add_system_transactions(
        "acme",
        "hdfc-current",
        vec![
            SystemTransaction::new(
                "je-001".to_string(),
                NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                "Owner investment".to_string(),
                BigDecimal::from(50000),
                EntryType::Credit,
            ),
            SystemTransaction::new(
                "je-002".to_string(),
                NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                "Receipt against INV-101".to_string(),
                BigDecimal::from(11800),
                EntryType::Credit,
            ),
            SystemTransaction::new(
                "je-003".to_string(),
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                "Monthly rent".to_string(),
                BigDecimal::from(8000),
                EntryType::Debit,
            )
            .with_reference("CHQ-1001".to_string()),
            SystemTransaction::new(
                "je-004".to_string(),
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                "Courier and logistics".to_string(),
                BigDecimal::from_str("8000.00")?,
                EntryType::Debit,
            ),
        ],
    )?;

    let config = ReconciliationConfig::from_env()?;
    let mut workflow = ReconciliationWorkflow::with_config(storage, "acme".to_string(), config);

    // 1. Select the account
    workflow.select_account("hdfc-current".to_string())?;

    // 2. Import the statement
    println!("📥 Importing statement...");
    let summary = workflow.import_statement(&StatementFile::csv(STATEMENT)).await?;
    println!(
        "  ✓ {} bank lines, {} ledger candidates\n",
        summary.total(),
        summary.unmatched_system_count
    );

    // 3. Match
    println!("🔗 Matching transactions...");
    for relation in workflow.auto_match().await? {
        println!(
            "  ✓ Auto-matched {} ↔ {}",
            relation.bank_transaction_id, relation.system_transaction_id
        );
    }

    // The two 8,000 debits on the 15th are ambiguous; resolve them by reference
    let session = workflow.session().ok_or("no active session")?;
    let pending: Vec<(String, Option<String>)> = session
        .bank_transactions()
        .iter()
        .filter(|t| !t.matched)
        .map(|t| (t.id.clone(), t.reference.clone()))
        .collect();

    for (bank_id, reference) in pending {
        let candidates: Vec<(String, Option<String>)> = workflow
            .select_for_matching(&bank_id)?
            .iter()
            .map(|t| (t.id.clone(), t.reference.clone()))
            .collect();

        let chosen = candidates
            .iter()
            .find(|(_, r)| r.is_some() && *r == reference)
            .or_else(|| candidates.iter().find(|(_, r)| r.is_none()));

        match chosen {
            Some((system_id, _)) => {
                workflow.match_transactions(&bank_id, system_id).await?;
                println!("  ✓ Matched {} ↔ {}", bank_id, system_id);
            }
            None => println!("  ⚠ No candidate for {}", bank_id),
        }
    }

    let summary = workflow.summary()?;
    println!(
        "\n📊 Matched: {}  Unmatched: {}\n",
        summary.matched_count, summary.unmatched_count
    );

    // 4. Complete; bank charges are still unposted, so confirm a partial reconciliation
    let result = workflow.complete(true).await?;
    let record = &result.reconciliation;
    println!("✅ Reconciliation {} completed", record.id);
    println!("  Period:  {} to {}", record.period_start, record.period_end);
    if let Some(opening) = &record.opening_balance {
        println!("  Opening: ₹{}", opening);
    }
    if let Some(closing) = &record.closing_balance {
        println!("  Closing: ₹{}", closing);
    }

    let history = workflow.reconciliation_history("hdfc-current").await?;
    println!("\n🗂  {} reconciliation(s) on record", history.len());

    Ok(())
}
