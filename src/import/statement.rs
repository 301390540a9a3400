//! CSV and JSON bank statement parsing
//!
//! CSV statements carry the columns `Date, Description, Reference, Debit,
//! Credit, Balance` (header names are matched case-insensitively; Reference
//! and Balance may be omitted). JSON statements are an array of objects with
//! the same fields. Ids are generated for lines that do not carry one.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use crate::types::{BankTransaction, ReconciliationError};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

/// Supported statement file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementFormat {
    Csv,
    Json,
}

impl StatementFormat {
    /// Guess the format from a file name extension
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(StatementFormat::Csv),
            "json" => Some(StatementFormat::Json),
            _ => None,
        }
    }
}

/// Raw statement file as uploaded by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementFile {
    pub format: StatementFormat,
    pub contents: String,
}

impl StatementFile {
    pub fn csv(contents: impl Into<String>) -> Self {
        Self {
            format: StatementFormat::Csv,
            contents: contents.into(),
        }
    }

    pub fn json(contents: impl Into<String>) -> Self {
        Self {
            format: StatementFormat::Json,
            contents: contents.into(),
        }
    }
}

/// Errors that can occur while parsing a statement
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Statement file is empty")]
    Empty,
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Record {record}: {message}")]
    InvalidRecord { record: usize, message: String },
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ImportError> for ReconciliationError {
    fn from(err: ImportError) -> Self {
        ReconciliationError::Validation(err.to_string())
    }
}

/// Parse a statement file into bank transactions
pub fn parse_statement(file: &StatementFile) -> Result<Vec<BankTransaction>, ImportError> {
    let transactions = match file.format {
        StatementFormat::Csv => parse_csv_statement(&file.contents)?,
        StatementFormat::Json => parse_json_statement(&file.contents)?,
    };
    tracing::debug!(
        format = ?file.format,
        lines = transactions.len(),
        "Parsed bank statement"
    );
    Ok(transactions)
}

/// Column positions resolved from the CSV header
struct ColumnMap {
    date: usize,
    description: usize,
    reference: Option<usize>,
    debit: usize,
    credit: usize,
    balance: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ImportError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require =
            |name: &str| find(name).ok_or_else(|| ImportError::MissingColumn(name.to_string()));

        Ok(Self {
            date: require("Date")?,
            description: require("Description")?,
            reference: find("Reference"),
            debit: require("Debit")?,
            credit: require("Credit")?,
            balance: find("Balance"),
        })
    }
}

/// Parse a CSV statement
pub fn parse_csv_statement(contents: &str) -> Result<Vec<BankTransaction>, ImportError> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    if contents.trim().is_empty() {
        return Err(ImportError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let columns = ColumnMap::from_headers(reader.headers()?)?;
    let mut transactions = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // header is record 1
        let record_number = idx + 2;
        let record = result?;
        let field = |i: usize| record.get(i).unwrap_or("");
        let optional = |i: Option<usize>| {
            i.map(field)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let date = parse_date(field(columns.date), record_number)?;
        let debit = parse_amount(field(columns.debit), record_number, "Debit")?;
        let credit = parse_amount(field(columns.credit), record_number, "Credit")?;
        let running_balance = match optional(columns.balance) {
            Some(raw) => Some(parse_signed_amount(&raw, record_number, "Balance")?),
            None => None,
        };

        transactions.push(build_transaction(
            None,
            date,
            field(columns.description).to_string(),
            optional(columns.reference),
            debit,
            credit,
            running_balance,
            record_number,
        )?);
    }

    if transactions.is_empty() {
        return Err(ImportError::Empty);
    }

    Ok(transactions)
}

#[derive(Deserialize)]
struct JsonStatementLine {
    #[serde(default)]
    id: Option<String>,
    date: NaiveDate,
    description: String,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    debit: BigDecimal,
    #[serde(default, deserialize_with = "deserialize_amount")]
    credit: BigDecimal,
    #[serde(
        default,
        alias = "runningBalance",
        alias = "balance",
        deserialize_with = "deserialize_optional_amount"
    )]
    running_balance: Option<BigDecimal>,
}

fn deserialize_amount<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_amount(deserializer)?.unwrap_or_else(|| BigDecimal::from(0)))
}

/// Amounts may be JSON strings or numbers. Numbers are parsed from their
/// shortest decimal text, never through a binary float expansion.
fn deserialize_optional_amount<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(None),
        Value::Number(number) => number.to_string(),
        Value::String(text) if text.trim().is_empty() => return Ok(None),
        Value::String(text) => text.trim().replace(',', ""),
        other => {
            return Err(de::Error::custom(format!(
                "expected a decimal amount, got {}",
                other
            )))
        }
    };

    BigDecimal::from_str(&raw)
        .map(Some)
        .map_err(|e| de::Error::custom(format!("invalid amount '{}': {}", raw, e)))
}

/// Parse a JSON statement (an array of line objects)
pub fn parse_json_statement(contents: &str) -> Result<Vec<BankTransaction>, ImportError> {
    if contents.trim().is_empty() {
        return Err(ImportError::Empty);
    }

    let lines: Vec<JsonStatementLine> = serde_json::from_str(contents)?;
    if lines.is_empty() {
        return Err(ImportError::Empty);
    }

    lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            let record_number = idx + 1;
            ensure_not_negative(&line.debit, record_number, "Debit")?;
            ensure_not_negative(&line.credit, record_number, "Credit")?;
            build_transaction(
                line.id.filter(|id| !id.trim().is_empty()),
                line.date,
                line.description,
                line.reference.filter(|r| !r.trim().is_empty()),
                line.debit,
                line.credit,
                line.running_balance,
                record_number,
            )
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn build_transaction(
    id: Option<String>,
    date: NaiveDate,
    description: String,
    reference: Option<String>,
    debit: BigDecimal,
    credit: BigDecimal,
    running_balance: Option<BigDecimal>,
    record: usize,
) -> Result<BankTransaction, ImportError> {
    let zero = BigDecimal::from(0);
    if debit > zero && credit > zero {
        return Err(ImportError::InvalidRecord {
            record,
            message: "a line cannot carry both a debit and a credit".to_string(),
        });
    }

    let mut txn = BankTransaction::new(
        id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        date,
        description,
        reference,
    );
    txn.debit = debit;
    txn.credit = credit;
    txn.running_balance = running_balance;
    Ok(txn)
}

fn parse_date(raw: &str, record: usize) -> Result<NaiveDate, ImportError> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .ok_or_else(|| ImportError::InvalidRecord {
            record,
            message: format!("unrecognised date '{}'", raw),
        })
}

fn parse_signed_amount(raw: &str, record: usize, column: &str) -> Result<BigDecimal, ImportError> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Ok(BigDecimal::from(0));
    }
    BigDecimal::from_str(&cleaned).map_err(|_| ImportError::InvalidRecord {
        record,
        message: format!("{} '{}' is not a valid amount", column, raw),
    })
}

fn parse_amount(raw: &str, record: usize, column: &str) -> Result<BigDecimal, ImportError> {
    let amount = parse_signed_amount(raw, record, column)?;
    ensure_not_negative(&amount, record, column)?;
    Ok(amount)
}

fn ensure_not_negative(amount: &BigDecimal, record: usize, column: &str) -> Result<(), ImportError> {
    if *amount < BigDecimal::from(0) {
        return Err(ImportError::InvalidRecord {
            record,
            message: format!("{} amount cannot be negative", column),
        });
    }
    Ok(())
}
