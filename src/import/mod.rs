//! Statement import: turns raw bank statement files into bank transactions

pub mod statement;

pub use statement::*;
