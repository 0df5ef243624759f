// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

use crate::domain::{Address, TxId};

#[derive(Debug, Error)]
pub enum SeedError {
    /// Network failure or malformed input at submission time. Never retried.
    #[error("submission failed: {0}")]
    Submission(String),

    #[error("transaction {txid} rejected by ledger: {reason}")]
    Rejected { txid: TxId, reason: String },

    #[error("transaction {txid} not confirmed after {rounds} rounds")]
    ConfirmationTimeout { txid: TxId, rounds: u64 },

    #[error("cancelled while {context}")]
    Cancelled { context: String },

    #[error("tick {tick} outside supported range [{min}, {max}]")]
    InvalidTick { tick: i64, min: i64, max: i64 },

    #[error(
        "insufficient funds in {account}: holds {balance} of {asset}, needs at least {required}"
    )]
    InsufficientFunds {
        account: Address,
        asset: String,
        balance: u64,
        required: u64,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("transaction {txid} confirmed without {field}")]
    MissingField { txid: TxId, field: &'static str },

    #[error("illegal stage transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SeedError {
    fn from(e: reqwest::Error) -> Self {
        SeedError::Submission(e.to_string())
    }
}

impl From<serde_json::Error> for SeedError {
    fn from(e: serde_json::Error) -> Self {
        SeedError::Submission(format!("malformed payload: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, SeedError>;
