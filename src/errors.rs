use ethers::providers::Middleware;
use ethers::types::{Address, H256, U256};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientField {
    Address,
    Amount,
}

impl fmt::Display for RecipientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientField::Address => write!(f, "address"),
            RecipientField::Amount => write!(f, "amount"),
        }
    }
}

/// Errors raised while turning raw user input into a `BatchRequest`.
/// Rows are 1-indexed to match what the user typed or pasted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchInputError {
    #[error("No recipients found in input")]
    EmptyInput,

    #[error("Row {row}: expected `address,amount`")]
    MalformedLine { row: usize },

    #[error("Row {row}: {field} is required")]
    MissingField { row: usize, field: RecipientField },

    #[error("Row {row}: invalid address")]
    InvalidAddress { row: usize },

    #[error("Row {row}: amount must be a decimal number greater than 0")]
    InvalidAmount { row: usize },

    #[error("Batch total overflows 256 bits")]
    TotalOverflow,
}

/// Failures of a single submission attempt. None of these are retried
/// here; the caller decides whether to fix input, resubmit or abandon.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    #[error("Insufficient balance: have {balance} wei, need {required} wei (transfer + gas reserve)")]
    InsufficientBalance { balance: U256, required: U256 },

    #[error("Insufficient token balance: have {balance}, need {required}")]
    InsufficientTokenBalance { balance: U256, required: U256 },

    #[error("Smart account {0:?} has no bytecode on-chain; deploy it first")]
    AccountNotDeployed(Address),

    #[error("Bundler rejected the user operation: {0}")]
    Submission(String),

    #[error("User operation was included but reverted on-chain, tx {0:?}")]
    Reverted(H256),

    #[error("No terminal receipt within {0}s")]
    ReceiptTimeout(u64),
}

#[derive(Debug, Error)]
pub enum OrchestratorError<M: Middleware> {
    #[error("Middleware error: {0}")]
    MiddlewareError(M::Error),

    #[error("Pre-verification gas not enough: calculated: {0}, provided: {1}")]
    PreVerificationGasError(u64, u64),

    #[error("Call gas limit not enough: calculated: {0}, provided: {1}")]
    CallGasLimitError(u64, u64),

    #[error("Verification gas limit not enough")]
    VerificationGasLimitError,
}
