//! Ledger error types.

use thiserror::Error;

/// Errors from account lookup, transfer staging and confirmation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// No account matched the identifier.
    #[error("no account matches '{identifier}'")]
    AccountNotFound { identifier: String },

    /// Several accounts matched equally well.
    #[error("'{identifier}' matches several accounts: {candidates}")]
    AmbiguousAccount {
        identifier: String,
        candidates: String,
    },

    /// Source and destination resolve to the same account.
    #[error("cannot transfer from an account to itself")]
    SameAccount,

    /// Amount is zero, negative, or not a number.
    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// The source account cannot cover the amount.
    #[error("insufficient funds in '{account}'")]
    InsufficientFunds { account: String },

    /// No staged transfer has this id.
    #[error("transfer '{id}' not found")]
    TransferNotFound { id: String },

    /// The transfer was already confirmed or cancelled.
    #[error("transfer '{id}' is already {status}")]
    TransferNotPending { id: String, status: String },
}
