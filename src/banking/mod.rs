//! Banking — the demo tool collaborator.
//!
//! An in-memory [`Ledger`] with fuzzy account matching and staged
//! transfers, and the tools that expose it to the model. Committing a
//! transfer is a user action on the ledger, not a tool.

pub mod errors;
pub mod ledger;
pub mod tools;

// Re-exports for convenience
pub use errors::LedgerError;
pub use ledger::{format_money, Account, AccountKind, Ledger, TransferProposal, TransferStatus};
pub use tools::banking_tools;
