//! Model-facing banking tools.
//!
//! Read-only lookups plus `initiateFundTransfer`, which stages a proposal
//! and never moves money. Expected domain failures (no such account,
//! insufficient funds) come back as `{success: false, message}` so the
//! model can explain them; they are not executor errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::errors::LedgerError;
use super::ledger::{cents_to_amount, Account, Ledger, Transaction};
use crate::tools::{Tool, ToolDescriptor, ToolError, ToolResult};

/// Default and maximum row counts for `getRecentTransactions`.
const DEFAULT_TRANSACTION_LIMIT: usize = 5;
const MAX_TRANSACTION_LIMIT: usize = 50;

/// Shown to the model when either side of a transfer fails to resolve.
pub const ACCOUNTS_NOT_FOUND: &str = "Account(s) not found.";

/// Every banking tool, in the order they are offered to the model.
pub fn banking_tools(ledger: Arc<Ledger>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetAccountBalance {
            ledger: ledger.clone(),
        }),
        Arc::new(ListAccounts {
            ledger: ledger.clone(),
        }),
        Arc::new(GetRecentTransactions {
            ledger: ledger.clone(),
        }),
        Arc::new(InitiateFundTransfer { ledger }),
    ]
}

// ─── getAccountBalance ──────────────────────────────────────────────────────

pub struct GetAccountBalance {
    ledger: Arc<Ledger>,
}

#[async_trait]
impl Tool for GetAccountBalance {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "getAccountBalance",
            "Get the current balance of one of the user's accounts. The identifier may be \
             the account name or a loose description such as 'savings' or 'my IRA'.",
            json!({
                "type": "object",
                "properties": {
                    "accountIdentifier": {
                        "type": "string",
                        "description": "Account name or description"
                    }
                },
                "required": ["accountIdentifier"]
            }),
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let identifier = required_str(&args, "accountIdentifier")?;
        match self.ledger.find_account(identifier) {
            Ok(account) => Ok(ToolResult::ok(json!({
                "accountName": account.name,
                "accountType": account.kind.label(),
                "balance": cents_to_amount(account.balance_cents),
            }))),
            Err(e) => Ok(lookup_failure(&self.ledger, &e)),
        }
    }
}

// ─── listAccounts ───────────────────────────────────────────────────────────

pub struct ListAccounts {
    ledger: Arc<Ledger>,
}

#[async_trait]
impl Tool for ListAccounts {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "listAccounts",
            "List all of the user's accounts with their types and balances.",
            json!({"type": "object", "properties": {}}),
        )
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, ToolError> {
        let accounts = self.ledger.accounts();
        let net: i64 = accounts.iter().map(|a| a.balance_cents).sum();
        Ok(ToolResult::ok(json!({
            "accounts": accounts.iter().map(account_json).collect::<Vec<_>>(),
            "netWorth": cents_to_amount(net),
        })))
    }
}

// ─── getRecentTransactions ──────────────────────────────────────────────────

pub struct GetRecentTransactions {
    ledger: Arc<Ledger>,
}

#[async_trait]
impl Tool for GetRecentTransactions {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "getRecentTransactions",
            "Get the most recent transactions on one account, newest first.",
            json!({
                "type": "object",
                "properties": {
                    "accountIdentifier": {
                        "type": "string",
                        "description": "Account name or description"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "How many transactions to return (default 5, max 50)"
                    }
                },
                "required": ["accountIdentifier"]
            }),
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let identifier = required_str(&args, "accountIdentifier")?;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, MAX_TRANSACTION_LIMIT))
            .unwrap_or(DEFAULT_TRANSACTION_LIMIT);

        match self.ledger.recent_transactions(identifier, limit) {
            Ok((account, transactions)) => Ok(ToolResult::ok(json!({
                "accountName": account.name,
                "transactions": transactions.iter().map(transaction_json).collect::<Vec<_>>(),
            }))),
            Err(e) => Ok(lookup_failure(&self.ledger, &e)),
        }
    }
}

// ─── initiateFundTransfer ───────────────────────────────────────────────────

/// Stages a transfer for the user to confirm. Never commits.
pub struct InitiateFundTransfer {
    ledger: Arc<Ledger>,
}

#[async_trait]
impl Tool for InitiateFundTransfer {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "initiateFundTransfer",
            "Prepare a transfer between two of the user's accounts. This only stages the \
             transfer: nothing moves until the user confirms it themselves. Tell the user \
             what was prepared and that it awaits their confirmation.",
            json!({
                "type": "object",
                "properties": {
                    "fromAccount": {"type": "string", "description": "Source account"},
                    "toAccount": {"type": "string", "description": "Destination account"},
                    "amount": {
                        "type": ["number", "string"],
                        "description": "Amount in dollars, e.g. 250 or \"250.00\""
                    },
                    "memo": {"type": "string", "description": "Optional note"}
                },
                "required": ["fromAccount", "toAccount", "amount"]
            }),
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let from = required_str(&args, "fromAccount")?;
        let to = required_str(&args, "toAccount")?;
        let memo = args.get("memo").and_then(Value::as_str).map(str::to_string);

        let amount_cents = match parse_amount(&args["amount"]) {
            Ok(cents) => cents,
            Err(e) => return Ok(ToolResult::failure(capitalize(&e.to_string()))),
        };

        match self.ledger.stage_transfer(from, to, amount_cents, memo) {
            Ok(proposal) => Ok(ToolResult::ok(json!({
                "transferId": proposal.id,
                "requiresConfirmation": true,
                "status": proposal.status.as_str(),
                "fromAccount": proposal.from_account_name,
                "toAccount": proposal.to_account_name,
                "amount": cents_to_amount(proposal.amount_cents),
                "memo": proposal.memo,
                "message": "Transfer staged. It will not happen until the user confirms it.",
            }))),
            Err(LedgerError::AccountNotFound { .. } | LedgerError::AmbiguousAccount { .. }) => {
                Ok(ToolResult::failure(ACCOUNTS_NOT_FOUND))
            }
            Err(e) => Ok(ToolResult::failure(capitalize(&e.to_string()))),
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// A string argument the schema marks as required.
fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidInput {
            reason: format!("'{key}' must be a string"),
        })
}

/// Dollars as a number or a string like `"$1,250.50"` → cents.
pub fn parse_amount(value: &Value) -> Result<i64, LedgerError> {
    let invalid = |reason: &str| LedgerError::InvalidAmount {
        reason: reason.to_string(),
    };

    let dollars = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| invalid("not a number"))?,
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | ' '))
                .collect();
            cleaned
                .parse::<f64>()
                .map_err(|_| invalid("not a number"))?
        }
        _ => return Err(invalid("amount is required")),
    };

    if !dollars.is_finite() {
        return Err(invalid("not a number"));
    }
    if dollars <= 0.0 {
        return Err(invalid("amount must be greater than zero"));
    }
    if dollars > (i64::MAX / 100) as f64 {
        return Err(invalid("amount is too large"));
    }
    Ok((dollars * 100.0).round() as i64)
}

fn lookup_failure(ledger: &Ledger, error: &LedgerError) -> ToolResult {
    let available: Vec<String> = ledger.accounts().into_iter().map(|a| a.name).collect();
    ToolResult::failure_with(
        capitalize(&error.to_string()),
        json!({"availableAccounts": available}),
    )
}

fn account_json(account: &Account) -> Value {
    json!({
        "id": account.id,
        "name": account.name,
        "type": account.kind.label(),
        "balance": cents_to_amount(account.balance_cents),
    })
}

fn transaction_json(txn: &Transaction) -> Value {
    json!({
        "id": txn.id,
        "date": txn.date.to_string(),
        "description": txn.description,
        "amount": cents_to_amount(txn.amount_cents),
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
