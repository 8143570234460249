//! In-memory ledger: accounts, transactions, and staged transfers.
//!
//! The model-facing tools only ever *stage* a transfer. The balance change
//! happens in [`Ledger::confirm_transfer`], which is called by the user
//! interface on an explicit user action and is never reachable as a tool.
//!
//! Amounts are held as integer cents.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::errors::LedgerError;
use crate::tools::registry::similarity;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Minimum fuzzy score for an account name match.
const MATCH_THRESHOLD: f64 = 0.6;

/// Words ignored when matching an account identifier ("my checking account").
const FILLER_WORDS: &[&str] = &["my", "the", "a", "an", "account", "accounts", "acct", "from", "to", "of"];

// ─── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Checking,
    Savings,
    Retirement,
    Brokerage,
    CreditCard,
}

impl AccountKind {
    pub fn label(&self) -> &'static str {
        match self {
            AccountKind::Checking => "checking",
            AccountKind::Savings => "savings",
            AccountKind::Retirement => "retirement",
            AccountKind::Brokerage => "brokerage",
            AccountKind::CreditCard => "credit card",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub kind: AccountKind,
    pub balance_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub description: String,
    /// Signed: negative is money leaving the account.
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

/// A staged transfer awaiting the user's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProposal {
    pub id: String,
    pub from_account_id: String,
    pub from_account_name: String,
    pub to_account_id: String,
    pub to_account_name: String,
    pub amount_cents: i64,
    pub memo: Option<String>,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
}

// ─── Ledger ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LedgerInner {
    accounts: Vec<Account>,
    /// Append order; the sequence number breaks same-day ties.
    transactions: Vec<Transaction>,
    transfers: Vec<TransferProposal>,
}

/// Shared account store. Wrap in `Arc` to hand to both tools and UI.
#[derive(Debug, Default)]
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    pub fn new(accounts: Vec<Account>, transactions: Vec<Transaction>) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                accounts,
                transactions,
                transfers: Vec::new(),
            }),
        }
    }

    /// Ledger seeded with the demo accounts and a short transaction history.
    pub fn demo() -> Self {
        let account = |id: &str, name: &str, kind, balance_cents| Account {
            id: id.into(),
            name: name.into(),
            kind,
            balance_cents,
        };
        let accounts = vec![
            account("chk-1001", "Everyday Checking", AccountKind::Checking, 482_315),
            account("sav-2001", "High-Yield Savings", AccountKind::Savings, 1_850_000),
            account("ira-3001", "Roth IRA", AccountKind::Retirement, 8_950_075),
            account("brk-4001", "Brokerage", AccountKind::Brokerage, 4_210_230),
            account("cc-5001", "Travel Credit Card", AccountKind::CreditCard, -124_040),
        ];

        let seed = [
            ("chk-1001", (2024, 6, 3), "Payroll deposit", 325_000),
            ("chk-1001", (2024, 6, 4), "Rent payment", -180_000),
            ("chk-1001", (2024, 6, 6), "Grocery Mart", -8_742),
            ("chk-1001", (2024, 6, 8), "City Utilities", -11_530),
            ("chk-1001", (2024, 6, 10), "Coffee House", -645),
            ("sav-2001", (2024, 5, 31), "Interest payment", 6_170),
            ("sav-2001", (2024, 6, 3), "Transfer from Everyday Checking", 50_000),
            ("ira-3001", (2024, 6, 1), "Annual contribution", 300_000),
            ("ira-3001", (2024, 6, 7), "Dividend reinvestment", 4_215),
            ("brk-4001", (2024, 6, 5), "Buy VTI x10", -254_310),
            ("brk-4001", (2024, 6, 9), "Dividend", 3_880),
            ("cc-5001", (2024, 6, 2), "Airline tickets", -64_520),
            ("cc-5001", (2024, 6, 7), "Hotel", -52_800),
            ("cc-5001", (2024, 6, 9), "Payment received", 40_000),
        ];
        let transactions = seed
            .iter()
            .enumerate()
            .map(|(i, (account_id, (y, m, d), description, amount_cents))| Transaction {
                id: format!("txn-{:04}", i + 1),
                account_id: (*account_id).into(),
                date: NaiveDate::from_ymd_opt(*y, *m, *d).unwrap_or_default(),
                description: (*description).into(),
                amount_cents: *amount_cents,
            })
            .collect();

        Self::new(accounts, transactions)
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Accounts ───────────────────────────────────────────────────────

    pub fn accounts(&self) -> Vec<Account> {
        self.lock().accounts.clone()
    }

    /// Resolve a free-text identifier to one account.
    pub fn find_account(&self, identifier: &str) -> Result<Account, LedgerError> {
        let inner = self.lock();
        resolve_account(&inner.accounts, identifier).cloned()
    }

    /// Most recent transactions first.
    pub fn recent_transactions(
        &self,
        identifier: &str,
        limit: usize,
    ) -> Result<(Account, Vec<Transaction>), LedgerError> {
        let inner = self.lock();
        let account = resolve_account(&inner.accounts, identifier)?.clone();

        let mut matching: Vec<(usize, &Transaction)> = inner
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, t)| t.account_id == account.id)
            .collect();
        matching.sort_by(|a, b| b.1.date.cmp(&a.1.date).then(b.0.cmp(&a.0)));

        let transactions = matching
            .into_iter()
            .take(limit)
            .map(|(_, t)| t.clone())
            .collect();
        Ok((account, transactions))
    }

    // ─── Transfers ──────────────────────────────────────────────────────

    /// Validate and stage a transfer. Balances are untouched.
    ///
    /// Each call creates a new independent proposal, even for identical
    /// arguments.
    pub fn stage_transfer(
        &self,
        from: &str,
        to: &str,
        amount_cents: i64,
        memo: Option<String>,
    ) -> Result<TransferProposal, LedgerError> {
        let mut inner = self.lock();
        let source = resolve_account(&inner.accounts, from)?.clone();
        let destination = resolve_account(&inner.accounts, to)?.clone();

        if source.id == destination.id {
            return Err(LedgerError::SameAccount);
        }
        if amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount {
                reason: "amount must be greater than zero".into(),
            });
        }
        if source.balance_cents < amount_cents {
            return Err(LedgerError::InsufficientFunds {
                account: source.name,
            });
        }

        let proposal = TransferProposal {
            id: format!("tr_{}", &Uuid::new_v4().simple().to_string()[..12]),
            from_account_id: source.id,
            from_account_name: source.name,
            to_account_id: destination.id,
            to_account_name: destination.name,
            amount_cents,
            memo: memo.filter(|m| !m.trim().is_empty()),
            status: TransferStatus::Pending,
            created_at: Utc::now(),
        };

        tracing::info!(
            transfer_id = %proposal.id,
            from = %proposal.from_account_id,
            to = %proposal.to_account_id,
            amount_cents,
            "transfer staged"
        );
        inner.transfers.push(proposal.clone());
        Ok(proposal)
    }

    pub fn transfer(&self, id: &str) -> Option<TransferProposal> {
        self.lock().transfers.iter().find(|t| t.id == id).cloned()
    }

    pub fn pending_transfers(&self) -> Vec<TransferProposal> {
        self.lock()
            .transfers
            .iter()
            .filter(|t| t.status == TransferStatus::Pending)
            .cloned()
            .collect()
    }

    /// Commit a staged transfer. The only operation that moves money.
    ///
    /// Funds are re-checked at commit time; a proposal commits at most once.
    pub fn confirm_transfer(&self, id: &str) -> Result<TransferProposal, LedgerError> {
        let mut inner = self.lock();
        let index = pending_index(&inner.transfers, id)?;
        let proposal = inner.transfers[index].clone();

        let from = account_index(&inner.accounts, &proposal.from_account_id)?;
        let to = account_index(&inner.accounts, &proposal.to_account_id)?;

        if inner.accounts[from].balance_cents < proposal.amount_cents {
            return Err(LedgerError::InsufficientFunds {
                account: proposal.from_account_name,
            });
        }

        inner.accounts[from].balance_cents -= proposal.amount_cents;
        inner.accounts[to].balance_cents += proposal.amount_cents;

        let today = Utc::now().date_naive();
        let suffix = proposal
            .memo
            .as_ref()
            .map(|m| format!(" ({m})"))
            .unwrap_or_default();
        let next_id = inner.transactions.len() + 1;
        inner.transactions.push(Transaction {
            id: format!("txn-{next_id:04}"),
            account_id: proposal.from_account_id.clone(),
            date: today,
            description: format!("Transfer to {}{suffix}", proposal.to_account_name),
            amount_cents: -proposal.amount_cents,
        });
        inner.transactions.push(Transaction {
            id: format!("txn-{:04}", next_id + 1),
            account_id: proposal.to_account_id.clone(),
            date: today,
            description: format!("Transfer from {}{suffix}", proposal.from_account_name),
            amount_cents: proposal.amount_cents,
        });

        inner.transfers[index].status = TransferStatus::Completed;
        tracing::info!(transfer_id = %id, amount_cents = proposal.amount_cents, "transfer confirmed");
        Ok(inner.transfers[index].clone())
    }

    /// Discard a staged transfer.
    pub fn cancel_transfer(&self, id: &str) -> Result<TransferProposal, LedgerError> {
        let mut inner = self.lock();
        let index = pending_index(&inner.transfers, id)?;
        inner.transfers[index].status = TransferStatus::Cancelled;
        tracing::info!(transfer_id = %id, "transfer cancelled");
        Ok(inner.transfers[index].clone())
    }
}

fn pending_index(transfers: &[TransferProposal], id: &str) -> Result<usize, LedgerError> {
    let index = transfers
        .iter()
        .position(|t| t.id == id)
        .ok_or_else(|| LedgerError::TransferNotFound { id: id.to_string() })?;
    let status = transfers[index].status;
    if status != TransferStatus::Pending {
        return Err(LedgerError::TransferNotPending {
            id: id.to_string(),
            status: status.as_str().to_string(),
        });
    }
    Ok(index)
}

fn account_index(accounts: &[Account], id: &str) -> Result<usize, LedgerError> {
    accounts
        .iter()
        .position(|a| a.id == id)
        .ok_or_else(|| LedgerError::AccountNotFound {
            identifier: id.to_string(),
        })
}

// ─── Fuzzy Matching ─────────────────────────────────────────────────────────

/// Match order: exact name/id (case-insensitive), then a unique substring
/// hit on name or kind, then the best token/edit-distance score.
fn resolve_account<'a>(accounts: &'a [Account], identifier: &str) -> Result<&'a Account, LedgerError> {
    let not_found = || LedgerError::AccountNotFound {
        identifier: identifier.to_string(),
    };
    let raw = identifier.trim().to_lowercase();
    let query = normalize_query(identifier);
    if raw.is_empty() {
        return Err(not_found());
    }

    if let Some(account) = accounts
        .iter()
        .find(|a| a.id.to_lowercase() == raw || normalize(&a.name) == normalize(&raw))
    {
        return Ok(account);
    }
    if query.is_empty() {
        return Err(not_found());
    }
    if let Some(account) = accounts.iter().find(|a| normalize(&a.name) == query) {
        return Ok(account);
    }

    let substring: Vec<&Account> = accounts
        .iter()
        .filter(|a| {
            let name = normalize(&a.name);
            name.contains(&query) || query.contains(&name) || a.kind.label().contains(&query)
        })
        .collect();
    match substring.as_slice() {
        [only] => return Ok(*only),
        [] => {}
        many => return Err(ambiguous(identifier, many)),
    }

    let mut scored: Vec<(f64, &Account)> = accounts
        .iter()
        .map(|a| (match_score(&query, &normalize(&a.name)), a))
        .filter(|(score, _)| *score >= MATCH_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    match scored.as_slice() {
        [] => Err(not_found()),
        [(best, account), (second, _), ..] if (best - second).abs() < f64::EPSILON => {
            let tied: Vec<&Account> = scored
                .iter()
                .filter(|(s, _)| (best - s).abs() < f64::EPSILON)
                .map(|(_, a)| *a)
                .collect();
            tracing::debug!(identifier, best = %account.name, "tied account match");
            Err(ambiguous(identifier, &tied))
        }
        [(_, account), ..] => Ok(*account),
    }
}

fn ambiguous(identifier: &str, candidates: &[&Account]) -> LedgerError {
    LedgerError::AmbiguousAccount {
        identifier: identifier.to_string(),
        candidates: candidates
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Lowercase, punctuation to spaces, single-spaced.
fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `normalize` with filler words removed.
fn normalize_query(s: &str) -> String {
    normalize(s)
        .split(' ')
        .filter(|w| !w.is_empty() && !FILLER_WORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best of whole-string similarity and the mean per-token best similarity.
fn match_score(query: &str, name: &str) -> f64 {
    let whole = similarity(query, name);

    let name_tokens: Vec<&str> = name.split(' ').collect();
    let query_tokens: Vec<&str> = query.split(' ').collect();
    let token_mean = query_tokens
        .iter()
        .map(|q| {
            name_tokens
                .iter()
                .map(|n| similarity(q, n))
                .fold(0.0, f64::max)
        })
        .sum::<f64>()
        / query_tokens.len() as f64;

    whole.max(token_mean)
}

// ─── Money ──────────────────────────────────────────────────────────────────

/// Cents as a JSON-friendly decimal number (`8950075` → `89500.75`).
pub fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Human-readable dollars: `-124040` → `-$1,240.40`.
pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let dollars = (abs / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, c) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}${grouped}.{:02}", abs % 100)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
