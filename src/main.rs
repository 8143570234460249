//! finchat — interactive command-line front end.
//!
//! Wires the banking ledger, tool registry, model gateway and event log
//! into one orchestrator, then runs a line-oriented REPL. Transfers the
//! assistant stages are committed only through `/confirm`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use finchat::agent_core::{AgentError, EventLog, Orchestrator, OrchestratorConfig};
use finchat::banking::{banking_tools, format_money, Ledger, TransferProposal};
use finchat::inference::config::{find_config_path, load_config};
use finchat::inference::{build_gateway, GatewayConfig, InferenceError};
use finchat::tools::ToolRegistry;
use finchat::LogOutput;

/// CLI arguments for finchat
#[derive(Parser, Debug)]
#[command(name = "finchat")]
#[command(version, about = "Personal-finance assistant with user-confirmed transfers")]
#[command(long_about = r#"
finchat answers questions about your accounts by calling local tools through a
language model. Transfers the assistant prepares are only staged; nothing moves
until you run /confirm <id>.

Configuration is loaded from (in priority order):
1. --config <path>
2. $FINCHAT_CONFIG
3. finchat.yaml in the current directory or any parent

REPL commands:
  /pending          list staged transfers
  /confirm <id>     commit a staged transfer
  /cancel <id>      discard a staged transfer
  /events           show the tool invocation log
  /reset            start a new conversation
  /quit             exit
"#)]
struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Short-circuit model calls to a canned reply (no API key needed)
    #[arg(long)]
    mock: bool,

    /// Write logs to stderr instead of the rotated log file
    #[arg(long)]
    log_stderr: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = if cli.log_stderr {
        LogOutput::Stderr
    } else {
        LogOutput::File
    };
    let log_path = finchat::init_tracing(output).context("failed to initialize logging")?;

    let config = load_gateway_config(&cli)?;

    let ledger = Arc::new(Ledger::demo());
    let registry = Arc::new(ToolRegistry::new());
    let tool_count = registry
        .register(banking_tools(ledger.clone()))
        .context("failed to register banking tools")?;

    let gateway = match build_gateway(&config) {
        Ok(gateway) => gateway,
        Err(InferenceError::MissingCredential) => {
            anyhow::bail!(
                "no API key configured. Set api_key in finchat.yaml or FINCHAT_API_KEY, \
                 or run with --mock"
            );
        }
        Err(e) => return Err(e).context("invalid gateway configuration"),
    };

    let event_log_path = config.event_log_path.as_deref().unwrap_or(":memory:");
    let event_log = Arc::new(
        EventLog::open(event_log_path)
            .with_context(|| format!("failed to open event log at {event_log_path}"))?,
    );

    tracing::info!(
        gateway = gateway.name(),
        model = %config.model,
        tools = tool_count,
        event_log = %event_log_path,
        "finchat ready"
    );

    let orchestrator = Orchestrator::new(
        registry,
        gateway,
        OrchestratorConfig {
            max_tool_rounds: config.max_tool_rounds,
            ..OrchestratorConfig::default()
        },
    )
    .with_event_log(event_log);

    println!("finchat {}, type /help for commands.", env!("CARGO_PKG_VERSION"));
    if config.development_mock_mode {
        println!("(mock mode: replies are canned, no model is called)");
    }
    if let Some(path) = log_path {
        println!("logs: {}", path.display());
    }

    repl(&orchestrator, &ledger).await
}

/// Locate, load and validate configuration.
///
/// A missing file is fine: defaults plus environment overrides apply, and
/// `build_gateway` reports a missing key.
fn load_gateway_config(cli: &Cli) -> Result<GatewayConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => find_config_path(&std::env::current_dir()?).ok(),
    };

    let mut config = match &path {
        Some(path) => {
            load_config(path).with_context(|| format!("failed to load {}", path.display()))?
        }
        None => {
            tracing::info!("no finchat.yaml found; using defaults");
            GatewayConfig::default()
        }
    };

    config.apply_env_overrides();
    if cli.mock {
        config.development_mock_mode = true;
    }
    Ok(config)
}

// ─── REPL ────────────────────────────────────────────────────────────────────

async fn repl(orchestrator: &Orchestrator, ledger: &Ledger) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nyou> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if !run_command(command, orchestrator, ledger)? {
                break;
            }
            continue;
        }

        chat(orchestrator, input).await;
        print_new_proposals(ledger);
    }

    tracing::info!("finchat exiting");
    Ok(())
}

/// Submit one message; Ctrl-C abandons the exchange.
async fn chat(orchestrator: &Orchestrator, input: &str) {
    let cancel = CancellationToken::new();
    let exchange = orchestrator.submit_with_cancel(input, cancel.clone());
    tokio::pin!(exchange);

    let result = tokio::select! {
        result = &mut exchange => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            exchange.await
        }
    };

    match result {
        Ok(outcome) => match outcome.display_text() {
            Some(text) => println!("\nfinchat> {text}"),
            None => println!("\n(cancelled)"),
        },
        Err(AgentError::ExchangeInProgress) => println!("\n(still working on the last message)"),
        Err(e) => println!("\n(error: {e})"),
    }
}

/// Returns `false` when the REPL should exit.
fn run_command(command: &str, orchestrator: &Orchestrator, ledger: &Ledger) -> Result<bool> {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    match (name, arg) {
        ("quit" | "exit", _) => return Ok(false),
        ("help", _) => {
            println!("/pending | /confirm <id> | /cancel <id> | /events | /reset | /quit");
        }
        ("pending", _) => {
            let pending = ledger.pending_transfers();
            if pending.is_empty() {
                println!("no staged transfers");
            }
            for proposal in &pending {
                println!("{}", describe_proposal(proposal));
            }
        }
        ("confirm", Some(id)) => match ledger.confirm_transfer(id) {
            Ok(proposal) => {
                println!("confirmed: {}", describe_proposal(&proposal));
                for account in ledger.accounts() {
                    if account.id == proposal.from_account_id || account.id == proposal.to_account_id {
                        println!("  {}: {}", account.name, format_money(account.balance_cents));
                    }
                }
            }
            Err(e) => println!("cannot confirm: {e}"),
        },
        ("cancel", Some(id)) => match ledger.cancel_transfer(id) {
            Ok(proposal) => println!("cancelled: {}", describe_proposal(&proposal)),
            Err(e) => println!("cannot cancel: {e}"),
        },
        ("confirm" | "cancel", None) => println!("usage: /{name} <transfer id>"),
        ("events", _) => print_events(orchestrator)?,
        ("reset", _) => match orchestrator.reset() {
            Ok(()) => println!("conversation cleared"),
            Err(e) => println!("cannot reset: {e}"),
        },
        _ => println!("unknown command '/{name}' (try /help)"),
    }
    Ok(true)
}

fn print_events(orchestrator: &Orchestrator) -> Result<()> {
    let Some(log) = orchestrator.event_log() else {
        println!("event log disabled");
        return Ok(());
    };

    let invocations = log.tool_invocations(None)?;
    if invocations.is_empty() {
        println!("no tool invocations yet");
    }
    for entry in invocations {
        println!(
            "{} {:<22} {:<17} {:>5}ms {}",
            entry.timestamp,
            entry.tool_name,
            entry.status.as_str(),
            entry.duration_ms,
            entry.arguments
        );
    }
    println!("({} events total)", log.count()?);
    Ok(())
}

fn describe_proposal(proposal: &TransferProposal) -> String {
    let memo = proposal
        .memo
        .as_ref()
        .map(|m| format!(" \"{m}\""))
        .unwrap_or_default();
    format!(
        "[{}] {} from {} to {}{} ({})",
        proposal.id,
        format_money(proposal.amount_cents),
        proposal.from_account_name,
        proposal.to_account_name,
        memo,
        proposal.status.as_str()
    )
}

/// Remind the user how to act on anything the assistant just staged.
fn print_new_proposals(ledger: &Ledger) {
    let pending = ledger.pending_transfers();
    if pending.is_empty() {
        return;
    }
    println!("\nstaged transfers awaiting your decision:");
    for proposal in &pending {
        println!("  {}", describe_proposal(proposal));
    }
    println!("use /confirm <id> or /cancel <id>");
}
