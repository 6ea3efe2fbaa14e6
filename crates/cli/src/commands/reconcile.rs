//! Reconcile CLI command.
//!
//! Replays the execution journal and lists every group that never recorded
//! completion, with the legs whose broker outcome is unknown. Those legs
//! must be checked against the broker's order book by hand.

use anyhow::{Context, Result};
use clap::Args;
use optdesk_core::AppConfig;
use optdesk_execution::{ExecutionJournal, FileJournal, JournaledGroup};
use std::path::PathBuf;

/// Arguments for the reconcile command.
#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    /// Journal file (defaults to `journal.path` from the config)
    #[arg(long)]
    pub journal: Option<PathBuf>,
}

/// Runs the reconcile command.
///
/// # Errors
/// Returns an error if the journal cannot be read or is corrupt.
pub fn run_reconcile(args: ReconcileArgs, config: &AppConfig) -> Result<()> {
    let path = args.journal.unwrap_or_else(|| config.journal.path.clone());
    if !path.exists() {
        println!("No journal at {}", path.display());
        return Ok(());
    }

    let journal = FileJournal::open(&path)
        .with_context(|| format!("opening journal {}", path.display()))?;
    let groups = journal.groups().context("replaying journal")?;
    let incomplete: Vec<&JournaledGroup> = groups.iter().filter(|g| !g.is_complete()).collect();

    tracing::info!(
        path = %path.display(),
        groups = groups.len(),
        incomplete = incomplete.len(),
        "journal replayed"
    );

    println!();
    println!("{}", "=".repeat(100));
    println!("RECONCILIATION REPORT: {}", path.display());
    println!("{}", "=".repeat(100));
    println!(
        "{} group(s) journaled, {} incomplete",
        groups.len(),
        incomplete.len()
    );

    for group in incomplete {
        println!();
        for line in describe(group) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Human-readable lines for one incomplete group.
fn describe(group: &JournaledGroup) -> Vec<String> {
    let intent = &group.intent;
    let mut lines = vec![format!(
        "{} {} strategy={} priority={:?} started={}",
        intent.group_id,
        intent.phase,
        intent.strategy_id,
        intent.priority,
        intent.created_at.format("%Y-%m-%d %H:%M:%S"),
    )];
    lines.extend(group.outcomes.iter().map(|leg| {
        format!(
            "  leg {} {} {} {} -> {:?}{}",
            leg.leg_index,
            leg.side,
            leg.quantity,
            leg.trading_symbol,
            leg.status,
            leg.broker_order_id
                .as_deref()
                .map(|id| format!(" ({id})"))
                .unwrap_or_default(),
        )
    }));
    lines.extend(group.unresolved_legs().into_iter().map(|i| {
        let order = &intent.legs[i];
        format!(
            "  leg {i} {} {} {} -> UNKNOWN",
            order.side, order.quantity, order.trading_symbol
        )
    }));
    lines
}
