//! `lflow submit`: run an invoice file through the workflow in-process.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use ledgerflow_core::workflow::RunOutcome;
use ledgerflow_types::checkpoint::ThreadStatus;
use ledgerflow_types::invoice::{InvoiceState, InvoiceSubmission};

use crate::cli::styled_status;
use crate::state::AppState;

pub async fn submit(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let submission: InvoiceSubmission = serde_json::from_str(&content)
        .with_context(|| format!("Invalid invoice payload in {}", file.display()))?;
    submission.validate()?;

    let outcome = state
        .workflow_service
        .run_to_pause(InvoiceState::from_submission(submission))
        .await?;

    let ticket = if outcome.status == ThreadStatus::Paused {
        state
            .workflow_service
            .list_pending_reviews()
            .await?
            .into_iter()
            .find(|t| t.thread_id == outcome.thread_id)
    } else {
        None
    };

    if json {
        let out = serde_json::json!({
            "thread_id": outcome.thread_id,
            "status": outcome.status,
            "step": outcome.step,
            "next_node": outcome.next_node,
            "error": outcome.error,
            "state": outcome.state,
            "ticket": ticket,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_outcome(&outcome);
    if let Some(ticket) = ticket {
        println!(
            "  Review:  {} {}",
            style(&ticket.ticket_id).yellow().bold(),
            style(&ticket.context.locator).dim()
        );
        println!("  Reason:  {}", ticket.context.reason);
    }
    println!();
    Ok(())
}

/// Summary lines shared by `submit` and `decide`.
pub(crate) fn print_outcome(outcome: &RunOutcome<InvoiceState>) {
    let s = &outcome.state;
    println!();
    println!(
        "  {} Invoice {} is {}",
        style("*").green().bold(),
        style(s.invoice_id()).cyan(),
        styled_status(outcome.status)
    );
    println!("  Thread:  {}", outcome.thread_id);
    println!("  Step:    {} (next: {})", outcome.step, outcome.next_node);
    if let Some(stage) = &s.stage {
        println!("  Stage:   {stage}");
    }
    if let Some(score) = s.match_score {
        println!("  Match:   {score:.2}");
    }
    if let Some(txn) = &s.erp_txn_id {
        println!("  ERP txn: {txn}");
    }
    if let Some(payment) = &s.payment_id {
        println!("  Payment: {payment}");
    }
    if let Some(err) = &outcome.error {
        println!("  Error:   {}", style(err).red());
    }
}
