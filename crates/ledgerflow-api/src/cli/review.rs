//! `lflow reviews` and `lflow decide`.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use ledgerflow_types::review::Decision;

use crate::cli::invoice::print_outcome;
use crate::state::AppState;

pub async fn list_reviews(state: &AppState, json: bool) -> Result<()> {
    let tickets = state.workflow_service.list_pending_reviews().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tickets)?);
        return Ok(());
    }

    if tickets.is_empty() {
        println!();
        println!("  No invoices awaiting review.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Ticket").fg(Color::Cyan),
            Cell::new("Invoice"),
            Cell::new("Vendor"),
            Cell::new("Amount"),
            Cell::new("Reason"),
            Cell::new("Opened"),
        ]);

    for t in &tickets {
        table.add_row(vec![
            Cell::new(&t.ticket_id).fg(Color::Yellow),
            Cell::new(&t.context.business_id),
            Cell::new(&t.context.counterparty),
            Cell::new(format!("{:.2}", t.context.amount)),
            Cell::new(&t.context.reason),
            Cell::new(t.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn decide(
    state: &AppState,
    ticket_id: &str,
    decision: Decision,
    notes: Option<&str>,
    json: bool,
) -> Result<()> {
    let (ack, outcome) = state
        .workflow_service
        .decide_and_run(ticket_id, decision, notes)
        .await?;

    if json {
        let out = serde_json::json!({
            "ack": ack,
            "status": outcome.status,
            "step": outcome.step,
            "error": outcome.error,
            "state": outcome.state,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} recorded for {} (next stage: {})",
        style("*").green().bold(),
        style(ack.decision).bold(),
        style(&ack.ticket_id).yellow(),
        ack.next_stage
    );
    print_outcome(&outcome);
    println!();
    Ok(())
}
