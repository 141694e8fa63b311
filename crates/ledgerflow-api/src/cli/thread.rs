//! `lflow threads`, `lflow trace` and `lflow recover`.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use ledgerflow_types::checkpoint::ThreadStatus;

use crate::cli::{status_cell, styled_status};
use crate::state::AppState;

pub async fn list_threads(state: &AppState, status: Option<ThreadStatus>, json: bool) -> Result<()> {
    let threads = state.workflow_service.list_threads(status).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&threads)?);
        return Ok(());
    }

    if threads.is_empty() {
        println!();
        println!("  No threads found.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Thread").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Step"),
            Cell::new("Next"),
            Cell::new("Updated"),
        ]);

    for t in &threads {
        table.add_row(vec![
            Cell::new(&t.thread_id),
            status_cell(t.status),
            Cell::new(t.step),
            Cell::new(&t.next_node),
            Cell::new(t.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn trace(state: &AppState, thread_id: &str, json: bool) -> Result<()> {
    let trail = state.workflow_service.audit_trail(thread_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&trail)?);
        return Ok(());
    }

    println!();
    println!(
        "  Thread {} is {} (next: {})",
        style(&trail.thread_id).cyan(),
        styled_status(trail.status),
        trail.next_node
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Node"),
            Cell::new("Status"),
            Cell::new("Stage"),
            Cell::new("Time"),
            Cell::new("Error"),
        ]);

    for entry in &trail.steps {
        let stage = entry
            .output
            .as_ref()
            .and_then(|o| o.get("stage"))
            .and_then(|s| s.as_str())
            .unwrap_or("-");
        table.add_row(vec![
            Cell::new(entry.step),
            Cell::new(entry.node.as_deref().unwrap_or("(seed)")),
            status_cell(entry.status),
            Cell::new(stage),
            Cell::new(entry.timestamp.format("%H:%M:%S%.3f").to_string()),
            Cell::new(entry.error.as_deref().unwrap_or("")).fg(Color::Red),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}

pub async fn recover(state: &AppState, json: bool) -> Result<()> {
    let report = state.workflow_service.recover().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Resumed {} thread(s), re-registered {} ticket(s)",
        style("*").green().bold(),
        report.resumed.len(),
        report.tickets_registered.len()
    );
    for t in &report.resumed {
        println!("  {} {} {}", style("-").dim(), t.thread_id, styled_status(t.status));
    }
    for err in &report.errors {
        println!("  {} {}", style("!").red().bold(), err);
    }
    println!();
    Ok(())
}
