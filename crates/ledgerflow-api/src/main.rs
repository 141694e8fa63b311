//! Ledgerflow CLI and REST API entry point.
//!
//! Binary name: `lflow`
//!
//! Parses CLI arguments, initializes tracing, database and services, then
//! dispatches to the command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use ledgerflow_observe::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        enable_otel: cli.otel,
        ..TracingOptions::from_verbosity(cli.verbose, cli.quiet)
    };
    if let Err(e) = init_tracing(&options) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    match cli.command {
        Commands::Serve { port, host } => {
            // Resumed threads run on spawned tasks; binding does not wait on workers.
            let report = state.workflow_service.recover_in_background().await?;
            if !report.resumed.is_empty() || !report.tickets_registered.is_empty() {
                tracing::info!(
                    resumed = report.resumed.len(),
                    tickets = report.tickets_registered.len(),
                    "scheduled recovery of interrupted threads"
                );
            }
            for err in &report.errors {
                tracing::error!("recovery: {err}");
            }

            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Ledgerflow API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!(
                "  {}",
                console::style(format!("Data: {}", state.data_dir.display())).dim()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }

        Commands::Submit { file } => {
            cli::invoice::submit(&state, &file, cli.json).await?;
        }

        Commands::Reviews => {
            cli::review::list_reviews(&state, cli.json).await?;
        }

        Commands::Decide {
            ticket_id,
            decision,
            notes,
        } => {
            cli::review::decide(&state, &ticket_id, decision.into(), notes.as_deref(), cli.json)
                .await?;
        }

        Commands::Threads { status } => {
            cli::thread::list_threads(&state, status.map(Into::into), cli.json).await?;
        }

        Commands::Trace { thread_id } => {
            cli::thread::trace(&state, &thread_id, cli.json).await?;
        }

        Commands::Recover => {
            cli::thread::recover(&state, cli.json).await?;
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
