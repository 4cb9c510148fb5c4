//! CLI entry point for Synapse.
//!
//! This binary provides the `synapse` command with subcommands for running
//! the engine against stdin, doing a one-off email check, and printing the
//! effective configuration.

mod cli;
mod feed;
mod helpers;
mod settings;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

use synapse_core::SynapseEngine;

use crate::cli::{Cli, Commands};
use crate::feed::FeedCommand;
use crate::helpers::{
    build_engine, check_once, cursor_file, init_tracing, restore_cursor, save_cursor,
};
use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { dry_run } => {
            init_tracing(LevelFilter::INFO);
            cmd_run(&Settings::load(&cli.config)?, dry_run).await
        }
        Commands::Check { dry_run } => {
            init_tracing(LevelFilter::INFO);
            cmd_check(&Settings::load(&cli.config)?, dry_run).await
        }
        Commands::Status => {
            init_tracing(LevelFilter::WARN);
            cmd_status(&cli.config)
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(settings: &Settings, dry_run: bool) -> Result<()> {
    let engine = build_engine(settings, dry_run).await?;
    let cursor = cursor_file(settings);
    restore_cursor(&engine, &cursor).await?;
    engine.start_polling().await?;

    info!("reading state changes from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };
        let Some(line) = line else {
            info!("stdin closed");
            break;
        };

        match feed::parse_line(&line) {
            Ok(FeedCommand::Quit) => break,
            Ok(command) => handle(&engine, command).await?,
            Err(e) => error!(error = %e, "ignoring input line"),
        }
    }

    let flushed = engine.shutdown().await;
    println!("flushed {flushed} batch(es) on shutdown");
    save_cursor(&engine, &cursor).await
}

async fn handle(engine: &SynapseEngine, command: FeedCommand) -> Result<()> {
    match command {
        FeedCommand::Record(change) => engine.record_state_change(change).await,
        FeedCommand::Flush(key) => {
            let flushed = engine.flush_state_changes(key.as_deref()).await;
            println!("flushed {flushed} batch(es)");
        }
        FeedCommand::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.get_stats())?);
            println!("{}", serde_json::to_string_pretty(&engine.get_trigger_stats())?);
        }
        FeedCommand::Triggers => {
            let triggers = engine.get_registered_email_triggers().await;
            println!("{}", serde_json::to_string_pretty(&triggers)?);
        }
        FeedCommand::Quit | FeedCommand::Skip => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: check
// ---------------------------------------------------------------------------

async fn cmd_check(settings: &Settings, dry_run: bool) -> Result<()> {
    let outcome = check_once(settings, dry_run).await?;

    println!(
        "checked {} new email(s), cursor {}",
        outcome.emails_seen, outcome.cursor
    );
    for id in &outcome.fired {
        println!("fired {id}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

fn cmd_status(config_path: &std::path::Path) -> Result<()> {
    let settings = Settings::load(config_path)?;
    let engine = &settings.engine;

    println!();
    println!("  Synapse Status");
    println!("  ==============");
    println!();
    if config_path.exists() {
        println!("  Config:           OK ({})", config_path.display());
    } else {
        println!("  Config:           MISSING (using defaults)");
    }
    println!(
        "  Batching:         window {}ms, cap {}ms, max {} change(s) -> {}",
        engine.batcher.window_ms,
        engine.batcher.max_window_ms,
        engine.batcher.max_batch_size,
        engine.batcher.workflow
    );
    println!(
        "  Email polling:    {} every {}s",
        if engine.poller.enabled { "enabled" } else { "disabled" },
        engine.poller.interval_secs
    );
    let spool = &settings.mail.spool_dir;
    println!(
        "  Spool directory:  {} ({})",
        spool.display(),
        if spool.is_dir() { "OK" } else { "MISSING" }
    );

    println!();
    println!("  Workflows ({}):", settings.workflows.len());
    for (name, url) in &settings.workflows {
        println!("    {name:<28} {url}");
    }

    println!();
    println!("  Email triggers ({}):", settings.email_triggers.len());
    for trigger in &settings.email_triggers {
        let routed = settings.workflows.contains_key(trigger.workflow.as_str());
        println!(
            "    {:<28} -> {}{}{}",
            trigger.id,
            trigger.workflow,
            if trigger.one_shot { " (one-shot)" } else { "" },
            if routed { "" } else { " [no endpoint]" }
        );
    }
    println!();

    Ok(())
}
