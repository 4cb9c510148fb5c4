//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, engine wiring and cursor persistence.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use synapse_adapters::{CursorFile, HttpWorkflowInvoker, LoggingInvoker, SpoolEmailSource};
use synapse_core::{CheckOutcome, SynapseEngine, WorkflowInvoker};

use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Log to stderr; stdout carries command output.  `RUST_LOG` directives
/// win over `default`.
pub fn init_tracing(default: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Engine wiring
// ---------------------------------------------------------------------------

/// Choose the workflow invoker for this run.
pub fn build_invoker(settings: &Settings, dry_run: bool) -> Result<Arc<dyn WorkflowInvoker>> {
    if dry_run {
        info!("dry run: workflow invocations are logged, not sent");
        return Ok(Arc::new(LoggingInvoker::new()));
    }

    let invoker = HttpWorkflowInvoker::new(&settings.workflows)
        .context("invalid [workflows] table")?;
    let batch_workflow = &settings.engine.batcher.workflow;
    if !invoker.resolves(batch_workflow) {
        warn!(
            workflow = %batch_workflow,
            "batch workflow has no endpoint in [workflows]; flushes will fail"
        );
    }
    Ok(Arc::new(invoker))
}

/// Build the engine and register the triggers declared in the config.
pub async fn build_engine(settings: &Settings, dry_run: bool) -> Result<SynapseEngine> {
    let invoker = build_invoker(settings, dry_run)?;
    let source = Arc::new(SpoolEmailSource::new(settings.mail.spool_dir.clone()));

    let engine = SynapseEngine::new(settings.engine.clone(), invoker, source)
        .context("invalid engine configuration")?;
    engine
        .register_configured_triggers(&settings.email_triggers)
        .await
        .context("invalid [[email_triggers]] entry")?;

    info!(
        spool_dir = %settings.mail.spool_dir.display(),
        triggers = settings.email_triggers.len(),
        "synapse engine ready"
    );
    Ok(engine)
}

// ---------------------------------------------------------------------------
// Cursor persistence
// ---------------------------------------------------------------------------

/// The cursor file for the configured spool.
pub fn cursor_file(settings: &Settings) -> CursorFile {
    CursorFile::in_dir(&settings.mail.spool_dir)
}

/// Resume `engine` from the cursor an earlier run saved, if any.
pub async fn restore_cursor(engine: &SynapseEngine, file: &CursorFile) -> Result<()> {
    let saved = file
        .load()
        .await
        .with_context(|| format!("unreadable cursor file {}", file.path().display()))?;
    if let Some(saved) = saved {
        engine.restore_email_cursor(saved).await;
        info!(cursor = %saved, "resuming from saved email cursor");
    }
    Ok(())
}

/// Save the engine's current cursor for the next run.
pub async fn save_cursor(engine: &SynapseEngine, file: &CursorFile) -> Result<()> {
    let cursor = engine.email_cursor().await;
    file.save(cursor)
        .await
        .with_context(|| format!("failed to write cursor file {}", file.path().display()))
}

/// One email check that resumes from, and then saves, the persisted cursor.
pub async fn check_once(settings: &Settings, dry_run: bool) -> Result<CheckOutcome> {
    let engine = build_engine(settings, dry_run).await?;
    let file = cursor_file(settings);
    restore_cursor(&engine, &file).await?;

    let outcome = engine.check_for_new_emails().await?;
    save_cursor(&engine, &file).await?;
    Ok(outcome)
}

/// Read a non-empty environment variable.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
