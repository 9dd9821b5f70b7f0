//! Draft maintenance subcommands: list stored drafts and clear a form.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Serialize;

use tutorhub_infra::sqlite::draft::StoredDraftSummary;
use tutorhub_types::draft::DraftKey;

use crate::state::AppState;

/// Draft subcommands.
#[derive(Subcommand)]
pub enum DraftsCommand {
    /// List stored drafts, most recent first.
    #[command(alias = "ls")]
    List {
        /// Only drafts whose form identity starts with this prefix.
        #[arg(long)]
        form: Option<String>,
    },

    /// Delete every stored step draft of a form.
    Clear {
        /// Form identity, e.g. `institution-signup/0190c4e2-...`.
        form: String,
    },
}

/// One listed draft.
#[derive(Debug, Serialize)]
pub struct DraftRow {
    pub form: String,
    pub step: Option<u32>,
    pub storage_key: String,
    pub size_bytes: usize,
    pub updated_at: String,
}

impl From<StoredDraftSummary> for DraftRow {
    fn from(summary: StoredDraftSummary) -> Self {
        let (form, step) = match summary.storage_key.parse::<DraftKey>() {
            Ok(key) => (key.form, Some(key.step)),
            Err(_) => (summary.storage_key.clone(), None),
        };
        Self {
            form,
            step,
            storage_key: summary.storage_key,
            size_bytes: summary.size_bytes,
            updated_at: summary.updated_at.to_rfc3339(),
        }
    }
}

/// Handle a drafts subcommand.
pub async fn handle_drafts_command(cmd: DraftsCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        DraftsCommand::List { form } => list_drafts(state, form.as_deref(), json).await,
        DraftsCommand::Clear { form } => clear_drafts(state, &form, json).await,
    }
}

/// Stored drafts under `prefix`. Empty for the in-memory backend, which
/// holds nothing between runs.
pub async fn collect_rows(state: &AppState, prefix: &str) -> Result<Vec<DraftRow>> {
    let Some(repo) = state.drafts.as_sqlite() else {
        return Ok(Vec::new());
    };
    let summaries = repo
        .list_summaries(prefix)
        .await
        .context("Failed to list stored drafts")?;
    Ok(summaries.into_iter().map(DraftRow::from).collect())
}

async fn list_drafts(state: &AppState, form: Option<&str>, json: bool) -> Result<()> {
    let rows = collect_rows(state, form.unwrap_or("")).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!();
        println!("  {}", style("No stored drafts.").dim());
        if state.drafts.as_sqlite().is_none() {
            println!("  {}", style("Draft storage is in-memory; nothing persists between runs.").dim());
        }
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Form").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Size").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(&row.form).fg(Color::Cyan),
            Cell::new(row.step.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string())),
            Cell::new(format!("{} B", row.size_bytes)).fg(Color::DarkGrey),
            Cell::new(&row.updated_at).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {} draft(s)", style(rows.len()).bold());
    println!();
    Ok(())
}

async fn clear_drafts(state: &AppState, form: &str, json: bool) -> Result<()> {
    let cleared = state.draft_store().clear_form(form).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "form": form, "cleared": cleared }))?
        );
    } else if cleared == 0 {
        println!("  {} No drafts stored for '{}'", style("·").dim(), form);
    } else {
        println!(
            "  {} Cleared {} draft(s) for '{}'",
            style("✓").green().bold(),
            cleared,
            style(form).cyan()
        );
    }
    Ok(())
}
