//! CLI presentation: text and json formatters per command family.

use crate::error::{ApiError, StorageError};
use crate::import::ImportReport;
use crate::retry::RestoreResult;
use crate::story::{Branch, Checkpoint, EntryType, Story, StoryEntry, StoryMode};
use chrono::{TimeZone, Utc};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

const PREVIEW_CHARS: usize = 60;

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::StorageError(StorageError::from(e)))
}

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn timestamp(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    let mut out: String = line.chars().take(PREVIEW_CHARS).collect();
    if line.chars().count() > PREVIEW_CHARS || text.lines().nth(1).is_some() {
        out.push('…');
    }
    out
}

fn short(id: &str) -> &str {
    &id[..id.len().min(8)]
}

fn mode_label(mode: StoryMode) -> &'static str {
    match mode {
        StoryMode::Adventure => "adventure",
        StoryMode::CreativeWriting => "creative writing",
    }
}

fn entry_label(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::UserAction => "action",
        EntryType::Narration => "narration",
        EntryType::System => "system",
    }
}

pub fn format_stories_text(stories: &[Story]) -> String {
    if stories.is_empty() {
        return "No stories.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Title", "Mode", "Branch", "Updated"]);
    for story in stories {
        table.add_row(vec![
            story.id.clone(),
            story.title.clone(),
            mode_label(story.mode).to_string(),
            story
                .current_branch_id
                .as_deref()
                .map_or_else(|| "main".to_string(), |b| short(b).to_string()),
            timestamp(story.updated_at),
        ]);
    }
    table.to_string()
}

pub fn format_entries_text(story: &Story, branch_label: &str, entries: &[StoryEntry]) -> String {
    let mut out = format!(
        "{}\n\n",
        format_section_heading(&format!("{} ({})", story.title, branch_label))
    );
    if entries.is_empty() {
        out.push_str("No entries.");
        return out;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Pos", "ID", "Type", "Branch", "Content"]);
    for entry in entries {
        table.add_row(vec![
            entry.position.to_string(),
            short(&entry.id).to_string(),
            entry_label(entry.entry_type).to_string(),
            entry
                .branch_id
                .as_deref()
                .map_or_else(|| "main".to_string(), |b| short(b).to_string()),
            preview(&entry.content),
        ]);
    }
    out.push_str(&table.to_string());
    out
}

/// Branch table with the current branch highlighted. The main timeline is always listed first.
pub fn format_branches_text(branches: &[Branch], current: Option<&str>) -> String {
    let marker = |is_current: bool, name: &str| {
        if is_current {
            format!("{} {}", "*".green(), name.green().bold())
        } else {
            format!("  {}", name)
        }
    };
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Name",
        "ID",
        "Parent",
        "Fork entry",
        "Checkpoint",
        "Created",
    ]);
    table.add_row(vec![
        marker(current.is_none(), "main"),
        "-".to_string(),
        "-".to_string(),
        "-".to_string(),
        "-".to_string(),
        "-".to_string(),
    ]);
    for branch in branches {
        table.add_row(vec![
            marker(current == Some(branch.id.as_str()), &branch.name),
            branch.id.clone(),
            branch
                .parent_branch_id
                .as_deref()
                .map_or_else(|| "main".to_string(), |p| short(p).to_string()),
            short(&branch.fork_entry_id).to_string(),
            branch
                .checkpoint_id
                .as_deref()
                .map_or_else(|| "-".to_string(), |c| short(c).to_string()),
            timestamp(branch.created_at),
        ]);
    }
    table.to_string()
}

pub fn format_checkpoints_text(checkpoints: &[Checkpoint]) -> String {
    if checkpoints.is_empty() {
        return "No checkpoints.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Name",
        "ID",
        "Branch",
        "Entries",
        "Last entry",
        "Created",
    ]);
    for cp in checkpoints {
        table.add_row(vec![
            cp.name.clone(),
            cp.id.clone(),
            cp.branch_id
                .as_deref()
                .map_or_else(|| "main".to_string(), |b| short(b).to_string()),
            cp.entry_count.to_string(),
            cp.last_entry_preview
                .as_deref()
                .map(preview)
                .unwrap_or_default(),
            timestamp(cp.created_at),
        ]);
    }
    table.to_string()
}

pub fn format_import_report(report: &ImportReport) -> String {
    let mut out = format!(
        "Imported story {}: {} entries, {} entities, {} checkpoints, {} branches",
        report.story_id.bold(),
        report.entries,
        report.entities,
        report.checkpoints,
        report.branches.inserted
    );
    if !report.branches.flattened.is_empty() {
        out.push_str(&format!(
            "\n{} {} branch(es) had a missing parent and now fork from the main timeline: {}",
            "warning:".yellow(),
            report.branches.flattened.len(),
            report.branches.flattened.join(", ")
        ));
    }
    out
}

pub fn format_restore_result(result: &RestoreResult) -> String {
    if result.success {
        format!(
            "{} removed {} entries and {} entities",
            "Rolled back:".green(),
            result.entries_removed,
            result.entities_removed
        )
    } else {
        format!(
            "{} {}",
            "Rollback failed:".red(),
            result.error.as_deref().unwrap_or("unknown error")
        )
    }
}
