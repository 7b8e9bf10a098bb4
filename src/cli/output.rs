//! Output formatting for CLI commands
//!
//! Everything prints as pretty JSON except `history`, which also has a table.

use crate::secrets::CombinedTimeline;
use crate::services::ProvisionReport;
use anyhow::{Context, Result};
use serde::Serialize;
use std::str::FromStr;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            _ => anyhow::bail!("Unsupported output format: '{}'. Use 'json' or 'table'.", s),
        }
    }
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print a timeline in the requested format
pub fn print_timeline(timeline: &CombinedTimeline, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(timeline),
        OutputFormat::Table => {
            println!("{} ({})", timeline.display_name, timeline.backend_id);
            for line in timeline_table(timeline) {
                println!("{}", line);
            }
            if !timeline.orphaned.is_empty() {
                println!();
                println!(
                    "{} ledger entries refer to versions the backend no longer lists",
                    timeline.orphaned.len()
                );
            }
            Ok(())
        }
    }
}

/// Header, separator and one line per backend version
pub fn timeline_table(timeline: &CombinedTimeline) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{:<38} {:<9} {:<20} {:<9} {:<20} {}",
            "Version", "Stage", "Created", "Operation", "Actor", "Revertible"
        ),
        "-".repeat(110),
    ];

    for row in &timeline.rows {
        let created = row
            .version
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let (operation, actor) = match &row.ledger {
            Some(entry) => {
                (entry.operation.as_str().to_string(), entry.metadata.actor_name.clone())
            }
            None => ("-".to_string(), "-".to_string()),
        };

        lines.push(format!(
            "{:<38} {:<9} {:<20} {:<9} {:<20} {}",
            truncate(&row.version.version_id, 38),
            row.version.stage.as_str(),
            created,
            operation,
            truncate(&actor, 20),
            if row.revertible { "yes" } else { "no" }
        ));
    }

    lines
}

/// Print which environments were provisioned and which failed
pub fn print_provision_report(report: &ProvisionReport) {
    for provisioned in &report.succeeded {
        println!(
            "✅ {}: {} (version {})",
            provisioned.environment.name,
            provisioned.record.metadata.display_name,
            provisioned.record.current_version_id
        );
    }
    for failure in &report.failed {
        println!("❌ {}: {}", failure.environment.name, failure.error);
    }
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
