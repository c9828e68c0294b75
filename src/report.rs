//! Status document rendering.
//!
//! Formats registry snapshots as human-readable lines or JSON.

use crate::model::AppSnapshot;
use anyhow::{Context, Result};

/// Pre-formatted lines for text output.
pub(crate) struct TextReport {
    pub lines: Vec<String>,
}

/// Build the text status document, one block per app in registry order.
pub(crate) fn build_text_report(snapshots: &[AppSnapshot]) -> TextReport {
    let mut lines = vec!["App Test Harness Status:".to_string(), String::new()];

    for s in snapshots {
        lines.push(format!(
            "App {}: {} (Driver: {})",
            s.id, s.name, s.driver_class
        ));
        lines.push(format!(
            "  Running: {}",
            if s.is_running { "Yes" } else { "No" }
        ));
        lines.push(format!("  Trials: {}", s.counts.trials));
        lines.push(format!(
            "  Automatic Recovery: {} ({:.1}%)",
            s.counts.automatic, s.percentages.automatic
        ));
        lines.push(format!(
            "  Manual Recovery: {} ({:.1}%)",
            s.counts.manual, s.percentages.manual
        ));
        lines.push(format!(
            "  Failed Recovery: {} ({:.1}%)",
            s.counts.failed, s.percentages.failed
        ));
        lines.push(String::new());
    }

    TextReport { lines }
}

pub(crate) fn build_json_report(snapshots: &[AppSnapshot]) -> Result<String> {
    serde_json::to_string_pretty(snapshots).context("failed to serialize status report")
}
