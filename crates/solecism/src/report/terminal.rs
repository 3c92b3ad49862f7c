//! Human-readable report lines.
//!
//! One line per scored location, `"{location:<35} : {score:.4}"`, grouped
//! under a package header. Scores at or above the highlight threshold are
//! rendered red and bold so the anomalies stand out when scrolling.

use colored::Colorize;

use crate::session::LocationScore;

/// Format location scores grouped by package. `highlight_at` marks the score
/// level rendered as anomalous.
pub fn format_location_scores(scores: &[LocationScore], highlight_at: f64) -> String {
    let mut out = String::new();
    let mut current_package = None;
    for entry in scores {
        if current_package != Some(entry.package_index) {
            current_package = Some(entry.package_index);
            out.push_str(&format!("### {}\n", entry.package_name.bold()));
        }
        let line = format!("  {:<35} : {:.4}", entry.location, entry.score);
        if entry.score >= highlight_at {
            out.push_str(&format!("{}\n", line.red().bold()));
        } else {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// One-line summary of a Mean Average Precision result.
pub fn format_map_score(map: Option<f64>) -> String {
    match map {
        Some(score) => format!("MAP: {:.4}", score),
        None => format!("MAP: {}", "undefined (ground truth incomplete)".yellow()),
    }
}
