//! Structured JSON report output.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::probfile::{ReportError, ScoredRecord};
use crate::session::LocationScore;

/// Flatten scored records into a list sorted by descending anomaly score and
/// serialize it pretty-printed.
pub fn records_to_json(records: &BTreeMap<String, ScoredRecord>) -> Result<String, ReportError> {
    let mut list: Vec<&ScoredRecord> = records.values().collect();
    list.sort_by(|a, b| b.anomaly_score.total_cmp(&a.anomaly_score));
    Ok(serde_json::to_string_pretty(&list)?)
}

/// Write the sorted record list to a file.
pub fn write_records<P: AsRef<Path>>(
    records: &BTreeMap<String, ScoredRecord>,
    path: P,
) -> Result<(), ReportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(records_to_json(records)?.as_bytes())?;
    Ok(())
}

/// Serialize location scores as `(package, location, score)` rows, in the
/// order given.
pub fn location_scores_to_json(scores: &[LocationScore]) -> Result<String, ReportError> {
    let rows: Vec<serde_json::Value> = scores
        .iter()
        .map(|s| {
            serde_json::json!({
                "package": s.package_name,
                "location": s.location,
                "score": s.score,
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}
